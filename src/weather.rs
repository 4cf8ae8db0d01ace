//! Ambient weather reading resolved once per run.
//!
//! The chain is strictly sequential: acquire a location fix, ask the weather
//! provider, and only when the provider rejects the credential, fall back to
//! reverse geocoding for a best-effort placeholder reading. No stage retries.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use anyhow::{Result, anyhow};

use crate::config::Config;

const LOCATE_TIMEOUT: Duration = Duration::from_secs(10);
const PROVIDER_OK: i64 = 200;

/// Temperature shown when the provider is unavailable and only the place name
/// could be recovered.
const PLACEHOLDER_TEMP_C: f64 = 27.8;
const GENERIC_LOCALITY: &str = "Local Area";

#[derive(Debug, Clone, Copy)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReading {
    pub location_label: String,
    pub temperature_celsius: f64,
    pub condition_main: String,
    pub condition_description: String,
    pub icon_id: String,
    /// True when this is the placeholder reading with only a genuine location.
    pub degraded: bool,
}

impl WeatherReading {
    /// Whole-degree rendering; the stored temperature stays untouched.
    pub fn display_temperature(&self) -> String {
        format!("{}°C", self.temperature_celsius.round() as i64)
    }

    fn degraded(location_label: String) -> Self {
        Self {
            location_label,
            temperature_celsius: PLACEHOLDER_TEMP_C,
            condition_main: "Clear".to_string(),
            condition_description: "clear sky".to_string(),
            icon_id: "01d".to_string(),
            degraded: true,
        }
    }
}

/// Resolver result shown in the header. Moves away from `Loading` exactly
/// once and never back.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolverStatus {
    Loading,
    Error(String),
    Ready(WeatherReading),
}

/// Outcome of the primary provider call. `Unauthorized` is the only trigger
/// for the degraded path; everything else that is not a clean success lands
/// in `ServiceError`.
#[derive(Debug)]
enum WeatherOutcome {
    Unauthorized,
    ServiceError(String),
    Success(WeatherReading),
}

#[derive(Debug, Deserialize)]
struct WeatherPayload {
    #[serde(default)]
    cod: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    main: PayloadMain,
    #[serde(default)]
    weather: Vec<PayloadCondition>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PayloadMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct PayloadCondition {
    main: String,
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct LocationFix {
    status: String,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeReply {
    #[serde(default)]
    city: Option<String>,
}

pub struct WeatherResolver {
    client: Client,
    location_url: String,
    weather_url: String,
    geocoding_url: String,
    api_key: Option<String>,
}

impl WeatherResolver {
    pub fn new(
        location_url: String,
        weather_url: String,
        geocoding_url: String,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            location_url,
            weather_url,
            geocoding_url,
            api_key,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.location_url(),
            config.weather_url(),
            config.geocoding_url(),
            config.weather_api_key(),
        )
    }

    /// Run the whole chain to a terminal state. Never returns `Loading` and
    /// never panics; every failure is folded into `Error` or the degraded
    /// reading.
    pub async fn resolve(&self) -> ResolverStatus {
        let coords = match self.locate().await {
            Ok(coords) => coords,
            Err(e) => {
                tracing::warn!("location acquisition failed: {e:#}");
                return ResolverStatus::Error(format!("Location Error: {e}"));
            }
        };

        match self.fetch_current(coords).await {
            WeatherOutcome::Success(reading) => ResolverStatus::Ready(reading),
            WeatherOutcome::Unauthorized => {
                tracing::info!("weather provider rejected the credential, degrading");
                ResolverStatus::Ready(self.degraded_reading(coords).await)
            }
            WeatherOutcome::ServiceError(message) => {
                tracing::warn!("weather provider failed: {message}");
                ResolverStatus::Error(format!("Weather service error: {message}"))
            }
        }
    }

    /// One-shot location fix, bounded by a 10 second timeout. This is the
    /// only cancellation-bearing stage in the chain.
    async fn locate(&self) -> Result<Coordinates> {
        tokio::time::timeout(LOCATE_TIMEOUT, self.locate_inner())
            .await
            .map_err(|_| anyhow!("timed out acquiring a location fix"))?
    }

    async fn locate_inner(&self) -> Result<Coordinates> {
        let response = self.client.get(&self.location_url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "location service returned status {}",
                response.status()
            ));
        }

        let fix: LocationFix = response.json().await?;
        if fix.status != "success" {
            return Err(anyhow!(
                fix.message
                    .unwrap_or_else(|| "location lookup failed".to_string())
            ));
        }

        Ok(Coordinates {
            latitude: fix.lat,
            longitude: fix.lon,
        })
    }

    async fn fetch_current(&self, coords: Coordinates) -> WeatherOutcome {
        // No credential at all gets the same treatment the provider would
        // give it: the degraded path, not a terminal error.
        let Some(api_key) = &self.api_key else {
            return WeatherOutcome::Unauthorized;
        };

        let request = self
            .client
            .get(&self.weather_url)
            .query(&[
                ("lat", coords.latitude.to_string()),
                ("lon", coords.longitude.to_string()),
                ("appid", api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .send();

        let response = match request.await {
            Ok(response) => response,
            Err(e) => return WeatherOutcome::ServiceError(e.to_string()),
        };

        if response.status() == StatusCode::UNAUTHORIZED {
            return WeatherOutcome::Unauthorized;
        }
        if !response.status().is_success() {
            return WeatherOutcome::ServiceError(format!(
                "provider returned status {}",
                response.status()
            ));
        }

        match response.json::<WeatherPayload>().await {
            Ok(payload) => classify(payload),
            Err(e) => WeatherOutcome::ServiceError(e.to_string()),
        }
    }

    /// Degraded path: recover a place name, or settle for a generic label.
    /// Never an error; coordinates are known, so something is always shown.
    async fn degraded_reading(&self, coords: Coordinates) -> WeatherReading {
        let label = match self.reverse_geocode(coords).await {
            Ok(label) => label,
            Err(e) => {
                tracing::warn!("reverse geocoding failed: {e:#}");
                GENERIC_LOCALITY.to_string()
            }
        };
        WeatherReading::degraded(label)
    }

    async fn reverse_geocode(&self, coords: Coordinates) -> Result<String> {
        let response = self
            .client
            .get(&self.geocoding_url)
            .query(&[
                ("latitude", coords.latitude.to_string()),
                ("longitude", coords.longitude.to_string()),
                ("localityLanguage", "en".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "geocoder returned status {}",
                response.status()
            ));
        }

        let reply: GeocodeReply = response.json().await?;
        Ok(reply
            .city
            .filter(|city| !city.is_empty())
            .unwrap_or_else(|| GENERIC_LOCALITY.to_string()))
    }
}

/// Map a success-shaped payload to a reading, or to a service error when the
/// internal status sentinel or the condition list disagrees.
fn classify(payload: WeatherPayload) -> WeatherOutcome {
    if payload.cod != PROVIDER_OK {
        return WeatherOutcome::ServiceError(
            payload
                .message
                .unwrap_or_else(|| format!("provider status {}", payload.cod)),
        );
    }

    let Some(condition) = payload.weather.into_iter().next() else {
        return WeatherOutcome::ServiceError("payload carried no condition entries".to_string());
    };

    WeatherOutcome::Success(WeatherReading {
        location_label: payload.name,
        temperature_celsius: payload.main.temp,
        condition_main: condition.main,
        condition_description: condition.description,
        icon_id: condition.icon,
        degraded: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> WeatherPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn ok_payload_becomes_reading() {
        let outcome = classify(payload(
            r#"{
                "cod": 200,
                "name": "Bengaluru",
                "main": {"temp": 27.8},
                "weather": [{"main": "Clouds", "description": "scattered clouds", "icon": "03d"}]
            }"#,
        ));

        match outcome {
            WeatherOutcome::Success(reading) => {
                assert_eq!(reading.location_label, "Bengaluru");
                assert_eq!(reading.temperature_celsius, 27.8);
                assert_eq!(reading.condition_main, "Clouds");
                assert_eq!(reading.condition_description, "scattered clouds");
                assert_eq!(reading.icon_id, "03d");
                assert!(!reading.degraded);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn first_condition_entry_wins() {
        let outcome = classify(payload(
            r#"{
                "cod": 200,
                "name": "Pune",
                "main": {"temp": 31.2},
                "weather": [
                    {"main": "Rain", "description": "light rain", "icon": "10d"},
                    {"main": "Clouds", "description": "broken clouds", "icon": "04d"}
                ]
            }"#,
        ));

        match outcome {
            WeatherOutcome::Success(reading) => assert_eq!(reading.condition_main, "Rain"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn internal_sentinel_mismatch_is_a_service_error() {
        let outcome = classify(payload(r#"{"cod": 500, "message": "upstream down"}"#));
        match outcome {
            WeatherOutcome::ServiceError(message) => assert_eq!(message, "upstream down"),
            other => panic!("expected service error, got {other:?}"),
        }
    }

    #[test]
    fn sentinel_mismatch_without_message_names_the_status() {
        let outcome = classify(payload(r#"{"cod": 429}"#));
        match outcome {
            WeatherOutcome::ServiceError(message) => assert!(message.contains("429")),
            other => panic!("expected service error, got {other:?}"),
        }
    }

    #[test]
    fn empty_condition_list_is_a_service_error() {
        let outcome = classify(payload(
            r#"{"cod": 200, "name": "Pune", "main": {"temp": 30.0}, "weather": []}"#,
        ));
        assert!(matches!(outcome, WeatherOutcome::ServiceError(_)));
    }

    #[test]
    fn display_temperature_rounds_to_whole_degrees() {
        let mut reading = WeatherReading::degraded("Pune".to_string());
        assert_eq!(reading.display_temperature(), "28°C");

        reading.temperature_celsius = 27.4;
        assert_eq!(reading.display_temperature(), "27°C");

        reading.temperature_celsius = -0.2;
        assert_eq!(reading.display_temperature(), "0°C");
    }

    #[test]
    fn degraded_reading_uses_placeholder_fields() {
        let reading = WeatherReading::degraded("Nashik".to_string());
        assert_eq!(reading.location_label, "Nashik");
        assert_eq!(reading.temperature_celsius, 27.8);
        assert_eq!(reading.condition_main, "Clear");
        assert_eq!(reading.condition_description, "clear sky");
        assert_eq!(reading.icon_id, "01d");
        assert!(reading.degraded);
    }
}

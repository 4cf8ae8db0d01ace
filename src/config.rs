use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080";
pub const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
pub const DEFAULT_GEOCODING_URL: &str = "https://api.bigdatacloud.net/data/reverse-geocode-client";
pub const DEFAULT_LOCATION_URL: &str = "http://ip-api.com/json";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub backend_url: Option<String>,
    pub weather_api_key: Option<String>,
    pub weather_url: Option<String>,
    pub geocoding_url: Option<String>,
    pub location_url: Option<String>,
    /// External capture command whose stdout is treated as the spoken transcript.
    pub speech_command: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Chat backend base address. Env var wins over the config file.
    pub fn backend_url(&self) -> String {
        std::env::var("KRISHIMITR_BACKEND_URL")
            .ok()
            .or_else(|| self.backend_url.clone())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string())
    }

    pub fn weather_api_key(&self) -> Option<String> {
        std::env::var("OPENWEATHER_API_KEY")
            .ok()
            .or_else(|| self.weather_api_key.clone())
    }

    pub fn weather_url(&self) -> String {
        self.weather_url
            .clone()
            .unwrap_or_else(|| DEFAULT_WEATHER_URL.to_string())
    }

    pub fn geocoding_url(&self) -> String {
        self.geocoding_url
            .clone()
            .unwrap_or_else(|| DEFAULT_GEOCODING_URL.to_string())
    }

    pub fn location_url(&self) -> String {
        self.location_url
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCATION_URL.to_string())
    }

    pub fn speech_command(&self) -> Option<String> {
        self.speech_command.clone()
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("krishimitr").join("config.json"))
    }
}

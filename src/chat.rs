use reqwest::Client;
use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};

/// Which backend endpoint a dispatch goes to. Snapshotted when the request is
/// issued, so flipping the mode never affects an in-flight question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    Live,
    Offline,
}

impl ChatMode {
    pub fn endpoint(self) -> &'static str {
        match self {
            ChatMode::Live => "/api/chat",
            ChatMode::Offline => "/api/chat-offline",
        }
    }
}

#[derive(Serialize)]
struct ChatRequest {
    message: String,
}

#[derive(Deserialize)]
struct ChatReply {
    reply: String,
}

#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
        }
    }

    /// Send one question and return the backend's reply text.
    pub async fn ask(&self, mode: ChatMode, message: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, mode.endpoint());

        let request = ChatRequest {
            message: message.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "chat request failed with status: {}",
                response.status()
            ));
        }

        let reply: ChatReply = response.json().await?;
        Ok(reply.reply)
    }
}

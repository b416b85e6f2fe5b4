//! Runtime configuration.
//!
//! All secrets are read from the environment exactly once, before the
//! gateway binds its listener. The resulting [`Config`] is an immutable value
//! injected into every component at construction time; nothing reads the
//! environment after startup.

use anyhow::bail;

/// Default Graph API base (version-pinned, no trailing slash).
const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.facebook.com/v22.0";
/// Default OpenAI API base (no trailing slash).
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default completion model.
const DEFAULT_MODEL: &str = "gpt-4.1";

#[derive(Debug, Clone)]
pub struct Config {
    /// Webhook verification secret echoed by Meta during subscription.
    pub verify_token: String,
    /// Graph API bearer token.
    pub whatsapp_token: String,
    /// Sending phone-number id.
    pub phone_number_id: String,
    /// OpenAI API key.
    pub openai_api_key: String,
    /// Graph API base URL (override with `GRAPH_API_BASE_URL`).
    pub graph_base_url: String,
    /// OpenAI base URL (override with `OPENAI_BASE_URL`).
    pub openai_base_url: String,
    /// Completion model id (override with `OPENAI_MODEL`).
    pub model: String,
}

impl Config {
    /// Load configuration from the process environment, failing fast with a
    /// list of every missing required variable.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let verify_token = get("VERIFY_TOKEN");
        let whatsapp_token = get("WHATSAPP_TOKEN");
        let phone_number_id = get("PHONE_NUMBER_ID");
        let openai_api_key = get("OPENAI_API_KEY");

        let mut missing = Vec::new();
        if verify_token.is_none() {
            missing.push("VERIFY_TOKEN");
        }
        if whatsapp_token.is_none() {
            missing.push("WHATSAPP_TOKEN");
        }
        if phone_number_id.is_none() {
            missing.push("PHONE_NUMBER_ID");
        }
        if openai_api_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if !missing.is_empty() {
            bail!(
                "missing required environment variables: {}",
                missing.join(", ")
            );
        }

        Ok(Self {
            verify_token: verify_token.unwrap_or_default(),
            whatsapp_token: whatsapp_token.unwrap_or_default(),
            phone_number_id: phone_number_id.unwrap_or_default(),
            openai_api_key: openai_api_key.unwrap_or_default(),
            graph_base_url: get("GRAPH_API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string()),
            openai_base_url: get("OPENAI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    /// Graph API message-send endpoint for the configured sender number.
    pub fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.graph_base_url, self.phone_number_id)
    }

    /// Graph API media-metadata endpoint for a media id.
    pub fn media_url(&self, media_id: &str) -> String {
        format!("{}/{}", self.graph_base_url, media_id)
    }
}

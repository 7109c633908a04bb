//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - Built-in defaults (the `Default` impl below)
//! - An optional `config.toml` file
//! - Environment variables with an `APP_` prefix
//!
//! A few environment variables used by deployment platforms and the
//! original deployment scripts are special-cased on top of the `APP_`
//! convention: `HOST`, `PORT`, and `OPENAI_API_KEY`.
//!
//! ## Priority (highest to lowest):
//! 1. Special-case environment variables
//! 2. `APP_*` environment variables
//! 3. `config.toml`
//! 4. Defaults

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Default persona instructions sent to the realtime speech session.
/// Fixed for the lifetime of a call; not renegotiated mid-call.
const DEFAULT_INSTRUCTIONS: &str = "You are an AI phone agent for Divergent Digital Studio. \
Your task is to engage politely with customers calling our digital agency. \
Greet the caller warmly and introduce yourself as an AI assistant for Divergent Digital Studio. \
Ask for and confirm the caller's name. Inquire about the specific digital services they're \
interested in. Ask about their preferred time for a follow-up call. Guide them to our website \
www.thedds.com.au and strongly encourage them to fill out and submit the service request form \
there, explaining that the form is crucial for a tailored response. Assure them that our team \
will promptly review their form and contact them at their preferred time. Maintain a friendly \
and professional tone, ask one question at a time, and do not request contact information \
beyond what the caller volunteers. Conclude by reiterating the importance of submitting the \
form and thank them for their interest in Divergent Digital Studio.";

/// Default greeting spoken by the telephony provider before the media
/// stream is connected.
const DEFAULT_GREETING: &str =
    "Hi, you have called Divergent Digital Studio. How can we help? \
You can speak with your language preference!";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub openai: OpenAiConfig,
    pub agent: AgentConfig,
    pub webhook: WebhookConfig,
}

/// Server bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// OpenAI API settings for both the realtime link and the post-call
/// structured-extraction completion.
///
/// ## Fields:
/// - `api_key`: bearer credential, required at startup (`OPENAI_API_KEY`)
/// - `realtime_base`: WebSocket base URL for the realtime API
/// - `api_base`: HTTP base URL for the completions API
/// - `realtime_model` / `completion_model`: model identifiers
/// - `voice`: synthesized voice identity
/// - `temperature`: sampling temperature for the realtime session
/// - `transcription_model`: sub-model transcribing caller audio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub realtime_base: String,
    pub api_base: String,
    pub realtime_model: String,
    pub completion_model: String,
    pub voice: String,
    pub temperature: f32,
    pub transcription_model: String,
}

/// Phone-agent persona settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Greeting spoken to the caller before the stream opens.
    pub greeting: String,
    /// System instructions for the realtime session.
    pub instructions: String,
}

/// Downstream automation webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Target for the extracted customer-details POST. Unauthenticated.
    pub url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5050,
            },
            openai: OpenAiConfig {
                api_key: String::new(), // must come from the environment
                realtime_base: "wss://api.openai.com/v1/realtime".to_string(),
                api_base: "https://api.openai.com".to_string(),
                realtime_model: "gpt-4o-realtime-preview-2024-10-01".to_string(),
                completion_model: "gpt-4o-2024-08-06".to_string(),
                voice: "alloy".to_string(),
                temperature: 0.8,
                transcription_model: "whisper-1".to_string(),
            },
            agent: AgentConfig {
                greeting: DEFAULT_GREETING.to_string(),
                instructions: DEFAULT_INSTRUCTIONS.to_string(),
            },
            webhook: WebhookConfig {
                url: "https://hook.us2.make.com/hh9edyw1fblx9gibhh8dt7cncbmq9hs0".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml`, and environment
    /// variables, in that order.
    ///
    /// ## Environment variable examples:
    /// - `APP_SERVER_PORT=8080`
    /// - `APP_OPENAI_VOICE=verse`
    /// - `OPENAI_API_KEY=sk-...` (special case, maps to `openai.api_key`)
    /// - `HOST` / `PORT` (special cases for deployment platforms)
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(key) = env::var("OPENAI_API_KEY") {
            settings = settings.set_override("openai.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration is usable.
    ///
    /// A missing API credential is fatal: the bridge cannot open the
    /// realtime link or run the post-call extraction without it.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.openai.api_key.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "Missing OpenAI API key. Set OPENAI_API_KEY in the environment or .env file"
            ));
        }

        if self.webhook.url.trim().is_empty() {
            return Err(anyhow::anyhow!("Webhook URL cannot be empty"));
        }

        if !(self.openai.temperature > 0.0 && self.openai.temperature <= 2.0) {
            return Err(anyhow::anyhow!(
                "Temperature must be in (0.0, 2.0], got {}",
                self.openai.temperature
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5050);
        assert_eq!(config.openai.voice, "alloy");
        assert_eq!(config.openai.transcription_model, "whisper-1");
        // Defaults carry no credential, so validation must fail until
        // OPENAI_API_KEY is supplied.
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_passes_with_key() {
        let mut config = AppConfig::default();
        config.openai.api_key = "sk-test".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_port_zero() {
        let mut config = AppConfig::default();
        config.openai.api_key = "sk-test".to_string();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_temperature() {
        let mut config = AppConfig::default();
        config.openai.api_key = "sk-test".to_string();
        config.openai.temperature = 0.0;
        assert!(config.validate().is_err());
        config.openai.temperature = 2.5;
        assert!(config.validate().is_err());
    }
}

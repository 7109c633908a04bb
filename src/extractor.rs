//! # Post-Call Extraction
//!
//! Runs once per call, after the caller-side connection has closed:
//! submits the accumulated transcript to a structured-extraction chat
//! completion, parses the returned JSON, and forwards it to the
//! downstream automation webhook.
//!
//! ## Failure domains (each logged, none retried):
//! 1. Completion call fails (network / non-success status): stop.
//! 2. Completion content is not valid JSON: stop, no webhook call.
//! 3. Webhook POST returns non-success: logged, nothing else to do.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

/// Instructions for the structured-extraction completion.
const EXTRACTION_PROMPT: &str =
    "Extract customer details: name, availability, and any special notes from the transcript.";

/// Completion response, reduced to the parts the extractor reads.
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Post-call extraction pipeline for one call's transcript.
pub struct Extractor {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    completion_model: String,
    webhook_url: String,
}

impl Extractor {
    pub fn new(config: AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.openai.api_base,
            api_key: config.openai.api_key,
            completion_model: config.openai.completion_model,
            webhook_url: config.webhook.url,
        }
    }

    /// Run the full pipeline: completion → parse → webhook. Every
    /// failure is logged at the failing step; the pipeline simply stops
    /// there. Nothing here can affect the (already torn down) call.
    pub async fn process(&self, call_id: &str, transcript: &str) {
        info!(call_id = %call_id, "Starting transcript processing");

        let content = match self.request_completion(transcript).await {
            Ok(content) => content,
            Err(err) => {
                error!(call_id = %call_id, error = %err, "Completion call failed");
                return;
            }
        };

        let details: serde_json::Value = match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(err) => {
                error!(
                    call_id = %call_id,
                    error = %err,
                    content = %content,
                    "Completion content is not valid JSON, skipping webhook"
                );
                return;
            }
        };

        info!(call_id = %call_id, details = %details, "Extracted customer details");
        self.send_to_webhook(call_id, &details).await;
    }

    /// Submit the transcript to the structured-extraction completion
    /// and return the first choice's message content.
    async fn request_completion(&self, transcript: &str) -> AppResult<String> {
        let body = json!({
            "model": self.completion_model,
            "messages": [
                { "role": "system", "content": EXTRACTION_PROMPT },
                { "role": "user", "content": transcript }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "customer_details_extraction",
                    "schema": {
                        "type": "object",
                        "properties": {
                            "customerName": { "type": "string" },
                            "customerAvailability": { "type": "string" },
                            "specialNotes": { "type": "string" }
                        },
                        "required": ["customerName", "customerAvailability", "specialNotes"]
                    }
                }
            }
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        info!(status = %status.as_u16(), "Completion API response");

        if !status.is_success() {
            return Err(AppError::Extraction(format!(
                "completion API returned status {}",
                status
            )));
        }

        let completion: CompletionResponse = response.json().await?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AppError::Extraction("completion response has no message content".to_string())
            })
    }

    /// Forward the extracted details verbatim to the webhook. A failure
    /// here is terminal for the pipeline; there is no retry or
    /// dead-letter path.
    async fn send_to_webhook(&self, call_id: &str, payload: &serde_json::Value) {
        match self
            .client
            .post(&self.webhook_url)
            .json(payload)
            .send()
            .await
        {
            Ok(response) => {
                if response.status().is_success() {
                    info!(call_id = %call_id, "Customer details sent to webhook");
                } else {
                    error!(
                        call_id = %call_id,
                        status = %response.status().as_u16(),
                        "Failed to send data to webhook"
                    );
                }
            }
            Err(err) => {
                error!(call_id = %call_id, error = %err, "Error sending data to webhook");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn extractor_for(api_base: &str, webhook_url: &str) -> Extractor {
        let mut config = AppConfig::default();
        config.openai.api_key = "sk-test".to_string();
        config.openai.api_base = api_base.to_string();
        config.webhook.url = webhook_url.to_string();
        Extractor::new(config)
    }

    fn completion_with_content(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": content } }
            ]
        })
    }

    #[tokio::test]
    async fn test_valid_extraction_posts_webhook_once() {
        let api = MockServer::start().await;
        let webhook = MockServer::start().await;

        let details = json!({
            "customerName": "Ada",
            "customerAvailability": "Tuesday afternoon",
            "specialNotes": "Interested in SEO"
        });

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_with_content(&details.to_string())),
            )
            .expect(1)
            .mount(&api)
            .await;

        // The webhook must receive exactly the parsed object, once.
        Mock::given(method("POST"))
            .and(body_json(&details))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&webhook)
            .await;

        let extractor = extractor_for(&api.uri(), &webhook.uri());
        extractor
            .process("CA1", "User: hi\nAgent: hello\n")
            .await;
    }

    #[tokio::test]
    async fn test_invalid_json_content_skips_webhook() {
        let api = MockServer::start().await;
        let webhook = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_with_content("not valid json {")),
            )
            .expect(1)
            .mount(&api)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&webhook)
            .await;

        let extractor = extractor_for(&api.uri(), &webhook.uri());
        extractor.process("CA1", "User: hi\n").await;
    }

    #[tokio::test]
    async fn test_completion_error_status_skips_webhook() {
        let api = MockServer::start().await;
        let webhook = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&api)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&webhook)
            .await;

        let extractor = extractor_for(&api.uri(), &webhook.uri());
        extractor.process("CA1", "User: hi\n").await;
    }

    #[tokio::test]
    async fn test_webhook_failure_is_non_fatal() {
        let api = MockServer::start().await;
        let webhook = MockServer::start().await;

        let details = json!({
            "customerName": "Ada",
            "customerAvailability": "anytime",
            "specialNotes": ""
        });

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_with_content(&details.to_string())),
            )
            .mount(&api)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&webhook)
            .await;

        // Must not panic or retry
        let extractor = extractor_for(&api.uri(), &webhook.uri());
        extractor.process("CA1", "User: hi\n").await;
    }
}

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use serde_json::{json, Value};
use tracing::{debug, error, info};
use url::Url;

use crate::relay::{Relay, RelayError};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Header carrying the credential. Keeping it out of the URL keeps it out of
/// reqwest's error messages.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Endpoint settings shared by every client built in a session.
#[derive(Debug, Clone, PartialEq)]
pub struct GeminiSettings {
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl GeminiSettings {
    /// Reads `GEMINI_MODEL`, `GEMINI_API_BASE` and `GEMINI_TIMEOUT_SECS`,
    /// falling back to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let model = env::var("GEMINI_MODEL").unwrap_or(defaults.model);
        let base_url = env::var("GEMINI_API_BASE").unwrap_or(defaults.base_url);
        let timeout = env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        Self {
            model,
            base_url,
            timeout,
        }
    }

    /// Full `generateContent` URL for the configured model.
    pub fn endpoint(&self) -> Result<Url, RelayError> {
        let mut base = self.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }

        let url = Url::parse(&base)?
            .join(&format!("v1beta/models/{}:generateContent", self.model))?;

        Ok(url)
    }
}

pub struct GeminiClient {
    api_key: String,
    settings: GeminiSettings,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, settings: GeminiSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .wrap_err("Failed to build HTTP client")?;

        Ok(Self {
            api_key: api_key.into(),
            settings,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn request_body(prompt: &str) -> Value {
        json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [
                        {
                            "text": prompt
                        }
                    ]
                }
            ],
            "generationConfig": {
                "temperature": 0.2,
                "topP": 0.8,
                "topK": 40,
                "maxOutputTokens": 8192
            }
        })
    }
}

#[async_trait]
impl Relay for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, RelayError> {
        let api_url = self.settings.endpoint()?;
        let request_body = Self::request_body(prompt);

        debug!("Sending request to Gemini API ({}): {}", self.settings.model, request_body);

        let response = self.client.post(api_url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.map_err(reqwest::Error::without_url)?;
            error!("API request failed with status {}: {}", status, body);
            return Err(RelayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response_json: Value = response.json().await.map_err(reqwest::Error::without_url)?;
        debug!("Received response from Gemini API: {}", response_json);

        match extract_text(&response_json) {
            Some(text) => Ok(text),
            None => {
                info!("Response carried no text parts");
                Err(RelayError::EmptyResponse)
            }
        }
    }
}

/// Concatenates every `text` part of the first candidate.
fn extract_text(response: &Value) -> Option<String> {
    let parts = response
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;

    const KEY: &str = "SECRET-KEY-123";

    fn settings_for(base_url: String) -> GeminiSettings {
        GeminiSettings {
            base_url,
            timeout: Duration::from_secs(5),
            ..GeminiSettings::default()
        }
    }

    /// Serves one connection with `response` and hands back the raw request.
    async fn serve_once(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            request
        });

        (base_url, handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + content_length {
                    break;
                }
            }
        }

        String::from_utf8_lossy(&buf).to_string()
    }

    fn http_response(status_line: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        )
    }

    /// A local address nothing is listening on.
    async fn closed_port_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_generate_returns_text_and_sends_key_in_header() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Use a LEFT JOIN."}]}}]}"#;
        let (base_url, server) = serve_once(http_response("200 OK", body)).await;
        let client = GeminiClient::new(KEY, settings_for(base_url)).unwrap();

        let text = client.generate("How do I keep unmatched rows?").await.unwrap();
        assert_eq!(text, "Use a LEFT JOIN.");

        let request = server.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert_eq!(
            request_line,
            "POST /v1beta/models/gemini-2.0-flash:generateContent HTTP/1.1"
        );
        assert!(request.to_lowercase().contains(&format!("x-goog-api-key: {}", KEY.to_lowercase())));
        assert!(request.contains("How do I keep unmatched rows?"));
    }

    #[tokio::test]
    async fn test_generate_maps_error_status_to_api_error() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key."}}"#;
        let (base_url, server) = serve_once(http_response("400 Bad Request", body)).await;
        let client = GeminiClient::new(KEY, settings_for(base_url)).unwrap();

        match client.generate("hi").await {
            Err(RelayError::Api { status, body: returned }) => {
                assert_eq!(status, 400);
                assert_eq!(returned, body);
            }
            other => panic!("expected an API error, got {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_generate_without_text_is_empty_response() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let (base_url, server) = serve_once(http_response("200 OK", body)).await;
        let client = GeminiClient::new(KEY, settings_for(base_url)).unwrap();

        assert!(matches!(client.generate("hi").await, Err(RelayError::EmptyResponse)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error_without_key() {
        let client = GeminiClient::new(KEY, settings_for(closed_port_url().await)).unwrap();

        let err = client.generate("hi").await.unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));

        let shown = err.to_string();
        assert!(!shown.contains(KEY), "error message leaked the key: {}", shown);
        assert!(!format!("{:?}", err).contains(KEY));
    }

    #[tokio::test]
    async fn test_validate_false_against_rejecting_server() {
        let body = r#"{"error":{"code":400,"message":"API key not valid."}}"#;
        let (base_url, server) = serve_once(http_response("400 Bad Request", body)).await;
        let client = GeminiClient::new(KEY, settings_for(base_url)).unwrap();

        assert!(!client.validate().await);
        let request = server.await.unwrap();
        assert!(request.contains(r#""text":"Test""#));
    }

    #[tokio::test]
    async fn test_validate_false_when_unreachable() {
        let client = GeminiClient::new(KEY, settings_for(closed_port_url().await)).unwrap();
        assert!(!client.validate().await);
    }

    #[test]
    fn test_endpoint_default_base() {
        let url = GeminiSettings::default().endpoint().unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let settings = GeminiSettings {
            model: "gemini-pro".to_string(),
            base_url: "http://localhost:8080/proxy".to_string(),
            ..GeminiSettings::default()
        };
        let url = settings.endpoint().unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/proxy/v1beta/models/gemini-pro:generateContent"
        );
    }

    #[test]
    fn test_endpoint_rejects_bad_base() {
        let settings = GeminiSettings {
            base_url: "not a url".to_string(),
            ..GeminiSettings::default()
        };
        assert!(matches!(settings.endpoint(), Err(RelayError::InvalidUrl(_))));
    }

    #[test]
    fn test_request_body_single_user_turn() {
        let body = GeminiClient::request_body("hello");
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response = json!({
            "candidates": [
                {
                    "content": {
                        "parts": [{ "text": "Step 1. " }, { "text": "Step 2." }],
                        "role": "model"
                    },
                    "finishReason": "STOP"
                },
                {
                    "content": { "parts": [{ "text": "ignored" }] }
                }
            ]
        });
        assert_eq!(extract_text(&response).as_deref(), Some("Step 1. Step 2."));
    }

    #[test]
    fn test_extract_text_missing_candidates() {
        assert_eq!(extract_text(&json!({ "promptFeedback": { "blockReason": "SAFETY" } })), None);
    }

    #[test]
    fn test_extract_text_no_text_parts() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "inlineData": {} }] } }]
        });
        assert_eq!(extract_text(&response), None);
    }
}

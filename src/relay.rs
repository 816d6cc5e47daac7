use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

/// Prompt sent by [`Relay::validate`] to check that a credential works.
pub const PROBE_PROMPT: &str = "Test";

/// Everything that can go wrong while turning a prompt into generated text.
///
/// The session prints these verbatim; the credential probe collapses all of
/// them into "invalid".
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("request to the generation API failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("generation API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("generation API returned no text")]
    EmptyResponse,

    #[error("invalid API endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Sends a text prompt to a remote text-generation service and returns its text.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, RelayError>;

    /// One-shot credential check. Any failure, whether a bad key or a dead
    /// network, reads as `false`.
    async fn validate(&self) -> bool {
        match self.generate(PROBE_PROMPT).await {
            Ok(_) => {
                debug!("Credential probe succeeded");
                true
            }
            Err(e) => {
                warn!("Credential probe failed: {}", e);
                false
            }
        }
    }
}

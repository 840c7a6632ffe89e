use crate::config::ConfigError;
use crate::stream::ErrorCode;

/// Error type shared by the turn loop, providers and collaborators.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Provider error: status={status}, message={message}")]
    Provider { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol translation error: {0}")]
    Translation(String),
    #[error("Envelope sink closed: {0}")]
    Sink(String),
    #[error("Event store error: {0}")]
    Store(String),
    #[error("Turn cancelled")]
    Cancelled,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TurnError {
    /// Stable envelope code surfaced to clients.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            TurnError::Provider { status, .. } if is_unavailable(*status) => {
                ErrorCode::ProviderUnavailable
            }
            TurnError::Provider { .. } => ErrorCode::ProviderError,
            TurnError::Transport(_) => ErrorCode::ProviderUnavailable,
            TurnError::Translation(_) => ErrorCode::TranslationError,
            TurnError::Cancelled => ErrorCode::Cancelled,
            TurnError::Config(_)
            | TurnError::Sink(_)
            | TurnError::Store(_)
            | TurnError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Message shown to the end user in the error envelope.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            TurnError::Provider { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Rate limits, overload and gateway failures.
fn is_unavailable(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504 | 529)
}

impl From<ConfigError> for TurnError {
    fn from(err: ConfigError) -> Self {
        TurnError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for TurnError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => TurnError::Provider {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => TurnError::Transport(err.to_string()),
        }
    }
}

use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Status { status: StatusCode, message: String },
    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{0}")]
    Validation(String),
    #[error("Not logged in")]
    Unauthenticated,
}

impl ClientError {
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        ClientError::Status {
            status,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation(message.into())
    }

    /// Text for a user-facing notice: the error's own message when it has
    /// one, otherwise the action's fallback.
    pub fn notice_text(&self, fallback: &str) -> String {
        let own = match self {
            ClientError::Status { message, .. } => message.trim().to_string(),
            ClientError::Validation(message) => message.trim().to_string(),
            ClientError::Unauthenticated => self.to_string(),
            ClientError::Transport(_) | ClientError::Decode(_) => String::new(),
        };
        if own.is_empty() {
            fallback.to_string()
        } else {
            own
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

use serde::Serialize;
use thiserror::Error;

/// Errors produced while coordinating a call.
///
/// None of them is fatal to the coordinator: every failure resolves the
/// session back to idle so a new call can be attempted.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CallError {
    /// Camera/microphone permission denied or no capture device present.
    #[error("media access error: {0}")]
    MediaAccess(String),

    /// Session description exchange failed.
    #[error("negotiation error: {0}")]
    Negotiation(String),

    /// A remote ICE candidate could not be applied. Logged and ignored.
    #[error("candidate apply error: {0}")]
    CandidateApply(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    /// A wire message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The coordinator event loop is no longer running.
    #[error("call coordinator is closed")]
    Closed,
}

impl CallError {
    /// Short human-readable line shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            CallError::MediaAccess(msg) => format!("Error accessing camera/microphone: {msg}"),
            CallError::Negotiation(_) => {
                "Error establishing video connection. Please try again.".to_string()
            }
            CallError::CandidateApply(_) => "Error adding network candidate".to_string(),
            CallError::Transport(_) => "Signaling channel unavailable".to_string(),
            CallError::Config(msg) => format!("Invalid configuration: {msg}"),
            CallError::Codec(_) => "Received malformed signaling message".to_string(),
            CallError::Closed => "Call service stopped".to_string(),
        }
    }
}

impl From<webrtc::Error> for CallError {
    fn from(err: webrtc::Error) -> Self {
        CallError::Negotiation(err.to_string())
    }
}

impl From<serde_json::Error> for CallError {
    fn from(err: serde_json::Error) -> Self {
        CallError::Codec(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_error_mentions_cause() {
        let err = CallError::MediaAccess("permission denied".into());
        assert!(err.user_message().contains("permission denied"));
        assert_eq!(err.to_string(), "media access error: permission denied");
    }
}

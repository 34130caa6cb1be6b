//! Crate-wide error types: one `thiserror` enum per subsystem boundary, each
//! a flat set of variants with `#[from]` conversions from lower-level errors.

use thiserror::Error;

use crate::action::ActionError;

/// Errors generated while a listener is connected to, or parsing messages
/// from, a venue.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http error fetching symbol catalog: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("unknown message method: {0}")]
    UnknownMethod(String),

    #[error("heartbeat timeout after {0:?}")]
    HeartbeatTimeout(std::time::Duration),

    #[error("venue '{0}' is not registered")]
    UnknownVenue(String),
}

impl ListenerError {
    /// Transient transport errors recover by reconnecting; malformed payloads
    /// and unknown methods are per-message and never terminate the listener.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ListenerError::Transport(_) | ListenerError::Http(_) | ListenerError::HeartbeatTimeout(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<ActionError> for StoreError {
    fn from(value: ActionError) -> Self {
        match value {
            ActionError::Constraint(msg) => StoreError::Constraint(msg),
            ActionError::Unavailable(msg) => StoreError::Unavailable(msg),
        }
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration errors are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for '{name}': {value}")]
    InvalidValue { name: String, value: String },

    #[error("unknown exchange requested: {0}")]
    UnknownExchange(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Action(#[from] ActionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_http_errors_are_retryable() {
        let err = ListenerError::MalformedPayload("bad timestamp".into());
        assert!(!err.is_retryable());

        let err = ListenerError::HeartbeatTimeout(std::time::Duration::from_secs(30));
        assert!(err.is_retryable());
    }
}

use thiserror::Error;

/// Message shown when the backend gives no usable explanation
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong, please try again";

#[derive(Error, Debug)]
pub enum BoothError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {}", .message.as_deref().unwrap_or(GENERIC_ERROR_MESSAGE))]
    Api {
        status: String,
        message: Option<String>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Session {session_uuid} expired")]
    SessionExpired { session_uuid: String },

    #[error("Validation failed: {}", .violations.join("; "))]
    Validation { violations: Vec<String> },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },

    #[error("System error: {message}")]
    System { message: String },
}

impl BoothError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn api<S: Into<String>>(status: S, message: Option<String>) -> Self {
        Self::Api {
            status: status.into(),
            message: message.filter(|m| !m.trim().is_empty()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BoothError::Cancelled)
    }

    /// Transient transport failures are retried by the next poll tick
    pub fn is_recoverable(&self) -> bool {
        match self {
            BoothError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            BoothError::Io(_) => true,
            BoothError::Api { .. } => true,
            _ => false,
        }
    }

    /// Normalize into the `{message}` shape shown next to a failed step
    pub fn user_message(&self) -> String {
        match self {
            BoothError::Api {
                message: Some(message),
                ..
            } => message.clone(),
            BoothError::Validation { violations } => violations.join("; "),
            _ => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Invalid viewer settings: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Unknown settings field: {0}")]
    UnknownField(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Settings store error: {0}")]
    Store(#[from] std::io::Error),

    #[error("Settings encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<SettingsError> for BoothError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::Invalid(violations) => BoothError::Validation { violations },
            SettingsError::Store(io) => BoothError::Io(io),
            SettingsError::Encoding(json) => BoothError::Json(json),
            other => BoothError::Validation {
                violations: vec![other.to_string()],
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, BoothError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_prefers_server_message() {
        let err = BoothError::api("error", Some("Printer offline".to_string()));
        assert_eq!(err.user_message(), "Printer offline");
    }

    #[test]
    fn test_user_message_falls_back_to_generic() {
        let err = BoothError::api("error", Some("   ".to_string()));
        assert_eq!(err.user_message(), GENERIC_ERROR_MESSAGE);
        assert_eq!(BoothError::system("boom").user_message(), GENERIC_ERROR_MESSAGE);
    }

    #[test]
    fn test_cancelled_is_not_recoverable() {
        assert!(BoothError::Cancelled.is_cancelled());
        assert!(!BoothError::Cancelled.is_recoverable());
    }
}

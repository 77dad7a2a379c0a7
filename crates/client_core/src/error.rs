use shared::error::ErrorClass;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RequestError {
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("operation not supported: {0}")]
    Unsupported(String),
}

impl RequestError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Http { status, .. } => ErrorClass::from_status(*status),
            Self::Network(_) => ErrorClass::Network,
            Self::Decode(_) | Self::Unsupported(_) => ErrorClass::Server,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }

    /// Connectivity failures, plus gateway statuses that only show up when the
    /// backend itself is unreachable behind a proxy.
    pub fn is_network(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => matches!(status, 502 | 503 | 504),
            _ => false,
        }
    }

    /// Message suitable for direct display.
    pub fn user_message(&self) -> String {
        match self {
            Self::Http { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else if let Some(status) = value.status() {
            Self::http(status.as_u16(), value.to_string())
        } else {
            Self::Network(value.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses() {
        assert!(RequestError::http(404, "nope").is_not_found());
        assert!(!RequestError::http(500, "boom").is_not_found());
        assert!(RequestError::http(503, "down").is_network());
        assert!(RequestError::Network("refused".into()).is_network());
        assert_eq!(
            RequestError::http(422, "bad").class(),
            ErrorClass::Validation
        );
    }

    #[test]
    fn http_errors_display_backend_message() {
        assert_eq!(RequestError::http(500, "boom").user_message(), "boom");
        assert_eq!(RequestError::http(500, "boom").to_string(), "boom");
    }
}

use serde::{Deserialize, Serialize};

/// Coarse error taxonomy shared by every list page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Endpoint or record absent; list reads treat this as an empty result.
    NotFound,
    Network,
    Server,
    /// Form-local; never produced by the list controller.
    Validation,
}

impl ErrorClass {
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => Self::NotFound,
            400 | 422 => Self::Validation,
            _ => Self::Server,
        }
    }
}

/// Error body returned by the backend on non-2xx responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn detail(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            message: None,
        }
    }

    /// Human-readable message for a failed request with the given status.
    pub fn into_message(self, status: u16) -> String {
        self.detail
            .filter(|value| !value.trim().is_empty())
            .or(self.message.filter(|value| !value.trim().is_empty()))
            .unwrap_or_else(|| format!("Request failed ({status})"))
    }
}

use serde_json::Value;
use thiserror::Error;

use crate::storage::StorageError;

pub const NETWORK_ERROR_MESSAGE: &str = "Network error";
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized or session expired";

/// Status and (best-effort decoded) body of a backend reply.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Value,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum ApiErrorKind {
    /// A required argument was missing; nothing was sent.
    #[error("{0}")]
    Validation(String),
    #[error("{message}")]
    Network {
        message: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{message}")]
    Unauthorized {
        message: String,
        response: RawResponse,
    },
    #[error("{message}")]
    Business {
        message: String,
        response: RawResponse,
    },
    #[error("unexpected response shape: {message}")]
    Decode {
        message: String,
        response: RawResponse,
    },
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Error returned by every client call. `silent` marks errors whose
/// notification has already been shown (or must not be shown).
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct ApiError {
    kind: ApiErrorKind,
    silent: bool,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind) -> Self {
        Self {
            kind,
            silent: false,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Validation(message.into()))
    }

    pub fn network(source: reqwest::Error) -> Self {
        Self::new(ApiErrorKind::Network {
            message: NETWORK_ERROR_MESSAGE.to_string(),
            source,
        })
    }

    pub fn unauthorized(message: impl Into<String>, response: RawResponse) -> Self {
        Self::new(ApiErrorKind::Unauthorized {
            message: message.into(),
            response,
        })
    }

    pub fn business(message: impl Into<String>, response: RawResponse) -> Self {
        Self::new(ApiErrorKind::Business {
            message: message.into(),
            response,
        })
    }

    pub fn decode(message: impl Into<String>, response: RawResponse) -> Self {
        Self::new(ApiErrorKind::Decode {
            message: message.into(),
            response,
        })
    }

    pub fn kind(&self) -> &ApiErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ApiErrorKind {
        self.kind
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn silenced(mut self) -> Self {
        self.silent = true;
        self
    }

    /// User-facing text.
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    /// Raw backend reply, when the failure came from one.
    pub fn response(&self) -> Option<&RawResponse> {
        match &self.kind {
            ApiErrorKind::Unauthorized { response, .. }
            | ApiErrorKind::Business { response, .. }
            | ApiErrorKind::Decode { response, .. } => Some(response),
            ApiErrorKind::Validation(_)
            | ApiErrorKind::Network { .. }
            | ApiErrorKind::Storage(_)
            | ApiErrorKind::Client(_) => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Unauthorized { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Validation(_))
    }

    pub fn is_network(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Network { .. })
    }
}

impl From<ApiErrorKind> for ApiError {
    fn from(kind: ApiErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::new(ApiErrorKind::Storage(err))
    }
}

use mixed_replace::StreamError;
use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("session expired: credential rejected with HTTP 401")]
    AuthExpired,

    #[error("malformed stream: {source}")]
    MalformedStream {
        #[from]
        source: StreamError,
    },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation}")]
    HttpStatus {
        status: StatusCode,
        operation: &'static str,
    },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("server error: {message}")]
    Api { message: String },

    #[error("token store error: {reason}")]
    TokenStore { reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl ClientError {
    pub fn http_status(status: StatusCode, operation: &'static str) -> Self {
        Self::HttpStatus { status, operation }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    pub fn token_store(reason: impl Into<String>) -> Self {
        Self::TokenStore {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// The caller must route the operator back to the login flow.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }
}

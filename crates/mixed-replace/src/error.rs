#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("unexpected content type `{content_type}`: expected multipart/x-mixed-replace")]
    InvalidContentType { content_type: String },

    #[error("boundary parameter missing from content type `{content_type}`")]
    MissingBoundary { content_type: String },

    #[error("stream transport error: {reason}")]
    Transport { reason: String },

    #[error("response body missing")]
    EmptyBody,
}

impl StreamError {
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Stream-level failures that cannot be recovered by reading more bytes.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::InvalidContentType { .. } | Self::MissingBoundary { .. } | Self::EmptyBody
        )
    }
}

/// Errors surfaced by the transport collaborators: object fetch, document
/// resolution, search, and push channels.
///
/// `Clone` so a settled result can fan out to every coalesced waiter.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("authentication required for {0}")]
    AuthenticationRequired(String),
    #[error("unparseable payload from {url}: {detail}")]
    Payload { url: String, detail: String },
    #[error("push channel ended: {0}")]
    ChannelClosed(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::ChannelClosed(_) => true,
            Self::Status { status, .. } => *status == 429 || (500..=599).contains(status),
            Self::AuthenticationRequired(_) | Self::Payload { .. } => false,
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Status { .. } => "status",
            Self::AuthenticationRequired(_) => "authentication_required",
            Self::Payload { .. } => "payload",
            Self::ChannelClosed(_) => "channel_closed",
        }
    }

    /// Classify a non-success HTTP status code.
    pub fn from_status(status: u16, url: impl Into<String>) -> Self {
        match status {
            401 | 403 => Self::AuthenticationRequired(url.into()),
            _ => Self::Status { status, url: url.into() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(TransportError::Network("tcp".into()).is_retryable());
        assert!(TransportError::ChannelClosed("eof".into()).is_retryable());
        assert!(TransportError::from_status(500, "https://ex/1").is_retryable());
        assert!(TransportError::from_status(429, "https://ex/1").is_retryable());
        assert!(!TransportError::from_status(404, "https://ex/1").is_retryable());
        assert!(!TransportError::from_status(401, "https://ex/1").is_retryable());
    }

    #[test]
    fn from_status_maps_auth() {
        let err = TransportError::from_status(403, "https://ex/private");
        assert_eq!(err.error_kind(), "authentication_required");

        let err = TransportError::from_status(502, "https://ex/1");
        assert_eq!(err.error_kind(), "status");
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(TransportError::Network("x".into()).error_kind(), "network");
        let payload = TransportError::Payload { url: "u".into(), detail: "d".into() };
        assert_eq!(payload.error_kind(), "payload");
    }
}

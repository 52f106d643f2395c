use orderdesk_protocol::ErrorBody;

/// Errors from the upload client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("response carried no data")]
    EmptyResponse,

    #[error("chunk {index} out of range: file has {total_chunks} chunks")]
    ChunkOutOfRange { index: u32, total_chunks: u32 },

    #[error("failed to upload chunk {index} after {attempts} attempts: {source}")]
    ChunkFailed {
        index: u32,
        attempts: u32,
        #[source]
        source: Box<ClientError>,
    },

    #[error("file too large: {chunks} chunks of {chunk_size} bytes")]
    TooManyChunks { chunks: u64, chunk_size: u64 },

    #[error("upload cancelled")]
    Cancelled,

    #[error("upload is {0}, expected {1}")]
    InvalidState(&'static str, &'static str),
}

impl ClientError {
    /// Builds an [`Api`](Self::Api) error from a non-2xx response body.
    pub(crate) fn from_body(status: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<ErrorBody>(body) {
            Ok(err) => Self::Api {
                status,
                code: err.code,
                message: err.message,
            },
            Err(_) => Self::Api {
                status,
                code: String::new(),
                message: String::from_utf8_lossy(body).into_owned(),
            },
        }
    }

    /// Whether resending the same request may succeed.
    ///
    /// Transport failures, timeouts, throttling and 5xx responses are
    /// retryable. Other API errors (unknown session, invalid index, oversized
    /// chunk) need a different request and are surfaced at once.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_builder(),
            Self::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::ChunkFailed { source, .. } => source.status(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_server_side_failures_are_retryable() {
        let api = |status| ClientError::from_body(status, b"");
        assert!(api(500).is_retryable());
        assert!(api(503).is_retryable());
        assert!(api(429).is_retryable());
        assert!(!api(400).is_retryable());
        assert!(!api(404).is_retryable());
        assert!(!api(409).is_retryable());
        assert!(!api(413).is_retryable());
        assert!(!ClientError::Cancelled.is_retryable());
    }

    #[test]
    fn parses_error_body() {
        let body = br#"{"success":false,"code":"upload_incomplete","message":"2 of 3"}"#;
        let err = ClientError::from_body(400, body);
        assert!(matches!(
            &err,
            ClientError::Api { status: 400, code, message } if code == "upload_incomplete" && message == "2 of 3"
        ));
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn falls_back_to_raw_text() {
        let err = ClientError::from_body(502, b"Bad Gateway");
        assert!(matches!(
            &err,
            ClientError::Api { status: 502, code, message } if code.is_empty() && message == "Bad Gateway"
        ));
    }
}

//! Error types shared by the scanner facade and recognition engines.

/// Coarse classification of a [`ScannerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Opening, closing or reading the local database file.
    Io,
    /// Local database lookup or matching failure.
    Query,
    /// Barcode decoding failure.
    Decode,
    /// Sync or online search transport failure.
    Network,
}

/// Errors reported by [`crate::scanner::Scanner`] and [`crate::engine::RecognitionEngine`].
#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scanner is not open")]
    NotOpen,

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Network error: {message} (after {attempts} attempts)")]
    Network {
        /// Human-readable transport error
        message: String,
        /// Number of attempts made before giving up
        attempts: u32,
    },

    #[error("Rate limited: {message}")]
    RateLimit {
        message: String,
        /// Retry-After header value in seconds, if provided
        retry_after_secs: Option<u64>,
    },

    #[error("API error: {0}")]
    Api(String),

    #[error("API key not configured")]
    MissingApiKey,
}

impl ScannerError {
    /// Classify this error into the four failure families.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScannerError::Io(_) | ScannerError::NotOpen | ScannerError::Catalog(_) => {
                ErrorKind::Io
            }
            ScannerError::Query(_) | ScannerError::InvalidImage(_) => ErrorKind::Query,
            ScannerError::Decode(_) => ErrorKind::Decode,
            ScannerError::Network { .. }
            | ScannerError::RateLimit { .. }
            | ScannerError::Api(_)
            | ScannerError::MissingApiKey => ErrorKind::Network,
        }
    }
}

impl From<reqwest::Error> for ScannerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return ScannerError::Api(format!("Malformed response: {}", e));
        }
        ScannerError::Network {
            message: e.to_string(),
            attempts: 1,
        }
    }
}

impl From<serde_json::Error> for ScannerError {
    fn from(e: serde_json::Error) -> Self {
        ScannerError::Catalog(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(ScannerError::NotOpen.kind(), ErrorKind::Io);
        assert_eq!(
            ScannerError::Io(std::io::Error::other("disk")).kind(),
            ErrorKind::Io
        );
        assert_eq!(ScannerError::Query("x".into()).kind(), ErrorKind::Query);
        assert_eq!(
            ScannerError::InvalidImage("x".into()).kind(),
            ErrorKind::Query
        );
        assert_eq!(ScannerError::Decode("x".into()).kind(), ErrorKind::Decode);
        assert_eq!(ScannerError::MissingApiKey.kind(), ErrorKind::Network);
        assert_eq!(ScannerError::Api("500".into()).kind(), ErrorKind::Network);
    }

    #[test]
    fn test_network_error_display() {
        let error = ScannerError::Network {
            message: "Connection refused".to_string(),
            attempts: 3,
        };
        assert_eq!(
            error.to_string(),
            "Network error: Connection refused (after 3 attempts)"
        );
    }

    #[test]
    fn test_rate_limit_display() {
        let error = ScannerError::RateLimit {
            message: "Too many requests".to_string(),
            retry_after_secs: Some(30),
        };
        assert_eq!(error.to_string(), "Rate limited: Too many requests");
    }

    #[test]
    fn test_not_open_display() {
        assert_eq!(ScannerError::NotOpen.to_string(), "Scanner is not open");
    }
}

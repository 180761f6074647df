use thiserror::Error;

/// Caller-visible classification of an error, mirroring the POSIX-style
/// codes host programs report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// EACCES
    AccessDenied,
    /// EINVAL
    InvalidArgument,
    /// EIO
    Io,
    /// ENOMEM
    OutOfMemory,
    /// Anything without a more specific mapping.
    Internal,
}

impl ErrorCode {
    pub fn errno(self) -> i32 {
        match self {
            ErrorCode::AccessDenied => 13,
            ErrorCode::InvalidArgument => 22,
            ErrorCode::Io => 5,
            ErrorCode::OutOfMemory => 12,
            ErrorCode::Internal => 255,
        }
    }
}

#[derive(Error, Debug)]
pub enum QsError {
    #[error("access denied: {0}")]
    AccessControl(String),
    #[error("bucket does not exist: {0}")]
    BucketNotExists(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("network: {0}")]
    Network(String),
    #[error("configuration invalid: {0}")]
    ConfigInvalid(String),
    #[error("configuration file not found: {0}")]
    ConfigNotFound(String),
    #[error("operation canceled")]
    Canceled,
    #[error("end of stream")]
    EndOfStream,
    #[error("env var missing: {0}")]
    EnvVarMissing(#[from] std::env::VarError),
    #[error("header to string: {0}")]
    HeaderToStr(#[from] http::header::ToStrError),
    #[error("hmac invalid length: {0}")]
    HmacInvalidLength(#[from] sha2::digest::InvalidLength),
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("request: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("time format: {0}")]
    TimeFormat(#[from] time::error::Format),
    #[error("tokio task join: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("url parse: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl QsError {
    pub fn code(&self) -> ErrorCode {
        match self {
            QsError::AccessControl(_) => ErrorCode::AccessDenied,
            QsError::InvalidParameter(_)
            | QsError::ConfigInvalid(_)
            | QsError::ConfigNotFound(_)
            | QsError::EnvVarMissing(_)
            | QsError::InvalidHeaderValue(_)
            | QsError::UrlParse(_) => ErrorCode::InvalidArgument,
            QsError::BucketNotExists(_)
            | QsError::Network(_)
            | QsError::Canceled
            | QsError::EndOfStream
            | QsError::Io(_)
            | QsError::Reqwest(_) => ErrorCode::Io,
            QsError::HeaderToStr(_)
            | QsError::HmacInvalidLength(_)
            | QsError::Json(_)
            | QsError::TimeFormat(_)
            | QsError::Join(_) => ErrorCode::Internal,
        }
    }

    /// Transport failures are retried by the invoker; domain errors coming
    /// back from the server are surfaced immediately.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(
            self,
            QsError::Network(_) | QsError::Reqwest(_) | QsError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn error_codes_follow_the_posix_mapping() {
        assert_eq!(
            QsError::AccessControl("b".into()).code().errno(),
            13 // EACCES
        );
        assert_eq!(QsError::InvalidParameter("x".into()).code().errno(), 22);
        assert_eq!(QsError::ConfigInvalid("x".into()).code().errno(), 22);
        assert_eq!(QsError::Network("x".into()).code().errno(), 5);
        assert_eq!(QsError::Canceled.code().errno(), 5);
        assert_eq!(QsError::BucketNotExists("b".into()).code().errno(), 5);
    }

    #[test]
    fn domain_errors_are_not_retryable() {
        assert!(QsError::Network("timeout".into()).is_retryable());
        assert!(!QsError::AccessControl("b".into()).is_retryable());
        assert!(!QsError::BucketNotExists("b".into()).is_retryable());
        assert!(!QsError::InvalidParameter("key".into()).is_retryable());
        assert!(!QsError::Canceled.is_retryable());
    }
}

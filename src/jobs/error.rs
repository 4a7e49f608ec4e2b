//! Structured failure taxonomy for job execution.
//!
//! Errors are classified at the point of failure, not by matching message
//! substrings later: a processor (or the retry policy) produces a `JobError`
//! carrying an `ErrorKind`, and everything downstream branches on the kind.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An attempt ran past its timeout budget.
    Timeout,
    /// Upstream said to slow down.
    RateLimited,
    /// Dependency is down or unreachable.
    ServiceUnavailable,
    /// Upstream/external service returned an error.
    Upstream,
    /// Payload or input failed validation.
    Validation,
    /// A referenced record does not exist.
    NotFound,
    /// No processor registered for the job type.
    MissingProcessor,
    /// Anything not yet mapped. Retryable until a mapping says otherwise.
    Other,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        match self {
            ErrorKind::Timeout
            | ErrorKind::RateLimited
            | ErrorKind::ServiceUnavailable
            | ErrorKind::Upstream
            | ErrorKind::Other => true,
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::MissingProcessor => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::RateLimited => "RATE_LIMIT",
            ErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorKind::Upstream => "UPSTREAM_ERROR",
            ErrorKind::Validation => "BAD_PAYLOAD",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::MissingProcessor => "UNKNOWN_JOB_TYPE",
            ErrorKind::Other => "UNKNOWN",
        }
    }
}

/// Failure value returned by processors and the retry policy.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}: {}", .kind.as_str(), .message)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_retryable() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::ServiceUnavailable.is_retryable());
        assert!(ErrorKind::Upstream.is_retryable());
        assert!(ErrorKind::Other.is_retryable());
    }

    #[test]
    fn fatal_kinds_are_not_retryable() {
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::MissingProcessor.is_retryable());
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = JobError::new(ErrorKind::RateLimited, "rate limit exceeded");
        assert_eq!(err.to_string(), "RATE_LIMIT: rate limit exceeded");
    }
}

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{service} rejected credentials (HTTP {status})")]
    Auth { service: &'static str, status: u16 },

    #[error("{service} request failed after {attempts} attempt(s): {reason}")]
    Transport {
        service: &'static str,
        attempts: u32,
        reason: String,
    },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} response could not be decoded: {reason}")]
    Decode {
        service: &'static str,
        reason: String,
    },

    #[error("{service} resource not found: {resource}")]
    NotFound {
        service: &'static str,
        resource: String,
    },
}

impl SourceError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis backend timed out after {0:?}")]
    Timeout(Duration),

    #[error("analysis backend request failed: {0}")]
    Transport(String),

    #[error("analysis backend returned a malformed response: {0}")]
    Malformed(String),

    #[error("analysis backend unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_auth_errors_are_fatal() {
        let auth = SourceError::Auth {
            service: "jira",
            status: 401,
        };
        let transport = SourceError::Transport {
            service: "jira",
            attempts: 4,
            reason: "connection reset".to_string(),
        };
        let missing = SourceError::NotFound {
            service: "confluence",
            resource: "content/42".to_string(),
        };

        assert!(auth.is_fatal());
        assert!(!transport.is_fatal());
        assert!(!missing.is_fatal());
        assert!(missing.is_not_found());
    }
}

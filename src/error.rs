//! Errors scoped to a single follow session.
//!
//! None of these are fatal to the process. A failure never touches the
//! tracked state, which only changes after a successful apply.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FollowError {
    /// The target ref does not resolve to a commit. The user has to pick
    /// another target.
    #[error("Review-Target '{target}' is not valid")]
    UnresolvableTarget { target: String },

    /// A review-files line is not a valid pattern.
    #[error("invalid Review-Files pattern '{line}': {reason}")]
    InvalidPattern { line: String, reason: String },

    /// The dry-run or apply request failed or timed out. Retry is allowed.
    #[error("request failed: {0}")]
    TransportFailure(String),

    /// A resolution arrived for an edit that has since been superseded.
    #[error("resolution {seq} superseded by {latest}")]
    StaleResolution { seq: u64, latest: u64 },
}

impl FollowError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        FollowError::TransportFailure(err.to_string())
    }

    /// Whether the same request may succeed when issued again.
    pub fn is_retriable(&self) -> bool {
        matches!(self, FollowError::TransportFailure(_))
    }

    /// Whether this should be shown to the user at all.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, FollowError::StaleResolution { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolvable_and_transport_render_differently() {
        let unresolvable = FollowError::UnresolvableTarget {
            target: "v9".to_string(),
        };
        let transport = FollowError::transport("connection refused");

        assert_eq!(unresolvable.to_string(), "Review-Target 'v9' is not valid");
        assert_eq!(transport.to_string(), "request failed: connection refused");
        assert!(!unresolvable.is_retriable());
        assert!(transport.is_retriable());
    }

    #[test]
    fn test_stale_resolution_is_internal() {
        let stale = FollowError::StaleResolution { seq: 1, latest: 3 };
        assert!(!stale.is_user_visible());
        assert!(FollowError::transport("x").is_user_visible());
    }
}

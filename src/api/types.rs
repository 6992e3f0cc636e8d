use serde::{Deserialize, Serialize};

use crate::domain::{ApplyOutcome, ProposedState, ReconciliationResult, TrackedState};
use crate::error::FollowError;

/// Prefix the server puts in front of every JSON body against XSSI.
pub const XSSI_PREFIX: &str = ")]}'";

/// Drop the anti-XSSI line from a response body, if present.
pub fn strip_xssi(body: &str) -> &str {
    body.trim_start()
        .strip_prefix(XSSI_PREFIX)
        .map(str::trim_start)
        .unwrap_or(body)
}

// ============================================================================
// Follow endpoint payloads
// ============================================================================

/// Body of `POST /changes/{id}/follow`.
///
/// `do_update = false` is a dry run: the server reconciles and reports the
/// delta without creating a patch set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowInput {
    pub do_update: bool,
    pub new_review_target: String,
    pub new_review_files: String,
}

impl FollowInput {
    pub fn dry_run(proposed: &ProposedState) -> Self {
        Self {
            do_update: false,
            new_review_target: proposed.target_ref.clone(),
            new_review_files: proposed.file_pattern.clone(),
        }
    }

    pub fn update(proposed: &ProposedState) -> Self {
        Self {
            do_update: true,
            ..Self::dry_run(proposed)
        }
    }
}

/// Reply of both the GET and POST follow endpoints.
///
/// Older servers answered with `can_update` and a single `changed_paths`
/// list; both are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FollowInfo {
    pub on_review_branch: bool,
    #[serde(alias = "can_update")]
    pub valid_review_target: bool,
    /// Zero when no patch set was created
    pub new_patchset_id: u32,
    pub version: Option<String>,
    pub follow_version: Option<String>,
    pub follow_branch: Option<String>,
    pub review_target: Option<String>,
    pub review_files: Option<String>,
    #[serde(deserialize_with = "nullable_list")]
    pub added_paths: Vec<String>,
    #[serde(alias = "changed_paths", deserialize_with = "nullable_list")]
    pub updated_paths: Vec<String>,
    #[serde(deserialize_with = "nullable_list")]
    pub removed_paths: Vec<String>,
}

fn nullable_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl FollowInfo {
    /// Delta reported by a dry run for `proposed`.
    pub fn to_result(&self, proposed: &ProposedState) -> ReconciliationResult {
        if !self.valid_review_target {
            return ReconciliationResult::invalid(FollowError::UnresolvableTarget {
                target: proposed.target_ref.clone(),
            });
        }
        ReconciliationResult {
            added: self.added_paths.iter().cloned().collect(),
            removed: self.removed_paths.iter().cloned().collect(),
            updated: self.updated_paths.iter().cloned().collect(),
            valid_target: true,
            failure: None,
            version: self.version.clone().filter(|v| !v.is_empty()),
        }
    }

    /// Target and pattern currently recorded on the change.
    ///
    /// The server computes the path delta itself, so `included_paths` stays
    /// empty.
    pub fn tracked_state(&self) -> TrackedState {
        TrackedState {
            target_ref: self.review_target.clone().unwrap_or_default(),
            file_pattern: self.review_files.clone().unwrap_or_default(),
            included_paths: Vec::new(),
        }
    }

    /// First proposal offered to the user.
    ///
    /// A change without a valid review target yet (typically a new one)
    /// starts from the follow version with every file selected.
    pub fn initial_proposal(&self) -> ProposedState {
        if self.valid_review_target {
            ProposedState::from(&self.tracked_state())
        } else {
            ProposedState::new(self.follow_version.clone().unwrap_or_default(), "*")
        }
    }

    pub fn apply_outcome(&self, proposed: &ProposedState) -> ApplyOutcome {
        let new_patchset_id = (self.new_patchset_id > 0).then_some(self.new_patchset_id);
        let description = match new_patchset_id {
            Some(id) => format!(
                "Created patch set {} following {}",
                id,
                self.version.as_deref().unwrap_or(&proposed.target_ref)
            ),
            None => "No patch set created".to_string(),
        };
        ApplyOutcome {
            new_patchset_id,
            description,
            commit_message: None,
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Coarse classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Unauthenticated,
    PermissionDenied,
    NotFound,
    Conflict,
    PreconditionFailed,
    Server,
    Other,
}

impl ApiErrorKind {
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 => ApiErrorKind::Unauthenticated,
            403 => ApiErrorKind::PermissionDenied,
            404 => ApiErrorKind::NotFound,
            409 => ApiErrorKind::Conflict,
            412 => ApiErrorKind::PreconditionFailed,
            500..=599 => ApiErrorKind::Server,
            _ => ApiErrorKind::Other,
        }
    }

    pub fn error_message(&self) -> &'static str {
        match self {
            ApiErrorKind::Unauthenticated => "Authentication failed",
            ApiErrorKind::PermissionDenied => "Permission denied",
            ApiErrorKind::NotFound => "Change or endpoint not found",
            ApiErrorKind::Conflict => "Change cannot be updated in its current state",
            ApiErrorKind::PreconditionFailed => "Precondition failed",
            ApiErrorKind::Server => "Server error",
            ApiErrorKind::Other => "Request failed",
        }
    }
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error_message())
    }
}

/// Non-success reply from the review server.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub http_status: u16,
    pub message: String,
    pub request_id: Option<String>,
}

impl ApiError {
    /// Create from HTTP status code and response body
    pub fn from_http_response(http_status: u16, body: String, request_id: Option<String>) -> Self {
        let kind = ApiErrorKind::from_http_status(http_status);
        let detail = strip_xssi(&body).trim();
        let message = if detail.is_empty() {
            format!("{} (HTTP {})", kind.error_message(), http_status)
        } else {
            format!("{} (HTTP {}): {}", kind.error_message(), http_status, detail)
        };

        Self {
            kind,
            http_status,
            message,
            request_id,
        }
    }

    /// Whether the user has to change something before trying again.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ApiErrorKind::Unauthenticated | ApiErrorKind::PermissionDenied | ApiErrorKind::NotFound
        )
    }

    /// Get a hint message for the user
    pub fn user_hint(&self) -> &'static str {
        match self.kind {
            ApiErrorKind::Unauthenticated => {
                "Check the username and HTTP password (REVIEWTARGET_USER, REVIEWTARGET_HTTP_PASSWORD)."
            }
            ApiErrorKind::PermissionDenied => {
                "Adding a patch set to this change requires upload permission on its branch."
            }
            ApiErrorKind::NotFound => {
                "Check the change id and that the review-target plugin is installed on the server."
            }
            ApiErrorKind::Conflict | ApiErrorKind::PreconditionFailed => {
                "Only open changes on a review branch can follow a new target."
            }
            ApiErrorKind::Server => "The server failed to process the request. Please try again later.",
            ApiErrorKind::Other => "An unexpected error occurred. Please try again.",
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

//! Checks a change has to pass before its review target may be changed.

use regex::Regex;
use tracing::debug;

/// Lifecycle status of a change on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    New,
    Merged,
    Abandoned,
}

/// Why a change cannot follow a new review target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionFailed {
    #[error("change is MERGED")]
    Merged,
    #[error("change is ABANDONED")]
    Abandoned,
    #[error("not on review branch")]
    NotOnReviewBranch,
}

const HEADS_PREFIX: &str = "refs/heads/";

fn full_branch_name(branch: &str) -> String {
    if branch.starts_with("refs/") {
        branch.to_string()
    } else {
        format!("{}{}", HEADS_PREFIX, branch)
    }
}

/// Whether `dest_branch` counts as a review branch.
///
/// `review_branch` matches exactly, as a folder (`review` covers
/// `review/1`), or through `*` wildcards (`review-*` covers `review-1`).
/// Both names may be given short or as full `refs/heads/` refs.
pub fn on_review_branch(dest_branch: &str, review_branch: &str) -> bool {
    let dest = full_branch_name(dest_branch);
    let review = full_branch_name(review_branch);

    if dest == review || dest.starts_with(&format!("{}/", review)) {
        return true;
    }
    if !review.contains('*') {
        return false;
    }

    let pattern = review
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("[^/]*");
    match Regex::new(&format!("^{}(/.*)?$", pattern)) {
        Ok(re) => re.is_match(&dest),
        Err(e) => {
            debug!("Invalid review branch pattern {}: {}", review_branch, e);
            false
        }
    }
}

/// Fail unless the change is open and targets a review branch.
pub fn assert_can_change_review_target(
    status: ChangeStatus,
    dest_branch: &str,
    review_branch: &str,
) -> Result<(), PreconditionFailed> {
    match status {
        ChangeStatus::Merged => return Err(PreconditionFailed::Merged),
        ChangeStatus::Abandoned => return Err(PreconditionFailed::Abandoned),
        ChangeStatus::New => {}
    }
    if !on_review_branch(dest_branch, review_branch) {
        return Err(PreconditionFailed::NotOnReviewBranch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_review_branch_exact_match() {
        assert!(on_review_branch("review", "refs/heads/review"));
        assert!(on_review_branch("refs/heads/review", "review"));
    }

    #[test]
    fn test_on_review_branch_only_exact_match() {
        assert!(!on_review_branch("review-1", "refs/heads/review"));
    }

    #[test]
    fn test_on_review_branch_matches_wildcard() {
        assert!(on_review_branch("review-1", "refs/heads/review-*"));
        assert!(!on_review_branch("other-1", "refs/heads/review-*"));
    }

    #[test]
    fn test_on_review_branch_matches_folder() {
        assert!(on_review_branch("review/1", "refs/heads/review"));
    }

    #[test]
    fn test_can_change_review_target() {
        assert_eq!(
            assert_can_change_review_target(ChangeStatus::New, "review", "refs/heads/review"),
            Ok(())
        );
        assert_eq!(
            assert_can_change_review_target(ChangeStatus::New, "other", "refs/heads/review"),
            Err(PreconditionFailed::NotOnReviewBranch)
        );
        assert_eq!(
            assert_can_change_review_target(ChangeStatus::Merged, "review", "refs/heads/review"),
            Err(PreconditionFailed::Merged)
        );
        assert_eq!(
            assert_can_change_review_target(ChangeStatus::Abandoned, "review", "refs/heads/review"),
            Err(PreconditionFailed::Abandoned)
        );
    }
}

//! Reconciliation of a proposed Review-Target / Review-Files pair against
//! the tracked state of a change.
//!
//! The engine itself is pure: tree access and content comparison come in as
//! collaborators, so the same code runs against a local repository, an
//! in-memory tree, or anything else that can answer the two questions.

use std::collections::BTreeSet;

use tracing::debug;

use crate::domain::{ProposedState, ReconciliationResult, TrackedState};
use crate::error::FollowError;

/// Paths a `(target, pattern)` pair resolves to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub valid_target: bool,
    pub paths: BTreeSet<String>,
}

impl Resolution {
    pub fn valid(paths: BTreeSet<String>) -> Self {
        Self {
            valid_target: true,
            paths,
        }
    }

    pub fn invalid() -> Self {
        Self::default()
    }
}

/// Compute the added / removed / updated paths of `proposed` relative to
/// `tracked`.
///
/// `resolve_paths(target, pattern)` lists the proposed inclusion set.
/// `content_differs(path, tracked_target, proposed_target)` is asked only for
/// paths present on both sides. A resolver error is reported as an invalid
/// target carrying that error, distinct from a target that does not exist.
pub fn reconcile<R, D>(
    tracked: &TrackedState,
    proposed: &ProposedState,
    mut resolve_paths: R,
    mut content_differs: D,
) -> ReconciliationResult
where
    R: FnMut(&str, &str) -> Result<Resolution, FollowError>,
    D: FnMut(&str, &str, &str) -> bool,
{
    let resolution = match resolve_paths(&proposed.target_ref, &proposed.file_pattern) {
        Ok(resolution) => resolution,
        Err(e) => {
            debug!("Resolution of {} failed: {}", proposed.target_ref, e);
            return ReconciliationResult::invalid(e);
        }
    };

    if !resolution.valid_target {
        return ReconciliationResult::invalid(FollowError::UnresolvableTarget {
            target: proposed.target_ref.clone(),
        });
    }

    let proposed_paths = resolution.paths;
    let tracked_paths: BTreeSet<&str> = tracked.included_paths.iter().map(String::as_str).collect();

    let added: BTreeSet<String> = proposed_paths
        .iter()
        .filter(|p| !tracked_paths.contains(p.as_str()))
        .cloned()
        .collect();
    let removed: BTreeSet<String> = tracked_paths
        .iter()
        .filter(|p| !proposed_paths.contains(**p))
        .map(|p| p.to_string())
        .collect();
    let updated: BTreeSet<String> = proposed_paths
        .iter()
        .filter(|p| tracked_paths.contains(p.as_str()))
        .filter(|p| content_differs(p.as_str(), &tracked.target_ref, &proposed.target_ref))
        .cloned()
        .collect();

    debug!(
        "Reconciled {} -> {}: {} added, {} updated, {} removed",
        tracked.target_ref,
        proposed.target_ref,
        added.len(),
        updated.len(),
        removed.len()
    );

    ReconciliationResult {
        added,
        removed,
        updated,
        valid_target: true,
        failure: None,
        version: None,
    }
}

/// Whether applying `proposed` would change anything.
///
/// A proposal with no path changes still counts when the target or pattern
/// text differs, because the commit message footers change.
pub fn can_apply(result: &ReconciliationResult, tracked: &TrackedState, proposed: &ProposedState) -> bool {
    if !result.valid_target {
        return false;
    }
    if result.has_path_changes() {
        return true;
    }
    proposed.target_ref != tracked.target_ref || proposed.file_pattern != tracked.file_pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    fn tracked(target: &str, pattern: &str, paths: &[&str]) -> TrackedState {
        TrackedState {
            target_ref: target.to_string(),
            file_pattern: pattern.to_string(),
            included_paths: paths.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Resolver backed by a fixed table of `(target, pattern) -> paths`.
    fn table(
        entries: &[((&str, &str), &[&str])],
    ) -> impl FnMut(&str, &str) -> Result<Resolution, FollowError> {
        let table: HashMap<(String, String), BTreeSet<String>> = entries
            .iter()
            .map(|((t, p), paths)| ((t.to_string(), p.to_string()), set(paths)))
            .collect();
        move |target, pattern| {
            if pattern.is_empty() {
                return Ok(Resolution::valid(BTreeSet::new()));
            }
            Ok(table
                .get(&(target.to_string(), pattern.to_string()))
                .cloned()
                .map(Resolution::valid)
                .unwrap_or_else(Resolution::invalid))
        }
    }

    #[test]
    fn test_end_to_end_example() {
        let tracked = tracked("rev1", "*.py", &["a.py", "b.py"]);
        let proposed = ProposedState::new("rev2", "*.py");
        let mut asked = Vec::new();

        let result = reconcile(
            &tracked,
            &proposed,
            table(&[(("rev2", "*.py"), &["a.py", "c.py"][..])]),
            |path, old, new| {
                asked.push((path.to_string(), old.to_string(), new.to_string()));
                true
            },
        );

        assert!(result.valid_target);
        assert_eq!(result.added, set(&["c.py"]));
        assert_eq!(result.removed, set(&["b.py"]));
        assert_eq!(result.updated, set(&["a.py"]));
        assert_eq!(
            asked,
            vec![("a.py".to_string(), "rev1".to_string(), "rev2".to_string())]
        );
        assert!(can_apply(&result, &tracked, &proposed));
    }

    #[test]
    fn test_unchanged_content_is_not_updated() {
        let tracked = tracked("rev1", "*.py", &["a.py"]);
        let proposed = ProposedState::new("rev2", "*.py");
        let result = reconcile(
            &tracked,
            &proposed,
            table(&[(("rev2", "*.py"), &["a.py"][..])]),
            |_, _, _| false,
        );
        assert!(!result.has_path_changes());
        // The target changed, so the footer update alone is worth a patch set.
        assert!(can_apply(&result, &tracked, &proposed));
    }

    #[test]
    fn test_unresolvable_target_short_circuits() {
        let tracked = tracked("rev1", "*.py", &["a.py"]);
        let proposed = ProposedState::new("missing", "*.py");
        let result = reconcile(&tracked, &proposed, table(&[]), |_, _, _| {
            panic!("content must not be compared for an invalid target")
        });

        assert!(!result.valid_target);
        assert!(!result.has_path_changes());
        assert_eq!(
            result.failure,
            Some(FollowError::UnresolvableTarget {
                target: "missing".to_string()
            })
        );
        assert!(!can_apply(&result, &tracked, &proposed));
    }

    #[test]
    fn test_resolver_failure_is_distinct_from_unresolvable() {
        let tracked = tracked("rev1", "*.py", &[]);
        let proposed = ProposedState::new("rev2", "*.py");
        let result = reconcile(
            &tracked,
            &proposed,
            |_, _| Err(FollowError::transport("503 Service Unavailable")),
            |_, _, _| true,
        );

        assert!(!result.valid_target);
        assert!(matches!(
            result.failure,
            Some(FollowError::TransportFailure(_))
        ));
    }

    #[test]
    fn test_empty_pattern_excludes_everything() {
        let tracked = tracked("rev1", "", &[]);
        let proposed = ProposedState::new("rev1", "");
        let result = reconcile(&tracked, &proposed, table(&[]), |_, _, _| true);

        assert!(result.valid_target);
        assert!(result.added.is_empty());
        assert!(result.removed.is_empty());
        assert!(result.updated.is_empty());
        assert!(!can_apply(&result, &tracked, &proposed));
    }

    #[test]
    fn test_pattern_edit_on_same_target_is_resolved() {
        let tracked = tracked("rev1", "*.py", &["a.py"]);
        let proposed = ProposedState::new("rev1", "*.py\n*.md");
        let result = reconcile(
            &tracked,
            &proposed,
            table(&[(("rev1", "*.py\n*.md"), &["a.py", "README.md"][..])]),
            |_, _, _| false,
        );

        assert_eq!(result.added, set(&["README.md"]));
        assert!(result.updated.is_empty());
        assert!(can_apply(&result, &tracked, &proposed));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let tracked = tracked("rev1", "*", &["a", "b", "c"]);
        let proposed = ProposedState::new("rev2", "*");
        let entries: &[((&str, &str), &[&str])] = &[(("rev2", "*"), &["b", "c", "d"][..])];
        let differs = |path: &str, _: &str, _: &str| path == "c";

        let first = reconcile(&tracked, &proposed, table(entries), differs);
        let second = reconcile(&tracked, &proposed, table(entries), differs);
        assert_eq!(first, second);
    }

    #[test]
    fn test_can_apply_false_when_nothing_changes() {
        let tracked = tracked("rev1", "*.py", &["a.py"]);
        let proposed = ProposedState::from(&tracked);
        let result = ReconciliationResult {
            valid_target: true,
            ..ReconciliationResult::default()
        };
        assert!(!can_apply(&result, &tracked, &proposed));

        let edited = ProposedState::new("rev1", "*.py\n");
        assert!(can_apply(&result, &tracked, &edited));
    }
}

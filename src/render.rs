//! Text shown to the user: counts, the confirm tooltip, compacted path lists.

use crate::compact::compact;
use crate::domain::{ProposedState, ReconciliationResult, TrackedState};
use crate::error::FollowError;

const INDENT: &str = "  ";

pub fn file_summary(count: usize) -> String {
    if count == 1 {
        "1 file".to_string()
    } else {
        format!("{} files", count)
    }
}

/// What confirming would do, phrased for the confirm button.
pub fn apply_tooltip(
    result: &ReconciliationResult,
    tracked: &TrackedState,
    proposed: &ProposedState,
) -> String {
    if !result.valid_target {
        return match &result.failure {
            Some(failure @ (FollowError::InvalidPattern { .. } | FollowError::TransportFailure(_))) => {
                failure.to_string()
            }
            _ => format!("Review-Target '{}' is not valid", proposed.target_ref),
        };
    }

    let path_changes = result.path_change_count();
    let target_changes = proposed.target_ref != tracked.target_ref;
    let files_changes = proposed.file_pattern != tracked.file_pattern;

    if path_changes > 0 && target_changes {
        let version = result.version.as_deref().unwrap_or(&proposed.target_ref);
        return format!(
            "Create new patchset, updating {} files to {}",
            path_changes, version
        );
    }
    if path_changes > 0 {
        return format!("Create new patchset, updating {} files", path_changes);
    }
    if target_changes || files_changes {
        return "Create new patchset, updating commit message".to_string();
    }
    "No changes necessary".to_string()
}

/// Render a sorted path list as an indented tree-ish listing.
///
/// Each entry prints its new directory part (if any) on its own line, and
/// the file name indented one level per shared or new directory segment.
pub fn render_compacted<I, S>(paths: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut lines = Vec::new();
    for entry in compact(paths) {
        let shared_depth = entry.shared_prefix.matches('/').count();
        if !entry.unique_suffix.is_empty() {
            lines.push(format!(
                "{}{}",
                INDENT.repeat(shared_depth),
                entry.unique_suffix
            ));
        }
        let depth = shared_depth + entry.unique_suffix.matches('/').count();
        lines.push(format!("{}{}", INDENT.repeat(depth), entry.file_name));
    }
    lines
}

/// One titled section of the dry-run report, empty when there are no paths.
pub fn render_section(title: &str, paths: &[&String]) -> Vec<String> {
    if paths.is_empty() {
        return Vec::new();
    }
    let mut lines = vec![format!("{} ({}):", title, file_summary(paths.len()))];
    lines.extend(
        render_compacted(paths.iter().map(|p| p.as_str()))
            .into_iter()
            .map(|line| format!("{}{}", INDENT, line)),
    );
    lines
}

/// Full dry-run report: target, version and the three path sections.
pub fn render_result(
    result: &ReconciliationResult,
    tracked: &TrackedState,
    proposed: &ProposedState,
) -> Vec<String> {
    let mut lines = vec![
        format!("Review-Target: {}", proposed.target_ref),
        format!(
            "Review-Files:  {}",
            proposed.file_pattern.lines().collect::<Vec<_>>().join(", ")
        ),
    ];
    if let Some(version) = &result.version {
        lines.push(format!("Version:       {}", version));
    }
    if !result.valid_target {
        lines.push(String::new());
        lines.push(apply_tooltip(result, tracked, proposed));
        return lines;
    }

    for (title, paths) in [
        ("Added", &result.added),
        ("Updated", &result.updated),
        ("Removed", &result.removed),
    ] {
        let paths: Vec<&String> = paths.iter().collect();
        let section = render_section(title, &paths);
        if !section.is_empty() {
            lines.push(String::new());
            lines.extend(section);
        }
    }
    lines.push(String::new());
    lines.push(apply_tooltip(result, tracked, proposed));
    lines
}

//! Domain types shared across modules.
//!
//! These types are used by the reconciliation engine, the session state
//! machine, the REST client and the renderers. Keeping them here avoids
//! circular dependencies between those modules.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::FollowError;

/// What the host currently records as the review's baseline.
///
/// `included_paths` is always the result of applying `file_pattern` to the
/// tree at `target_ref`, sorted. It is never edited on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedState {
    pub target_ref: String,
    pub file_pattern: String,
    pub included_paths: Vec<String>,
}

/// A user-edited candidate target/pattern pair, not yet applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedState {
    pub target_ref: String,
    pub file_pattern: String,
}

impl ProposedState {
    pub fn new(target_ref: impl Into<String>, file_pattern: impl Into<String>) -> Self {
        Self {
            target_ref: target_ref.into(),
            file_pattern: file_pattern.into(),
        }
    }
}

impl From<&TrackedState> for ProposedState {
    fn from(tracked: &TrackedState) -> Self {
        Self {
            target_ref: tracked.target_ref.clone(),
            file_pattern: tracked.file_pattern.clone(),
        }
    }
}

/// Delta between the tracked paths and the paths a proposal would include.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationResult {
    /// In the proposal, not tracked yet
    pub added: BTreeSet<String>,
    /// Tracked, dropped by the proposal
    pub removed: BTreeSet<String>,
    /// In both, with different content between the two targets
    pub updated: BTreeSet<String>,
    pub valid_target: bool,
    /// Why `valid_target` is false, when it is.
    pub failure: Option<FollowError>,
    /// Display name of the proposed target (e.g. a tag without `refs/tags/`).
    pub version: Option<String>,
}

impl ReconciliationResult {
    /// Result for a target that could not be resolved.
    pub fn invalid(failure: FollowError) -> Self {
        Self {
            valid_target: false,
            failure: Some(failure),
            ..Self::default()
        }
    }

    pub fn has_path_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.updated.is_empty()
    }

    pub fn path_change_count(&self) -> usize {
        self.added.len() + self.removed.len() + self.updated.len()
    }
}

/// One renderable line of a compacted path list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactedEntry {
    pub shared_prefix: String,
    pub unique_suffix: String,
    pub file_name: String,
}

impl CompactedEntry {
    /// The full path this entry was derived from.
    pub fn full_path(&self) -> String {
        format!("{}{}{}", self.shared_prefix, self.unique_suffix, self.file_name)
    }
}

/// Outcome of a successful apply request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Patch set created by the host, `None` when nothing had to change.
    pub new_patchset_id: Option<u32>,
    pub description: String,
    /// Commit message carrying the updated footers, when computed locally.
    pub commit_message: Option<String>,
}

//! Revision trees and the resolvers the reconciliation engine runs against.
//!
//! A `TreeSource` turns a ref name into a flat snapshot of `path -> blob id`.
//! `TreeResolver` plugs any source into `reconcile`: it resolves the proposed
//! target, applies the Review-Files filter, and compares blob ids for paths
//! present in both targets.

mod git;

pub use git::GitTrees;
#[cfg(test)]
pub(crate) use git::fixture;

use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use tracing::{debug, warn};

use crate::domain::{ProposedState, ReconciliationResult, TrackedState};
use crate::error::FollowError;
use crate::filter::ReviewFilter;
use crate::reconcile::{reconcile, Resolution};

/// Flat listing of one revision's files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSnapshot {
    entries: BTreeMap<String, String>,
}

impl TreeSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, blob_id: impl Into<String>) {
        self.entries.insert(path.into(), blob_id.into());
    }

    pub fn blob_id(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    /// `(path, blob id)` pairs in path order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, b)| (p.as_str(), b.as_str()))
    }

    /// Paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<P: Into<String>, B: Into<String>> FromIterator<(P, B)> for TreeSnapshot {
    fn from_iter<T: IntoIterator<Item = (P, B)>>(iter: T) -> Self {
        let mut snapshot = TreeSnapshot::new();
        for (path, blob) in iter {
            snapshot.insert(path, blob);
        }
        snapshot
    }
}

/// Something that can list the tree of a revision.
pub trait TreeSource {
    /// `Ok(None)` when the ref does not resolve to a commit.
    fn snapshot(&self, target_ref: &str) -> Result<Option<TreeSnapshot>>;

    /// Ref names pointing at the same commit as `target_ref`.
    fn ref_tips(&self, _target_ref: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// In-memory tree source keyed by ref name.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryTrees {
    trees: HashMap<String, TreeSnapshot>,
    tips: HashMap<String, Vec<String>>,
}

#[cfg(test)]
impl MemoryTrees {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tree(mut self, target_ref: &str, snapshot: TreeSnapshot) -> Self {
        self.trees.insert(target_ref.to_string(), snapshot);
        self
    }

    pub fn with_tips(mut self, target_ref: &str, tips: &[&str]) -> Self {
        self.tips.insert(
            target_ref.to_string(),
            tips.iter().map(|t| t.to_string()).collect(),
        );
        self
    }
}

#[cfg(test)]
impl TreeSource for MemoryTrees {
    fn snapshot(&self, target_ref: &str) -> Result<Option<TreeSnapshot>> {
        Ok(self.trees.get(target_ref).cloned())
    }

    fn ref_tips(&self, target_ref: &str) -> Result<Vec<String>> {
        Ok(self.tips.get(target_ref).cloned().unwrap_or_default())
    }
}

/// Adapts a `TreeSource` to the engine's collaborators.
pub struct TreeResolver<S> {
    source: S,
}

impl<S: TreeSource> TreeResolver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn read_tree(&self, target_ref: &str) -> Result<Option<TreeSnapshot>, FollowError> {
        self.source.snapshot(target_ref).map_err(|e| {
            warn!("Failed to read tree of {}: {:#}", target_ref, e);
            FollowError::transport(format!("{:#}", e))
        })
    }

    fn select_paths(filter: &ReviewFilter, target_ref: &str, tree: Option<&TreeSnapshot>) -> Resolution {
        match tree {
            Some(tree) => {
                let paths = filter.select(tree.paths());
                debug!(
                    "Resolved {}: {} of {} paths selected",
                    target_ref,
                    paths.len(),
                    tree.len()
                );
                Resolution::valid(paths)
            }
            None => Resolution::invalid(),
        }
    }

    /// Resolve `(target, pattern)` to the set of reviewed paths.
    pub fn resolve_paths(&self, target_ref: &str, file_pattern: &str) -> Result<Resolution, FollowError> {
        let filter = ReviewFilter::new(file_pattern)?;
        let tree = self.read_tree(target_ref)?;
        Ok(Self::select_paths(&filter, target_ref, tree.as_ref()))
    }

    /// Build the tracked state recorded for `(target, pattern)`.
    ///
    /// The included paths are always derived from the tree, never stored.
    pub fn tracked_state(&self, target_ref: &str, file_pattern: &str) -> Result<TrackedState, FollowError> {
        let resolution = self.resolve_paths(target_ref, file_pattern)?;
        Ok(TrackedState {
            target_ref: target_ref.to_string(),
            file_pattern: file_pattern.to_string(),
            included_paths: resolution.paths.into_iter().collect(),
        })
    }

    /// Run the reconciliation engine against this source.
    ///
    /// Each tree is read at most once. A path missing from either tree
    /// counts as changed content. Failing to read the tracked tree fails the
    /// whole reconciliation rather than reporting every shared path as
    /// updated.
    pub fn reconcile(&self, tracked: &TrackedState, proposed: &ProposedState) -> ReconciliationResult {
        let proposed_tree: OnceCell<Option<TreeSnapshot>> = OnceCell::new();
        let tracked_tree: OnceCell<Result<Option<TreeSnapshot>, FollowError>> = OnceCell::new();

        let result = reconcile(
            tracked,
            proposed,
            |target, pattern| {
                let filter = ReviewFilter::new(pattern)?;
                let tree = self.read_tree(target)?;
                let resolution = Self::select_paths(&filter, target, tree.as_ref());
                let _ = proposed_tree.set(tree);
                Ok(resolution)
            },
            |path, old_ref, _new_ref| {
                let Ok(old) = tracked_tree.get_or_init(|| self.read_tree(old_ref)) else {
                    return true;
                };
                let new = proposed_tree.get().and_then(Option::as_ref);
                match (
                    old.as_ref().and_then(|t| t.blob_id(path)),
                    new.and_then(|t| t.blob_id(path)),
                ) {
                    (Some(a), Some(b)) => a != b,
                    _ => true,
                }
            },
        );

        match tracked_tree.into_inner() {
            Some(Err(e)) => ReconciliationResult::invalid(e),
            _ => result,
        }
    }

    /// Whether `current_ref` already carries what `target_ref` and
    /// `file_pattern` select on top of `base_ref`.
    ///
    /// The expected tree takes every selected path from the target and every
    /// other path from the base. An unresolvable target or current ref is
    /// never current; a missing base (root commit) is an empty tree.
    pub fn is_current(
        &self,
        current_ref: &str,
        base_ref: &str,
        target_ref: &str,
        file_pattern: &str,
    ) -> Result<bool, FollowError> {
        let filter = ReviewFilter::new(file_pattern)?;
        let Some(target) = self.read_tree(target_ref)? else {
            debug!("{} does not resolve, not current", target_ref);
            return Ok(false);
        };
        let Some(current) = self.read_tree(current_ref)? else {
            return Ok(false);
        };
        let base = self.read_tree(base_ref)?.unwrap_or_default();

        let expected: TreeSnapshot = base
            .entries()
            .filter(|(path, _)| !filter.is_selected(path))
            .chain(target.entries().filter(|(path, _)| filter.is_selected(path)))
            .collect();
        debug!(
            "{}: expected {} paths, found {}",
            current_ref,
            expected.len(),
            current.len()
        );
        Ok(expected == current)
    }
}

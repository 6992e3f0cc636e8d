//! Tree source backed by a local git repository.
//!
//! `git2::Repository` is opened per call, on whichever blocking thread asks,
//! so `GitTrees` itself only holds the path and is `Send + Sync`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use git2::{Commit, ErrorCode, ObjectType, Repository, TreeWalkMode, TreeWalkResult};
use tracing::debug;

use super::{TreeSnapshot, TreeSource};

const HEADS_PREFIX: &str = "refs/heads/";

/// Reads trees, refs and commit messages from a repository on disk.
pub struct GitTrees {
    repo: PathBuf,
}

impl GitTrees {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    fn open(&self) -> Result<Repository> {
        Repository::open(&self.repo)
            .with_context(|| format!("Failed to open repository {}", self.repo.display()))
    }

    /// Commit id a ref points at, `None` when it does not resolve.
    pub fn resolve_commit(&self, target_ref: &str) -> Result<Option<String>> {
        let repo = self.open()?;
        let id = peel_commit(&repo, target_ref)?.map(|commit| commit.id().to_string());
        Ok(id)
    }

    /// Full message of the `HEAD` commit, ending in a single newline.
    pub fn head_message(&self) -> Result<String> {
        let repo = self.open()?;
        let commit = repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .context("Failed to read HEAD commit")?;
        let message = String::from_utf8_lossy(commit.message_bytes());
        Ok(format!("{}\n", message.trim_end()))
    }

    /// Short name of the checked out branch, `None` when detached.
    ///
    /// An unborn branch still has a name.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let repo = self.open()?;
        let head = repo.find_reference("HEAD").context("Failed to read HEAD")?;
        Ok(head
            .symbolic_target()
            .map(|target| target.strip_prefix(HEADS_PREFIX).unwrap_or(target).to_string())
            .filter(|name| !name.is_empty()))
    }
}

/// Resolve `target_ref` to a commit. Specs that name nothing, or name
/// something other than a commit, resolve to `None`.
fn peel_commit<'r>(repo: &'r Repository, target_ref: &str) -> Result<Option<Commit<'r>>> {
    if target_ref.trim().is_empty() {
        return Ok(None);
    }
    let object = match repo.revparse_single(target_ref) {
        Ok(object) => object,
        Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec | ErrorCode::Ambiguous) => {
            debug!("{} does not resolve: {}", target_ref, e.message());
            return Ok(None);
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to resolve {}", target_ref)),
    };
    match object.peel_to_commit() {
        Ok(commit) => Ok(Some(commit)),
        Err(e) => {
            debug!("{} is not a commit: {}", target_ref, e.message());
            Ok(None)
        }
    }
}

impl TreeSource for GitTrees {
    fn snapshot(&self, target_ref: &str) -> Result<Option<TreeSnapshot>> {
        let repo = self.open()?;
        let Some(commit) = peel_commit(&repo, target_ref)? else {
            return Ok(None);
        };
        let tree = commit
            .tree()
            .with_context(|| format!("Failed to read tree of {}", target_ref))?;

        let mut snapshot = TreeSnapshot::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            // Gitlinks (submodules) are not reviewable files.
            if entry.kind() == Some(ObjectType::Blob) {
                let name = String::from_utf8_lossy(entry.name_bytes());
                // Mode is part of the identity: a chmod is an update too.
                snapshot.insert(
                    format!("{}{}", root, name),
                    format!("{:06o}:{}", entry.filemode(), entry.id()),
                );
            }
            TreeWalkResult::Ok
        })
        .with_context(|| format!("Failed to walk tree of {}", target_ref))?;

        debug!("{} ({}) has {} files", target_ref, commit.id(), snapshot.len());
        Ok(Some(snapshot))
    }

    fn ref_tips(&self, target_ref: &str) -> Result<Vec<String>> {
        let repo = self.open()?;
        let Some(commit) = peel_commit(&repo, target_ref)? else {
            return Ok(Vec::new());
        };
        let mut tips = Vec::new();
        for reference in repo.references().context("Failed to list references")? {
            let Ok(reference) = reference else {
                continue;
            };
            if !reference
                .peel_to_commit()
                .is_ok_and(|tip| tip.id() == commit.id())
            {
                continue;
            }
            if let Some(name) = reference.name() {
                tips.push(name.to_string());
            }
        }
        tips.sort();
        Ok(tips)
    }
}

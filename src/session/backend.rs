//! Where a session's reconciliations and applies are executed.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::api::{FollowInput, GerritClient};
use crate::config::Config;
use crate::domain::{ApplyOutcome, ProposedState, ReconciliationResult, TrackedState};
use crate::error::FollowError;
use crate::footer::{footer_values, patch_set_message, updated_message};
use crate::tree::{GitTrees, TreeResolver, TreeSource};
use crate::version::display_version;

/// Executes the commands a `FollowSession` issues.
pub trait FollowBackend: Send + Sync + 'static {
    /// Dry run: the delta `proposed` would produce relative to `tracked`.
    fn reconcile(
        &self,
        tracked: &TrackedState,
        proposed: &ProposedState,
    ) -> impl Future<Output = ReconciliationResult> + Send;

    /// Record `proposed` as the change's new review target.
    fn apply(
        &self,
        tracked: &TrackedState,
        proposed: &ProposedState,
    ) -> impl Future<Output = Result<ApplyOutcome, FollowError>> + Send;
}

// ============================================================================
// Remote: the review server computes everything
// ============================================================================

pub struct RemoteBackend {
    client: GerritClient,
    change_id: String,
}

impl RemoteBackend {
    pub fn new(client: GerritClient, change_id: impl Into<String>) -> Self {
        Self {
            client,
            change_id: change_id.into(),
        }
    }
}

impl FollowBackend for RemoteBackend {
    async fn reconcile(&self, _tracked: &TrackedState, proposed: &ProposedState) -> ReconciliationResult {
        match self
            .client
            .post_follow(&self.change_id, &FollowInput::dry_run(proposed))
            .await
        {
            Ok(info) => info.to_result(proposed),
            Err(e) => ReconciliationResult::invalid(FollowError::transport(format!("{:#}", e))),
        }
    }

    async fn apply(&self, _tracked: &TrackedState, proposed: &ProposedState) -> Result<ApplyOutcome, FollowError> {
        let info = self
            .client
            .post_follow(&self.change_id, &FollowInput::update(proposed))
            .await
            .map_err(|e| FollowError::transport(format!("{:#}", e)))?;

        if !info.valid_review_target {
            return Err(FollowError::UnresolvableTarget {
                target: proposed.target_ref.clone(),
            });
        }
        let outcome = info.apply_outcome(proposed);
        info!("{}", outcome.description);
        Ok(outcome)
    }
}

// ============================================================================
// Local: a git checkout stands in for the server
// ============================================================================

#[derive(Debug, Clone)]
struct LocalSettings {
    target_footer: String,
    files_footer: String,
    version_prefix: String,
    version_drop_prefix: String,
}

/// Reconciles against a local repository.
///
/// The tracked state comes from the footers of `HEAD`. Applying does not
/// touch the repository; it computes the commit message the new patch set
/// would carry.
pub struct LocalBackend {
    resolver: Arc<TreeResolver<GitTrees>>,
    settings: LocalSettings,
}

impl LocalBackend {
    pub fn new(repo: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            resolver: Arc::new(TreeResolver::new(GitTrees::new(repo))),
            settings: LocalSettings {
                target_footer: config.review_target_footer.clone(),
                files_footer: config.review_files_footer.clone(),
                version_prefix: config.version_prefix.clone(),
                version_drop_prefix: config.version_drop_prefix.clone(),
            },
        }
    }

    pub fn trees(&self) -> &GitTrees {
        self.resolver.source()
    }

    /// Review target and files recorded in the `HEAD` commit message.
    ///
    /// A commit without a `Review-Target` footer has no tracked state yet.
    /// A target that no longer resolves is kept with no included paths.
    pub fn tracked_state(&self) -> Result<TrackedState> {
        let message = self.trees().head_message()?;
        let Some(target) = footer_values(&message, &self.settings.target_footer)
            .into_iter()
            .next()
        else {
            debug!("HEAD has no {} footer", self.settings.target_footer);
            return Ok(TrackedState::default());
        };
        let pattern = footer_values(&message, &self.settings.files_footer).join("\n");

        match self.resolver.tracked_state(&target, &pattern) {
            Ok(tracked) => Ok(tracked),
            Err(e) => {
                debug!("Tracked target {} does not resolve: {}", target, e);
                Ok(TrackedState {
                    target_ref: target,
                    file_pattern: pattern,
                    included_paths: Vec::new(),
                })
            }
        }
    }

    /// Display version of the follow branch tip, empty when the branch does
    /// not exist.
    pub fn follow_version(&self, follow_branch: &str) -> Result<String> {
        if self.trees().resolve_commit(follow_branch)?.is_none() {
            return Ok(String::new());
        }
        Ok(version_of(self.trees(), &self.settings, follow_branch))
    }

    /// Whether `HEAD` already carries exactly what its own footers select:
    /// the selected paths from the Review-Target and everything else from
    /// the parent commit.
    ///
    /// A commit without a Review-Target footer is never current.
    pub fn is_current(&self) -> Result<bool> {
        let tracked = self.tracked_state()?;
        if tracked.target_ref.is_empty() {
            return Ok(false);
        }
        let current = self
            .resolver
            .is_current("HEAD", "HEAD^", &tracked.target_ref, &tracked.file_pattern)?;
        debug!(
            "HEAD is {}current with {}",
            if current { "" } else { "not " },
            tracked.target_ref
        );
        Ok(current)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, FollowError>
    where
        T: Send + 'static,
        F: FnOnce(&TreeResolver<GitTrees>, &LocalSettings) -> T + Send + 'static,
    {
        let resolver = Arc::clone(&self.resolver);
        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || f(&*resolver, &settings))
            .await
            .map_err(FollowError::transport)
    }
}

fn version_of<S: TreeSource>(trees: &S, settings: &LocalSettings, target: &str) -> String {
    let tips = trees.ref_tips(target).unwrap_or_default();
    display_version(
        &tips,
        &settings.version_prefix,
        &settings.version_drop_prefix,
        target,
    )
}

impl FollowBackend for LocalBackend {
    async fn reconcile(&self, tracked: &TrackedState, proposed: &ProposedState) -> ReconciliationResult {
        let tracked = tracked.clone();
        let proposed = proposed.clone();
        let outcome = self
            .blocking(move |resolver, settings| {
                let mut result = resolver.reconcile(&tracked, &proposed);
                if result.valid_target {
                    result.version = Some(version_of(resolver.source(), settings, &proposed.target_ref));
                }
                result
            })
            .await;
        outcome.unwrap_or_else(ReconciliationResult::invalid)
    }

    async fn apply(&self, tracked: &TrackedState, proposed: &ProposedState) -> Result<ApplyOutcome, FollowError> {
        let tracked = tracked.clone();
        let proposed = proposed.clone();
        self.blocking(move |resolver, settings| {
            let result = resolver.reconcile(&tracked, &proposed);
            if let Some(failure) = result.failure {
                return Err(failure);
            }
            let original = resolver
                .source()
                .head_message()
                .map_err(|e| FollowError::transport(format!("{:#}", e)))?;
            let message = updated_message(
                &original,
                &settings.target_footer,
                &proposed.target_ref,
                &settings.files_footer,
                &proposed.file_pattern,
            );

            let same_tree = !result.has_path_changes();
            let description = if same_tree && message == original {
                "No changes necessary".to_string()
            } else {
                patch_set_message(same_tree, &proposed.target_ref)
            };
            Ok(ApplyOutcome {
                new_patchset_id: None,
                description,
                commit_message: Some(message),
            })
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::fixture;
    use crate::tree::MemoryTrees;
    use std::fs;
    use std::path::Path;

    /// Two tagged upstream versions and a review commit following v1.
    ///
    /// The review commit carries v1's `*.py` files on top of v2's parent, so
    /// its tree differs from what its footers select.
    fn repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let repo = fixture::init(root, "review");

        fs::create_dir(root.join("docs")).unwrap();
        fs::write(root.join("a.py"), "a = 1\n").unwrap();
        fs::write(root.join("b.py"), "b = 1\n").unwrap();
        fs::write(root.join("docs/x.md"), "# x\n").unwrap();
        let v1 = fixture::commit_all(&repo, "v1");
        fixture::tag(&repo, "v1", v1);

        fs::write(root.join("a.py"), "a = 2\n").unwrap();
        fs::remove_file(root.join("b.py")).unwrap();
        fs::write(root.join("c.py"), "c = 1\n").unwrap();
        let v2 = fixture::commit_all(&repo, "v2");
        fixture::tag(&repo, "v2", v2);

        fixture::commit_all(
            &repo,
            "Review\n\nReview-Target: v1\nReview-Files: *.py\nChange-Id: I1234\n",
        );
        dir
    }

    /// A review commit on `base` carrying v2's `*.py` files.
    fn current_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let repo = fixture::init(root, "review");

        fs::write(root.join("a.py"), "a = 1\n").unwrap();
        fs::write(root.join("README"), "base\n").unwrap();
        let base = fixture::commit_all(&repo, "base");

        fs::write(root.join("a.py"), "a = 2\n").unwrap();
        fs::write(root.join("README"), "upstream\n").unwrap();
        let v2 = fixture::commit_all(&repo, "v2");
        fixture::tag(&repo, "v2", v2);

        // The review commit sits on base, not on v2.
        repo.reference("refs/heads/review", base, true, "rewind").unwrap();
        fs::write(root.join("README"), "base\n").unwrap();
        fixture::commit_all(
            &repo,
            "Review\n\nReview-Target: v2\nReview-Files: *.py\nChange-Id: I99\n",
        );
        dir
    }

    fn backend(dir: &Path) -> LocalBackend {
        LocalBackend::new(dir, &Config::default())
    }

    #[tokio::test]
    async fn test_local_backend_against_git() {
        let dir = repo();
        let backend = backend(dir.path());

        let tracked = backend.tracked_state().unwrap();
        assert_eq!(tracked.target_ref, "v1");
        assert_eq!(tracked.file_pattern, "*.py");
        assert_eq!(tracked.included_paths, vec!["a.py", "b.py"]);
        assert_eq!(backend.follow_version("refs/heads/master").unwrap(), "");

        let proposed = ProposedState::new("v2", "*.py");
        let result = backend.reconcile(&tracked, &proposed).await;
        assert!(result.valid_target);
        assert_eq!(result.added.iter().collect::<Vec<_>>(), vec!["c.py"]);
        assert_eq!(result.removed.iter().collect::<Vec<_>>(), vec!["b.py"]);
        assert_eq!(result.updated.iter().collect::<Vec<_>>(), vec!["a.py"]);
        assert_eq!(result.version.as_deref(), Some("v2"));

        let outcome = backend.apply(&tracked, &proposed).await.unwrap();
        assert_eq!(outcome.description, "Updated files based on v2.");
        let message = outcome.commit_message.unwrap();
        assert_eq!(
            message,
            "Review\n\nReview-Target: v2\nReview-Files: *.py\nChange-Id: I1234\n"
        );
    }

    #[tokio::test]
    async fn test_local_backend_unknown_target() {
        let dir = repo();
        let backend = backend(dir.path());
        let tracked = backend.tracked_state().unwrap();

        let proposed = ProposedState::new("v9", "*.py");
        let result = backend.reconcile(&tracked, &proposed).await;
        assert!(!result.valid_target);
        assert_eq!(
            result.failure,
            Some(FollowError::UnresolvableTarget {
                target: "v9".to_string()
            })
        );
        assert!(backend.apply(&tracked, &proposed).await.is_err());
    }

    #[test]
    fn test_is_current() {
        let dir = current_repo();
        assert!(backend(dir.path()).is_current().unwrap());

        // HEAD's tree is v2 itself, not v1's files on top of the parent.
        let dir = repo();
        assert!(!backend(dir.path()).is_current().unwrap());
    }

    #[test]
    fn test_follow_version_uses_tags_at_the_tip() {
        let dir = repo();
        let backend = backend(dir.path());
        assert_eq!(backend.follow_version("v2").unwrap(), "v2");
        assert_eq!(backend.follow_version("refs/heads/missing").unwrap(), "");
    }

    #[test]
    fn test_version_of_prefers_version_refs() {
        let settings = backend(Path::new(".")).settings;
        let trees = MemoryTrees::new()
            .with_tips("refs/heads/master", &["refs/heads/master", "refs/tags/v1.4.0"])
            .with_tips("refs/heads/dev", &["refs/heads/dev"]);

        assert_eq!(version_of(&trees, &settings, "refs/heads/master"), "v1.4.0");
        assert_eq!(version_of(&trees, &settings, "refs/heads/dev"), "refs/heads/dev");
    }
}

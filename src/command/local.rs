use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::{dry_run, edit_events, print_report};
use crate::cli::{resolve_repo_root, EditArgs};
use crate::config::Config;
use crate::domain::{ProposedState, TrackedState};
use crate::preconditions::{assert_can_change_review_target, ChangeStatus};
use crate::session::{FollowSession, LocalBackend, SessionDriver, SessionEvent};

pub async fn run_local(
    config: &Config,
    repo: Option<PathBuf>,
    branch: Option<String>,
    show_message: bool,
    edit: &EditArgs,
) -> Result<()> {
    let backend = LocalBackend::new(resolve_repo_root(repo)?, config);
    info!("Using repository {}", backend.trees().repo().display());

    let branch = match branch {
        Some(branch) => branch,
        None => backend
            .trees()
            .current_branch()?
            .context("HEAD is detached; pass --branch with the change's destination branch")?,
    };
    assert_can_change_review_target(ChangeStatus::New, &branch, &config.review_branch)
        .with_context(|| format!("Cannot follow on {} (review branch is {})", branch, config.review_branch))?;

    let tracked = backend.tracked_state()?;
    let follow_version = backend.follow_version(&config.follow_branch)?;
    debug!(
        "Tracked target={:?} files={:?} ({} paths), follow version {:?}",
        tracked.target_ref,
        tracked.file_pattern,
        tracked.included_paths.len(),
        follow_version
    );

    // A commit without footers starts from the follow version with every file.
    let initial = if tracked.target_ref.is_empty() {
        ProposedState::new(follow_version.clone(), "*")
    } else {
        ProposedState::from(&tracked)
    };
    let session = FollowSession::open(tracked).with_follow_version(follow_version);
    let events = edit_events(&initial, edit);

    let driver = SessionDriver::new(backend, Duration::from_secs(config.request_timeout_secs));
    let session = dry_run(&driver, session, events).await;
    print_report(&session);
    print_current(driver.backend(), session.tracked());

    if !show_message || !session.can_apply() {
        return Ok(());
    }

    let session = driver.step(session, SessionEvent::Confirm).await;
    match (session.outcome(), session.last_error()) {
        (Some(outcome), _) => {
            println!();
            println!("{}", outcome.description);
            if let Some(message) = &outcome.commit_message {
                println!();
                print!("{}", message);
            }
            Ok(())
        }
        (None, Some(error)) => anyhow::bail!("Failed to compute the updated commit: {}", error),
        (None, None) => anyhow::bail!("Failed to compute the updated commit"),
    }
}

/// Report whether `HEAD` already holds what its own footers select.
fn print_current(backend: &LocalBackend, tracked: &TrackedState) {
    if tracked.target_ref.is_empty() {
        return;
    }
    match backend.is_current() {
        Ok(true) => println!("HEAD is current with {}", tracked.target_ref),
        Ok(false) => println!("⚠️  HEAD does not match {} and its Review-Files", tracked.target_ref),
        Err(e) => warn!("Could not compare HEAD with {}: {:#}", tracked.target_ref, e),
    }
}

use std::time::Duration;

use anyhow::Result;

use super::{dry_run, edit_events, print_report};
use crate::api::GerritClient;
use crate::cli::EditArgs;
use crate::config::Config;
use crate::session::{FollowSession, RemoteBackend, SessionDriver};

/// Open a session on the change as the server reports it and dry-run `edit`.
pub(super) async fn remote_session(
    config: &Config,
    change: &str,
    edit: &EditArgs,
) -> Result<(SessionDriver<RemoteBackend>, FollowSession)> {
    let client = GerritClient::new(config)?;
    let info = client.get_follow(change).await?;
    if !info.on_review_branch {
        anyhow::bail!("Change {} is not on a review branch", change);
    }

    let session = FollowSession::open(info.tracked_state())
        .with_follow_version(info.follow_version.clone().unwrap_or_default());
    let events = edit_events(&info.initial_proposal(), edit);

    let driver = SessionDriver::new(
        RemoteBackend::new(client, change),
        Duration::from_secs(config.request_timeout_secs),
    );
    let session = dry_run(&driver, session, events).await;
    Ok((driver, session))
}

pub async fn run_preview(config: &Config, change: &str, edit: &EditArgs) -> Result<()> {
    let (_driver, session) = remote_session(config, change, edit).await?;
    print_report(&session);
    Ok(())
}

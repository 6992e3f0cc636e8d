//! Subcommand handlers.
//!
//! `preview`, `apply` and `local` share one flow: open a session on the
//! tracked state, replay the requested edits through the session driver,
//! then report the result (and confirm it, for `apply`).

mod apply;
mod compact;
mod local;
mod preview;
mod status;

pub use apply::run_apply;
pub use compact::run_compact;
pub use local::run_local;
pub use preview::run_preview;
pub use status::run_status;

use tokio::sync::mpsc;
use tracing::debug;

use crate::cli::EditArgs;
use crate::domain::ProposedState;
use crate::render::render_result;
use crate::session::{FollowBackend, FollowSession, SessionDriver, SessionEvent, SessionState};

/// Events turning the session's current proposal into `initial`, then
/// applying the user's edits on top.
fn edit_events(initial: &ProposedState, edit: &EditArgs) -> Vec<SessionEvent> {
    let mut events = vec![
        SessionEvent::EditTarget(initial.target_ref.clone()),
        SessionEvent::EditPattern(initial.file_pattern.clone()),
    ];
    if edit.follow {
        events.push(SessionEvent::UseFollowVersion);
    }
    if let Some(target) = &edit.target {
        events.push(SessionEvent::EditTarget(target.clone()));
    }
    if !edit.files.is_empty() {
        events.push(SessionEvent::EditPattern(edit.files.join("\n")));
    }
    events
}

/// Replay `events` and wait for the latest dry run to answer.
///
/// A session that ends up clean is reconciled as-is, so moved branch
/// targets still show their updates.
async fn dry_run<B: FollowBackend>(
    driver: &SessionDriver<B>,
    session: FollowSession,
    events: Vec<SessionEvent>,
) -> FollowSession {
    let (tx, rx) = mpsc::channel(events.len().max(1));
    for event in events {
        // Capacity covers every event, so this never waits.
        if tx.send(event).await.is_err() {
            break;
        }
    }
    drop(tx);

    let session = driver.run(session, rx).await;
    if session.state() == SessionState::Clean {
        debug!("No edits, reconciling the tracked state");
        return driver.step(session, SessionEvent::Retry).await;
    }
    session
}

fn print_report(session: &FollowSession) {
    match session.result() {
        Some(result) => {
            for line in render_result(result, session.tracked(), session.proposed()) {
                println!("{}", line);
            }
        }
        None => println!("No result available"),
    }
    if let Some(version) = session.follow_version() {
        println!("Follow version: {}", version);
    }
    if let Some(error) = session.last_error() {
        println!();
        println!("❌ {}", error);
        if error.is_retriable() {
            println!("   The request may succeed when run again.");
        }
    }
}

use anyhow::Result;
use tracing::info;

use super::preview::remote_session;
use super::print_report;
use crate::cli::EditArgs;
use crate::config::Config;
use crate::render::apply_tooltip;
use crate::session::SessionEvent;

pub async fn run_apply(config: &Config, change: &str, edit: &EditArgs) -> Result<()> {
    let (driver, session) = remote_session(config, change, edit).await?;
    print_report(&session);

    if !session.can_apply() {
        if let Some(result) = session.result() {
            info!("{}", apply_tooltip(result, session.tracked(), session.proposed()));
        }
        anyhow::bail!("Nothing to apply for change {}", change);
    }

    let session = driver.step(session, SessionEvent::Confirm).await;
    match (session.outcome(), session.last_error()) {
        (Some(outcome), _) => {
            println!();
            println!("✅ {}", outcome.description);
            Ok(())
        }
        (None, Some(error)) => anyhow::bail!("Failed to update change {}: {}", change, error),
        (None, None) => anyhow::bail!("Failed to update change {}", change),
    }
}

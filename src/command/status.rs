use anyhow::Result;

use crate::api::GerritClient;
use crate::config::Config;

pub async fn run_status(config: &Config, change: &str) -> Result<()> {
    let client = GerritClient::new(config)?;
    let info = client.get_follow(change).await?;

    if !info.on_review_branch {
        println!("⚠️  Change {} is not on a review branch", change);
        return Ok(());
    }

    println!("Change {}", change);
    if info.valid_review_target {
        println!("   Review-Target: {}", info.review_target.as_deref().unwrap_or(""));
        println!("   Review-Files:  {}", info.review_files.as_deref().unwrap_or("").replace('\n', ", "));
        if let Some(version) = &info.version {
            println!("   Version:       {}", version);
        }
    } else {
        println!("   No valid Review-Target recorded yet");
    }

    let follow_branch = info.follow_branch.as_deref().unwrap_or(&config.follow_branch);
    match info.follow_version.as_deref().filter(|v| !v.is_empty()) {
        Some(version) => println!("   Follow:        {} on {}", version, follow_branch),
        None => println!("   Follow:        {} does not exist", follow_branch),
    }

    Ok(())
}

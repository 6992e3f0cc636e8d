use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

use crate::render::render_compacted;

pub fn run_compact(input: Option<&Path>) -> Result<()> {
    let content = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read paths from stdin")?;
            buf
        }
    };

    let mut paths: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    paths.sort_unstable();
    paths.dedup();

    for line in render_compacted(paths) {
        println!("{}", line);
    }
    Ok(())
}

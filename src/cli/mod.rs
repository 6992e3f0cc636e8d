mod args;
mod paths;

pub use args::{Cli, Commands, EditArgs};
pub use paths::resolve_repo_root;

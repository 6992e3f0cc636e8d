//! Common-prefix compaction of sorted path lists.
//!
//! Each entry only shows the directory segments it does not share with the
//! entry right before it. Input order matters: pass sorted paths.

use crate::domain::CompactedEntry;

/// Compact an ordered sequence of `/`-separated paths.
pub fn compact<I, S>(paths: I) -> Vec<CompactedEntry>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut entries = Vec::new();
    let mut previous_dirs: Vec<String> = Vec::new();

    for path in paths {
        let segments: Vec<&str> = path.as_ref().split('/').collect();
        let (file_name, dirs) = match segments.split_last() {
            Some((last, dirs)) => (*last, dirs),
            None => ("", &[][..]),
        };

        let shared = previous_dirs
            .iter()
            .zip(dirs.iter())
            .take_while(|(prev, cur)| prev.as_str() == **cur)
            .count();

        entries.push(CompactedEntry {
            shared_prefix: join_dirs(&dirs[..shared]),
            unique_suffix: join_dirs(&dirs[shared..]),
            file_name: file_name.to_string(),
        });

        previous_dirs = dirs.iter().map(|s| s.to_string()).collect();
    }

    entries
}

/// Join directory segments with a trailing `/`, or nothing when empty.
fn join_dirs(dirs: &[&str]) -> String {
    let mut joined = String::new();
    for dir in dirs {
        joined.push_str(dir);
        joined.push('/');
    }
    joined
}

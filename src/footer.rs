//! Commit-message footers carrying the Review-Target and Review-Files.
//!
//! Footers live in the last paragraph of the message, next to `Change-Id:`.

/// Replace the `key:` footer lines of `message` with one line per value.
///
/// Values are split on newlines and trimmed; blank values are dropped, so an
/// empty `values` removes the footer. The new lines take the place of the
/// first existing `key:` line in the last paragraph. Keys compare the same
/// way as in `footer_values`. Without an existing footer block a new
/// paragraph is started.
pub fn insert_footers(message: &str, key: &str, values: &str) -> String {
    let mut updated = String::with_capacity(message.len() + values.len() + key.len());

    let mut start = None;
    let mut existing_footer = false;
    if let Some(paragraph) = message.rfind("\n\n") {
        existing_footer = find_from(message, "\nChange-Id:", paragraph + 1).is_some();
        start = find_footer(message, key, paragraph + 1);
    }

    match start {
        Some(idx) => updated.push_str(&message[..idx + 1]),
        None => updated.push_str(message),
    }
    if !updated.ends_with('\n') {
        updated.push('\n');
    }
    if !existing_footer {
        updated.push('\n');
    }

    for value in values.split('\n') {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        updated.push_str(key);
        updated.push_str(": ");
        updated.push_str(value);
        updated.push('\n');
    }

    // Copy the remaining footers, skipping every other `key:` line.
    while let Some(idx) = start {
        let Some(line_end) = find_from(message, "\n", idx + 1) else {
            break;
        };
        match find_footer(message, key, line_end) {
            Some(next) => {
                updated.push_str(&message[line_end + 1..next + 1]);
                start = Some(next);
            }
            None => {
                updated.push_str(&message[line_end + 1..]);
                start = None;
            }
        }
    }

    updated
}

/// Values of the `key:` footer lines in the last paragraph, in order.
///
/// Keys compare case-insensitively. A single-paragraph message has no
/// footers.
pub fn footer_values(message: &str, key: &str) -> Vec<String> {
    let trimmed = message.trim_end();
    let Some(paragraph) = trimmed.rfind("\n\n") else {
        return Vec::new();
    };

    trimmed[paragraph + 2..]
        .lines()
        .filter(|line| is_footer_line(line, key))
        .filter_map(|line| line.split_once(':'))
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Message with both review footers set to the given target and files.
pub fn updated_message(
    original: &str,
    target_footer: &str,
    target: &str,
    files_footer: &str,
    files: &str,
) -> String {
    let message = insert_footers(original, target_footer, target);
    insert_footers(&message, files_footer, files)
}

/// Description recorded on the new patch set.
pub fn patch_set_message(same_tree: bool, target: &str) -> String {
    if same_tree {
        "Updated commit message.".to_string()
    } else {
        format!("Updated files based on {}.", target)
    }
}

fn find_from(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    haystack.get(from..)?.find(needle).map(|idx| idx + from)
}

fn is_footer_line(line: &str, key: &str) -> bool {
    line.split_once(':')
        .is_some_and(|(k, _)| k.trim().eq_ignore_ascii_case(key))
}

/// Index of the `\n` that starts the first `key:` line at or after `from`.
fn find_footer(message: &str, key: &str, from: usize) -> Option<usize> {
    let mut pos = from;
    while let Some(idx) = find_from(message, "\n", pos) {
        let rest = &message[idx + 1..];
        let line = rest.find('\n').map_or(rest, |end| &rest[..end]);
        if is_footer_line(line, key) {
            return Some(idx);
        }
        pos = idx + 1;
    }
    None
}

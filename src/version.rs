//! Human readable names for review targets.

/// Name to show for a commit given the refs pointing at it.
///
/// Picks the first ref starting with `prefix` and strips `drop_prefix` from
/// it when present. Falls back to `fallback` (usually the target as typed).
pub fn display_version<S: AsRef<str>>(
    tips: &[S],
    prefix: &str,
    drop_prefix: &str,
    fallback: &str,
) -> String {
    tips.iter()
        .map(|tip| tip.as_ref())
        .find(|name| name.starts_with(prefix))
        .map(|name| name.strip_prefix(drop_prefix).unwrap_or(name).to_string())
        .unwrap_or_else(|| fallback.to_string())
}

//! Review-Files pattern matching.
//!
//! Each non-empty line of a Review-Files text is a `.gitignore` style rule
//! (`*`, `**`, trailing `/`, leading `/`, `!` negation). Here a matching rule
//! *selects* a path for review and a `!` rule deselects it. Later lines win.
//!
//! Glob semantics come from `ignore::gitignore`.

use std::collections::BTreeSet;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;
use tracing::debug;

use crate::error::FollowError;

/// Answer of a single filter lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selected {
    NoMatch,
    Positive,
    Negative,
}

/// Compiled Review-Files rules.
pub struct ReviewFilter {
    matcher: Gitignore,
}

impl ReviewFilter {
    /// Compile a newline-separated pattern text.
    ///
    /// Lines are trimmed and blank lines skipped. An empty text compiles to a
    /// filter that selects nothing.
    pub fn new(pattern: &str) -> Result<Self, FollowError> {
        Self::from_lines(pattern.split('\n'))
    }

    pub fn from_lines<'a, I>(lines: I) -> Result<Self, FollowError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut builder = GitignoreBuilder::new(".");
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            builder
                .add_line(None, line)
                .map_err(|e| FollowError::InvalidPattern {
                    line: line.to_string(),
                    reason: e.to_string(),
                })?;
        }

        let matcher = builder.build().map_err(|e| FollowError::InvalidPattern {
            line: String::new(),
            reason: e.to_string(),
        })?;

        debug!(
            "Compiled Review-Files filter: {} select, {} deselect rules",
            matcher.num_ignores(),
            matcher.num_whitelists()
        );

        Ok(Self { matcher })
    }

    /// True when the filter has no rules at all.
    pub fn is_empty(&self) -> bool {
        self.matcher.is_empty()
    }

    /// Look up one path (file or directory) without looking at its parents.
    pub fn is_path_to_be_reviewed(&self, path: &str, is_dir: bool) -> Selected {
        match self.matcher.matched(path, is_dir) {
            Match::None => Selected::NoMatch,
            Match::Ignore(_) => Selected::Positive,
            Match::Whitelist(_) => Selected::Negative,
        }
    }

    /// Decide whether a file path is part of the review.
    ///
    /// Directories are decided top-down: the first ancestor directory with a
    /// matching rule decides for everything below it. Only when no ancestor
    /// matches is the file's own rule consulted.
    pub fn is_selected(&self, path: &str) -> bool {
        for (idx, _) in path.match_indices('/') {
            let dir = &path[..idx];
            if dir.is_empty() {
                continue;
            }
            match self.is_path_to_be_reviewed(dir, true) {
                Selected::Positive => return true,
                Selected::Negative => return false,
                Selected::NoMatch => {}
            }
        }
        self.is_path_to_be_reviewed(path, false) == Selected::Positive
    }

    /// Keep the paths this filter selects.
    pub fn select<I, S>(&self, paths: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.is_empty() {
            return BTreeSet::new();
        }
        paths
            .into_iter()
            .filter(|p| self.is_selected(p.as_ref()))
            .map(|p| p.as_ref().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_name_matches_at_any_depth() {
        let filter = ReviewFilter::new("src").unwrap();
        assert_eq!(filter.is_path_to_be_reviewed("test", true), Selected::NoMatch);
        assert_eq!(filter.is_path_to_be_reviewed("src", true), Selected::Positive);
        assert_eq!(
            filter.is_path_to_be_reviewed("component/src", true),
            Selected::Positive
        );
        assert_eq!(
            filter.is_path_to_be_reviewed("component/test", true),
            Selected::NoMatch
        );
        assert_eq!(filter.is_path_to_be_reviewed("src", false), Selected::Positive);
        assert_eq!(filter.is_path_to_be_reviewed("src1", false), Selected::NoMatch);
        assert_eq!(
            filter.is_path_to_be_reviewed("file.src", false),
            Selected::NoMatch
        );
    }

    #[test]
    fn test_later_negation_wins() {
        let filter = ReviewFilter::new("a.*\n!*.b").unwrap();
        assert_eq!(filter.is_path_to_be_reviewed("x.x", false), Selected::NoMatch);
        assert_eq!(filter.is_path_to_be_reviewed("a.x", false), Selected::Positive);
        assert_eq!(filter.is_path_to_be_reviewed("a.b", false), Selected::Negative);
        assert_eq!(filter.is_path_to_be_reviewed("x.b", false), Selected::Negative);
    }

    #[test]
    fn test_whitespace_and_blank_lines_are_ignored() {
        let filter = ReviewFilter::new("  \n  *.py \n\n").unwrap();
        assert!(filter.is_selected("a.py"));
        assert!(filter.is_selected("pkg/b.py"));
        assert!(!filter.is_selected("a.rs"));
    }

    #[test]
    fn test_empty_pattern_selects_nothing() {
        let filter = ReviewFilter::new("").unwrap();
        assert!(filter.is_empty());
        assert!(filter.select(["a.py", "src/lib.rs"]).is_empty());
    }

    #[test]
    fn test_selected_directory_decides_for_its_contents() {
        let filter = ReviewFilter::new("docs/\n!docs/keep.md").unwrap();
        assert!(filter.is_selected("docs/guide.md"));
        assert!(filter.is_selected("docs/keep.md"));
        assert!(!filter.is_selected("src/docs.rs"));
    }

    #[test]
    fn test_deselected_directory_hides_matching_files() {
        let filter = ReviewFilter::new("*.rs\n!vendor/").unwrap();
        assert!(filter.is_selected("src/lib.rs"));
        assert!(!filter.is_selected("vendor/dep/lib.rs"));
    }

    #[test]
    fn test_anchored_pattern() {
        let filter = ReviewFilter::new("/src").unwrap();
        assert!(filter.is_selected("src/main.rs"));
        assert!(!filter.is_selected("component/src/main.rs"));
    }

    #[test]
    fn test_select_keeps_order_and_filters() {
        let filter = ReviewFilter::new("*.py").unwrap();
        let selected = filter.select(["c.py", "a.py", "b.txt"]);
        let selected: Vec<_> = selected.into_iter().collect();
        assert_eq!(selected, vec!["a.py".to_string(), "c.py".to_string()]);
    }
}

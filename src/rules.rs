// 📐 Extraction Rules - Heuristics as data
// A rule is a compiled pattern plus the function that turns its captures into
// a typed value. Parsers are built from rules; each rule is testable alone.

use regex::{Captures, Regex};
use tracing::trace;

// ============================================================================
// RULE DEFINITION
// ============================================================================

pub struct ExtractionRule<T> {
    /// Rule name for tracing
    pub name: &'static str,

    pattern: Regex,

    /// Turns a match into a value; `None` means the match was unusable
    extract: fn(&Captures<'_>) -> Option<T>,
}

impl<T> ExtractionRule<T> {
    /// Build a rule from a pattern literal.
    ///
    /// Panics if the pattern does not compile: rule patterns are constants
    /// and a broken one is a programming error.
    pub fn new(name: &'static str, pattern: &str, extract: fn(&Captures<'_>) -> Option<T>) -> Self {
        let pattern = Regex::new(pattern)
            .unwrap_or_else(|e| panic!("extraction rule '{}' has an invalid pattern: {}", name, e));

        ExtractionRule {
            name,
            pattern,
            extract,
        }
    }

    /// Apply to the first (leftmost) match only.
    ///
    /// A later match is never consulted, even when the first one yields
    /// nothing: first match wins.
    pub fn apply(&self, text: &str) -> Option<T> {
        let caps = self.pattern.captures(text)?;
        let value = (self.extract)(&caps);
        trace!(rule = self.name, matched = &caps[0], usable = value.is_some(), "rule matched");
        value
    }

    /// Apply to every non-overlapping match, keeping the usable values
    pub fn apply_all<'t>(&'t self, text: &'t str) -> impl Iterator<Item = T> + 't {
        self.pattern
            .captures_iter(text)
            .filter_map(move |caps| (self.extract)(&caps))
    }
}

impl<T> std::fmt::Debug for ExtractionRule<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionRule")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

//! Segment-wise wildcard matching for permission names
//!
//! Patterns and candidates are split on the configured delimiters:
//! - `users.view` matches only `users.view`
//! - `users.*` matches `users.view` and `users.create.bulk`
//! - `*.view` matches `users.view` but not `users.edit`
//! - `users.cre*` matches `users.create` (wildcard inside a segment)
//! - `*` matches everything

use crate::config::WildcardSection;

/// Matches granted permission patterns against requested names
#[derive(Debug, Clone)]
pub struct WildcardMatcher {
    token: String,
    delimiters: Vec<char>,
}

impl WildcardMatcher {
    /// Creates a matcher with the default `*` token and `.`/`:` delimiters
    pub fn new() -> Self {
        Self::from_config(&WildcardSection::default())
    }

    pub fn from_config(config: &WildcardSection) -> Self {
        Self {
            token: config.token.clone(),
            delimiters: config.delimiters.clone(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn with_delimiters(mut self, delimiters: Vec<char>) -> Self {
        self.delimiters = delimiters;
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Whether the pattern contains the wildcard token
    pub fn contains_wildcard(&self, pattern: &str) -> bool {
        pattern.contains(self.token.as_str())
    }

    /// Checks whether `pattern` covers `candidate`
    pub fn matches(&self, pattern: &str, candidate: &str) -> bool {
        if pattern == self.token {
            return true;
        }
        if !self.contains_wildcard(pattern) {
            return pattern == candidate;
        }

        let pattern_segments = self.segments(pattern);
        let candidate_segments = self.segments(candidate);

        // A trailing bare wildcard covers one or more non-empty remaining segments
        if let Some((last, prefix)) = pattern_segments.split_last() {
            if *last == self.token {
                if candidate_segments.len() <= prefix.len() {
                    return false;
                }
                let (head, tail) = candidate_segments.split_at(prefix.len());
                return tail.iter().all(|s| !s.is_empty())
                    && prefix
                        .iter()
                        .zip(head.iter())
                        .all(|(p, c)| self.segment_matches(p, c));
            }
        }

        if pattern_segments.len() != candidate_segments.len() {
            return false;
        }

        pattern_segments
            .iter()
            .zip(candidate_segments.iter())
            .all(|(p, c)| self.segment_matches(p, c))
    }

    /// Returns true if any of the patterns covers the candidate
    pub fn matches_any<'a, I>(&self, patterns: I, candidate: &str) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        patterns.into_iter().any(|p| self.matches(p, candidate))
    }

    fn segments<'a>(&self, value: &'a str) -> Vec<&'a str> {
        value.split(|c| self.delimiters.contains(&c)).collect()
    }

    /// Matches one segment; the token stands for any run of characters
    fn segment_matches(&self, pattern: &str, candidate: &str) -> bool {
        if pattern == self.token {
            return !candidate.is_empty();
        }
        if !pattern.contains(self.token.as_str()) {
            return pattern == candidate;
        }

        let parts: Vec<&str> = pattern.split(self.token.as_str()).collect();
        let (first, rest) = match parts.split_first() {
            Some(split) => split,
            None => return false,
        };
        let Some(mut remaining) = candidate.strip_prefix(first) else {
            return false;
        };

        let (last, middle) = match rest.split_last() {
            Some(split) => split,
            None => return remaining.is_empty(),
        };

        for part in middle {
            match remaining.find(part) {
                Some(idx) => remaining = &remaining[idx + part.len()..],
                None => return false,
            }
        }

        remaining.len() >= last.len() && remaining.ends_with(last)
    }
}

impl Default for WildcardMatcher {
    fn default() -> Self {
        Self::new()
    }
}

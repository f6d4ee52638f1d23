//! Resource pattern compilation.
//!
//! Rules target resources either by exact identifier or by glob pattern
//! (`invoice/*`, `report/**`, `order-?`). Patterns are compiled once at
//! index build time; the decision path only runs the compiled form.
//!
//! Glob syntax:
//! - `*` - matches any characters except `/`
//! - `**` - matches any characters including `/`
//! - `?` - matches a single character

use regex::Regex;

use warden_core::{CoreError, Result};

/// A compiled resource pattern.
#[derive(Debug, Clone)]
pub struct ResourcePattern {
    raw: String,
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    Exact,
    Glob(Regex),
}

impl ResourcePattern {
    /// Compile a pattern string.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidPattern` if the pattern is empty or
    /// its glob translation does not compile.
    pub fn compile(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(CoreError::invalid_pattern("empty pattern"));
        }

        if !pattern.contains(['*', '?']) {
            return Ok(Self {
                raw: pattern.to_string(),
                kind: PatternKind::Exact,
            });
        }

        // Convert glob to regex. Handle ** before * to avoid double
        // replacement.
        let escaped = regex::escape(pattern)
            .replace(r"\*\*", "\x00")
            .replace(r"\*", "[^/]*")
            .replace('\x00', ".*")
            .replace(r"\?", ".");
        let regex = Regex::new(&format!("^{escaped}$"))
            .map_err(|e| CoreError::invalid_pattern(format!("{pattern}: {e}")))?;

        Ok(Self {
            raw: pattern.to_string(),
            kind: PatternKind::Glob(regex),
        })
    }

    /// The original pattern string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns `true` if this pattern contains wildcards.
    ///
    /// Wildcard patterns live in the index's fallback bucket, tried
    /// after exact matches.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        matches!(self.kind, PatternKind::Glob(_))
    }

    /// Check the pattern against a resource identifier.
    #[must_use]
    pub fn matches(&self, resource: &str) -> bool {
        match &self.kind {
            PatternKind::Exact => self.raw == resource,
            PatternKind::Glob(regex) => regex.is_match(resource),
        }
    }

    /// Specificity rank for tie-breaking: exact beats any glob, and a
    /// glob with more literal characters beats a looser one.
    #[must_use]
    pub fn specificity(&self) -> u32 {
        match &self.kind {
            PatternKind::Exact => u32::MAX,
            PatternKind::Glob(_) => self
                .raw
                .chars()
                .filter(|c| !matches!(c, '*' | '?'))
                .count() as u32,
        }
    }
}

//! Pattern and numeric checks used by model validators.

use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

use regex::Regex;

/// Thread-safe cache of compiled patterns.
///
/// Format validators are evaluated on every save, so each pattern is compiled
/// once and shared for the lifetime of the process.
struct RegexCache {
    cache: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern)?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// Check whether `value` matches `pattern`.
///
/// An invalid pattern never matches; the compile error is logged.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "Invalid regex pattern in format validation, treating as non-match"
            );
            false
        }
    }
}

/// Check a pattern up front. Returns the compile error message, if any.
pub fn validate_pattern(pattern: &str) -> Option<String> {
    match Regex::new(pattern) {
        Ok(_) => None,
        Err(e) => Some(format!("invalid regex pattern: {e}")),
    }
}

/// Optional sign followed by digits only.
pub fn is_integer_literal(value: &str) -> bool {
    matches_pattern(value, r"\A[+-]?\d+\z")
}

/// Decimal or scientific number literal, optionally surrounded by leading
/// whitespace (`" 1.5"`, `"-3"`, `".5"`, `"1e3"`).
pub fn is_numeric(value: &str) -> bool {
    matches_pattern(value, r"\A\s*[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?\z")
}

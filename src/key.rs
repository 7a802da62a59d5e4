//! Cache key naming convention and prefixing.
//!
//! Keys written through the manager follow a `module:class:method:args` style:
//! at least three non-empty colon-separated segments with no whitespace.
//! Writes with malformed keys are rejected with an explicit error so a typoed
//! key surfaces at the call site instead of reading as a permanent cache miss.
//! Read-side operations do not validate; a malformed key simply never hits.

use crate::error::CacheError;

const SEPARATOR: char = ':';
const MIN_SEGMENTS: usize = 3;

/// Checks a logical key against the naming convention.
pub fn validate(key: &str) -> Result<(), CacheError> {
    let segments: Vec<&str> = key.split(SEPARATOR).collect();
    let well_formed = segments.len() >= MIN_SEGMENTS
        && segments.iter().all(|s| !s.is_empty())
        && !key.contains(char::is_whitespace);

    if well_formed {
        Ok(())
    } else {
        Err(CacheError::InvalidKey {
            key: key.to_string(),
        })
    }
}

/// Builds the physical key stored remotely: the instance prefix plus the
/// logical key. An empty prefix leaves the key untouched.
pub fn prefixed(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{SEPARATOR}{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conforming_keys_pass() {
        assert!(validate("orders:repository:find_by_id:42").is_ok());
        assert!(validate("a:b:c").is_ok());
        assert!(validate("a:b:c:d:e").is_ok());
    }

    #[test]
    fn test_too_few_segments_rejected() {
        assert!(validate("orders").is_err());
        assert!(validate("orders:list").is_err());
    }

    #[test]
    fn test_empty_segments_rejected() {
        assert!(validate("orders::find").is_err());
        assert!(validate(":a:b:c").is_err());
        assert!(validate("a:b:c:").is_err());
        assert!(validate("").is_err());
    }

    #[test]
    fn test_whitespace_rejected() {
        assert!(validate("orders:list:page 1").is_err());
    }

    #[test]
    fn test_prefixing() {
        assert_eq!(prefixed("app", "a:b:c"), "app:a:b:c");
        assert_eq!(prefixed("", "a:b:c"), "a:b:c");
    }
}

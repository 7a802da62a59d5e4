//! Serialization codec between typed values and the store's string payloads.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::error;

use crate::error::CacheError;

/// Serializes a value for storage. Write-path failures propagate.
pub fn encode<T: Serialize>(value: &T) -> Result<String, CacheError> {
    Ok(serde_json::to_string(value)?)
}

/// Deserializes a stored payload. Used where a failure must be reported,
/// e.g. sorted-set reads.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, CacheError> {
    Ok(serde_json::from_str(raw)?)
}

/// Deserializes a stored payload, degrading failure to a cache miss.
///
/// Read-path deserialization errors preserve miss semantics: the caller sees
/// `None`, the incident is logged.
pub fn decode_or_miss<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            error!(cache.key = %key, error = %e, "Failed to deserialize cached value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        id: i32,
        name: String,
    }

    #[test]
    fn test_round_trip() {
        let value = Payload {
            id: 7,
            name: "seven".into(),
        };
        let raw = encode(&value).unwrap();
        let back: Payload = decode(&raw).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_decode_or_miss_degrades_to_none() {
        let miss: Option<Payload> = decode_or_miss("a:b:c", "{not json");
        assert!(miss.is_none());
    }

    #[test]
    fn test_decode_reports_failure() {
        let result: Result<Payload, _> = decode("{not json");
        assert!(result.is_err());
    }
}

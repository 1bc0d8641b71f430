//! Content hashing utilities for fingerprints and fact identities.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute the SHA256 fingerprint of a serializable value.
///
/// The value is serialized to JSON before hashing, ensuring deterministic
/// output. Returns a 64-character lowercase hexadecimal string.
///
/// # Errors
/// Returns an error if the value cannot be serialized to JSON.
pub fn fingerprint<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute the identity hash of a knowledge fact.
///
/// Deterministic over (category, text); returns 16 lowercase hex characters.
/// Used to deduplicate facts created by answer handlers.
pub fn content_hash(category: &str, text: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    category.hash(&mut hasher);
    text.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_deterministic() {
        let value = json!({"schema": "public", "tables": ["orders", "customers"]});
        let h1 = fingerprint(&value).unwrap();
        let h2 = fingerprint(&value).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64); // SHA256 hex = 64 chars
    }

    #[test]
    fn test_fingerprint_differs() {
        let v1 = json!({"tables": ["orders"]});
        let v2 = json!({"tables": ["orders", "customers"]});
        assert_ne!(fingerprint(&v1).unwrap(), fingerprint(&v2).unwrap());
    }

    #[test]
    fn test_content_hash_format() {
        let h = content_hash("column_semantics", "orders.status is a lifecycle state");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_content_hash_deterministic() {
        let h1 = content_hash("cat", "text");
        let h2 = content_hash("cat", "text");
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_content_hash_sensitive_to_both_inputs() {
        assert_ne!(content_hash("cat", "text"), content_hash("dog", "text"));
        assert_ne!(content_hash("cat", "text"), content_hash("cat", "other"));
    }

    #[test]
    fn test_content_hash_no_collisions_over_random_pairs() {
        use std::collections::HashSet;

        let mut seen = HashSet::new();
        for i in 0..60 {
            let category = format!("category_{}", i % 6);
            let text = format!("fact number {} about table t{}", i, i * 7 % 13);
            let h = content_hash(&category, &text);
            assert!(seen.insert(h), "collision among distinct inputs");
        }
    }
}

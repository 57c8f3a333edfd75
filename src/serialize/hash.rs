use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use super::canonical_string;

/// Derive the content-addressed execution id for one component invocation.
///
/// Digest input, in order: the sorted parent ids, the function name, the
/// canonical sorted-key JSON of the encoded inputs, and the timestamp in
/// ISO-8601. The timestamp is deliberate: two calls with identical inputs
/// get distinct ids, because the graph records history rather than
/// memoization keys. Caching uses [`content_hash`] instead.
pub fn execution_hash(
    parent_ids: &[String],
    func_name: &str,
    inputs: &serde_json::Value,
    timestamp: DateTime<Utc>,
) -> String {
    let mut sorted_parents: Vec<&String> = parent_ids.iter().collect();
    sorted_parents.sort();

    let mut hasher = Sha256::new();
    for parent in sorted_parents {
        hasher.update(parent.as_bytes());
    }
    hasher.update(func_name.as_bytes());
    hasher.update(canonical_string(inputs).as_bytes());
    hasher.update(
        timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true)
            .as_bytes(),
    );

    truncate_digest(hasher)
}

/// Timestamp-free digest of `(function, inputs)` for cache keys.
pub fn content_hash(func_name: &str, inputs: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(func_name.as_bytes());
    hasher.update(canonical_string(inputs).as_bytes());
    truncate_digest(hasher)
}

fn truncate_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn hash_is_sixteen_hex_chars() {
        let hash = execution_hash(&[], "add", &serde_json::json!({"a": 1}), fixed_time());
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn identical_inputs_and_timestamp_hash_identically() {
        let inputs = serde_json::json!({"a": 1, "b": 2});
        let parents = vec!["p1".to_string(), "p2".to_string()];
        let first = execution_hash(&parents, "add", &inputs, fixed_time());
        let second = execution_hash(&parents, "add", &inputs, fixed_time());
        assert_eq!(first, second);
    }

    #[test]
    fn parent_order_does_not_matter() {
        let inputs = serde_json::json!({"a": 1});
        let forward = vec!["p1".to_string(), "p2".to_string()];
        let backward = vec!["p2".to_string(), "p1".to_string()];
        assert_eq!(
            execution_hash(&forward, "add", &inputs, fixed_time()),
            execution_hash(&backward, "add", &inputs, fixed_time()),
        );
    }

    #[test]
    fn any_single_change_produces_a_different_hash() {
        let base = execution_hash(&[], "add", &serde_json::json!({"a": 1}), fixed_time());

        let changed_input =
            execution_hash(&[], "add", &serde_json::json!({"a": 2}), fixed_time());
        let changed_name =
            execution_hash(&[], "mul", &serde_json::json!({"a": 1}), fixed_time());
        let changed_time = execution_hash(
            &[],
            "add",
            &serde_json::json!({"a": 1}),
            fixed_time() + chrono::Duration::microseconds(1),
        );

        assert_ne!(base, changed_input);
        assert_ne!(base, changed_name);
        assert_ne!(base, changed_time);
    }

    #[test]
    fn content_hash_ignores_time() {
        let inputs = serde_json::json!({"a": 1});
        assert_eq!(content_hash("add", &inputs), content_hash("add", &inputs));
        assert_ne!(
            content_hash("add", &inputs),
            content_hash("add", &serde_json::json!({"a": 2}))
        );
    }
}

use std::collections::BTreeMap;
use std::net::IpAddr;
use serde::Serialize;
use sha2::{Sha256, Digest};
use shared::types::ServiceRecord;

/// Only the fields that describe how to reach a service; `last_seen` changes on
/// every report and would make the digest useless for change detection.
#[derive(Serialize)]
struct HashView<'a> {
    name: &'a str,
    service_type: &'a str,
    hostname: Option<&'a str>,
    addresses: &'a [IpAddr],
    port: Option<u16>,
    txt: &'a BTreeMap<String, String>,
}

/// SHA-256 over the given services, sorted by name so input order does not matter.
pub fn compute_hash(services: &[ServiceRecord]) -> String {
    let mut views: Vec<HashView<'_>> = services
        .iter()
        .map(|s| HashView {
            name: &s.name,
            service_type: &s.service_type,
            hostname: s.hostname.as_deref(),
            addresses: &s.addresses,
            port: s.port,
            txt: &s.txt,
        })
        .collect();
    views.sort_by(|a, b| a.name.cmp(b.name));

    let mut hasher = Sha256::new();
    for view in &views {
        // Serializing borrowed strings, integers and maps with string keys cannot fail
        if let Ok(json) = serde_json::to_vec(view) {
            hasher.update(&json);
        }
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::resolution::testing::resolved_record;

    #[test]
    fn test_hash_deterministic() {
        let a = resolved_record("a");
        let b = resolved_record("b");

        let hash1 = compute_hash(&[a.clone(), b.clone()]);
        let hash2 = compute_hash(&[b, a]);

        assert_eq!(hash1, hash2, "Hash should be same regardless of input order");
    }

    #[test]
    fn test_hash_changes_on_modification() {
        let a = resolved_record("a");
        let mut moved = resolved_record("a");
        moved.port = Some(9090);

        assert_ne!(compute_hash(&[a]), compute_hash(&[moved]));
    }

    #[test]
    fn test_hash_stable_across_last_seen() {
        let a = resolved_record("a");
        let mut later = resolved_record("a");
        later.last_seen = Utc::now() + chrono::Duration::seconds(60);

        assert_eq!(compute_hash(&[a]), compute_hash(&[later]));
    }

    #[test]
    fn test_empty_set_has_stable_hash() {
        assert_eq!(compute_hash(&[]), compute_hash(&[]));
        assert_ne!(compute_hash(&[]), compute_hash(&[resolved_record("a")]));
    }
}

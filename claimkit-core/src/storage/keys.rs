//! Blob names used by the wallet.

use sha2::{Digest, Sha256};

/// The locally queued claim tickets.
pub const CLAIM_QUEUE_BLOB: &str = "claim_queue.json";

/// Known credential ids, most recently inserted first.
pub const CREDENTIAL_INDEX_BLOB: &str = "credential_index.json";

const CREDENTIAL_DIR: &str = "credentials";
const SAFE_PREFIX_LEN: usize = 24;

/// Blob name holding the record for credential `id`.
///
/// Ids are issuer-controlled (digests or JWS prefixes), so they are reduced to a
/// readable filesystem-safe prefix and disambiguated by a hash of the full id.
#[must_use]
pub fn credential_blob(id: &str) -> String {
    let readable: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(SAFE_PREFIX_LEN)
        .collect();
    let digest = Sha256::digest(id.as_bytes());
    format!(
        "{CREDENTIAL_DIR}/{readable}-{}.json",
        hex::encode(&digest[..8])
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_blob_is_filesystem_safe() {
        let name = credential_blob("sha256:AbC/../+==");
        let file = name.strip_prefix("credentials/").unwrap();
        assert!(file
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')));
        assert!(file.starts_with("sha256_AbC_______-"));
        assert!(file.ends_with(".json"));
    }

    #[test]
    fn test_distinct_ids_never_share_a_blob() {
        assert_ne!(credential_blob("a/b"), credential_blob("a_b"));
        assert_eq!(credential_blob("a/b"), credential_blob("a/b"));
    }
}

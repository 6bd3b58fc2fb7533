//! Common test utilities shared across integration tests.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use claimkit_core::config::ScanConfig;
use claimkit_core::scan::{ScanEvent, Scanner};
use claimkit_core::storage::{CredentialStore, FsBlobStore};

/// The interval an issuer display typically cycles frames at.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(200);

pub fn fs_store(root: &Path) -> Arc<CredentialStore> {
    let blobs = FsBlobStore::open(root).expect("open blob store");
    Arc::new(CredentialStore::new(Arc::new(blobs)))
}

pub fn scanner(store: &Arc<CredentialStore>) -> Scanner {
    Scanner::new(ScanConfig::default(), Arc::clone(store))
}

/// A compact JWS with a readable payload and a dummy signature.
pub fn sample_jws() -> String {
    let payload = serde_json::json!({
        "vc": {
            "type": ["VerifiableCredential", "UniversityDegreeCredential"],
            "issuanceDate": "2024-01-01T00:00:00Z",
            "credentialSubject": {"id": "did:example:holder", "name": "Ada Lovelace"}
        }
    });
    format!(
        "eyJhbGciOiJFUzI1NiJ9.{}.c2lnbmF0dXJl",
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

/// Feeds `frames` one per [`FRAME_INTERVAL`] and returns every non-status event.
pub fn play(scanner: &mut Scanner, frames: &[String], start: Instant) -> Vec<ScanEvent> {
    frames
        .iter()
        .enumerate()
        .filter_map(|(i, frame)| {
            let now = start + FRAME_INTERVAL * u32::try_from(i).expect("frame count");
            match scanner.on_scan(frame, now).expect("scan") {
                ScanEvent::Status(_) => None,
                event => Some(event),
            }
        })
        .collect()
}

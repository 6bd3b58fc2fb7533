//! Credential records as held by the wallet.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::envelope::{jws_payload, Envelope};

/// Number of leading JWS characters used as the id when the issuer supplies no digest.
pub const JWS_ID_PREFIX_LEN: usize = 32;

const VERIFIABLE_CREDENTIAL_TYPE: &str = "VerifiableCredential";
const DEFAULT_TITLE: &str = "Verifiable Credential";

/// Display metadata pulled from the JWS payload. Every field is best effort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialMetadata {
    /// Human-readable title (credential name or most specific type).
    pub title: String,
    /// Most specific credential type other than `VerifiableCredential`.
    pub credential_type: Option<String>,
    /// Subject display name.
    pub subject_name: Option<String>,
    /// Subject identifier, usually a DID.
    pub subject_id: Option<String>,
    /// Issuance date as the issuer wrote it (`issuanceDate`, `validFrom` or `iat`).
    pub issued_at: Option<String>,
}

impl CredentialMetadata {
    /// Extracts metadata from a compact JWS. A payload that cannot be parsed
    /// yields defaults rather than an error.
    #[must_use]
    pub fn from_jws(jws: &str) -> Self {
        jws_payload(jws).map_or_else(
            || {
                log::debug!("jws payload unreadable, using default metadata");
                Self::untitled()
            },
            |claims| Self::from_claims(&claims),
        )
    }

    fn untitled() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            ..Self::default()
        }
    }

    fn from_claims(claims: &Map<String, Value>) -> Self {
        // VC-JWT nests the data model under `vc`; plain VC payloads do not.
        let vc = claims.get("vc").and_then(Value::as_object).unwrap_or(claims);
        let subject = vc.get("credentialSubject").and_then(Value::as_object);

        let credential_type = match vc.get("type") {
            Some(Value::String(kind)) => Some(kind.clone()),
            Some(Value::Array(kinds)) => kinds
                .iter()
                .filter_map(Value::as_str)
                .rfind(|kind| *kind != VERIFIABLE_CREDENTIAL_TYPE)
                .map(ToString::to_string),
            _ => None,
        };

        let subject_name = subject
            .and_then(|subject| text(subject, "name"))
            .or_else(|| text(claims, "name"));
        let subject_id = subject
            .and_then(|subject| text(subject, "id"))
            .or_else(|| text(claims, "sub"));
        let issued_at = text(vc, "issuanceDate")
            .or_else(|| text(vc, "validFrom"))
            .or_else(|| claims.get("iat").and_then(Value::as_i64).map(|iat| iat.to_string()));

        let title = text(vc, "name")
            .or_else(|| credential_type.clone())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        Self {
            title,
            credential_type,
            subject_name,
            subject_id,
            issued_at,
        }
    }
}

fn text(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// A credential accepted into the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Stable id: the issuer digest, or the first [`JWS_ID_PREFIX_LEN`] characters of the JWS.
    pub id: String,
    /// The compact JWS exactly as received.
    pub jws: String,
    /// Display metadata.
    pub metadata: CredentialMetadata,
    /// The envelope the credential arrived in.
    pub envelope: Envelope,
}

impl Credential {
    /// Builds a credential from a decoded envelope.
    #[must_use]
    pub fn from_envelope(envelope: Envelope) -> Self {
        let id = credential_id(&envelope.jws, envelope.digest.as_deref());
        Self {
            id,
            jws: envelope.jws.clone(),
            metadata: CredentialMetadata::from_jws(&envelope.jws),
            envelope,
        }
    }

    /// Builds a credential from a bare JWS, as returned by the claim endpoints.
    #[must_use]
    pub fn from_jws(jws: &str, digest: Option<String>) -> Self {
        Self::from_envelope(Envelope::new(jws, digest))
    }
}

/// Derives the store id for a credential.
#[must_use]
pub fn credential_id(jws: &str, digest: Option<&str>) -> String {
    match digest.map(str::trim).filter(|digest| !digest.is_empty()) {
        Some(digest) => digest.to_string(),
        None => jws.chars().take(JWS_ID_PREFIX_LEN).collect(),
    }
}

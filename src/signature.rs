//! ES256 signature verification of compact JWS tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use p256::ecdsa::{signature::Verifier, Signature};

use crate::error::{Result, ValidationError};
use crate::keys::{IssuerKey, KeyStore};

/// Verifies the ES256 signature of `jws` with the store's keys for `kid`.
///
/// Without a `kid` every key in the store is tried. Returns the `kid` of the
/// key that verified the signature.
pub fn verify_jws(jws: &str, kid: Option<&str>, store: &KeyStore) -> Result<String> {
    let (signing_input, encoded_signature) = jws
        .rsplit_once('.')
        .ok_or_else(|| ValidationError::SignatureError("JWS has no signature part".to_string()))?;

    let signature_bytes = URL_SAFE_NO_PAD.decode(encoded_signature).map_err(|e| {
        ValidationError::SignatureError(format!("Signature base64url decode failed: {}", e))
    })?;

    // JWS carries the raw r || s form, not DER
    if signature_bytes.len() != 64 {
        return Err(ValidationError::SignatureError(format!(
            "Expected 64 byte ES256 signature, got {} bytes",
            signature_bytes.len()
        )));
    }
    let signature = Signature::from_slice(&signature_bytes)
        .map_err(|e| ValidationError::SignatureError(format!("Invalid signature: {}", e)))?;

    let candidates: Vec<IssuerKey> = match kid {
        Some(kid) => store.get(kid),
        None => store.all(),
    };
    if candidates.is_empty() {
        return Err(ValidationError::SignatureError(match kid {
            Some(kid) => format!("No key with kid '{}' in key store", kid),
            None => "Key store is empty".to_string(),
        }));
    }

    candidates
        .iter()
        .find(|key| {
            key.verifying_key
                .verify(signing_input.as_bytes(), &signature)
                .is_ok()
        })
        .map(|key| key.kid.clone())
        .ok_or_else(|| {
            ValidationError::SignatureError(format!(
                "Signature does not verify with {} candidate key(s)",
                candidates.len()
            ))
        })
}

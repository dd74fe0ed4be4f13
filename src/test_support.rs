//! Builders for signed health card fixtures used across unit tests.

use std::io::Write;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use serde_json::{json, Value};

use crate::config::ValidatorConfig;
use crate::context::ValidationContext;
use crate::fetch::StaticFetcher;
use crate::keys::Jwk;

pub const NOW: i64 = 1_700_000_000;
pub const ISSUER: &str = "https://example.org/issuer";

pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed; 32]).unwrap()
}

pub fn kid(key: &SigningKey) -> String {
    Jwk::from_verifying_key(key.verifying_key()).kid.unwrap()
}

pub fn key_set(keys: &[&SigningKey]) -> Value {
    let keys: Vec<Value> = keys
        .iter()
        .map(|k| serde_json::to_value(Jwk::from_verifying_key(k.verifying_key())).unwrap())
        .collect();
    json!({ "keys": keys })
}

pub fn payload(iss: &str) -> Value {
    json!({
        "iss": iss,
        "nbf": NOW - 60,
        "vc": {
            "type": ["https://smarthealth.cards#health-card"],
            "credentialSubject": {
                "fhirVersion": "4.0.1",
                "fhirBundle": {
                    "resourceType": "Bundle",
                    "type": "collection",
                    "entry": [
                        { "fullUrl": "resource:0", "resource": { "resourceType": "Patient", "name": [{ "family": "Anyperson" }] } }
                    ]
                }
            }
        }
    })
}

pub fn deflate(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

pub fn sign_compact(key: &SigningKey, header: &Value, payload: &[u8]) -> String {
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload)
    );
    let signature: Signature = key.sign(signing_input.as_bytes());
    format!(
        "{}.{}",
        signing_input,
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    )
}

pub fn header(key: &SigningKey) -> Value {
    json!({ "alg": "ES256", "zip": "DEF", "kid": kid(key) })
}

/// A correctly signed, deflated health card token for `iss`.
pub fn health_card_jws(key: &SigningKey, iss: &str) -> String {
    let body = deflate(payload(iss).to_string().as_bytes());
    sign_compact(key, &header(key), &body)
}

pub fn config() -> ValidatorConfig {
    ValidatorConfig {
        now: Some(NOW),
        ..ValidatorConfig::default()
    }
}

/// Context whose fetcher serves `keys` at `iss`'s well-known key set URL.
pub fn context_serving(iss: &str, keys: &[&SigningKey]) -> ValidationContext {
    let fetcher = StaticFetcher::new()
        .with_document(format!("{}/.well-known/jwks.json", iss), key_set(keys));
    ValidationContext::with_fetcher(config(), Arc::new(fetcher))
}

/// Context that cannot download anything.
pub fn offline_context() -> ValidationContext {
    ValidationContext::with_fetcher(config(), Arc::new(StaticFetcher::new()))
}

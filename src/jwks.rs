//! Issuer key set validation.

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use crate::error::ErrorCode;
use crate::keys::{IssuerKey, Jwk, KeyStore};
use crate::log::{Log, ValidationResult};
use crate::schema::{validate_schema, Schema};

pub const EXPECTED_KTY: &str = "EC";
pub const EXPECTED_ALG: &str = "ES256";
pub const EXPECTED_CRV: &str = "P-256";
pub const EXPECTED_USE: &str = "sig";

/// Keys of one validated key set that were usable for signing.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    pub keys: Vec<IssuerKey>,
}

/// Parses and validates a key set file.
pub fn validate_text(text: &str, store: &KeyStore) -> ValidationResult<KeySet> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => validate(value, store),
        Err(e) => {
            let mut log = Log::new("JWK Key Set");
            log.fatal(
                format!("Failed to parse JWK Key Set as JSON: {}", e),
                ErrorCode::JsonParseError,
            );
            ValidationResult::failed(log)
        }
    }
}

/// Validates a parsed key set and merges every usable key into `store`.
///
/// Violations are logged per key. A key is only left out when it cannot be
/// used for ES256 verification at all: missing `kid`, wrong `kty` or `crv`,
/// or coordinates that are not a P-256 point.
pub fn validate(key_set: Value, store: &KeyStore) -> ValidationResult<KeySet> {
    let mut log = Log::new("JWK Key Set");

    validate_schema(Schema::KeySet, &key_set, ErrorCode::InvalidKeySchema, &mut log);

    let Some(entries) = key_set.get("keys").and_then(Value::as_array) else {
        log.fatal("JWK Key Set has no 'keys' array", ErrorCode::CriticalDataMissing);
        return ValidationResult::failed(log);
    };
    if entries.is_empty() {
        log.warn("JWK Key Set contains no keys", ErrorCode::InvalidKeySchema);
    }

    let mut seen_kids = HashSet::new();
    let mut accepted = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        let jwk: Jwk = match serde_json::from_value(entry.clone()) {
            Ok(jwk) => jwk,
            Err(e) => {
                log.error(
                    format!("Key {}: not a JSON Web Key: {}", index, e),
                    ErrorCode::InvalidKeySchema,
                );
                continue;
            }
        };

        if let Some(kid) = jwk.kid.as_deref().filter(|kid| !kid.is_empty()) {
            if !seen_kids.insert(kid.to_string()) {
                log.error(
                    format!("Key {}: duplicate 'kid' {} in key set", index, kid),
                    ErrorCode::InvalidKeySchema,
                );
            }
        }

        if let Some(key) = validate_key(index, jwk, &mut log) {
            accepted.push(key);
        }
    }

    let added = store.merge(accepted.iter().cloned());
    debug!(accepted = accepted.len(), added, "Key set merged");
    log.info(format!(
        "{} of {} key(s) accepted, {} new in key store",
        accepted.len(),
        entries.len(),
        added
    ));

    ValidationResult::ok(KeySet { keys: accepted }, log)
}

fn validate_key(index: usize, jwk: Jwk, log: &mut Log) -> Option<IssuerKey> {
    let label = match jwk.kid.as_deref() {
        Some(kid) if !kid.is_empty() => format!("Key {} ({})", index, kid),
        _ => format!("Key {}", index),
    };

    let mut usable = true;

    if jwk.kid.as_deref().map_or(true, str::is_empty) {
        log.error(format!("{}: missing 'kid'", label), ErrorCode::InvalidKeyWrongKid);
        usable = false;
    }

    if jwk.kty != EXPECTED_KTY {
        log.error(
            format!("{}: wrong key type '{}', expected '{}'", label, jwk.kty, EXPECTED_KTY),
            ErrorCode::InvalidKeyWrongKty,
        );
        usable = false;
    }

    match jwk.crv.as_deref() {
        Some(EXPECTED_CRV) => {}
        other => {
            log.error(
                format!(
                    "{}: wrong curve '{}', expected '{}'",
                    label,
                    other.unwrap_or("<none>"),
                    EXPECTED_CRV
                ),
                ErrorCode::InvalidKeyWrongCrv,
            );
            usable = false;
        }
    }

    if jwk.alg.as_deref() != Some(EXPECTED_ALG) {
        log.warn(
            format!(
                "{}: wrong algorithm '{}', expected '{}'",
                label,
                jwk.alg.as_deref().unwrap_or("<none>"),
                EXPECTED_ALG
            ),
            ErrorCode::InvalidKeyWrongAlg,
        );
    }

    if jwk.use_.as_deref() != Some(EXPECTED_USE) {
        log.warn(
            format!(
                "{}: wrong use '{}', expected '{}'",
                label,
                jwk.use_.as_deref().unwrap_or("<none>"),
                EXPECTED_USE
            ),
            ErrorCode::InvalidKeyWrongUse,
        );
    }

    if jwk.d.is_some() {
        log.error(
            format!("{}: key contains private key material 'd'", label),
            ErrorCode::InvalidKeyPrivate,
        );
    }

    if let (Some(kid), Some(thumbprint)) = (jwk.kid.as_deref(), jwk.thumbprint()) {
        if !kid.is_empty() && kid != thumbprint {
            log.error(
                format!("{}: 'kid' does not match the key thumbprint {}", label, thumbprint),
                ErrorCode::InvalidKeyWrongKid,
            );
        }
    }

    if !usable {
        return None;
    }

    match IssuerKey::from_jwk(jwk) {
        Ok(key) => {
            log.debug(format!("{}: accepted", label));
            Some(key)
        }
        Err(e) => {
            log.error(format!("{}: {}", label, e), ErrorCode::InvalidKeyUnknown);
            None
        }
    }
}

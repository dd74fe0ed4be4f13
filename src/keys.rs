//! Trusted issuer public keys.

use std::collections::HashMap;
use std::sync::RwLock;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use p256::ecdsa::VerifyingKey;
use p256::EncodedPoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Result, ValidationError};

/// A JSON Web Key as published by an issuer, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub kty: String,
    pub kid: Option<String>,
    #[serde(rename = "use")]
    pub use_: Option<String>,
    pub alg: Option<String>,
    pub crv: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
}

impl Jwk {
    /// Public signing JWK for a P-256 key, with the thumbprint as `kid`.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let mut jwk = Self {
            kty: "EC".to_string(),
            use_: Some("sig".to_string()),
            alg: Some("ES256".to_string()),
            crv: Some("P-256".to_string()),
            x: point.x().map(|x| URL_SAFE_NO_PAD.encode(x)),
            y: point.y().map(|y| URL_SAFE_NO_PAD.encode(y)),
            ..Self::default()
        };
        jwk.kid = jwk.thumbprint();
        jwk
    }

    /// RFC 7638 SHA-256 thumbprint of an EC key, base64url encoded.
    pub fn thumbprint(&self) -> Option<String> {
        let crv = self.crv.as_deref()?;
        let x = self.x.as_deref()?;
        let y = self.y.as_deref()?;
        let canonical = format!(
            r#"{{"crv":"{}","kty":"{}","x":"{}","y":"{}"}}"#,
            crv, self.kty, x, y
        );
        Some(URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes())))
    }

    /// Builds the P-256 verifying key from the `x`/`y` coordinates.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        let x = decode_coordinate(self.x.as_deref(), "x")?;
        let y = decode_coordinate(self.y.as_deref(), "y")?;
        let point = EncodedPoint::from_affine_coordinates(
            x.as_slice().into(),
            y.as_slice().into(),
            false,
        );
        VerifyingKey::from_encoded_point(&point)
            .map_err(|e| ValidationError::InvalidKey(format!("invalid EC point: {}", e)))
    }
}

fn decode_coordinate(value: Option<&str>, name: &str) -> Result<Vec<u8>> {
    let value =
        value.ok_or_else(|| ValidationError::InvalidKey(format!("missing '{}' coordinate", name)))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| ValidationError::InvalidKey(format!("'{}' is not base64url: {}", name, e)))?;
    if bytes.len() != 32 {
        return Err(ValidationError::InvalidKey(format!(
            "'{}' must be 32 bytes, got {}",
            name,
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// A key accepted for signature verification.
#[derive(Debug, Clone)]
pub struct IssuerKey {
    pub kid: String,
    pub jwk: Jwk,
    pub verifying_key: VerifyingKey,
}

impl IssuerKey {
    pub fn from_jwk(jwk: Jwk) -> Result<Self> {
        let kid = jwk
            .kid
            .clone()
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| ValidationError::InvalidKey("missing 'kid'".to_string()))?;
        let verifying_key = jwk.verifying_key()?;
        Ok(Self {
            kid,
            // never keep private material around
            jwk: Jwk { d: None, ..jwk },
            verifying_key,
        })
    }
}

/// Keys trusted for the current run, indexed by `kid`.
///
/// Merges are additive: a key is never removed or replaced. Several keys may
/// share a `kid`; verification tries each of them.
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: RwLock<HashMap<String, Vec<IssuerKey>>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds keys, skipping exact duplicates. Returns how many were new.
    pub fn merge(&self, keys: impl IntoIterator<Item = IssuerKey>) -> usize {
        let mut store = match self.keys.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut added = 0;
        for key in keys {
            let slot = store.entry(key.kid.clone()).or_default();
            let point = key.verifying_key.to_encoded_point(false);
            if slot
                .iter()
                .any(|k| k.verifying_key.to_encoded_point(false) == point)
            {
                continue;
            }
            debug!(kid = %key.kid, "Key added to store");
            slot.push(key);
            added += 1;
        }
        added
    }

    pub fn get(&self, kid: &str) -> Vec<IssuerKey> {
        let store = match self.keys.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        store.get(kid).cloned().unwrap_or_default()
    }

    pub fn all(&self) -> Vec<IssuerKey> {
        let store = match self.keys.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        store.values().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let store = match self.keys.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        store.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use p256::ecdsa::SigningKey;

    use super::*;

    fn jwk_for(secret: u8) -> Jwk {
        let signing_key = SigningKey::from_slice(&[secret; 32]).unwrap();
        Jwk::from_verifying_key(signing_key.verifying_key())
    }

    #[test]
    fn thumbprint_is_unpadded_sha256() {
        let jwk = jwk_for(3);
        let tp = jwk.thumbprint().unwrap();
        // 32 byte digest, unpadded base64url
        assert_eq!(tp.len(), 43);
        assert!(!tp.contains('='));
    }

    #[test]
    fn jwk_round_trips_to_the_same_point() {
        let signing_key = SigningKey::from_slice(&[4; 32]).unwrap();
        let jwk = Jwk::from_verifying_key(signing_key.verifying_key());
        let restored = jwk.verifying_key().unwrap();
        assert_eq!(
            restored.to_encoded_point(false),
            signing_key.verifying_key().to_encoded_point(false)
        );
    }

    #[test]
    fn thumbprint_requires_coordinates() {
        let jwk = Jwk {
            kty: "EC".to_string(),
            crv: Some("P-256".to_string()),
            ..Jwk::default()
        };
        assert!(jwk.thumbprint().is_none());
    }

    #[test]
    fn from_jwk_drops_private_part() {
        let mut jwk = jwk_for(5);
        jwk.d = Some("secret".to_string());
        let key = IssuerKey::from_jwk(jwk).unwrap();
        assert!(key.jwk.d.is_none());
    }

    #[test]
    fn from_jwk_rejects_short_coordinate() {
        let mut jwk = jwk_for(5);
        jwk.x = Some(URL_SAFE_NO_PAD.encode([1u8; 16]));
        assert!(matches!(
            IssuerKey::from_jwk(jwk),
            Err(ValidationError::InvalidKey(_))
        ));
    }

    #[test]
    fn merge_is_additive_and_deduplicates() {
        let store = KeyStore::new();
        let a = IssuerKey::from_jwk(jwk_for(1)).unwrap();
        let b = IssuerKey::from_jwk(jwk_for(2)).unwrap();

        assert_eq!(store.merge(vec![a.clone()]), 1);
        assert_eq!(store.merge(vec![a.clone(), b.clone()]), 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&a.kid).len(), 1);
    }

    #[test]
    fn merge_keeps_distinct_keys_sharing_a_kid() {
        let store = KeyStore::new();
        let a = IssuerKey::from_jwk(jwk_for(1)).unwrap();
        let mut b = IssuerKey::from_jwk(jwk_for(2)).unwrap();
        b.kid = a.kid.clone();

        store.merge(vec![a.clone(), b]);
        assert_eq!(store.get(&a.kid).len(), 2);
    }
}

//! SMART Health Card Validator Library
//!
//! Validates SMART Health Card artefacts: QR images, numeric QR payloads,
//! compact JWS tokens, JWS payloads, FHIR bundles, health card files and
//! issuer key sets. Every stage reports into a diagnostic [`Log`] tree and
//! keeps going past anything short of a fatal problem.

pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod fhir;
pub mod file;
pub mod health_card;
pub mod jwks;
pub mod jws;
pub mod keys;
pub mod log;
pub mod payload;
pub mod qr;
pub mod qr_image;
pub mod schema;
pub mod signature;
pub mod trusted;
pub mod validate;

#[cfg(test)]
mod test_support;

pub use config::ValidatorConfig;
pub use context::ValidationContext;
pub use error::{ErrorCode, Result, ValidationError};
pub use fetch::{HttpFetcher, JsonFetcher, StaticFetcher};
pub use file::{FileInfo, FileType, ImageKind};
pub use jws::CompactToken;
pub use keys::{IssuerKey, Jwk, KeyStore};
pub use log::{Level, Log, LogEntry, ValidationResult};
pub use trusted::{DirectorySource, TrustedIssuer, TrustedIssuerDirectory, TrustedIssuers};
pub use validate::{validate, validate_text, Artifact, Report};

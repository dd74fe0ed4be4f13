//! Compact JWS validation for SMART Health Card tokens.
//!
//! Every step logs and moves on where it can. Only a token that cannot be
//! split into three parts, or a payload that is not JSON, stops the stage.

use std::io::Read;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use flate2::read::DeflateDecoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::context::ValidationContext;
use crate::error::{ErrorCode, ValidationError};
use crate::jwks;
use crate::keys::Jwk;
use crate::log::{Log, ValidationResult};
use crate::payload::{self, Payload};
use crate::schema::{validate_schema, Schema};
use crate::signature::verify_jws;

/// Longest token that still fits a single version 22 numeric QR code.
pub const MAX_SINGLE_CHUNK_JWS_LENGTH: usize = 1195;

pub const WELL_KNOWN_JWKS_PATH: &str = "/.well-known/jwks.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwsHeader {
    pub alg: Option<String>,
    pub zip: Option<String>,
    pub kid: Option<String>,
    pub typ: Option<String>,
    pub jwk: Option<Jwk>,
}

impl JwsHeader {
    /// Key id to verify with: the explicit `kid`, else the thumbprint of an
    /// embedded `jwk`.
    pub fn key_hint(&self) -> Option<String> {
        self.kid
            .clone()
            .or_else(|| self.jwk.as_ref().and_then(Jwk::thumbprint))
    }
}

/// A token whose payload could be read.
#[derive(Debug, Clone)]
pub struct CompactToken {
    /// The token as received, without surrounding whitespace.
    pub jws: String,
    pub header: Option<JwsHeader>,
    pub payload: Payload,
    /// `kid` of the key that verified the signature.
    pub verified_kid: Option<String>,
}

impl CompactToken {
    pub fn signature_verified(&self) -> bool {
        self.verified_kid.is_some()
    }

    pub fn fhir_bundle(&self) -> Option<&Value> {
        self.payload.fhir_bundle.as_ref()
    }
}

pub async fn validate(jws: &str, ctx: &ValidationContext) -> ValidationResult<CompactToken> {
    validate_titled(jws, "JWS-compact", ctx).await
}

#[instrument(skip_all, fields(stage = %title))]
pub async fn validate_titled(
    jws: &str,
    title: &str,
    ctx: &ValidationContext,
) -> ValidationResult<CompactToken> {
    let mut log = Log::new(title);

    let trimmed = jws.trim();
    if trimmed.len() != jws.len() {
        log.warn(
            "JWS has leading or trailing characters",
            ErrorCode::TrailingCharacters,
        );
    }

    if trimmed.len() > MAX_SINGLE_CHUNK_JWS_LENGTH {
        log.warn(
            format!(
                "JWS is longer than {} characters and will need split QR codes",
                MAX_SINGLE_CHUNK_JWS_LENGTH
            ),
            ErrorCode::JwsTooLong,
        );
    }

    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        log.fatal(
            "Failed to parse JWS-compact data as 'base64url.base64url.base64url' string",
            ErrorCode::JsonParseError,
        );
        return ValidationResult::failed(log);
    }

    validate_schema(
        Schema::Jws,
        &Value::String(trimmed.to_string()),
        ErrorCode::SchemaError,
        &mut log,
    );

    let header = check_header(parts[0], &mut log);

    let payload_text = decode_payload(parts[1], &mut log);
    let payload_result = payload::validate(&payload_text, &ctx.config);
    log.add_child(payload_result.log);
    let Some(payload) = payload_result.result else {
        return ValidationResult::failed(log);
    };

    let iss = payload.iss().map(str::to_string);
    match iss.as_deref() {
        Some(iss) => {
            check_issuer_url(iss, &mut log);
            download_issuer_keys(iss, ctx, &mut log).await;
            if ctx.directory.is_requested() {
                ctx.directory.check(iss, &mut log);
            }
        }
        None => log.error(
            "Can't find 'iss' entry in JWS payload",
            ErrorCode::SchemaError,
        ),
    }

    let kid = header.as_ref().and_then(JwsHeader::key_hint);
    let verified_kid = match verify_jws(trimmed, kid.as_deref(), &ctx.keys) {
        Ok(kid) => {
            log.info("JWS signature verified");
            Some(kid)
        }
        Err(e) => {
            log.error(
                format!("JWS verification failed: {}", e),
                ErrorCode::JwsVerificationError,
            );
            None
        }
    };

    ValidationResult::ok(
        CompactToken {
            jws: trimmed.to_string(),
            header,
            payload,
            verified_kid,
        },
        log,
    )
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(segment.trim_end_matches('='))
}

fn check_header(segment: &str, log: &mut Log) -> Option<JwsHeader> {
    let header = decode_segment(segment)
        .map_err(|e| e.to_string())
        .and_then(|bytes| serde_json::from_slice::<JwsHeader>(&bytes).map_err(|e| e.to_string()));
    let header = match header {
        Ok(header) => header,
        Err(e) => {
            log.error(
                format!("Failed to decode JWS header: {}", e),
                ErrorCode::JwsHeaderError,
            );
            return None;
        }
    };

    if header.alg.as_deref() != Some("ES256") {
        log.error(
            format!(
                "JWS header 'alg' should be 'ES256', not '{}'",
                header.alg.as_deref().unwrap_or("<none>")
            ),
            ErrorCode::JwsHeaderError,
        );
    }
    if header.zip.as_deref() != Some("DEF") {
        log.error(
            format!(
                "JWS header 'zip' should be 'DEF', not '{}'",
                header.zip.as_deref().unwrap_or("<none>")
            ),
            ErrorCode::JwsHeaderError,
        );
    }
    if header.kid.is_none() {
        log.error("JWS header is missing 'kid'", ErrorCode::JwsHeaderError);
    }
    Some(header)
}

/// Base64url-decodes and inflates the payload segment. Falls back to the
/// undecompressed bytes, then to the raw segment, so the payload stage can
/// still report on whatever is there.
fn decode_payload(segment: &str, log: &mut Log) -> String {
    let decoded = match decode_segment(segment) {
        Ok(bytes) => bytes,
        Err(e) => {
            log.error(
                format!("Failed to base64url-decode JWS payload: {}", e),
                ErrorCode::InvalidBase64,
            );
            return segment.to_string();
        }
    };

    match inflate(&decoded) {
        Ok(inflated) => {
            log.info("JWS payload inflated");
            match String::from_utf8(inflated) {
                Ok(text) => text,
                Err(e) => {
                    log.error(
                        "Inflated JWS payload is not valid UTF-8",
                        ErrorCode::InflationError,
                    );
                    String::from_utf8_lossy(e.as_bytes()).into_owned()
                }
            }
        }
        Err(e) => {
            log.error(
                format!(
                    "Error inflating JWS payload. Did you use raw DEFLATE compression? {}",
                    e
                ),
                ErrorCode::InflationError,
            );
            String::from_utf8_lossy(&decoded).into_owned()
        }
    }
}

fn inflate(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    if decoder.total_in() != bytes.len() as u64 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "data after end of DEFLATE stream",
        ));
    }
    Ok(out)
}

fn check_issuer_url(iss: &str, log: &mut Log) {
    if !iss.starts_with("https://") {
        log.error(
            format!("Issuer URL SHALL use https: {}", iss),
            ErrorCode::InvalidIssuerUrl,
        );
    }
    if iss.ends_with('/') {
        log.error(
            format!("Issuer URL SHALL NOT include a trailing '/': {}", iss),
            ErrorCode::InvalidIssuerUrl,
        );
    }
    if let Err(e) = Url::parse(iss) {
        log.error(
            format!("Issuer URL is not a valid URL: {} ({})", iss, e),
            ErrorCode::InvalidIssuerUrl,
        );
    }
}

/// Downloads the issuer's key set into the key store. Failures leave the
/// store as it was.
async fn download_issuer_keys(iss: &str, ctx: &ValidationContext, log: &mut Log) {
    let url = format!("{}{}", iss, WELL_KNOWN_JWKS_PATH);
    log.info(format!("Retrieving issuer key from {}", url));

    match ctx.fetcher().fetch_json(&url).await {
        Ok(key_set) => {
            debug!(url = %url, "Issuer key set received");
            let result = jwks::validate(key_set, &ctx.keys);
            log.add_child(result.log);
        }
        Err(e) => {
            let reason = match e {
                ValidationError::FetchError { reason, .. } => reason,
                other => other.to_string(),
            };
            log.error(
                format!("Failed to download issuer JWK set from {}: {}", url, reason),
                ErrorCode::IssuerKeyDownloadError,
            );
        }
    }
}

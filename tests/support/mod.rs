//! Fixtures shared by the integration tests: real ES256 tokens, numeric QR
//! encoding and rendered QR images.
#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use image::{GrayImage, ImageFormat, Luma};
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use qrcode::{Color, EcLevel, QrCode};
use serde_json::{json, Value};
use shc_validator::{Jwk, StaticFetcher, ValidationContext, ValidatorConfig};

pub const NOW: i64 = 1_700_000_000;
pub const ISSUER: &str = "https://issuer.example.org/shc";

const QUIET_ZONE: u32 = 4;
const MODULE_PX: u32 = 4;

pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed; 32]).unwrap()
}

pub fn jwk(key: &SigningKey) -> Value {
    serde_json::to_value(Jwk::from_verifying_key(key.verifying_key())).unwrap()
}

pub fn key_set(keys: &[&SigningKey]) -> Value {
    json!({ "keys": keys.iter().map(|k| jwk(k)).collect::<Vec<_>>() })
}

pub fn payload(iss: &str) -> Value {
    json!({
        "iss": iss,
        "nbf": NOW - 3600,
        "vc": {
            "type": [
                "https://smarthealth.cards#health-card",
                "https://smarthealth.cards#immunization"
            ],
            "credentialSubject": {
                "fhirVersion": "4.0.1",
                "fhirBundle": {
                    "resourceType": "Bundle",
                    "type": "collection",
                    "entry": [
                        {
                            "fullUrl": "resource:0",
                            "resource": {
                                "resourceType": "Patient",
                                "name": [{ "family": "Anyperson", "given": ["John", "B."] }],
                                "birthDate": "1951-01-20"
                            }
                        },
                        {
                            "fullUrl": "resource:1",
                            "resource": {
                                "resourceType": "Immunization",
                                "status": "completed",
                                "vaccineCode": { "coding": [{ "system": "http://hl7.org/fhir/sid/cvx", "code": "207" }] },
                                "patient": { "reference": "resource:0" },
                                "occurrenceDateTime": "2021-01-01"
                            }
                        }
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
    format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature.to_bytes()))
}

pub fn health_card_jws(key: &SigningKey, iss: &str) -> String {
    let kid = jwk(key)["kid"].as_str().unwrap().to_string();
    let header = json!({ "alg": "ES256", "zip": "DEF", "kid": kid });
    sign_compact(key, &header, &deflate(payload(iss).to_string().as_bytes()))
}

pub fn config() -> ValidatorConfig {
    ValidatorConfig {
        now: Some(NOW),
        ..ValidatorConfig::default()
    }
}

pub fn context_serving(iss: &str, keys: &[&SigningKey]) -> ValidationContext {
    let fetcher = StaticFetcher::new()
        .with_document(format!("{}/.well-known/jwks.json", iss), key_set(keys));
    ValidationContext::with_fetcher(config(), Arc::new(fetcher))
}

pub fn offline_context() -> ValidationContext {
    ValidationContext::with_fetcher(config(), Arc::new(StaticFetcher::new()))
}

/// Digits of `token`: each character as its code point minus 45.
pub fn numeric(token: &str) -> String {
    token.bytes().map(|b| format!("{:02}", b - 45)).collect()
}

/// Splits `token` into `parts` chunks of nearly equal size with
/// `shc:/<i>/<n>/` headers.
pub fn numeric_chunks(token: &str, parts: usize) -> Vec<String> {
    let base = token.len() / parts;
    let extra = token.len() % parts;
    let mut start = 0;
    (0..parts)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let text = &token[start..start + len];
            start += len;
            format!("shc:/{}/{}/{}", i + 1, parts, numeric(text))
        })
        .collect()
}

fn modules(text: &str) -> (u32, Vec<Color>) {
    let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::L).unwrap();
    (code.width() as u32, code.to_colors())
}

/// PNG rendering of a QR code carrying `text`.
pub fn qr_png(text: &str) -> Vec<u8> {
    let (width, colors) = modules(text);
    let side = (width + 2 * QUIET_ZONE) * MODULE_PX;
    let image = GrayImage::from_fn(side, side, |x, y| {
        let mx = (x / MODULE_PX) as i64 - QUIET_ZONE as i64;
        let my = (y / MODULE_PX) as i64 - QUIET_ZONE as i64;
        let dark = mx >= 0
            && my >= 0
            && (mx as u32) < width
            && (my as u32) < width
            && colors[(my as u32 * width + mx as u32) as usize] == Color::Dark;
        if dark {
            Luma([0])
        } else {
            Luma([255])
        }
    });
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// SVG rendering of a QR code carrying `text`, one unit per module.
pub fn qr_svg(text: &str) -> String {
    let (width, colors) = modules(text);
    let side = width + 2 * QUIET_ZONE;
    let mut svg = format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{side}" height="{side}" viewBox="0 0 {side} {side}" shape-rendering="crispEdges"><rect width="{side}" height="{side}" fill="#ffffff"/>"##
    );
    for (i, color) in colors.iter().enumerate() {
        if *color == Color::Dark {
            let x = i as u32 % width + QUIET_ZONE;
            let y = i as u32 / width + QUIET_ZONE;
            svg.push_str(&format!(r##"<rect x="{x}" y="{y}" width="1" height="1" fill="#000000"/>"##));
        }
    }
    svg.push_str("</svg>");
    svg
}

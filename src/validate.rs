//! High-level validation API.
//!
//! One entry point per run: pick the stage for the artefact type, feed it
//! the input files, and hand back whatever the stage produced together with
//! its log.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::context::ValidationContext;
use crate::error::ErrorCode;
use crate::file::{FileInfo, FileType};
use crate::fhir;
use crate::health_card;
use crate::jwks::{self, KeySet};
use crate::jws::{self, CompactToken};
use crate::log::{Log, ValidationResult};
use crate::payload::{self, Payload};
use crate::qr;
use crate::qr_image;

/// What a successful stage hands back.
#[derive(Debug, Clone)]
pub enum Artifact {
    /// A compact token, from `jws`, `qrnumeric` or `qr` input.
    Token(CompactToken),
    /// Bundles of every credential in a health card file.
    Bundles(Vec<Option<Value>>),
    Payload(Payload),
    Bundle(Value),
    KeySet(KeySet),
}

impl Artifact {
    /// The FHIR bundle(s) the artefact carries, for display.
    pub fn fhir_bundles(&self) -> Vec<&Value> {
        match self {
            Artifact::Token(token) => token.fhir_bundle().into_iter().collect(),
            Artifact::Bundles(bundles) => bundles.iter().flatten().collect(),
            Artifact::Payload(payload) => payload.fhir_bundle.iter().collect(),
            Artifact::Bundle(bundle) => vec![bundle],
            Artifact::KeySet(_) => Vec::new(),
        }
    }
}

/// Compact summary of a run, suitable for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct Report<'a> {
    pub file_type: FileType,
    pub files: Vec<&'a str>,
    /// `true` when nothing at error level or above was logged.
    pub valid: bool,
    pub fhir_bundles: Vec<&'a Value>,
    pub log: &'a Log,
}

impl<'a> Report<'a> {
    pub fn new(file_type: FileType, files: &'a [FileInfo], result: &'a ValidationResult<Artifact>) -> Self {
        Self {
            file_type,
            files: files.iter().map(|f| f.name.as_str()).collect(),
            valid: result.result.is_some()
                && result.log.level() < Some(crate::log::Level::Error),
            fhir_bundles: result
                .result
                .as_ref()
                .map(Artifact::fhir_bundles)
                .unwrap_or_default(),
            log: &result.log,
        }
    }
}

/// Validates `files` as artefacts of `file_type`.
///
/// Only QR input takes more than one file: numeric chunks or images that
/// together carry a split token. Other types validate the first file and
/// warn about the rest.
pub async fn validate(
    ctx: &ValidationContext,
    file_type: FileType,
    files: &[FileInfo],
) -> ValidationResult<Artifact> {
    info!(%file_type, files = files.len(), "Validating");

    if files.is_empty() {
        let mut log = Log::new(file_type.name());
        log.fatal("No input file given", ErrorCode::DataFileNotFound);
        return ValidationResult::failed(log);
    }

    match file_type {
        FileType::QrNumeric => {
            let chunks: Vec<String> = files.iter().map(FileInfo::text).collect();
            qr::validate(&chunks, ctx).await.map(Artifact::Token)
        }
        FileType::Qr => {
            let mut result = qr_image::validate(files, ctx).await;
            for file in files.iter().filter(|f| f.image.is_none()) {
                result.log.warn(
                    format!("{} does not look like a PNG, JPEG, BMP or SVG image", file.name),
                    ErrorCode::UnknownFileType,
                );
            }
            result.map(Artifact::Token)
        }
        _ => {
            let text = files[0].text();
            let mut result = validate_text(ctx, file_type, &text).await;
            if files.len() > 1 {
                result.log.warn(
                    format!(
                        "Only the first of {} files is validated for type '{}'",
                        files.len(),
                        file_type
                    ),
                    ErrorCode::UnknownFileType,
                );
            }
            result
        }
    }
}

/// Validates a text artefact. Image input has no text form and is rejected.
pub async fn validate_text(
    ctx: &ValidationContext,
    file_type: FileType,
    text: &str,
) -> ValidationResult<Artifact> {
    match file_type {
        FileType::QrNumeric => {
            let chunks: Vec<String> = text
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect();
            qr::validate(&chunks, ctx).await.map(Artifact::Token)
        }
        FileType::Jws => jws::validate(text, ctx).await.map(Artifact::Token),
        FileType::JwsPayload => payload::validate(text, &ctx.config).map(Artifact::Payload),
        FileType::FhirBundle => fhir::validate_text(text).map(Artifact::Bundle),
        FileType::HealthCard => health_card::validate(text, ctx).await.map(Artifact::Bundles),
        FileType::FhirHealthCard => health_card::validate_fhir(text, ctx)
            .await
            .map(Artifact::Bundles),
        FileType::JwkSet => jwks::validate_text(text, &ctx.keys).map(Artifact::KeySet),
        FileType::Qr => {
            let mut log = Log::new(file_type.name());
            log.fatal(
                "QR images must be validated from image files",
                ErrorCode::UnknownFileType,
            );
            ValidationResult::failed(log)
        }
    }
}

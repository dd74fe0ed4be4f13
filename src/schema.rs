//! Embedded JSON schemas and schema validation glue.

use std::sync::OnceLock;

use jsonschema::{Draft, Validator};
use serde_json::Value;

use crate::error::{ErrorCode, ValidationError};
use crate::log::Log;

/// Schemas the pipeline validates against. They are compiled into the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Jws,
    JwsPayload,
    KeySet,
    HealthCard,
    FhirHealthCard,
    FhirBundle,
    TrustedIssuers,
}

impl Schema {
    fn source(self) -> &'static str {
        match self {
            Self::Jws => include_str!("../schemas/jws.schema.json"),
            Self::JwsPayload => include_str!("../schemas/jws-payload.schema.json"),
            Self::KeySet => include_str!("../schemas/keyset.schema.json"),
            Self::HealthCard => include_str!("../schemas/health-card.schema.json"),
            Self::FhirHealthCard => include_str!("../schemas/fhir-health-card.schema.json"),
            Self::FhirBundle => include_str!("../schemas/fhir-bundle.schema.json"),
            Self::TrustedIssuers => include_str!("../schemas/trusted-issuers.schema.json"),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Jws => "JWS",
            Self::JwsPayload => "JWS payload",
            Self::KeySet => "key set",
            Self::HealthCard => "health card",
            Self::FhirHealthCard => "FHIR health card",
            Self::FhirBundle => "FHIR bundle",
            Self::TrustedIssuers => "trusted issuers",
        }
    }

    fn cell(self) -> &'static OnceLock<Result<Validator, String>> {
        static JWS: OnceLock<Result<Validator, String>> = OnceLock::new();
        static JWS_PAYLOAD: OnceLock<Result<Validator, String>> = OnceLock::new();
        static KEY_SET: OnceLock<Result<Validator, String>> = OnceLock::new();
        static HEALTH_CARD: OnceLock<Result<Validator, String>> = OnceLock::new();
        static FHIR_HEALTH_CARD: OnceLock<Result<Validator, String>> = OnceLock::new();
        static FHIR_BUNDLE: OnceLock<Result<Validator, String>> = OnceLock::new();
        static TRUSTED_ISSUERS: OnceLock<Result<Validator, String>> = OnceLock::new();
        match self {
            Self::Jws => &JWS,
            Self::JwsPayload => &JWS_PAYLOAD,
            Self::KeySet => &KEY_SET,
            Self::HealthCard => &HEALTH_CARD,
            Self::FhirHealthCard => &FHIR_HEALTH_CARD,
            Self::FhirBundle => &FHIR_BUNDLE,
            Self::TrustedIssuers => &TRUSTED_ISSUERS,
        }
    }

    fn validator(self) -> Result<&'static Validator, ValidationError> {
        self.cell()
            .get_or_init(|| compile(self.source()))
            .as_ref()
            .map_err(|e| ValidationError::SchemaCompileError(format!("{}: {}", self.name(), e)))
    }

    /// Messages for every violation of this schema; empty when `value` conforms.
    pub fn violations(self, value: &Value) -> Result<Vec<String>, ValidationError> {
        let validator = self.validator()?;
        Ok(validator.iter_errors(value).map(|e| e.to_string()).collect())
    }
}

fn compile(source: &str) -> Result<Validator, String> {
    let schema: Value = serde_json::from_str(source).map_err(|e| e.to_string())?;
    jsonschema::options()
        .with_draft(Draft::Draft7)
        .build(&schema)
        .map_err(|e| e.to_string())
}

/// Validates `value` against `schema`, logging one error per violation.
///
/// Returns `true` when the value conforms. Violations never stop the caller.
pub fn validate_schema(schema: Schema, value: &Value, code: ErrorCode, log: &mut Log) -> bool {
    match schema.violations(value) {
        Ok(violations) if violations.is_empty() => true,
        Ok(violations) => {
            for violation in violations {
                log.error(format!("Schema: {}: {}", schema.name(), violation), code);
            }
            false
        }
        Err(e) => {
            log.error(e.to_string(), code);
            false
        }
    }
}

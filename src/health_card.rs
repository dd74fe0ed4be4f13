//! Health card files: the `.smart-health-card` JSON envelope and the FHIR
//! `Parameters` resource returned by `$health-cards-issue`.
//!
//! Both carry one or more compact tokens. Each token is validated on its own
//! under a child log named after its position.

use serde_json::Value;

use crate::context::ValidationContext;
use crate::error::ErrorCode;
use crate::jws;
use crate::log::{Log, ValidationResult};
use crate::schema::{validate_schema, Schema};

pub const VERIFIABLE_CREDENTIAL: &str = "verifiableCredential";

/// FHIR bundles of the credentials in a health card, in file order.
///
/// An entry is `None` when its token's payload could not be read.
pub type Bundles = Vec<Option<Value>>;

/// Validates a `.smart-health-card` file.
pub async fn validate(text: &str, ctx: &ValidationContext) -> ValidationResult<Bundles> {
    let mut log = Log::new("SMART Health Card");

    let Some(json) = parse(text, "health card", &mut log) else {
        return ValidationResult::failed(log);
    };

    validate_schema(Schema::HealthCard, &json, ErrorCode::SchemaError, &mut log);

    let Some(values) = json.get(VERIFIABLE_CREDENTIAL).and_then(Value::as_array) else {
        log.fatal(
            format!("Health card has no '{}' array", VERIFIABLE_CREDENTIAL),
            ErrorCode::CriticalDataMissing,
        );
        return ValidationResult::failed(log);
    };

    let mut credentials = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        let jws = value.as_str();
        if jws.is_none() {
            log.error(
                format!("{}[{}] is not a string", VERIFIABLE_CREDENTIAL, i),
                ErrorCode::SchemaError,
            );
        }
        credentials.push(jws);
    }

    let bundles = validate_credentials(&credentials, ctx, &mut log).await;
    ValidationResult::ok(bundles, log)
}

/// Validates a FHIR `Parameters` resource whose `verifiableCredential`
/// parameters hold compact tokens in `valueString`.
pub async fn validate_fhir(text: &str, ctx: &ValidationContext) -> ValidationResult<Bundles> {
    let mut log = Log::new("FHIR $health-cards-issue response");

    let Some(json) = parse(text, "FHIR health card", &mut log) else {
        return ValidationResult::failed(log);
    };

    validate_schema(
        Schema::FhirHealthCard,
        &json,
        ErrorCode::FhirSchemaError,
        &mut log,
    );

    let Some(parameters) = json.get("parameter").and_then(Value::as_array) else {
        log.fatal(
            "FHIR Parameters resource has no 'parameter' array",
            ErrorCode::CriticalDataMissing,
        );
        return ValidationResult::failed(log);
    };

    let credentials: Vec<Option<&str>> = parameters
        .iter()
        .filter(|p| p.get("name").and_then(Value::as_str) == Some(VERIFIABLE_CREDENTIAL))
        .filter_map(|p| p.get("valueString").and_then(Value::as_str))
        .map(Some)
        .collect();

    if credentials.is_empty() {
        log.fatal(
            format!(
                "FHIR Parameters resource has no '{}' parameter with a 'valueString'",
                VERIFIABLE_CREDENTIAL
            ),
            ErrorCode::CriticalDataMissing,
        );
        return ValidationResult::failed(log);
    }

    let bundles = validate_credentials(&credentials, ctx, &mut log).await;
    ValidationResult::ok(bundles, log)
}

fn parse(text: &str, what: &str, log: &mut Log) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(json) => Some(json),
        Err(e) => {
            log.fatal(
                format!("Failed to parse {} as JSON: {}", what, e),
                ErrorCode::JsonParseError,
            );
            None
        }
    }
}

/// Validates each token under a child log titled with its position. Entries
/// that are not tokens keep their slot as `None`.
async fn validate_credentials(
    credentials: &[Option<&str>],
    ctx: &ValidationContext,
    log: &mut Log,
) -> Bundles {
    let mut bundles = Vec::with_capacity(credentials.len());
    for (i, credential) in credentials.iter().enumerate() {
        let Some(credential) = credential else {
            bundles.push(None);
            continue;
        };
        let title = format!("{}[{}]", VERIFIABLE_CREDENTIAL, i);
        let result = jws::validate_titled(credential, &title, ctx).await;
        log.add_child(result.log);
        bundles.push(
            result
                .result
                .and_then(|token| token.payload.fhir_bundle),
        );
    }
    log.info(format!(
        "{} of {} credential(s) carry a FHIR bundle",
        bundles.iter().filter(|b| b.is_some()).count(),
        bundles.len()
    ));
    bundles
}

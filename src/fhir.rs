//! Structural validation of the embedded FHIR bundle.
//!
//! Only the shape is checked here; FHIR content rules are not.

use serde_json::Value;

use crate::error::ErrorCode;
use crate::log::{Log, ValidationResult};
use crate::schema::{validate_schema, Schema};

pub fn validate_text(text: &str) -> ValidationResult<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(bundle) => validate(bundle),
        Err(e) => {
            let mut log = Log::new("FHIR Bundle");
            log.fatal(
                format!("Failed to parse FHIR Bundle as JSON: {}", e),
                ErrorCode::JsonParseError,
            );
            ValidationResult::failed(log)
        }
    }
}

pub fn validate(bundle: Value) -> ValidationResult<Value> {
    let mut log = Log::new("FHIR Bundle");

    if !bundle.is_object() {
        log.fatal("FHIR Bundle is not a JSON object", ErrorCode::FhirSchemaError);
        return ValidationResult::failed(log);
    }

    if validate_schema(Schema::FhirBundle, &bundle, ErrorCode::FhirSchemaError, &mut log) {
        let entries = bundle
            .get("entry")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        log.info(format!("FHIR Bundle with {} entries", entries));
    }

    ValidationResult::ok(bundle, log)
}

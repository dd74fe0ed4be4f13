//! JWS payload validation.
//!
//! The payload is parsed as untyped JSON first. Typed claims are only built
//! once the schema accepts it; before that, fields are read by JSON pointer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ValidatorConfig;
use crate::error::ErrorCode;
use crate::fhir;
use crate::log::{Log, ValidationResult};
use crate::schema::{validate_schema, Schema};

pub const HEALTH_CARD_VC_TYPE: &str = "https://smarthealth.cards#health-card";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCardClaims {
    pub iss: String,
    pub nbf: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<f64>,
    pub vc: VerifiableCredential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiableCredential {
    #[serde(rename = "type")]
    pub types: Vec<String>,
    #[serde(rename = "credentialSubject")]
    pub credential_subject: CredentialSubject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSubject {
    #[serde(rename = "fhirVersion")]
    pub fhir_version: String,
    #[serde(rename = "fhirBundle")]
    pub fhir_bundle: Value,
}

/// A payload that parsed as a JSON object.
#[derive(Debug, Clone)]
pub struct Payload {
    pub json: Value,
    /// Present only when the payload conforms to the schema.
    pub claims: Option<HealthCardClaims>,
    /// The embedded bundle, whether or not it passed validation.
    pub fhir_bundle: Option<Value>,
}

impl Payload {
    pub fn iss(&self) -> Option<&str> {
        self.json.get("iss").and_then(Value::as_str)
    }
}

pub fn validate(text: &str, config: &ValidatorConfig) -> ValidationResult<Payload> {
    let mut log = Log::new("JWS Payload");

    let json: Value = match serde_json::from_str(text) {
        Ok(json) => json,
        Err(e) => {
            log.fatal(
                format!("Failed to parse JWS payload as JSON: {}", e),
                ErrorCode::JsonParseError,
            );
            return ValidationResult::failed(log);
        }
    };
    if !json.is_object() {
        log.fatal("JWS payload is not a JSON object", ErrorCode::JsonParseError);
        return ValidationResult::failed(log);
    }

    let claims = if validate_schema(Schema::JwsPayload, &json, ErrorCode::SchemaError, &mut log) {
        match serde_json::from_value::<HealthCardClaims>(json.clone()) {
            Ok(claims) => Some(claims),
            Err(e) => {
                log.error(format!("Failed to read JWS claims: {}", e), ErrorCode::SchemaError);
                None
            }
        }
    } else {
        None
    };

    if let Some(types) = json.pointer("/vc/type").and_then(Value::as_array) {
        if !types.iter().any(|t| t.as_str() == Some(HEALTH_CARD_VC_TYPE)) {
            log.error(
                format!("JWS payload 'vc.type' does not contain '{}'", HEALTH_CARD_VC_TYPE),
                ErrorCode::SchemaError,
            );
        }
    }

    check_times(&json, config.now(), &mut log);

    let fhir_bundle = match json.pointer("/vc/credentialSubject/fhirBundle") {
        Some(bundle) => {
            let result = fhir::validate(bundle.clone());
            log.add_child(result.log);
            result.result
        }
        None => {
            log.error(
                "JWS payload has no 'vc.credentialSubject.fhirBundle'",
                ErrorCode::CriticalDataMissing,
            );
            None
        }
    };

    ValidationResult::ok(
        Payload {
            json,
            claims,
            fhir_bundle,
        },
        log,
    )
}

fn check_times(json: &Value, now: i64, log: &mut Log) {
    if let Some(nbf) = json.get("nbf").and_then(Value::as_f64) {
        if nbf > now as f64 {
            log.error(
                format!("JWS payload is not valid before {} (now {})", nbf, now),
                ErrorCode::NotYetValid,
            );
        }
    }
    if let Some(exp) = json.get("exp").and_then(Value::as_f64) {
        if exp < now as f64 {
            log.error(
                format!("JWS payload expired at {} (now {})", exp, now),
                ErrorCode::Expiration,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::log::Level;

    const NOW: i64 = 1_700_000_000;

    fn config() -> ValidatorConfig {
        ValidatorConfig {
            now: Some(NOW),
            ..ValidatorConfig::default()
        }
    }

    fn payload() -> Value {
        json!({
            "iss": "https://example.org/issuer",
            "nbf": NOW - 60,
            "vc": {
                "type": [HEALTH_CARD_VC_TYPE],
                "credentialSubject": {
                    "fhirVersion": "4.0.1",
                    "fhirBundle": {
                        "resourceType": "Bundle",
                        "type": "collection",
                        "entry": [{ "fullUrl": "resource:0", "resource": { "resourceType": "Patient" } }]
                    }
                }
            }
        })
    }

    #[test]
    fn valid_payload_exposes_claims_and_bundle() {
        let result = validate(&payload().to_string(), &config());
        let parsed = result.result.unwrap();

        assert_eq!(parsed.iss(), Some("https://example.org/issuer"));
        assert_eq!(parsed.claims.unwrap().vc.credential_subject.fhir_version, "4.0.1");
        assert!(parsed.fhir_bundle.is_some());
        assert!(result.log.level() <= Some(Level::Info));
    }

    #[test]
    fn invalid_json_is_fatal() {
        let result = validate("\u{1}\u{2}binary", &config());
        assert!(result.result.is_none());
        assert!(result.log.has_code(ErrorCode::JsonParseError));
    }

    #[test]
    fn schema_violation_keeps_payload() {
        let mut json = payload();
        json.as_object_mut().unwrap().remove("nbf");

        let result = validate(&json.to_string(), &config());
        let parsed = result.result.unwrap();

        assert!(parsed.claims.is_none());
        assert_eq!(parsed.iss(), Some("https://example.org/issuer"));
        assert!(result.log.has_code(ErrorCode::SchemaError));
    }

    #[test]
    fn missing_health_card_type_is_error() {
        let mut json = payload();
        json["vc"]["type"] = json!(["VerifiableCredential"]);

        let result = validate(&json.to_string(), &config());
        assert!(result.log.has_code(ErrorCode::SchemaError));
    }

    #[test]
    fn future_nbf_and_past_exp_are_errors() {
        let mut json = payload();
        json["nbf"] = json!(NOW + 3600);
        json["exp"] = json!(NOW - 3600);

        let result = validate(&json.to_string(), &config());
        assert!(result.log.has_code(ErrorCode::NotYetValid));
        assert!(result.log.has_code(ErrorCode::Expiration));
        assert!(result.result.is_some());
    }

    #[test]
    fn missing_bundle_is_error_not_fatal() {
        let mut json = payload();
        json["vc"]["credentialSubject"]
            .as_object_mut()
            .unwrap()
            .remove("fhirBundle");

        let result = validate(&json.to_string(), &config());
        assert!(result.log.has_code(ErrorCode::CriticalDataMissing));
        assert!(result.result.unwrap().fhir_bundle.is_none());
    }
}

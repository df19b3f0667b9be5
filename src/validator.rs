//! Message body validation.
//!
//! A producer may carry one [`SchemaValidator`]. The validator is bound to a
//! content type and checks message bodies before anything is sent. The
//! producer only talks to the trait; concrete validators are injected through
//! a factory when the validator is installed (see
//! [`Producer::set_validator`](crate::Producer::set_validator)).
//!
//! # Example
//!
//! ```rust
//! use amqp_producer::validator::{JsonSchemaValidator, SchemaValidator};
//! use serde_json::json;
//!
//! let schema = json!({
//!     "type": "object",
//!     "properties": { "order_id": { "$ref": "#/definitions/id" } },
//!     "required": ["order_id"]
//! });
//! let definitions = json!({ "id": { "type": "integer", "minimum": 1 } });
//!
//! let validator = JsonSchemaValidator::new(schema, definitions).unwrap();
//! assert!(validator.validate(br#"{"order_id": 7}"#).is_ok());
//! assert!(validator.validate(br#"{"order_id": 0}"#).is_err());
//! ```

use crate::{Error, Result};
use jsonschema::Validator;
use serde_json::Value;

/// Outcome of checking a body: `Ok(())` or a human readable reason.
pub type ValidationOutcome = std::result::Result<(), String>;

/// Checks message bodies against a schema bound to one content type.
pub trait SchemaValidator: Send + Sync {
    /// The content type this validator understands.
    fn content_type(&self) -> &str;

    /// Validates a message body.
    ///
    /// Malformed input is reported as a failed outcome, never as a panic.
    fn validate(&self, body: &[u8]) -> ValidationOutcome;
}

/// Validates `application/json` bodies against a JSON Schema.
///
/// The definitions bundle is merged into the schema's `definitions` so that
/// `#/definitions/<name>` references resolve. Definitions already present in
/// the schema take precedence over the bundle.
pub struct JsonSchemaValidator {
    validator: Validator,
}

impl JsonSchemaValidator {
    pub const CONTENT_TYPE: &'static str = "application/json";

    pub fn new(schema: Value, definitions: Value) -> Result<Self> {
        let schema = merge_definitions(schema, definitions)?;
        let validator = jsonschema::validator_for(&schema).map_err(|e| Error::Schema {
            message: e.to_string(),
        })?;

        Ok(Self { validator })
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn content_type(&self) -> &str {
        Self::CONTENT_TYPE
    }

    fn validate(&self, body: &[u8]) -> ValidationOutcome {
        let instance: Value =
            serde_json::from_slice(body).map_err(|e| format!("invalid JSON: {}", e))?;

        let errors: Vec<String> = self
            .validator
            .iter_errors(&instance)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    format!("(root): {}", e)
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}

fn merge_definitions(mut schema: Value, definitions: Value) -> Result<Value> {
    let bundle = match definitions {
        Value::Null => return Ok(schema),
        Value::Object(map) => map,
        _ => {
            return Err(Error::Schema {
                message: "definitions must be a JSON object".to_string(),
            })
        }
    };

    let root = schema.as_object_mut().ok_or_else(|| Error::Schema {
        message: "schema must be a JSON object".to_string(),
    })?;

    let target = root
        .entry("definitions")
        .or_insert_with(|| Value::Object(Default::default()));
    let target = target.as_object_mut().ok_or_else(|| Error::Schema {
        message: "schema 'definitions' must be a JSON object".to_string(),
    })?;

    for (name, definition) in bundle {
        target.entry(name).or_insert(definition);
    }

    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "$ref": "#/definitions/positive" },
                "sku": { "type": "string" }
            },
            "required": ["id"]
        })
    }

    #[test]
    fn test_valid_body() {
        let validator =
            JsonSchemaValidator::new(order_schema(), json!({ "positive": { "type": "integer", "minimum": 1 } }))
                .unwrap();

        assert_eq!(validator.content_type(), "application/json");
        assert!(validator.validate(br#"{"id": 3, "sku": "A-1"}"#).is_ok());
    }

    #[test]
    fn test_schema_violation_reports_path() {
        let validator =
            JsonSchemaValidator::new(order_schema(), json!({ "positive": { "type": "integer", "minimum": 1 } }))
                .unwrap();

        let error = validator.validate(br#"{"id": -4}"#).unwrap_err();
        assert!(error.contains("/id"), "unexpected error: {}", error);

        let error = validator.validate(br#"{"sku": "A-1"}"#).unwrap_err();
        assert!(error.starts_with("(root)"), "unexpected error: {}", error);
    }

    #[test]
    fn test_malformed_body_is_failure() {
        let validator = JsonSchemaValidator::new(json!({ "type": "object" }), Value::Null).unwrap();

        let error = validator.validate(b"{not json").unwrap_err();
        assert!(error.starts_with("invalid JSON"));
    }

    #[test]
    fn test_schema_definitions_take_precedence() {
        let schema = json!({
            "type": "object",
            "properties": { "n": { "$ref": "#/definitions/num" } },
            "definitions": { "num": { "type": "string" } }
        });
        let validator = JsonSchemaValidator::new(schema, json!({ "num": { "type": "integer" } })).unwrap();

        assert!(validator.validate(br#"{"n": "seven"}"#).is_ok());
        assert!(validator.validate(br#"{"n": 7}"#).is_err());
    }

    #[test]
    fn test_invalid_definitions_bundle() {
        let result = JsonSchemaValidator::new(json!({ "type": "object" }), json!(["not", "a", "map"]));
        assert!(matches!(result, Err(Error::Schema { .. })));
    }

    #[test]
    fn test_uncompilable_schema() {
        let result = JsonSchemaValidator::new(json!({ "type": 12 }), Value::Null);
        assert!(matches!(result, Err(Error::Schema { .. })));
    }
}

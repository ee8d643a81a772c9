//! Argument schema validation for capability calls.
//!
//! Every capability method has one JSON Schema describing its arguments.
//! Schemas are compiled once when the [`SchemaTable`] is built and reused for
//! every call. Unknown properties are rejected (`additionalProperties: false`)
//! on every method and nested object.

use std::collections::HashMap;

use jsonschema::Validator;
use serde_json::{json, Value};

use crate::capability::methods;
use crate::error::GatewayError;

/// A compiled argument schema.
pub struct ArgSchema {
    validator: Validator,
}

impl ArgSchema {
    /// Create a schema from JSON Schema content.
    pub fn from_json(schema_json: &str) -> Result<Self, GatewayError> {
        let schema: Value = serde_json::from_str(schema_json)
            .map_err(|e| GatewayError::SchemaParse(e.to_string()))?;

        Self::from_value(&schema)
    }

    /// Create a schema from a parsed JSON value.
    pub fn from_value(schema: &Value) -> Result<Self, GatewayError> {
        let validator = Validator::new(schema)
            .map_err(|e| GatewayError::SchemaParse(format!("invalid JSON Schema: {}", e)))?;

        Ok(Self { validator })
    }

    /// Validate a value, collecting every violation into one message.
    pub fn validate(&self, args: &Value) -> Result<(), String> {
        let messages: Vec<String> = self
            .validator
            .iter_errors(args)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect();

        if messages.is_empty() {
            Ok(())
        } else {
            Err(messages.join("; "))
        }
    }
}

/// Compiled schemas for every capability method.
pub struct SchemaTable {
    schemas: HashMap<&'static str, ArgSchema>,
}

impl SchemaTable {
    /// Compile the built-in schemas for the capability table.
    pub fn builtin() -> Result<Self, GatewayError> {
        let mut schemas = HashMap::new();
        for (method, schema) in builtin_schemas() {
            schemas.insert(method, ArgSchema::from_value(&schema)?);
        }
        Ok(Self { schemas })
    }

    /// Validate `args` for `method`.
    ///
    /// Methods without a schema pass unvalidated. That path is reserved for
    /// trusted internal calls; the built-in table registers a schema for
    /// every method.
    pub fn validate(&self, method: &str, args: &Value) -> Result<(), String> {
        match self.schemas.get(method) {
            Some(schema) => schema.validate(args),
            None => Ok(()),
        }
    }

    /// Whether `method` has a registered schema.
    pub fn contains(&self, method: &str) -> bool {
        self.schemas.contains_key(method)
    }

    /// Registered method names.
    pub fn methods(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.schemas.keys().copied()
    }
}

fn topic_property() -> Value {
    json!({ "type": "string", "minLength": 1, "maxLength": 256 })
}

fn builtin_schemas() -> Vec<(&'static str, Value)> {
    vec![
        (
            methods::GET_SERIES,
            json!({
                "type": "object",
                "required": ["id", "from", "to", "step"],
                "properties": {
                    "id": { "type": "string", "minLength": 1, "maxLength": 128 },
                    "from": { "type": "number" },
                    "to": { "type": "number" },
                    "step": { "type": "integer", "minimum": 1 }
                },
                "additionalProperties": false
            }),
        ),
        (
            methods::RAISE_ALERT,
            json!({
                "type": "object",
                "required": ["severity", "title"],
                "properties": {
                    "severity": { "enum": ["info", "warning", "error", "critical"] },
                    "title": { "type": "string", "minLength": 1, "maxLength": 200 },
                    "details": { "type": "string", "maxLength": 4000 }
                },
                "additionalProperties": false
            }),
        ),
        (
            methods::REGISTER_WIDGET,
            json!({
                "type": "object",
                "required": ["id", "name"],
                "properties": {
                    "id": { "type": "string", "minLength": 1, "maxLength": 64 },
                    "name": { "type": "string", "minLength": 1, "maxLength": 128 },
                    "size": {
                        "type": "object",
                        "required": ["w", "h"],
                        "properties": {
                            "w": { "type": "integer", "minimum": 1 },
                            "h": { "type": "integer", "minimum": 1 }
                        },
                        "additionalProperties": false
                    }
                },
                "additionalProperties": false
            }),
        ),
        (
            methods::BUS_SUBSCRIBE,
            json!({
                "type": "object",
                "required": ["topic"],
                "properties": { "topic": topic_property() },
                "additionalProperties": false
            }),
        ),
        (
            methods::BUS_UNSUBSCRIBE,
            json!({
                "type": "object",
                "required": ["topic"],
                "properties": { "topic": topic_property() },
                "additionalProperties": false
            }),
        ),
        (
            methods::BUS_PUBLISH,
            json!({
                "type": "object",
                "required": ["topic"],
                "properties": {
                    "topic": topic_property(),
                    "payload": {}
                },
                "additionalProperties": false
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SchemaTable {
        SchemaTable::builtin().unwrap()
    }

    #[test]
    fn every_method_has_a_schema() {
        let table = table();
        for method in methods::ALL {
            assert!(table.contains(method), "missing schema for {}", method);
        }
        assert_eq!(table.methods().count(), methods::ALL.len());
    }

    #[test]
    fn get_series_requires_all_fields() {
        let table = table();
        let valid = json!({"id": "cpu", "from": 0, "to": 60, "step": 5});
        assert!(table.validate(methods::GET_SERIES, &valid).is_ok());

        for field in ["id", "from", "to", "step"] {
            let mut args = valid.clone();
            args.as_object_mut().unwrap().remove(field);
            let err = table.validate(methods::GET_SERIES, &args).unwrap_err();
            assert!(err.contains(field), "error should name {}: {}", field, err);
        }
    }

    #[test]
    fn get_series_step_must_be_positive() {
        let table = table();
        let zero = json!({"id": "cpu", "from": 0, "to": 60, "step": 0});
        assert!(table.validate(methods::GET_SERIES, &zero).is_err());

        let fractional = json!({"id": "cpu", "from": 0, "to": 60, "step": 1.5});
        assert!(table.validate(methods::GET_SERIES, &fractional).is_err());
    }

    #[test]
    fn alert_severity_is_enumerated() {
        let table = table();
        for severity in ["info", "warning", "error", "critical"] {
            let args = json!({"severity": severity, "title": "disk"});
            assert!(table.validate(methods::RAISE_ALERT, &args).is_ok());
        }
        let bad = json!({"severity": "fatal", "title": "disk"});
        assert!(table.validate(methods::RAISE_ALERT, &bad).is_err());
    }

    #[test]
    fn extra_properties_are_rejected() {
        let table = table();
        let extra = json!({"topic": "public:x", "sneaky": true});
        assert!(table.validate(methods::BUS_SUBSCRIBE, &extra).is_err());

        let nested = json!({"id": "w", "name": "W", "size": {"w": 1, "h": 1, "d": 1}});
        assert!(table.validate(methods::REGISTER_WIDGET, &nested).is_err());
    }

    #[test]
    fn publish_payload_is_optional_and_untyped() {
        let table = table();
        assert!(table
            .validate(methods::BUS_PUBLISH, &json!({"topic": "public:t"}))
            .is_ok());
        assert!(table
            .validate(
                methods::BUS_PUBLISH,
                &json!({"topic": "public:t", "payload": [1, {"a": null}]})
            )
            .is_ok());
    }

    #[test]
    fn non_object_args_are_rejected() {
        let table = table();
        assert!(table.validate(methods::BUS_SUBSCRIBE, &json!(null)).is_err());
        assert!(table.validate(methods::BUS_SUBSCRIBE, &json!("public:x")).is_err());
    }

    #[test]
    fn unregistered_method_is_not_validated() {
        let table = table();
        assert!(table.validate("internal.trusted", &json!(42)).is_ok());
    }

    #[test]
    fn schema_from_json() {
        let schema = ArgSchema::from_json(
            r#"{"type": "object", "required": ["quota"], "properties": {"quota": {"type": "integer"}}}"#,
        )
        .unwrap();
        assert!(schema.validate(&json!({"quota": 1})).is_ok());
        assert!(schema.validate(&json!({})).is_err());
        assert!(ArgSchema::from_json("not json").is_err());
    }
}

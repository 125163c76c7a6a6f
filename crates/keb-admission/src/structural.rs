//! Structural validation of raw parameters against a plan schema.

use keb_core::{BrokerError, BrokerResult};
use serde_json::Value;
use tracing::warn;

/// Which request the parameters belong to; only changes the message prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Create,
    Update,
}

impl SchemaKind {
    fn prefix(self) -> &'static str {
        match self {
            SchemaKind::Create => "while validating input parameters",
            SchemaKind::Update => "while validating update parameters",
        }
    }
}

/// Validate `raw` against `schema` (draft-04). All violations are reported
/// in one 400 message.
///
/// An empty schema accepts anything. Absent parameters validate as `{}`.
pub fn validate_against_schema(schema: &Value, raw: Option<&Value>, kind: SchemaKind) -> BrokerResult<()> {
    if schema.as_object().is_none_or(|m| m.is_empty()) {
        return Ok(());
    }
    let empty = Value::Object(Default::default());
    let instance = match raw {
        None | Some(Value::Null) => &empty,
        Some(v) => v,
    };

    let validator = jsonschema::draft4::options().build(schema).map_err(|e| {
        warn!(error = %e, "plan schema does not compile");
        BrokerError::internal("unable to validate parameters", e)
    })?;

    let errors: Vec<String> = validator
        .iter_errors(instance)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{path}: {e}")
            }
        })
        .collect();
    if errors.is_empty() {
        return Ok(());
    }
    Err(BrokerError::bad_request(format!("{}: {}", kind.prefix(), errors.join(", "))))
}

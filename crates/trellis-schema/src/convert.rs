//! Attribute converters: runtime value to persisted scalar and back.
//!
//! Converters are selected from an explicit registration table keyed by
//! (type, field), populated during startup configuration. Fields without a
//! registered converter must already hold persistable scalars.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use trellis_core::{TypeKey, Value};

/// Converts one field's runtime value to and from its stored form.
pub trait AttributeConverter: Send + Sync {
    fn to_persisted(&self, value: &Value) -> anyhow::Result<Value>;
    fn from_persisted(&self, value: &Value) -> anyhow::Result<Value>;
}

/// Registration table mapping (type, field) to a converter.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<(TypeKey, String), Arc<dyn AttributeConverter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter, chained builder-style at startup.
    pub fn with(
        mut self,
        type_key: impl Into<TypeKey>,
        field: impl Into<String>,
        converter: Arc<dyn AttributeConverter>,
    ) -> Self {
        self.register(type_key, field, converter);
        self
    }

    pub fn register(
        &mut self,
        type_key: impl Into<TypeKey>,
        field: impl Into<String>,
        converter: Arc<dyn AttributeConverter>,
    ) {
        self.converters
            .insert((type_key.into(), field.into()), converter);
    }

    pub fn converter_for(&self, type_key: &TypeKey, field: &str) -> Option<&dyn AttributeConverter> {
        self.converters
            .get(&(type_key.clone(), field.to_string()))
            .map(Arc::as_ref)
    }
}

// ── Built-in converters ───────────────────────────────────────────

/// `DateTime<Utc>` stored as epoch milliseconds.
pub struct DateTimeEpochMillis;

impl AttributeConverter for DateTimeEpochMillis {
    fn to_persisted(&self, value: &Value) -> anyhow::Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::DateTime(dt) => Ok(Value::Int(dt.timestamp_millis())),
            other => bail!("expected a datetime, got {other:?}"),
        }
    }

    fn from_persisted(&self, value: &Value) -> anyhow::Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Int(ms) => {
                let dt = Utc
                    .timestamp_millis_opt(*ms)
                    .single()
                    .ok_or_else(|| anyhow!("{ms} is out of range for an epoch-millis timestamp"))?;
                Ok(Value::DateTime(dt))
            }
            other => bail!("expected epoch milliseconds, got {other:?}"),
        }
    }
}

/// `DateTime<Utc>` stored as an ISO-8601 (RFC 3339) string.
pub struct DateTimeIso8601;

impl AttributeConverter for DateTimeIso8601 {
    fn to_persisted(&self, value: &Value) -> anyhow::Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::DateTime(dt) => Ok(Value::String(dt.to_rfc3339())),
            other => bail!("expected a datetime, got {other:?}"),
        }
    }

    fn from_persisted(&self, value: &Value) -> anyhow::Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::String(s) => {
                let dt = DateTime::parse_from_rfc3339(s)
                    .with_context(|| format!("`{s}` is not an ISO-8601 timestamp"))?;
                Ok(Value::DateTime(dt.with_timezone(&Utc)))
            }
            other => bail!("expected an ISO-8601 string, got {other:?}"),
        }
    }
}

/// `Uuid` stored as its hyphenated string form.
pub struct UuidString;

impl AttributeConverter for UuidString {
    fn to_persisted(&self, value: &Value) -> anyhow::Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Uuid(u) => Ok(Value::String(u.to_string())),
            other => bail!("expected a uuid, got {other:?}"),
        }
    }

    fn from_persisted(&self, value: &Value) -> anyhow::Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::String(s) => {
                let u = Uuid::parse_str(s).with_context(|| format!("`{s}` is not a uuid"))?;
                Ok(Value::Uuid(u))
            }
            other => bail!("expected a uuid string, got {other:?}"),
        }
    }
}

/// Numbers stored as strings, for stores that cannot hold 64-bit values
/// losslessly.
pub struct NumberString;

impl AttributeConverter for NumberString {
    fn to_persisted(&self, value: &Value) -> anyhow::Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Int(i) => Ok(Value::String(i.to_string())),
            Value::Float(x) => Ok(Value::String(x.to_string())),
            other => bail!("expected a number, got {other:?}"),
        }
    }

    fn from_persisted(&self, value: &Value) -> anyhow::Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::String(s) => {
                if let Ok(i) = s.parse::<i64>() {
                    return Ok(Value::Int(i));
                }
                let x = s
                    .parse::<f64>()
                    .with_context(|| format!("`{s}` is not a number"))?;
                Ok(Value::Float(x))
            }
            other => bail!("expected a number string, got {other:?}"),
        }
    }
}

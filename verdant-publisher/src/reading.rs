//! Raw readings and the parse boundary.
//!
//! Everything entering the pipeline passes through `Reading::from_json` (push
//! bodies) or `Reading::from_text` (file drops). Past this point a reading is
//! well-typed: a kind, a capture timestamp and scalar fields only. Raw strings
//! are never threaded further into the pipeline.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

use crate::error::PipelineError;

/// Body key that carries the reading kind.
pub const KIND_KEY: &str = "sensor_type";

/// Body keys that never become measurement fields. `local_time` is the sensor's
/// own clock; the publisher stamps points with its own time instead.
const RESERVED_KEYS: &[&str] = &[KIND_KEY, "local_time"];

/// One scalar measurement value.
///
/// Equality is raw-representation equality: two floats that differ in their
/// last digit are different values and both get sent.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    Text(String),
}

impl FieldValue {
    /// Converts a JSON scalar; arrays, objects and nulls have no field form.
    pub fn from_json(value: &Value) -> Option<FieldValue> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(FieldValue::Integer(i))
                } else {
                    n.as_f64().map(FieldValue::Float)
                }
            }
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            Value::Bool(b) => Some(FieldValue::Boolean(*b)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Boolean(v) => write!(f, "{v}"),
            FieldValue::Text(v) => write!(f, "{v}"),
        }
    }
}

/// The dedup cache key and the field key written to the sinks.
pub fn measurement_key(kind: &str, field_name: &str) -> String {
    format!("{kind}-{field_name}")
}

/// One raw measurement batch from a source. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct Reading {
    pub kind: String,
    pub captured_at: DateTime<Utc>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Reading {
    /// Validates a JSON body into a reading.
    ///
    /// Requires a non-empty `sensor_type` string and at least one usable scalar
    /// field. Reserved keys are stripped; non-scalar values and empty field
    /// names are dropped with a warning rather than failing the whole reading.
    pub fn from_json(body: &Value) -> Result<Reading, PipelineError> {
        let obj = body
            .as_object()
            .ok_or_else(|| PipelineError::MalformedReading("body is not a JSON object".into()))?;

        let kind = obj
            .get(KIND_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                PipelineError::MalformedReading(format!("missing or empty '{KIND_KEY}' key"))
            })?
            .to_string();

        let mut fields = BTreeMap::new();
        for (key, value) in obj {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            if key.is_empty() {
                warn!("Dropping field with empty name from {kind} reading");
                continue;
            }
            match FieldValue::from_json(value) {
                Some(v) => {
                    fields.insert(key.clone(), v);
                }
                None => {
                    warn!("Dropping non-scalar field '{key}' from {kind} reading");
                }
            }
        }

        if fields.is_empty() {
            return Err(PipelineError::MalformedReading(format!(
                "{kind} reading has no usable fields"
            )));
        }

        Ok(Reading {
            kind,
            captured_at: Utc::now(),
            fields,
        })
    }

    /// Parses file content into a reading.
    ///
    /// The oldest sensor images render their drop files with single quotes
    /// (a stringified dict, not JSON). A failed parse is retried once with
    /// quotes substituted before the content is rejected.
    pub fn from_text(text: &str) -> Result<Reading, PipelineError> {
        let parsed: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(first_err) => serde_json::from_str(&text.replace('\'', "\"")).map_err(|_| {
                PipelineError::MalformedReading(format!("unparseable content: {first_err}"))
            })?,
        };
        Reading::from_json(&parsed)
    }

    /// Dedup/sink key for one of this reading's fields.
    pub fn measurement_key(&self, field_name: &str) -> String {
        measurement_key(&self.kind, field_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_push_body() {
        let body = json!({
            "sensor_type": "bme680",
            "temperature_c": 21.5,
            "humidity": 40,
            "heater_stable": true,
            "status": "ok",
            "local_time": "2024-03-01 10:00:00"
        });

        let reading = Reading::from_json(&body).unwrap();
        assert_eq!(reading.kind, "bme680");
        assert_eq!(
            reading.fields.get("temperature_c"),
            Some(&FieldValue::Float(21.5))
        );
        assert_eq!(reading.fields.get("humidity"), Some(&FieldValue::Integer(40)));
        assert_eq!(
            reading.fields.get("heater_stable"),
            Some(&FieldValue::Boolean(true))
        );
        assert_eq!(
            reading.fields.get("status"),
            Some(&FieldValue::Text("ok".into()))
        );
        // Reserved keys never become fields.
        assert!(!reading.fields.contains_key("sensor_type"));
        assert!(!reading.fields.contains_key("local_time"));
    }

    #[test]
    fn rejects_missing_kind() {
        let err = Reading::from_json(&json!({"temperature_c": 21.5})).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedReading(_)));
    }

    #[test]
    fn rejects_reading_without_usable_fields() {
        let err = Reading::from_json(&json!({
            "sensor_type": "bme680",
            "local_time": "2024-03-01 10:00:00",
            "samples": [1, 2, 3]
        }))
        .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedReading(_)));
    }

    #[test]
    fn drops_non_scalar_fields_only() {
        let reading = Reading::from_json(&json!({
            "sensor_type": "hm3301",
            "pm25": 12,
            "raw": {"a": 1}
        }))
        .unwrap();
        assert_eq!(reading.fields.len(), 1);
        assert!(reading.fields.contains_key("pm25"));
    }

    #[test]
    fn drops_fields_with_empty_names() {
        let reading = Reading::from_json(&json!({
            "sensor_type": "hm3301",
            "pm25": 12,
            "": 7
        }))
        .unwrap();
        assert_eq!(reading.fields.len(), 1);
        assert!(reading.fields.contains_key("pm25"));
    }

    #[test]
    fn repairs_single_quoted_drop_files() {
        let reading =
            Reading::from_text("{'sensor_type': 'bme680', 'temperature_c': 21.5}").unwrap();
        assert_eq!(reading.kind, "bme680");
        assert_eq!(
            reading.fields.get("temperature_c"),
            Some(&FieldValue::Float(21.5))
        );
    }

    #[test]
    fn rejects_garbage_text() {
        let err = Reading::from_text("not json at all").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedReading(_)));
    }

    #[test]
    fn measurement_key_joins_kind_and_field() {
        assert_eq!(measurement_key("bme680", "temperature_c"), "bme680-temperature_c");
    }

    #[test]
    fn float_values_compare_on_raw_representation() {
        assert_ne!(FieldValue::Float(21.5), FieldValue::Float(21.50001));
        assert_ne!(FieldValue::Integer(21), FieldValue::Float(21.0));
    }

    #[test]
    fn field_values_render_raw_forms() {
        assert_eq!(FieldValue::Float(21.5).to_string(), "21.5");
        assert_eq!(FieldValue::Integer(40).to_string(), "40");
        assert_eq!(FieldValue::Boolean(true).to_string(), "true");
        assert_eq!(FieldValue::Text("ok".into()).to_string(), "ok");
    }
}

//! Canonical time-series points.
//!
//! Every reading field becomes two points under the `reading` measurement: one
//! tagged with the node's own identity, one tagged with the fixed lake identity
//! so the aggregate bucket receives every node's data under a single tenant.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::reading::{measurement_key, FieldValue};

pub const MEASUREMENT: &str = "reading";

/// Aggregate identity the lake bucket is tagged with, regardless of node config.
pub const LAKE_FRIENDLY_NAME: &str = "Data Lake";
pub const LAKE_CUSTOMER_ID: &str = "VGT";

/// Per-node identity tags from configuration.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub friendly_name: String,
    pub customer_id: String,
}

/// A fully tagged, sink-ready datum. Immutable once built.
#[derive(Debug, Clone)]
pub struct Point {
    pub measurement: &'static str,
    pub tags: BTreeMap<String, String>,
    pub kind: String,
    pub field_name: String,
    pub value: FieldValue,
    pub timestamp: DateTime<Utc>,
}

impl Point {
    /// Field key on the wire: the measurement key, so every kind's series stay
    /// distinguishable inside the shared `reading` measurement.
    pub fn series_key(&self) -> String {
        measurement_key(&self.kind, &self.field_name)
    }

    /// Renders the point as one InfluxDB line protocol record with nanosecond
    /// timestamp precision.
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape_measurement(self.measurement);
        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape_tag(key));
            line.push('=');
            line.push_str(&escape_tag(value));
        }
        line.push(' ');
        line.push_str(&escape_tag(&self.series_key()));
        line.push('=');
        line.push_str(&render_field_value(&self.value));
        line.push(' ');
        line.push_str(
            &self
                .timestamp
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_string(),
        );
        line
    }
}

/// Tenant and lake points for one reading field. Always built together.
#[derive(Debug, Clone)]
pub struct PointPair {
    pub tenant: Point,
    pub lake: Point,
}

/// Turns (kind, field, value) tuples into point pairs for the node it was
/// constructed with. Building never fails; malformed readings are rejected at
/// the parse boundary before reaching this type.
#[derive(Debug, Clone)]
pub struct PointBuilder {
    identity: NodeIdentity,
}

impl PointBuilder {
    pub fn new(identity: NodeIdentity) -> Self {
        Self { identity }
    }

    /// Builds the tenant/lake pair. Both points share one timestamp taken here,
    /// at build time, so the two bucket rows for a field always align.
    pub fn build(&self, kind: &str, field_name: &str, value: FieldValue) -> PointPair {
        let timestamp = Utc::now();
        let tenant = Point {
            measurement: MEASUREMENT,
            tags: identity_tags(&self.identity.friendly_name, &self.identity.customer_id),
            kind: kind.to_string(),
            field_name: field_name.to_string(),
            value: value.clone(),
            timestamp,
        };
        let lake = Point {
            measurement: MEASUREMENT,
            tags: identity_tags(LAKE_FRIENDLY_NAME, LAKE_CUSTOMER_ID),
            kind: kind.to_string(),
            field_name: field_name.to_string(),
            value,
            timestamp,
        };
        PointPair { tenant, lake }
    }
}

fn identity_tags(friendly_name: &str, customer_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("friendly_name".to_string(), friendly_name.to_string()),
        ("customer_id".to_string(), customer_id.to_string()),
    ])
}

fn render_field_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Float(v) => format!("{v}"),
        FieldValue::Integer(v) => format!("{v}i"),
        FieldValue::Boolean(v) => format!("{v}"),
        FieldValue::Text(v) => format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")),
    }
}

// Line protocol escaping: measurements escape commas and spaces; tag keys,
// tag values and field keys additionally escape equals signs.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_tag(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

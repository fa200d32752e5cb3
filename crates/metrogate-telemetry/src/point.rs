//! Telemetry points and their line-protocol encoding.
//!
//! A [`TelemetryPoint`] is built once through [`PointBuilder`] and never
//! changes afterwards; the pipeline only moves it between buffers.
//!
//! # Line Protocol
//!
//! ```text
//! measurement,tag1=v1,tag2=v2 field1=1i,field2=true,field3="text" 1760000000000000000
//! ```
//!
//! Tags and fields are written in key order. Timestamps are UTC nanoseconds.
//!
//! # Examples
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use metrogate_telemetry::TelemetryPoint;
//!
//! let point = TelemetryPoint::builder("metro_access")
//!     .tag("door", "canceladora_1")
//!     .field("access_granted", true)
//!     .timestamp(Utc.timestamp_opt(1, 0).unwrap())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(
//!     point.to_line_protocol(),
//!     "metro_access,door=canceladora_1 access_granted=true 1000000000"
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{self, Write};

use crate::error::{Result, TelemetryError};

/// Typed field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

impl FieldValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(value) => Some(value),
            _ => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<usize> for FieldValue {
    fn from(value: usize) -> Self {
        FieldValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(value) => write!(f, "{value}i"),
            FieldValue::Float(value) => write!(f, "{value}"),
            FieldValue::Boolean(value) => write!(f, "{value}"),
            FieldValue::String(value) => {
                f.write_char('"')?;
                for c in value.chars() {
                    match c {
                        '\n' | '\r' => f.write_char(' ')?,
                        '"' | '\\' => {
                            f.write_char('\\')?;
                            f.write_char(c)?;
                        }
                        c => f.write_char(c)?,
                    }
                }
                f.write_char('"')
            }
        }
    }
}

/// One immutable timestamped record destined for the time-series backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryPoint {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: DateTime<Utc>,
}

impl TelemetryPoint {
    /// Start building a point for `measurement`.
    pub fn builder(measurement: impl Into<String>) -> PointBuilder {
        PointBuilder {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Encode as one line of InfluxDB line protocol (no trailing newline).
    pub fn to_line_protocol(&self) -> String {
        let mut line = String::with_capacity(128);
        // Writing into a String cannot fail.
        let _ = self.write_line_protocol(&mut line);
        line
    }

    fn write_line_protocol(&self, out: &mut String) -> fmt::Result {
        escape_into(out, &self.measurement, &[',', ' ']);

        for (key, value) in &self.tags {
            out.push(',');
            escape_into(out, key, &[',', '=', ' ']);
            out.push('=');
            escape_into(out, value, &[',', '=', ' ']);
        }

        let mut separator = ' ';
        for (key, value) in &self.fields {
            out.push(separator);
            escape_into(out, key, &[',', '=', ' ']);
            write!(out, "={value}")?;
            separator = ',';
        }

        if let Some(nanos) = self.timestamp.timestamp_nanos_opt() {
            write!(out, " {nanos}")?;
        }
        Ok(())
    }
}

/// Escape a measurement, key or tag value.
///
/// Line breaks become escaped spaces so a point always stays on one line. A
/// backslash is doubled only where the parser would otherwise read it as an
/// escape: before a special character, another backslash, or the end.
fn escape_into(out: &mut String, raw: &str, special: &[char]) {
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' | '\r' => out.push_str("\\ "),
            '\\' => {
                let escapes_next = chars
                    .peek()
                    .is_none_or(|next| matches!(next, '\\' | '\n' | '\r') || special.contains(next));
                if escapes_next {
                    out.push('\\');
                }
                out.push('\\');
            }
            c if special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}

/// Builder for [`TelemetryPoint`].
#[derive(Debug, Clone)]
pub struct PointBuilder {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: Option<DateTime<Utc>>,
}

impl PointBuilder {
    /// Add a tag. Empty values are skipped, line protocol has no empty tags.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.tags.insert(key.into(), value);
        }
        self
    }

    /// Add a field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set the timestamp (defaults to now).
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Build the point.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::InvalidPoint` if the measurement is empty, no
    /// field was added, or a float field is not finite.
    pub fn build(self) -> Result<TelemetryPoint> {
        if self.measurement.is_empty() {
            return Err(TelemetryError::InvalidPoint(
                "measurement name is empty".to_string(),
            ));
        }

        if self.fields.is_empty() {
            return Err(TelemetryError::InvalidPoint(format!(
                "{} has no fields",
                self.measurement
            )));
        }

        if let Some((key, _)) = self
            .fields
            .iter()
            .find(|(_, value)| matches!(value, FieldValue::Float(v) if !v.is_finite()))
        {
            return Err(TelemetryError::InvalidPoint(format!(
                "{}.{key} is not a finite number",
                self.measurement
            )));
        }

        Ok(self.finish())
    }

    /// Build without validation, for the fixed schemas in this crate.
    pub(crate) fn finish(self) -> TelemetryPoint {
        TelemetryPoint {
            measurement: self.measurement,
            tags: self.tags,
            fields: self.fields,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

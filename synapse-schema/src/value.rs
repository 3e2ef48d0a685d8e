//! Scalar kinds, runtime values and records
//!
//! Values enter the system as JSON and are coerced against the declared
//! [`ScalarKind`] of the field, parameter or filter operand they target. After
//! coercion every comparison happens between values of the same kind.

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeDelta, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Scalar kind of a field, method parameter or return value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Time,
    #[serde(alias = "date_time")]
    Datetime,
    Decimal,
    Uuid,
    Duration,
    Json,
}

impl ScalarKind {
    /// All kinds, in declaration order
    pub const ALL: [ScalarKind; 11] = [
        ScalarKind::String,
        ScalarKind::Integer,
        ScalarKind::Float,
        ScalarKind::Boolean,
        ScalarKind::Date,
        ScalarKind::Time,
        ScalarKind::Datetime,
        ScalarKind::Decimal,
        ScalarKind::Uuid,
        ScalarKind::Duration,
        ScalarKind::Json,
    ];

    /// Registry spelling of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Integer => "integer",
            ScalarKind::Float => "float",
            ScalarKind::Boolean => "boolean",
            ScalarKind::Date => "date",
            ScalarKind::Time => "time",
            ScalarKind::Datetime => "datetime",
            ScalarKind::Decimal => "decimal",
            ScalarKind::Uuid => "uuid",
            ScalarKind::Duration => "duration",
            ScalarKind::Json => "json",
        }
    }

    /// Name of the scalar in the generated surface
    pub fn graphql_name(&self) -> &'static str {
        match self {
            ScalarKind::String => "String",
            ScalarKind::Integer => "Int",
            ScalarKind::Float => "Float",
            ScalarKind::Boolean => "Boolean",
            ScalarKind::Date => "Date",
            ScalarKind::Time => "Time",
            ScalarKind::Datetime => "DateTime",
            ScalarKind::Decimal => "Decimal",
            ScalarKind::Uuid => "UUID",
            ScalarKind::Duration => "Duration",
            ScalarKind::Json => "JSON",
        }
    }

    /// Whether `<`, `<=`, `>`, `>=` and `range` apply
    pub fn is_orderable(&self) -> bool {
        matches!(
            self,
            ScalarKind::Integer
                | ScalarKind::Float
                | ScalarKind::Decimal
                | ScalarKind::String
                | ScalarKind::Date
                | ScalarKind::Time
                | ScalarKind::Datetime
                | ScalarKind::Duration
        )
    }

    /// Whether substring predicates apply
    pub fn is_text(&self) -> bool {
        matches!(self, ScalarKind::String)
    }

    /// Whether records can be sorted by a field of this kind
    pub fn is_sortable(&self) -> bool {
        !matches!(self, ScalarKind::Json)
    }

    /// Whether the kind can serve as a server-assigned identity
    pub fn is_identity_capable(&self) -> bool {
        matches!(self, ScalarKind::Integer | ScalarKind::Uuid)
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(DateTime<Utc>),
    Decimal(Decimal),
    Uuid(Uuid),
    Duration(TimeDelta),
    Json(Json),
    List(Vec<Value>),
}

impl Value {
    /// Coerce a JSON value to `kind`, or a list of `kind` when `list` is set
    ///
    /// JSON `null` coerces to [`Value::Null`]; whether null is acceptable is the
    /// caller's decision.
    pub fn from_json(kind: ScalarKind, list: bool, json: &Json) -> Result<Value, String> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        if !list {
            return Self::scalar_from_json(kind, json);
        }
        let Json::Array(items) = json else {
            return Err(format!("expected a list of {}, got {}", kind, json_type(json)));
        };
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                if item.is_null() {
                    return Err(format!("list item {} must not be null", i));
                }
                Self::scalar_from_json(kind, item).map_err(|e| format!("list item {}: {}", i, e))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List)
    }

    fn scalar_from_json(kind: ScalarKind, json: &Json) -> Result<Value, String> {
        let mismatch = || format!("expected {}, got {}", kind, json_type(json));
        match kind {
            ScalarKind::String => json.as_str().map(|s| Value::String(s.to_string())).ok_or_else(mismatch),
            ScalarKind::Integer => json.as_i64().map(Value::Int).ok_or_else(mismatch),
            ScalarKind::Float => json.as_f64().map(Value::Float).ok_or_else(mismatch),
            ScalarKind::Boolean => json.as_bool().map(Value::Bool).ok_or_else(mismatch),
            ScalarKind::Date => {
                let s = json.as_str().ok_or_else(mismatch)?;
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(Value::Date)
                    .map_err(|e| format!("invalid date `{}`: {}", s, e))
            }
            ScalarKind::Time => {
                let s = json.as_str().ok_or_else(mismatch)?;
                NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                    .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
                    .map(Value::Time)
                    .map_err(|e| format!("invalid time `{}`: {}", s, e))
            }
            ScalarKind::Datetime => {
                let s = json.as_str().ok_or_else(mismatch)?;
                DateTime::parse_from_rfc3339(s)
                    .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                    .map_err(|e| format!("invalid datetime `{}`: {}", s, e))
            }
            ScalarKind::Decimal => {
                let text = match json {
                    Json::String(s) => s.clone(),
                    Json::Number(n) => n.to_string(),
                    _ => return Err(mismatch()),
                };
                Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .map(Value::Decimal)
                    .map_err(|e| format!("invalid decimal `{}`: {}", text, e))
            }
            ScalarKind::Uuid => {
                let s = json.as_str().ok_or_else(mismatch)?;
                Uuid::parse_str(s)
                    .map(Value::Uuid)
                    .map_err(|e| format!("invalid uuid `{}`: {}", s, e))
            }
            ScalarKind::Duration => {
                if let Some(secs) = json.as_i64() {
                    return TimeDelta::try_seconds(secs)
                        .map(Value::Duration)
                        .ok_or_else(|| format!("duration of {} seconds is out of range", secs));
                }
                let secs = json.as_f64().ok_or_else(mismatch)?;
                if !secs.is_finite() || secs.abs() > (i64::MAX / 1_000_000) as f64 {
                    return Err(format!("duration of {} seconds is out of range", secs));
                }
                Ok(Value::Duration(TimeDelta::microseconds(
                    (secs * 1_000_000.0).round() as i64,
                )))
            }
            ScalarKind::Json => Ok(Value::Json(json.clone())),
        }
    }

    /// Render back to JSON
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => Json::String(t.format("%H:%M:%S%.f").to_string()),
            Value::DateTime(dt) => Json::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Decimal(d) => Json::String(d.to_string()),
            Value::Uuid(u) => Json::String(u.to_string()),
            Value::Duration(d) => {
                if d.subsec_nanos() == 0 {
                    Json::from(d.num_seconds())
                } else {
                    let micros = d.num_microseconds().unwrap_or(i64::MAX);
                    serde_json::Number::from_f64(micros as f64 / 1_000_000.0)
                        .map(Json::Number)
                        .unwrap_or(Json::Null)
                }
            }
            Value::Json(j) => j.clone(),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
        }
    }

    /// Whether this is [`Value::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether the value is an instance of `kind` (lists check every item)
    pub fn fits(&self, kind: ScalarKind, list: bool) -> bool {
        match (self, list) {
            (Value::Null, _) => true,
            (Value::List(items), true) => items.iter().all(|v| !v.is_null() && v.fits(kind, false)),
            (_, true) => false,
            (value, false) => matches!(
                (value, kind),
                (Value::Bool(_), ScalarKind::Boolean)
                    | (Value::Int(_), ScalarKind::Integer)
                    | (Value::Float(_), ScalarKind::Float)
                    | (Value::String(_), ScalarKind::String)
                    | (Value::Date(_), ScalarKind::Date)
                    | (Value::Time(_), ScalarKind::Time)
                    | (Value::DateTime(_), ScalarKind::Datetime)
                    | (Value::Decimal(_), ScalarKind::Decimal)
                    | (Value::Uuid(_), ScalarKind::Uuid)
                    | (Value::Duration(_), ScalarKind::Duration)
                    | (Value::Json(_), ScalarKind::Json)
            ),
        }
    }

    /// String content, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values of the same kind; `None` when incomparable or either is null
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total ordering for sorting: nulls first, incomparable values tie
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<Identity> for Value {
    fn from(id: Identity) -> Self {
        match id {
            Identity::Int(i) => Value::Int(i),
            Identity::Uuid(u) => Value::Uuid(u),
        }
    }
}

fn json_type(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "list",
        Json::Object(_) => "object",
    }
}

/// Identity of a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identity {
    Int(i64),
    Uuid(Uuid),
}

impl Identity {
    /// Extract an identity from a value
    pub fn from_value(value: &Value) -> Option<Identity> {
        match value {
            Value::Int(i) => Some(Identity::Int(*i)),
            Value::Uuid(u) => Some(Identity::Uuid(*u)),
            _ => None,
        }
    }

    /// Coerce a JSON value to an identity of `kind`
    pub fn from_json(kind: ScalarKind, json: &Json) -> Result<Identity, String> {
        if json.is_null() {
            return Err("identity must not be null".to_string());
        }
        let value = Value::from_json(kind, false, json)?;
        Identity::from_value(&value).ok_or_else(|| format!("{} cannot be an identity", kind))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Int(i) => write!(f, "{}", i),
            Identity::Uuid(u) => write!(f, "{}", u),
        }
    }
}

/// A stored record: field name to value, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: IndexMap<String, Value>,
}

impl Record {
    /// Empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a field
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Set a field, keeping its position when it already exists
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Remove a field
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.shift_remove(name)
    }

    /// Identity stored under `field`
    pub fn identity(&self, field: &str) -> Option<Identity> {
        self.get(field).and_then(Identity::from_value)
    }

    /// Iterate fields in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Render as a JSON object
    pub fn to_json(&self) -> Json {
        Json::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

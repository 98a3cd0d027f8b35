//! Typed values held by `Value` nodes
//!
//! A `Variant` is one scalar (bool, int, float, double, string, date, time,
//! datetime) or a reference to other nodes. Conversion between kinds drives
//! the allowed-type coercion of `Value::set_value`.

use crate::model::AnyNode;
use crate::{Result, StorageError};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Kinds a value can hold.
///
/// The ids are persisted in `Value.valueType` and in the
/// `*_allowedTypes` join tables, so they must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Double,
    String,
    Date,
    Time,
    DateTime,
    /// Reference to a single node
    Node,
    /// Ordered references to several nodes
    NodeList,
}

impl ValueKind {
    pub fn id(&self) -> i32 {
        match self {
            ValueKind::Bool => 1,
            ValueKind::Int => 2,
            ValueKind::Double => 6,
            ValueKind::String => 10,
            ValueKind::Date => 14,
            ValueKind::Time => 15,
            ValueKind::DateTime => 16,
            ValueKind::Float => 38,
            ValueKind::Node => 65536,
            ValueKind::NodeList => 65537,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::all().iter().copied().find(|kind| kind.id() == id)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
            ValueKind::String => "string",
            ValueKind::Date => "date",
            ValueKind::Time => "time",
            ValueKind::DateTime => "datetime",
            ValueKind::Node => "node",
            ValueKind::NodeList => "nodelist",
        }
    }

    pub fn all() -> &'static [ValueKind] {
        &[
            ValueKind::Bool,
            ValueKind::Int,
            ValueKind::Float,
            ValueKind::Double,
            ValueKind::String,
            ValueKind::Date,
            ValueKind::Time,
            ValueKind::DateTime,
            ValueKind::Node,
            ValueKind::NodeList,
        ]
    }

    /// Whether values of this kind reference other nodes
    pub fn is_reference(&self) -> bool {
        matches!(self, ValueKind::Node | ValueKind::NodeList)
    }
}

impl FromStr for ValueKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bool" | "boolean" => Ok(ValueKind::Bool),
            "int" | "integer" | "long" => Ok(ValueKind::Int),
            "float" | "real" => Ok(ValueKind::Float),
            "double" => Ok(ValueKind::Double),
            "string" | "str" | "text" => Ok(ValueKind::String),
            "date" => Ok(ValueKind::Date),
            "time" => Ok(ValueKind::Time),
            "datetime" | "timestamp" => Ok(ValueKind::DateTime),
            "node" | "ref" => Ok(ValueKind::Node),
            "nodelist" | "node-list" | "refs" => Ok(ValueKind::NodeList),
            _ => Err(StorageError::Invariant {
                context: "ValueKind::from_str",
                message: format!("Unknown value kind: {}", s),
            }),
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Variant {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f32),
    Double(f64),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Node(AnyNode),
    NodeList(Vec<AnyNode>),
}

/// What a `Value.value` column decodes to before node references are resolved
#[derive(Debug)]
pub(crate) enum Stored {
    Ready(Variant),
    Nodes { list: bool, ids: Vec<i64> },
}

impl Variant {
    /// Kind of the held value; `None` for `Null`
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Variant::Null => None,
            Variant::Bool(_) => Some(ValueKind::Bool),
            Variant::Int(_) => Some(ValueKind::Int),
            Variant::Float(_) => Some(ValueKind::Float),
            Variant::Double(_) => Some(ValueKind::Double),
            Variant::String(_) => Some(ValueKind::String),
            Variant::Date(_) => Some(ValueKind::Date),
            Variant::Time(_) => Some(ValueKind::Time),
            Variant::DateTime(_) => Some(ValueKind::DateTime),
            Variant::Node(_) => Some(ValueKind::Node),
            Variant::NodeList(_) => Some(ValueKind::NodeList),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    /// Nodes referenced by this value, in order
    pub fn nodes(&self) -> Vec<AnyNode> {
        match self {
            Variant::Node(node) => vec![node.clone()],
            Variant::NodeList(nodes) => nodes.clone(),
            _ => Vec::new(),
        }
    }

    /// Convert to `target`, or `None` when the value has no representation
    /// in that kind.
    pub fn convert(&self, target: ValueKind) -> Option<Variant> {
        use ValueKind as K;
        use Variant as V;

        if self.kind() == Some(target) {
            return Some(self.clone());
        }

        match (self, target) {
            (V::Null, _) => None,
            (V::Node(_) | V::NodeList(_), K::String) => None,
            (V::String(s), kind) => Self::parse(s, kind),
            (v, K::String) => Some(V::String(v.to_string())),

            (V::Bool(b), K::Int) => Some(V::Int(*b as i64)),
            (V::Bool(b), K::Float) => Some(V::Float(if *b { 1.0 } else { 0.0 })),
            (V::Bool(b), K::Double) => Some(V::Double(if *b { 1.0 } else { 0.0 })),

            (V::Int(i), K::Bool) => Some(V::Bool(*i != 0)),
            (V::Int(i), K::Float) => Some(V::Float(*i as f32)),
            (V::Int(i), K::Double) => Some(V::Double(*i as f64)),

            (V::Float(f), K::Bool) => Some(V::Bool(*f != 0.0)),
            (V::Float(f), K::Double) => Some(V::Double(*f as f64)),
            (V::Float(f), K::Int) => Self::integral(*f as f64),
            (V::Double(d), K::Bool) => Some(V::Bool(*d != 0.0)),
            (V::Double(d), K::Float) => Some(V::Float(*d as f32)),
            (V::Double(d), K::Int) => Self::integral(*d),

            (V::Date(d), K::DateTime) => d.and_hms_opt(0, 0, 0).map(V::DateTime),
            (V::DateTime(dt), K::Date) => Some(V::Date(dt.date())),
            (V::DateTime(dt), K::Time) => Some(V::Time(dt.time())),

            (V::Node(node), K::NodeList) => Some(V::NodeList(vec![node.clone()])),
            (V::NodeList(nodes), K::Node) if nodes.len() == 1 => Some(V::Node(nodes[0].clone())),

            _ => None,
        }
    }

    fn integral(value: f64) -> Option<Variant> {
        if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            Some(Variant::Int(value as i64))
        } else {
            None
        }
    }

    fn parse(s: &str, kind: ValueKind) -> Option<Variant> {
        let trimmed = s.trim();
        match kind {
            ValueKind::String => Some(Variant::String(s.to_string())),
            ValueKind::Bool => match trimmed.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(Variant::Bool(true)),
                "false" | "no" | "0" => Some(Variant::Bool(false)),
                _ => None,
            },
            ValueKind::Int => trimmed.parse().ok().map(Variant::Int),
            ValueKind::Float => trimmed.parse().ok().map(Variant::Float),
            ValueKind::Double => trimmed.parse().ok().map(Variant::Double),
            ValueKind::Date => NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .ok()
                .map(Variant::Date),
            ValueKind::Time => NaiveTime::parse_from_str(trimmed, TIME_FORMAT)
                .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
                .ok()
                .map(Variant::Time),
            ValueKind::DateTime => NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
                .ok()
                .map(Variant::DateTime),
            ValueKind::Node | ValueKind::NodeList => None,
        }
    }

    /// Encode for the `Value.value` column
    pub(crate) fn to_sql(&self) -> Result<SqlValue> {
        Ok(match self {
            Variant::Null => SqlValue::Null,
            Variant::Bool(b) => SqlValue::Integer(*b as i64),
            Variant::Int(i) => SqlValue::Integer(*i),
            Variant::Float(f) => SqlValue::Real(*f as f64),
            Variant::Double(d) => SqlValue::Real(*d),
            Variant::String(s) => SqlValue::Text(s.clone()),
            Variant::Date(d) => SqlValue::Text(d.format(DATE_FORMAT).to_string()),
            Variant::Time(t) => SqlValue::Text(t.format(TIME_FORMAT).to_string()),
            Variant::DateTime(dt) => SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()),
            Variant::Node(node) => SqlValue::Integer(node.id()),
            Variant::NodeList(nodes) => {
                let ids: Vec<i64> = nodes.iter().map(AnyNode::id).collect();
                SqlValue::Text(serde_json::to_string(&ids)?)
            }
        })
    }

    /// Decode a `Value` row given its `valueType` column
    pub(crate) fn from_sql(kind: Option<ValueKind>, raw: SqlValue) -> Result<Stored> {
        let Some(kind) = kind else {
            return Ok(Stored::Ready(Variant::Null));
        };

        let mismatch = |raw: &SqlValue| StorageError::Invariant {
            context: "Variant::from_sql",
            message: format!("column value {:?} does not hold a {}", raw, kind),
        };

        let variant = match (kind, raw) {
            (_, SqlValue::Null) => Variant::Null,
            (ValueKind::Node, SqlValue::Integer(id)) => {
                return Ok(Stored::Nodes { list: false, ids: vec![id] });
            }
            (ValueKind::NodeList, SqlValue::Text(json)) => {
                let ids: Vec<i64> = serde_json::from_str(&json)?;
                return Ok(Stored::Nodes { list: true, ids });
            }
            (ValueKind::Bool, SqlValue::Integer(i)) => Variant::Bool(i != 0),
            (ValueKind::Int, SqlValue::Integer(i)) => Variant::Int(i),
            (ValueKind::Float, SqlValue::Real(r)) => Variant::Float(r as f32),
            (ValueKind::Float, SqlValue::Integer(i)) => Variant::Float(i as f32),
            (ValueKind::Double, SqlValue::Real(r)) => Variant::Double(r),
            (ValueKind::Double, SqlValue::Integer(i)) => Variant::Double(i as f64),
            (ValueKind::String, SqlValue::Text(s)) => Variant::String(s),
            (kind, SqlValue::Text(s)) if !kind.is_reference() => {
                Self::parse(&s, kind).ok_or_else(|| mismatch(&SqlValue::Text(s)))?
            }
            (_, other) => return Err(mismatch(&other)),
        };
        Ok(Stored::Ready(variant))
    }

    /// JSON rendering used by the CLI
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Variant::Null => serde_json::Value::Null,
            Variant::Bool(b) => json!(b),
            Variant::Int(i) => json!(i),
            Variant::Float(f) => json!(f),
            Variant::Double(d) => json!(d),
            Variant::Node(node) => json!({ "node": node.id() }),
            Variant::NodeList(nodes) => {
                json!({ "nodes": nodes.iter().map(AnyNode::id).collect::<Vec<_>>() })
            }
            other => json!(other.to_string()),
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Null => Ok(()),
            Variant::Bool(b) => write!(f, "{}", b),
            Variant::Int(i) => write!(f, "{}", i),
            Variant::Float(v) => write!(f, "{}", v),
            Variant::Double(v) => write!(f, "{}", v),
            Variant::String(s) => write!(f, "{}", s),
            Variant::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Variant::Time(t) => write!(f, "{}", t.format(TIME_FORMAT)),
            Variant::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Variant::Node(node) => write!(f, "#{}", node.id()),
            Variant::NodeList(nodes) => {
                let ids: Vec<String> = nodes.iter().map(|n| format!("#{}", n.id())).collect();
                write!(f, "[{}]", ids.join(", "))
            }
        }
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Variant::Int(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::Int(value as i64)
    }
}

impl From<f32> for Variant {
    fn from(value: f32) -> Self {
        Variant::Float(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Double(value)
    }
}

impl From<NaiveDate> for Variant {
    fn from(value: NaiveDate) -> Self {
        Variant::Date(value)
    }
}

impl From<NaiveTime> for Variant {
    fn from(value: NaiveTime) -> Self {
        Variant::Time(value)
    }
}

impl From<NaiveDateTime> for Variant {
    fn from(value: NaiveDateTime) -> Self {
        Variant::DateTime(value)
    }
}

impl From<AnyNode> for Variant {
    fn from(value: AnyNode) -> Self {
        Variant::Node(value)
    }
}

impl From<Vec<AnyNode>> for Variant {
    fn from(value: Vec<AnyNode>) -> Self {
        Variant::NodeList(value)
    }
}

//! Wire conventions shared by every remote call.
//!
//! - Optional values travel as sequences of zero or one element.
//! - `nat64` counters and timestamps are written as decimal strings and read
//!   from either a JSON number or a decimal string.
//! - Tagged variants are read from a bare string or a single-key object.

use std::fmt;

use {
    serde::{
        Deserialize, Deserializer, Serialize, Serializer,
        de::{self, DeserializeOwned, Visitor},
        ser::{SerializeMap, SerializeSeq},
    },
    serde_json::Value,
};

const NANOS_PER_MILLI: u64 = 1_000_000;

/// `serde(with = "wire::opt")` for `Option<T>` fields.
pub mod opt {
    use super::*;

    pub fn serialize<T, S>(value: &Option<T>, s: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        let mut seq = s.serialize_seq(Some(usize::from(value.is_some())))?;
        if let Some(v) = value {
            seq.serialize_element(v)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, T, D>(d: D) -> Result<Option<T>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let mut items = Vec::<T>::deserialize(d)?;
        match items.len() {
            0 | 1 => Ok(items.pop()),
            n => Err(de::Error::invalid_length(n, &"a sequence of zero or one element")),
        }
    }
}

/// `serde(with = "wire::nat")` for `u64` fields.
pub mod nat {
    use super::*;

    pub fn serialize<S: Serializer>(value: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        d.deserialize_any(NatVisitor)
    }

    struct NatVisitor;

    impl Visitor<'_> for NatVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer or decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            u64::try_from(v).map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
            v.parse()
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }
}

/// Encode an optional value as a top-level wire value.
pub fn encode_optional<T: Serialize>(value: Option<&T>) -> serde_json::Result<Value> {
    Ok(Value::Array(match value {
        Some(v) => vec![serde_json::to_value(v)?],
        None => Vec::new(),
    }))
}

/// Decode a top-level optional reply. Any length other than zero or one is
/// an error.
pub fn decode_optional<T: DeserializeOwned>(value: Value) -> serde_json::Result<Option<T>> {
    #[derive(Deserialize)]
    #[serde(transparent, bound(deserialize = "T: Deserialize<'de>"))]
    struct Wrapped<T>(#[serde(with = "opt")] Option<T>);

    serde_json::from_value::<Wrapped<T>>(value).map(|w| w.0)
}

/// Nanosecond timestamps display in milliseconds.
pub fn nanos_to_millis(nanos: u64) -> u64 {
    nanos / NANOS_PER_MILLI
}

/// The tag naming a variant: a bare string, or the only key of an object.
pub fn variant_tag(value: &Value) -> Option<&str> {
    match value {
        Value::String(tag) => Some(tag.as_str()),
        Value::Object(map) if map.len() == 1 => map.keys().next().map(String::as_str),
        _ => None,
    }
}

fn serialize_variant<S: Serializer>(tag: Option<&str>, s: S) -> Result<S::Ok, S::Error> {
    let mut map = s.serialize_map(Some(usize::from(tag.is_some())))?;
    if let Some(tag) = tag {
        map.serialize_entry(tag, &())?;
    }
    map.end()
}

/// Severity of an analysis, audit, or finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Unknown,
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Case-insensitive; unrecognized tags are [`Severity::Unknown`].
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "info" => Self::Info,
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Total decode from any wire value.
    pub fn from_wire(value: &Value) -> Self {
        variant_tag(value).map_or(Self::Unknown, Self::from_tag)
    }

    fn wire_tag(self) -> Option<&'static str> {
        match self {
            Self::Unknown => None,
            Self::Info => Some("Info"),
            Self::Low => Some("Low"),
            Self::Medium => Some("Medium"),
            Self::High => Some("High"),
            Self::Critical => Some("Critical"),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        serialize_variant(self.wire_tag(), s)
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Value::deserialize(d).map(|v| Self::from_wire(&v))
    }
}

/// Lifecycle of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditStatus {
    InProgress,
    Completed,
    Failed,
    RequiresReview,
    Unknown,
}

impl AuditStatus {
    pub fn from_tag(tag: &str) -> Self {
        let normalized: String = tag
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "inprogress" => Self::InProgress,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "requiresreview" => Self::RequiresReview,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RequiresReview => "requires_review",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_wire(value: &Value) -> Self {
        variant_tag(value).map_or(Self::Unknown, Self::from_tag)
    }

    fn wire_tag(self) -> Option<&'static str> {
        match self {
            Self::InProgress => Some("InProgress"),
            Self::Completed => Some("Completed"),
            Self::Failed => Some("Failed"),
            Self::RequiresReview => Some("RequiresReview"),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl Serialize for AuditStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        serialize_variant(self.wire_tag(), s)
    }
}

impl<'de> Deserialize<'de> for AuditStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Value::deserialize(d).map(|v| Self::from_wire(&v))
    }
}

/// `serde(with = "wire::tag")` for free-form variant fields such as a
/// finding category. Unreadable tags become `"Other"`.
pub mod tag {
    use super::*;

    pub fn serialize<S: Serializer>(value: &str, s: S) -> Result<S::Ok, S::Error> {
        serialize_variant(Some(value), s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(variant_tag(&value)
            .filter(|t| !t.is_empty())
            .unwrap_or("Other")
            .to_string())
    }
}

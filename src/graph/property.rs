//! Property values carried by intelligence nodes and edges
//!
//! Producer attributes are open-ended, so they are stored as a tagged union.
//! Every value has a known shape at the storage boundary and the schema
//! registry can check it against a [`PropertyKind`].

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::fmt;

/// Ordered so canonical text, hashes and diffs are deterministic.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// Milliseconds since the Unix epoch
    DateTime(i64),
    Array(Vec<PropertyValue>),
    Map(PropertyMap),
    Null,
}

/// Expected shape of a property in a schema rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKind {
    String,
    Integer,
    Float,
    /// Integer or Float
    Number,
    Boolean,
    DateTime,
    Array,
    Map,
    Null,
}

impl PropertyValue {
    pub fn is_null(&self) -> bool {
        *self == PropertyValue::Null
    }

    pub fn as_string(&self) -> Option<&str> {
        if let PropertyValue::String(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        if let PropertyValue::Integer(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    /// Numeric view of the value; integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match *self {
            PropertyValue::Float(f) => Some(f),
            PropertyValue::Integer(i) => Some(i as f64),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PropertyValue]> {
        if let PropertyValue::Array(items) = self {
            Some(items.as_slice())
        } else {
            None
        }
    }

    pub fn as_map(&self) -> Option<&PropertyMap> {
        if let PropertyValue::Map(map) = self {
            Some(map)
        } else {
            None
        }
    }

    pub fn kind(&self) -> PropertyKind {
        use PropertyValue as V;
        match self {
            V::String(_) => PropertyKind::String,
            V::Integer(_) => PropertyKind::Integer,
            V::Float(_) => PropertyKind::Float,
            V::Boolean(_) => PropertyKind::Boolean,
            V::DateTime(_) => PropertyKind::DateTime,
            V::Array(_) => PropertyKind::Array,
            V::Map(_) => PropertyKind::Map,
            V::Null => PropertyKind::Null,
        }
    }

    /// `Number` accepts both integers and floats; every other kind must match exactly.
    pub fn matches(&self, kind: PropertyKind) -> bool {
        if kind == PropertyKind::Number {
            return self.as_float().is_some();
        }
        self.kind() == kind
    }

    /// Untagged JSON form, used for canonical text and CLI output
    pub fn to_json(&self) -> Json {
        use PropertyValue as V;
        match self {
            V::String(s) => Json::from(s.as_str()),
            V::Integer(i) | V::DateTime(i) => Json::from(*i),
            // NaN and infinities have no JSON form
            V::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            V::Boolean(b) => Json::Bool(*b),
            V::Array(items) => items.iter().map(PropertyValue::to_json).collect(),
            V::Map(map) => Json::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
            V::Null => Json::Null,
        }
    }
}

impl From<Json> for PropertyValue {
    fn from(value: Json) -> Self {
        match value {
            Json::Null => PropertyValue::Null,
            Json::Bool(b) => PropertyValue::Boolean(b),
            Json::Number(n) => n
                .as_i64()
                .map(PropertyValue::Integer)
                .unwrap_or_else(|| PropertyValue::Float(n.as_f64().unwrap_or(f64::NAN))),
            Json::String(s) => PropertyValue::String(s),
            Json::Array(items) => PropertyValue::Array(items.into_iter().map(PropertyValue::from).collect()),
            Json::Object(map) => PropertyValue::Map(map.into_iter().map(|(k, v)| (k, PropertyValue::from(v))).collect()),
        }
    }
}

/// Strings render bare; everything else renders as compact JSON.
impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

macro_rules! property_from {
    ($($ty:ty => $variant:ident $(as $cast:ty)?),* $(,)?) => {
        $(
            impl From<$ty> for PropertyValue {
                fn from(v: $ty) -> Self {
                    PropertyValue::$variant(v $(as $cast)?)
                }
            }
        )*
    };
}

property_from! {
    String => String,
    i64 => Integer,
    i32 => Integer as i64,
    u32 => Integer as i64,
    f64 => Float,
    f32 => Float as f64,
    bool => Boolean,
    Vec<PropertyValue> => Array,
    PropertyMap => Map,
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_owned())
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A stored record. Stores hold arbitrary JSON documents.
pub type Record = Value;

/// Primary key of a record.
///
/// Variant order is the engine's key order: every integer sorts before every
/// string, every string before every array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Integer(i64),
    Text(String),
    Array(Vec<Key>),
}

impl Key {
    /// Read a key out of a JSON value. Fractions, booleans, objects and null
    /// are not valid keys.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Key::Integer),
            Value::String(s) => Some(Key::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Key::Array),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Key::Integer(n) => Value::from(*n),
            Key::Text(s) => Value::String(s.clone()),
            Key::Array(items) => Value::Array(items.iter().map(Key::to_json).collect()),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Key::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Integer(n) => write!(f, "{}", n),
            Key::Text(s) => write!(f, "'{}'", s),
            Key::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Integer(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Integer(n as i64)
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Integer(n as i64)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<Vec<Key>> for Key {
    fn from(items: Vec<Key>) -> Self {
        Key::Array(items)
    }
}

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const DEFAULT_KEY_PATH: &str = "id";
pub const DEFAULT_AUTO_INCREMENT: bool = true;

/// How the engine derives a record's primary key.
///
/// `OutOfLine` is the explicit `null` key path: keys are supplied next to the
/// record (or generated) instead of being read from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPath {
    OutOfLine,
    Single(String),
    Compound(Vec<String>),
}

impl KeyPath {
    pub fn single(path: impl Into<String>) -> Self {
        KeyPath::Single(path.into())
    }

    pub fn compound<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        KeyPath::Compound(paths.into_iter().map(Into::into).collect())
    }

    pub fn is_inline(&self) -> bool {
        !matches!(self, KeyPath::OutOfLine)
    }

    pub fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(KeyPath::OutOfLine),
            Value::String(s) => Ok(KeyPath::Single(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(format!("compound key path segments must be strings, found {}", other)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(KeyPath::Compound),
            other => Err(format!("expected a string, an array of strings or null, found {}", other)),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            KeyPath::OutOfLine => Value::Null,
            KeyPath::Single(s) => Value::String(s.clone()),
            KeyPath::Compound(paths) => Value::Array(paths.iter().cloned().map(Value::String).collect()),
        }
    }
}

impl Default for KeyPath {
    fn default() -> Self {
        KeyPath::Single(DEFAULT_KEY_PATH.to_string())
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPath::OutOfLine => write!(f, "null"),
            KeyPath::Single(s) => write!(f, "{}", s),
            KeyPath::Compound(paths) => write!(f, "[{}]", paths.join(", ")),
        }
    }
}

impl From<&str> for KeyPath {
    fn from(s: &str) -> Self {
        KeyPath::Single(s.to_string())
    }
}

impl From<String> for KeyPath {
    fn from(s: String) -> Self {
        KeyPath::Single(s)
    }
}

impl From<Vec<&str>> for KeyPath {
    fn from(paths: Vec<&str>) -> Self {
        KeyPath::compound(paths)
    }
}

impl Serialize for KeyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for KeyPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        KeyPath::from_json(&value).map_err(de::Error::custom)
    }
}

/// Parameters the engine needs to create a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreParameters {
    pub key_path: KeyPath,
    pub auto_increment: bool,
}

impl Default for StoreParameters {
    fn default() -> Self {
        Self {
            key_path: KeyPath::default(),
            auto_increment: DEFAULT_AUTO_INCREMENT,
        }
    }
}

/// Canonical description of one store, produced by normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDefinition {
    pub name: String,
    pub key_path: KeyPath,
    pub auto_increment: bool,
}

impl StoreDefinition {
    /// A store with the default key policy (`keyPath = "id"`, auto-increment).
    pub fn new(name: impl Into<String>) -> Self {
        let defaults = StoreParameters::default();
        Self {
            name: name.into(),
            key_path: defaults.key_path,
            auto_increment: defaults.auto_increment,
        }
    }

    pub fn key_path(mut self, key_path: impl Into<KeyPath>) -> Self {
        self.key_path = key_path.into();
        self
    }

    pub fn out_of_line(mut self) -> Self {
        self.key_path = KeyPath::OutOfLine;
        self
    }

    pub fn auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }

    pub fn parameters(&self) -> StoreParameters {
        StoreParameters {
            key_path: self.key_path.clone(),
            auto_increment: self.auto_increment,
        }
    }
}

//! Store declarations as callers write them.
//!
//! Three input shapes are accepted and later folded into one canonical
//! schema by [`normalize`](super::normalize::normalize):
//!
//! - a list of bare store names,
//! - a list of configuration objects,
//! - a name-keyed map of optional configuration objects.

use crate::core::{DbError, Result};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;

use super::definition::KeyPath;

pub const STORE_DEFINITION_ERROR: &str = "Store names must be provided as an array of strings or configuration objects, or as a plain object map of configurations";

pub const STORE_MAP_ENTRY_ERROR: &str = "Store configuration map entries must be plain objects when provided";

/// Key policy overrides nested under a configuration's `options` field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreOptions {
    pub key_path: Option<KeyPath>,
    pub auto_increment: Option<bool>,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_path(mut self, key_path: impl Into<KeyPath>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    pub fn out_of_line(mut self) -> Self {
        self.key_path = Some(KeyPath::OutOfLine);
        self
    }

    pub fn auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = Some(auto_increment);
        self
    }
}

/// A configuration field whose JSON value had the wrong type.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectedField {
    /// `name` (or `storeName` in its place) was not a string.
    Name,
    /// `keyPath` was not a string, a list of strings or `null`.
    KeyPath(String),
    AutoIncrement,
    /// `options` was not a plain object.
    Options,
}

/// One store configuration object.
///
/// `None` means "not given"; an explicit `null` key path is
/// `Some(KeyPath::OutOfLine)` and survives normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreConfig {
    pub name: Option<String>,
    pub store_name: Option<String>,
    pub key_path: Option<KeyPath>,
    pub auto_increment: Option<bool>,
    pub options: Option<StoreOptions>,
    /// Wrongly typed fields found by [`from_object`](StoreConfig::from_object)
    pub rejected: Vec<RejectedField>,
}

impl StoreConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = Some(store_name.into());
        self
    }

    pub fn key_path(mut self, key_path: impl Into<KeyPath>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    pub fn out_of_line(mut self) -> Self {
        self.key_path = Some(KeyPath::OutOfLine);
        self
    }

    pub fn auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = Some(auto_increment);
        self
    }

    pub fn options(mut self, options: StoreOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Decode a configuration object.
    ///
    /// Fields of the wrong type never fail here. They are recorded in
    /// `rejected` and reported by the validator once every store name has
    /// been checked.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let mut rejected = Vec::new();

        // `name` is tried before `storeName`; the first one present decides.
        let (name, store_name) = match (decode_name(object.get("name")), decode_name(object.get("storeName"))) {
            (Err(field), _) | (Ok(None), Err(field)) => {
                rejected.push(field);
                (None, None)
            }
            (Ok(name), store_name) => (name, store_name.unwrap_or_default()),
        };

        let key_path = decode_key_path(object, &mut rejected);
        let auto_increment = decode_auto_increment(object, &mut rejected);

        let options = match object.get("options") {
            None => None,
            Some(Value::Object(nested)) => {
                let mut nested_rejected = Vec::new();
                let options = StoreOptions {
                    key_path: decode_key_path(nested, &mut nested_rejected),
                    auto_increment: decode_auto_increment(nested, &mut nested_rejected),
                };
                // A nested field only counts where no top-level field overrides it.
                rejected.extend(nested_rejected.into_iter().filter(|field| match field {
                    RejectedField::KeyPath(_) => !object.contains_key("keyPath"),
                    _ => !object.contains_key("autoIncrement"),
                }));
                Some(options)
            }
            Some(_) => {
                rejected.push(RejectedField::Options);
                None
            }
        };

        Self {
            name,
            store_name,
            key_path,
            auto_increment,
            options,
            rejected,
        }
    }

    pub fn rejects(&self, field: &RejectedField) -> bool {
        self.rejected.contains(field)
    }
}

fn decode_name(value: Option<&Value>) -> std::result::Result<Option<String>, RejectedField> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(name)) => Ok(Some(name.clone())),
        Some(_) => Err(RejectedField::Name),
    }
}

fn decode_key_path(object: &Map<String, Value>, rejected: &mut Vec<RejectedField>) -> Option<KeyPath> {
    match KeyPath::from_json(object.get("keyPath")?) {
        Ok(key_path) => Some(key_path),
        Err(reason) => {
            rejected.push(RejectedField::KeyPath(reason));
            None
        }
    }
}

fn decode_auto_increment(object: &Map<String, Value>, rejected: &mut Vec<RejectedField>) -> Option<bool> {
    match object.get("autoIncrement")? {
        Value::Bool(flag) => Some(*flag),
        _ => {
            rejected.push(RejectedField::AutoIncrement);
            None
        }
    }
}

/// The three accepted declaration shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreDeclarations {
    Names(Vec<String>),
    Configs(Vec<StoreConfig>),
    /// Map form. Iteration follows key order, so normalization is stable.
    Map(BTreeMap<String, Option<StoreConfig>>),
}

impl StoreDeclarations {
    /// Parse loosely typed input, e.g. the `storeNames` field of a JSON options object.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => {
                if let Some(names) = items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                {
                    return Ok(StoreDeclarations::Names(names));
                }

                let configs = items
                    .iter()
                    .map(|item| match item {
                        Value::String(name) => StoreConfig::named(name.clone()),
                        Value::Object(object) => StoreConfig::from_object(object),
                        // Neither a name nor a configuration: it has no usable name.
                        _ => StoreConfig::default(),
                    })
                    .collect();
                Ok(StoreDeclarations::Configs(configs))
            }
            Value::Object(entries) => {
                let mut map = BTreeMap::new();
                for (name, config) in entries {
                    let config = match config {
                        Value::Null => None,
                        Value::Object(object) => Some(StoreConfig::from_object(object)),
                        _ => return Err(DbError::StoreDefinitionShape(STORE_MAP_ENTRY_ERROR.to_string())),
                    };
                    map.insert(name.clone(), config);
                }
                Ok(StoreDeclarations::Map(map))
            }
            _ => Err(DbError::StoreDefinitionShape(STORE_DEFINITION_ERROR.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StoreDeclarations::Names(names) => names.len(),
            StoreDeclarations::Configs(configs) => configs.len(),
            StoreDeclarations::Map(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wrongly typed fields of each store, in the order `normalize` yields the stores.
    pub fn rejected_fields(&self) -> Vec<&[RejectedField]> {
        match self {
            StoreDeclarations::Names(names) => vec![&[] as &[RejectedField]; names.len()],
            StoreDeclarations::Configs(configs) => configs.iter().map(|config| config.rejected.as_slice()).collect(),
            StoreDeclarations::Map(map) => map
                .values()
                .map(|config| config.as_ref().map_or(&[] as &[RejectedField], |config| config.rejected.as_slice()))
                .collect(),
        }
    }

    /// Append one more declaration, widening a name list into a
    /// configuration list when `config` carries more than a name.
    pub fn push(&mut self, config: StoreConfig) {
        match self {
            StoreDeclarations::Names(names) => match config.name.clone() {
                Some(name) if config == StoreConfig::named(name.clone()) => names.push(name),
                _ => {
                    let mut configs: Vec<StoreConfig> = names.drain(..).map(StoreConfig::named).collect();
                    configs.push(config);
                    *self = StoreDeclarations::Configs(configs);
                }
            },
            StoreDeclarations::Configs(configs) => configs.push(config),
            StoreDeclarations::Map(map) => {
                let key = config.name.clone().or_else(|| config.store_name.clone()).unwrap_or_default();
                map.insert(key, Some(config));
            }
        }
    }
}

impl From<Vec<String>> for StoreDeclarations {
    fn from(names: Vec<String>) -> Self {
        StoreDeclarations::Names(names)
    }
}

impl From<Vec<&str>> for StoreDeclarations {
    fn from(names: Vec<&str>) -> Self {
        StoreDeclarations::Names(names.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for StoreDeclarations {
    fn from(names: [&str; N]) -> Self {
        StoreDeclarations::Names(names.iter().map(|s| s.to_string()).collect())
    }
}

impl From<Vec<StoreConfig>> for StoreDeclarations {
    fn from(configs: Vec<StoreConfig>) -> Self {
        StoreDeclarations::Configs(configs)
    }
}

impl From<BTreeMap<String, Option<StoreConfig>>> for StoreDeclarations {
    fn from(map: BTreeMap<String, Option<StoreConfig>>) -> Self {
        StoreDeclarations::Map(map)
    }
}

/// Store declarations as handed to a session: already typed, or raw JSON
/// still to be parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreInput {
    Declared(StoreDeclarations),
    Json(Value),
}

impl StoreInput {
    pub fn declarations(&self) -> Result<Cow<'_, StoreDeclarations>> {
        match self {
            StoreInput::Declared(declarations) => Ok(Cow::Borrowed(declarations)),
            StoreInput::Json(value) => StoreDeclarations::from_json(value).map(Cow::Owned),
        }
    }
}

impl From<StoreDeclarations> for StoreInput {
    fn from(declarations: StoreDeclarations) -> Self {
        StoreInput::Declared(declarations)
    }
}

impl From<Value> for StoreInput {
    fn from(value: Value) -> Self {
        StoreInput::Json(value)
    }
}

macro_rules! declared_input_from {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for StoreInput {
                fn from(declarations: $source) -> Self {
                    StoreInput::Declared(declarations.into())
                }
            }
        )*
    };
}

declared_input_from!(
    Vec<String>,
    Vec<&str>,
    Vec<StoreConfig>,
    BTreeMap<String, Option<StoreConfig>>,
);

impl<const N: usize> From<[&str; N]> for StoreInput {
    fn from(names: [&str; N]) -> Self {
        StoreInput::Declared(names.into())
    }
}

use crate::core::{Key, Record};
use crate::schema::{KeyPath, StoreParameters};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::engine::{EngineError, EngineResult};

/// Largest key a generator hands out (2^53, the engine's exact-integer limit).
pub const MAX_GENERATED_KEY: i64 = 9_007_199_254_740_992;

lazy_static! {
    static ref KEY_PATH_SEGMENTS: Regex =
        Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z_$][A-Za-z0-9_$]*)*$").unwrap();
}

/// `""` (the record itself) or dot-separated identifiers.
pub fn is_valid_key_path(path: &str) -> bool {
    path.is_empty() || KEY_PATH_SEGMENTS.is_match(path)
}

/// Check creation parameters the way the engine does before a store exists.
pub fn check_parameters(parameters: &StoreParameters) -> EngineResult<()> {
    let valid = match &parameters.key_path {
        KeyPath::OutOfLine => true,
        KeyPath::Single(path) => is_valid_key_path(path),
        KeyPath::Compound(paths) => !paths.is_empty() && paths.iter().all(|p| !p.is_empty() && is_valid_key_path(p)),
    };
    if !valid {
        return Err(EngineError::Syntax(format!(
            "The keyPath argument contains an invalid key path: {}",
            parameters.key_path
        )));
    }

    if parameters.auto_increment {
        let unusable = match &parameters.key_path {
            KeyPath::Single(path) => path.is_empty(),
            KeyPath::Compound(_) => true,
            KeyPath::OutOfLine => false,
        };
        if unusable {
            return Err(EngineError::InvalidAccess(
                "An object store with autoIncrement cannot use an empty or array key path".into(),
            ));
        }
    }

    Ok(())
}

/// Records of one store, ordered by key.
#[derive(Debug, Clone)]
pub(crate) struct ObjectStoreData {
    parameters: StoreParameters,
    records: BTreeMap<Key, Record>,
    next_key: i64,
}

impl ObjectStoreData {
    pub fn new(parameters: StoreParameters) -> Self {
        Self {
            parameters,
            records: BTreeMap::new(),
            next_key: 1,
        }
    }

    pub fn get(&self, key: &Key) -> Option<&Record> {
        self.records.get(key)
    }

    pub fn all(&self) -> Vec<Record> {
        self.records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn delete(&mut self, key: &Key) -> bool {
        self.records.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn put(&mut self, mut record: Record, explicit_key: Option<Key>) -> EngineResult<Key> {
        let parameters = self.parameters.clone();
        let key = match (&parameters.key_path, explicit_key) {
            (KeyPath::OutOfLine, Some(key)) => key,
            (KeyPath::OutOfLine, None) if parameters.auto_increment => self.generated_key()?,
            (KeyPath::OutOfLine, None) => {
                return Err(EngineError::Data(
                    "The object store uses out-of-line keys and has no key generator and the key parameter was not provided".into(),
                ));
            }
            (_, Some(_)) => {
                return Err(EngineError::Data(
                    "The object store uses in-line keys and the key parameter was provided".into(),
                ));
            }
            (key_path, None) => match extract_key(&record, key_path)? {
                Some(key) => key,
                None if parameters.auto_increment => {
                    // The generator only advances once the record is stored.
                    let key = self.generated_key()?;
                    if let KeyPath::Single(path) = key_path {
                        inject_key(&mut record, path, &key)?;
                    }
                    key
                }
                None => {
                    return Err(EngineError::Data(
                        "Evaluating the object store's key path did not yield a value".into(),
                    ));
                }
            },
        };

        if parameters.auto_increment
            && let Key::Integer(n) = key
            && n >= self.next_key
        {
            self.next_key = n.saturating_add(1).min(MAX_GENERATED_KEY + 1);
        }

        self.records.insert(key.clone(), record);
        Ok(key)
    }

    /// The key the generator hands out next.
    fn generated_key(&self) -> EngineResult<Key> {
        if self.next_key > MAX_GENERATED_KEY {
            return Err(EngineError::Constraint("The key generator has reached its maximum value".into()));
        }
        Ok(Key::Integer(self.next_key))
    }
}

/// Evaluate a key path against a record.
///
/// `Ok(None)` means the path does not resolve; a resolved value that is not a
/// valid key is a data error.
pub fn extract_key(record: &Record, key_path: &KeyPath) -> EngineResult<Option<Key>> {
    match key_path {
        KeyPath::OutOfLine => Ok(None),
        KeyPath::Single(path) => match resolve_path(record, path) {
            None => Ok(None),
            Some(value) => Key::from_json(value).map(Some).ok_or_else(|| {
                EngineError::Data(format!(
                    "Evaluating the key path '{}' yielded a value that is not a valid key",
                    path
                ))
            }),
        },
        KeyPath::Compound(paths) => {
            let mut parts = Vec::with_capacity(paths.len());
            for path in paths {
                match extract_key(record, &KeyPath::Single(path.clone()))? {
                    Some(part) => parts.push(part),
                    None => return Ok(None),
                }
            }
            Ok(Some(Key::Array(parts)))
        }
    }
}

fn resolve_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(record);
    }
    path.split('.').try_fold(record, |value, segment| value.as_object()?.get(segment))
}

fn inject_key(record: &mut Value, path: &str, key: &Key) -> EngineResult<()> {
    let not_insertable = || EngineError::Data("A generated key could not be inserted into the value".into());

    let mut segments = path.split('.').peekable();
    let mut current = record;
    while let Some(segment) = segments.next() {
        let object = current.as_object_mut().ok_or_else(not_insertable)?;
        if segments.peek().is_none() {
            object.insert(segment.to_string(), key.to_json());
            return Ok(());
        }
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    Err(not_insertable())
}

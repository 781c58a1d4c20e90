use crate::core::{ConfigError, Result};
use crate::schema::{StoreConfig, StoreDeclarations, StoreInput, ValidatedSchema, verify_parameters};
use serde_json::Value;
use std::fmt;

/// Largest schema version the engine accepts (2^53 - 1).
pub const MAX_VERSION: u64 = 9_007_199_254_740_991;

/// Requested schema version, as given by the caller.
///
/// Kept loosely typed until validation so that a fractional or non-numeric
/// version is reported as a configuration error instead of being rounded.
#[derive(Debug, Clone, PartialEq)]
pub enum VersionSpec {
    Integer(i128),
    Float(f64),
    Json(Value),
}

impl VersionSpec {
    /// The version as a positive integer.
    pub fn resolve(&self) -> std::result::Result<u64, ConfigError> {
        let invalid = || ConfigError::InvalidVersion(self.to_string());

        match self {
            VersionSpec::Integer(n) => {
                if *n < 1 || *n > MAX_VERSION as i128 {
                    return Err(invalid());
                }
                Ok(*n as u64)
            }
            VersionSpec::Float(f) => {
                if !f.is_finite() || f.fract() != 0.0 || *f < 1.0 || *f > MAX_VERSION as f64 {
                    return Err(invalid());
                }
                Ok(*f as u64)
            }
            VersionSpec::Json(Value::Number(number)) => {
                let spec = if let Some(n) = number.as_u64() {
                    VersionSpec::Integer(n as i128)
                } else if let Some(n) = number.as_i64() {
                    VersionSpec::Integer(n as i128)
                } else {
                    VersionSpec::Float(number.as_f64().unwrap_or(f64::NAN))
                };
                spec.resolve().map_err(|_| invalid())
            }
            VersionSpec::Json(_) => Err(invalid()),
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpec::Integer(n) => write!(f, "{}", n),
            VersionSpec::Float(n) => write!(f, "{}", n),
            VersionSpec::Json(value) => write!(f, "{}", value),
        }
    }
}

macro_rules! integer_version_from {
    ($($source:ty),*) => {
        $(
            impl From<$source> for VersionSpec {
                fn from(version: $source) -> Self {
                    VersionSpec::Integer(version as i128)
                }
            }
        )*
    };
}

integer_version_from!(i32, i64, u32, u64);

impl From<f64> for VersionSpec {
    fn from(version: f64) -> Self {
        VersionSpec::Float(version)
    }
}

impl From<Value> for VersionSpec {
    fn from(version: Value) -> Self {
        VersionSpec::Json(version)
    }
}

/// Session construction parameters
///
/// Built with chained setters, or read from a JSON options object:
///
/// ```ignore
/// let config = SessionConfig::new("Shop", ["Orders"], 1)
///     .store("Customers")
///     .store_config(StoreConfig::named("Logs").out_of_line().auto_increment(false));
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Database name, `None` when the caller gave none
    pub database_name: Option<String>,

    /// Store declarations in any accepted shape
    pub stores: StoreInput,

    /// Requested schema version
    pub version: VersionSpec,
}

impl SessionConfig {
    /// Create a new session configuration
    pub fn new(database_name: impl Into<String>, stores: impl Into<StoreInput>, version: impl Into<VersionSpec>) -> Self {
        Self {
            database_name: Some(database_name.into()),
            stores: stores.into(),
            version: version.into(),
        }
    }

    /// Replace the store declarations
    pub fn stores(mut self, stores: impl Into<StoreInput>) -> Self {
        self.stores = stores.into();
        self
    }

    /// Declare one more store by name, with default key policy
    pub fn store(self, name: impl Into<String>) -> Self {
        self.store_config(StoreConfig::named(name))
    }

    /// Declare one more store
    ///
    /// Raw JSON declarations are parsed first; if they do not parse, they
    /// are left as they are so validation reports the first problem.
    pub fn store_config(mut self, config: StoreConfig) -> Self {
        let declarations = match &self.stores {
            StoreInput::Declared(declarations) => Some(declarations.clone()),
            StoreInput::Json(value) => StoreDeclarations::from_json(value).ok(),
        };

        if let Some(mut declarations) = declarations {
            declarations.push(config);
            self.stores = StoreInput::Declared(declarations);
        }
        self
    }

    /// Set the schema version
    pub fn version(mut self, version: impl Into<VersionSpec>) -> Self {
        self.version = version.into();
        self
    }

    /// Read an options object
    ///
    /// Format: `{ "databaseName": "...", "storeNames": [...] | "stores": ..., "version": 1 }`
    ///
    /// Nothing is checked here; a missing or wrongly typed field is reported by
    /// [`verify`](SessionConfig::verify).
    pub fn from_json(options: &Value) -> Self {
        let database_name = options
            .get("databaseName")
            .and_then(Value::as_str)
            .map(str::to_string);

        let stores = options
            .get("storeNames")
            .or_else(|| options.get("stores"))
            .cloned()
            .unwrap_or(Value::Null);

        let version = options.get("version").cloned().unwrap_or(Value::Null);

        Self {
            database_name,
            stores: StoreInput::Json(stores),
            version: VersionSpec::Json(version),
        }
    }

    /// Validate configuration
    pub fn verify(&self) -> Result<ValidatedSchema> {
        verify_parameters(self.database_name.as_deref(), &self.stores, &self.version)
    }
}

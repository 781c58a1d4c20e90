//! Constructor parameter validation.
//!
//! Runs synchronously and fails on the first problem found, in this order:
//! database name, store declarations, store names, key paths, auto-increment
//! flags, nested options, version.

use crate::core::{ConfigError, DbError, Result};
use crate::facade::config::VersionSpec;
use tracing::debug;

use super::declaration::{RejectedField, StoreInput};
use super::definition::{KeyPath, StoreDefinition};
use super::normalize::normalize;

/// Everything a session needs once its parameters are known to be good.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSchema {
    pub database_name: String,
    pub version: u64,
    pub stores: Vec<StoreDefinition>,
}

impl ValidatedSchema {
    pub fn store(&self, name: &str) -> Option<&StoreDefinition> {
        self.stores.iter().find(|store| store.name == name)
    }

    pub fn store_names(&self) -> Vec<&str> {
        self.stores.iter().map(|store| store.name.as_str()).collect()
    }
}

pub fn verify_parameters(
    database_name: Option<&str>,
    stores: &StoreInput,
    version: &VersionSpec,
) -> Result<ValidatedSchema> {
    let database_name = match database_name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Err(ConfigError::InvalidDatabaseName.into()),
    };

    let declarations = stores.declarations()?;
    let stores = normalize(&declarations);
    if stores.is_empty() {
        return Err(ConfigError::NoStores.into());
    }

    for (index, store) in stores.iter().enumerate() {
        if !is_valid_store_name(&store.name) {
            return Err(ConfigError::InvalidStoreName { index }.into());
        }
    }

    // Each check covers every store before the next one starts.
    let rejected = declarations.rejected_fields();

    for (store, rejected) in stores.iter().zip(&rejected) {
        let reason = rejected.iter().find_map(|field| match field {
            RejectedField::KeyPath(reason) => Some(reason),
            _ => None,
        });
        if let Some(reason) = reason {
            return Err(ConfigError::InvalidKeyPath {
                store: store.name.clone(),
                reason: reason.clone(),
            }
            .into());
        }
        verify_key_path(store)?;
    }

    for (store, rejected) in stores.iter().zip(&rejected) {
        if rejected.contains(&RejectedField::AutoIncrement) {
            return Err(ConfigError::InvalidAutoIncrement {
                store: store.name.clone(),
            }
            .into());
        }
    }

    for (store, rejected) in stores.iter().zip(&rejected) {
        if rejected.contains(&RejectedField::Options) {
            return Err(ConfigError::InvalidOptions {
                store: store.name.clone(),
            }
            .into());
        }
    }

    let version = version.resolve()?;

    debug!(
        database = %database_name,
        version,
        stores = stores.len(),
        "session parameters verified"
    );

    Ok(ValidatedSchema {
        database_name,
        version,
        stores,
    })
}

fn is_valid_store_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.chars().any(char::is_control)
}

fn verify_key_path(store: &StoreDefinition) -> Result<()> {
    let reason = match &store.key_path {
        KeyPath::OutOfLine | KeyPath::Single(_) => return Ok(()),
        KeyPath::Compound(paths) if paths.is_empty() => "a compound key path needs at least one segment",
        KeyPath::Compound(paths) if paths.iter().any(String::is_empty) => {
            "compound key path segments must not be empty"
        }
        KeyPath::Compound(_) => return Ok(()),
    };

    Err(DbError::Configuration(ConfigError::InvalidKeyPath {
        store: store.name.clone(),
        reason: reason.to_string(),
    }))
}

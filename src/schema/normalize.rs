use super::declaration::{RejectedField, StoreConfig, StoreDeclarations};
use super::definition::{DEFAULT_AUTO_INCREMENT, StoreDefinition};

/// Fold any declaration shape into the canonical, ordered schema.
///
/// Sequence forms keep their order; the map form follows key order.
/// Missing or non-string names normalize to an empty string, which the
/// validator rejects.
pub fn normalize(declarations: &StoreDeclarations) -> Vec<StoreDefinition> {
    match declarations {
        StoreDeclarations::Names(names) => names.iter().map(StoreDefinition::new).collect(),
        StoreDeclarations::Configs(configs) => configs
            .iter()
            .map(|config| canonical(config, None))
            .collect(),
        StoreDeclarations::Map(map) => map
            .iter()
            .map(|(name, config)| match config {
                Some(config) => canonical(config, Some(name)),
                None => StoreDefinition::new(name.as_str()),
            })
            .collect(),
    }
}

fn canonical(config: &StoreConfig, map_key: Option<&str>) -> StoreDefinition {
    let name = if config.rejects(&RejectedField::Name) {
        String::new()
    } else {
        config
            .name
            .as_deref()
            .or(config.store_name.as_deref())
            .or(map_key)
            .unwrap_or_default()
            .to_string()
    };

    let nested = config.options.as_ref();

    // Top-level fields win over the nested options.
    let key_path = config
        .key_path
        .clone()
        .or_else(|| nested.and_then(|options| options.key_path.clone()))
        .unwrap_or_default();

    let auto_increment = config
        .auto_increment
        .or_else(|| nested.and_then(|options| options.auto_increment))
        .unwrap_or(DEFAULT_AUTO_INCREMENT);

    StoreDefinition {
        name,
        key_path,
        auto_increment,
    }
}

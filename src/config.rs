//! Settings: the model, layered loading and server settings helpers.

pub mod dotted;
pub mod load;
pub mod settings;
pub mod user;

pub use dotted::{deep_merge, expand_dotted_keys};
pub use load::{
    SettingsEvent, SettingsEventKind, SettingsLoadOutcome, SettingsOverride, load_settings,
};
pub use settings::{
    BridgeSettings, DEFAULT_PRIORITY, DEFAULT_ROOT_URI, ServerConfig, SettingsLayer, Timeouts,
};
pub use user::{UserConfigError, UserConfigResult, load_config_file, user_config_path};

use std::collections::HashMap;

/// Merge multiple layers in order.
/// Later layers in the slice have higher precedence (override earlier ones).
pub fn merge_all(layers: &[Option<SettingsLayer>]) -> Option<SettingsLayer> {
    layers.iter().cloned().reduce(merge_settings).flatten()
}

/// Merge two layers, preferring values from `primary` over `fallback`.
pub fn merge_settings(
    fallback: Option<SettingsLayer>,
    primary: Option<SettingsLayer>,
) -> Option<SettingsLayer> {
    match (fallback, primary) {
        (None, None) => None,
        (Some(settings), None) | (None, Some(settings)) => Some(settings),
        (Some(fallback), Some(primary)) => Some(SettingsLayer {
            root_uri: primary.root_uri.or(fallback.root_uri),
            language_servers: merge_language_servers(
                fallback.language_servers,
                primary.language_servers,
            ),
            timeouts: primary.timeouts.or(fallback.timeouts),
        }),
    }
}

fn merge_language_servers(
    fallback: Option<HashMap<String, ServerConfig>>,
    primary: Option<HashMap<String, ServerConfig>>,
) -> Option<HashMap<String, ServerConfig>> {
    match (fallback, primary) {
        (None, None) => None,
        (Some(servers), None) | (None, Some(servers)) => Some(servers),
        (Some(mut fallback_servers), Some(primary_servers)) => {
            // Deep merge: for each server id, merge individual ServerConfig fields
            for (key, primary_config) in primary_servers {
                fallback_servers
                    .entry(key)
                    .and_modify(|fallback_config| {
                        // For Vec fields: use primary if non-empty, else keep fallback
                        if !primary_config.cmd.is_empty() {
                            fallback_config.cmd = primary_config.cmd.clone();
                        }
                        if !primary_config.languages.is_empty() {
                            fallback_config.languages = primary_config.languages.clone();
                        }
                        // For Option fields: primary.or(fallback)
                        fallback_config.priority =
                            primary_config.priority.or(fallback_config.priority);
                        fallback_config.display_name = primary_config
                            .display_name
                            .clone()
                            .or(fallback_config.display_name.take());
                        fallback_config.initialization_options = primary_config
                            .initialization_options
                            .clone()
                            .or(fallback_config.initialization_options.take());
                        // Settings merge key by key
                        for (setting, value) in &primary_config.settings {
                            fallback_config
                                .settings
                                .insert(setting.clone(), value.clone());
                        }
                    })
                    .or_insert(primary_config);
            }
            Some(fallback_servers)
        }
    }
}

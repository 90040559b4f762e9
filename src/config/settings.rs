use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Priority of a server that does not configure one.
pub const DEFAULT_PRIORITY: u32 = 50;

/// Workspace root used when none is configured.
pub const DEFAULT_ROOT_URI: &str = "file:///";

/// One configured language server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Program and arguments, e.g. `["pylsp"]`
    #[serde(default)]
    pub cmd: Vec<String>,
    /// Languages this server handles
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Server settings, keys may be dotted (`pylsp.plugins.flake8.enabled`)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub settings: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialization_options: Option<Value>,
}

impl ServerConfig {
    pub fn priority(&self) -> u32 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }

    pub fn handles(&self, language: &str) -> bool {
        self.languages.iter().any(|l| l == language)
    }

    pub fn display_name<'a>(&'a self, server_id: &'a str) -> &'a str {
        self.display_name.as_deref().unwrap_or(server_id)
    }
}

/// How long a connection may take to become ready.
///
/// Readiness is polled quickly during the first window and slowly during
/// the second one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timeouts {
    pub first_timeout_secs: u64,
    pub second_timeout_minutes: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            first_timeout_secs: 30,
            second_timeout_minutes: 5,
        }
    }
}

impl Timeouts {
    pub fn first(&self) -> Duration {
        Duration::from_secs(self.first_timeout_secs)
    }

    pub fn second(&self) -> Duration {
        Duration::from_secs(self.second_timeout_minutes * 60)
    }
}

/// One settings layer as written in a TOML file or sent by a client.
///
/// Every field is optional so that a layer only overrides what it names.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsLayer {
    pub root_uri: Option<String>,
    pub language_servers: Option<HashMap<String, ServerConfig>>,
    pub timeouts: Option<Timeouts>,
}

/// Effective settings after all layers were merged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeSettings {
    pub root_uri: String,
    pub language_servers: HashMap<String, ServerConfig>,
    pub timeouts: Timeouts,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            root_uri: DEFAULT_ROOT_URI.to_string(),
            language_servers: HashMap::new(),
            timeouts: Timeouts::default(),
        }
    }
}

impl From<SettingsLayer> for BridgeSettings {
    fn from(layer: SettingsLayer) -> Self {
        let defaults = BridgeSettings::default();
        Self {
            root_uri: layer.root_uri.unwrap_or(defaults.root_uri),
            language_servers: layer.language_servers.unwrap_or_default(),
            timeouts: layer.timeouts.unwrap_or(defaults.timeouts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_parses_from_toml() {
        let toml_str = r#"
            cmd = ["pylsp", "--verbose"]
            languages = ["python"]
            priority = 80
            displayName = "Python LSP Server"

            [settings]
            "pylsp.plugins.flake8.enabled" = true
        "#;

        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.cmd, vec!["pylsp", "--verbose"]);
        assert!(config.handles("python"));
        assert!(!config.handles("r"));
        assert_eq!(config.priority(), 80);
        assert_eq!(config.display_name("pylsp"), "Python LSP Server");
        assert_eq!(
            config.settings.get("pylsp.plugins.flake8.enabled"),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn missing_priority_defaults_to_fifty() {
        let config: ServerConfig = toml::from_str(r#"cmd = ["r-ls"]"#).unwrap();
        assert_eq!(config.priority(), DEFAULT_PRIORITY);
        assert_eq!(config.display_name("r-ls"), "r-ls");
    }

    #[test]
    fn layer_fills_defaults() {
        let layer: SettingsLayer = toml::from_str(
            r#"
            [timeouts]
            firstTimeoutSecs = 10
        "#,
        )
        .unwrap();
        let settings = BridgeSettings::from(layer);

        assert_eq!(settings.root_uri, DEFAULT_ROOT_URI);
        assert_eq!(settings.timeouts.first(), Duration::from_secs(10));
        assert_eq!(settings.timeouts.second(), Duration::from_secs(300));
    }
}

use std::path::Path;

use serde_json::Value;

use super::user::{CONFIG_FILE_NAME, load_config_file, load_user_config};
use super::{BridgeSettings, SettingsLayer, merge_all};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingsEventKind {
    Info,
    Warning,
}

/// Something worth telling the user about while loading settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingsEvent {
    pub kind: SettingsEventKind,
    pub message: String,
}

impl SettingsEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: SettingsEventKind::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: SettingsEventKind::Warning,
            message: message.into(),
        }
    }

    /// Forward to the log facade.
    pub fn log(&self) {
        match self.kind {
            SettingsEventKind::Info => log::info!(target: "polylsp::config", "{}", self.message),
            SettingsEventKind::Warning => {
                log::warn!(target: "polylsp::config", "{}", self.message)
            }
        }
    }
}

/// Where the highest precedence layer came from.
#[derive(Clone, Debug, PartialEq)]
pub enum SettingsOverride<'a> {
    File(&'a Path),
    Json(Value),
}

#[derive(Debug, Default)]
pub struct SettingsLoadOutcome {
    pub settings: BridgeSettings,
    pub events: Vec<SettingsEvent>,
}

/// Load settings from every layer.
///
/// Layers from lowest to highest precedence: defaults, user config, project
/// config at `<root_path>/polylsp.toml`, explicit override. Problems with a
/// layer skip that layer and are reported as events.
pub fn load_settings(
    root_path: Option<&Path>,
    override_settings: Option<SettingsOverride<'_>>,
) -> SettingsLoadOutcome {
    let mut events = Vec::new();

    let user_config = load_user_config_with_events(&mut events);
    let project_settings = root_path
        .map(|root| root.join(CONFIG_FILE_NAME))
        .filter(|path| path.exists())
        .and_then(|path| load_file_with_events(&path, &mut events));
    let override_settings = override_settings.and_then(|source| match source {
        SettingsOverride::File(path) => load_file_with_events(path, &mut events),
        SettingsOverride::Json(value) => parse_override_settings(value, &mut events),
    });

    let merged = merge_all(&[
        Some(SettingsLayer::default()),
        user_config,
        project_settings,
        override_settings,
    ]);
    let settings = merged.map(BridgeSettings::from).unwrap_or_default();

    SettingsLoadOutcome { settings, events }
}

fn load_user_config_with_events(events: &mut Vec<SettingsEvent>) -> Option<SettingsLayer> {
    match load_user_config() {
        Ok(Some(settings)) => {
            events.push(SettingsEvent::info("Loaded user config"));
            Some(settings)
        }
        Ok(None) => None,
        Err(err) => {
            events.push(SettingsEvent::warning(format!(
                "Failed to load user config: {}",
                err
            )));
            None
        }
    }
}

fn load_file_with_events(path: &Path, events: &mut Vec<SettingsEvent>) -> Option<SettingsLayer> {
    match load_config_file(path) {
        Ok(settings) => {
            events.push(SettingsEvent::info(format!(
                "Loaded config file: {}",
                path.display()
            )));
            Some(settings)
        }
        Err(err) => {
            events.push(SettingsEvent::warning(err.to_string()));
            None
        }
    }
}

fn parse_override_settings(value: Value, events: &mut Vec<SettingsEvent>) -> Option<SettingsLayer> {
    match serde_json::from_value::<SettingsLayer>(value) {
        Ok(settings) => Some(settings),
        Err(err) => {
            events.push(SettingsEvent::warning(format!(
                "Failed to parse settings override: {}",
                err
            )));
            None
        }
    }
}

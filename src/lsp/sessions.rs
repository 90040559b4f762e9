//! Configured language servers and which one serves a language.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::{ServerConfig, expand_dotted_keys};
use crate::error::{BridgeError, BridgeResult, LockResultExt};

/// One row of the read-only session listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub id: String,
    pub display_name: String,
    pub languages: Vec<String>,
    pub priority: u32,
    pub running: bool,
}

/// Specs of every configured server, keyed by server identity.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    servers: RwLock<BTreeMap<String, ServerConfig>>,
    warned_ties: Mutex<HashSet<(String, String)>>,
}

impl SessionRegistry {
    pub fn new(servers: HashMap<String, ServerConfig>) -> Self {
        Self {
            servers: RwLock::new(servers.into_iter().collect()),
            warned_ties: Mutex::new(HashSet::new()),
        }
    }

    pub fn server_config(&self, server_id: &str) -> Option<ServerConfig> {
        self.servers
            .read()
            .recover_poison("SessionRegistry::server_config")
            .get(server_id)
            .cloned()
    }

    /// Servers handling `language`, best first.
    ///
    /// Sorted by descending priority, then by id. Each pair of equally
    /// prioritized neighbours is warned about once.
    pub fn get_matching_servers(&self, language: &str) -> Vec<String> {
        let mut matches: Vec<(String, u32)> = self
            .servers
            .read()
            .recover_poison("SessionRegistry::get_matching_servers")
            .iter()
            .filter(|(_, config)| config.handles(language))
            .map(|(id, config)| (id.clone(), config.priority()))
            .collect();
        matches.sort_by(|(a_id, a_priority), (b_id, b_priority)| {
            b_priority.cmp(a_priority).then_with(|| a_id.cmp(b_id))
        });

        for pair in matches.windows(2) {
            let [(first, first_priority), (second, second_priority)] = pair else {
                continue;
            };
            if first_priority != second_priority {
                continue;
            }
            let newly_seen = self
                .warned_ties
                .lock()
                .recover_poison("SessionRegistry::get_matching_servers")
                .insert((first.clone(), second.clone()));
            if newly_seen {
                log::warn!(
                    target: "polylsp::sessions",
                    "{} and {} both serve {} with priority {}; preferring {}. Set a priority to choose explicitly",
                    first,
                    second,
                    language,
                    first_priority,
                    first
                );
            }
        }

        matches.into_iter().map(|(id, _)| id).collect()
    }

    /// Pairs of servers a tie warning was emitted for.
    pub fn warned_ties(&self) -> Vec<(String, String)> {
        let mut ties: Vec<_> = self
            .warned_ties
            .lock()
            .recover_poison("SessionRegistry::warned_ties")
            .iter()
            .cloned()
            .collect();
        ties.sort();
        ties
    }

    /// Merge `settings` (keys may be dotted) into the server's settings.
    ///
    /// Returns the expanded settings to send to a running server.
    pub fn set_configuration(
        &self,
        server_id: &str,
        settings: Map<String, Value>,
    ) -> BridgeResult<Value> {
        let mut servers = self
            .servers
            .write()
            .recover_poison("SessionRegistry::set_configuration");
        let config = servers
            .get_mut(server_id)
            .ok_or_else(|| BridgeError::config(format!("unknown language server {}", server_id)))?;
        config.settings.extend(settings);
        Ok(expand_dotted_keys(&config.settings))
    }

    /// Settings of `server_id` expanded into nested objects.
    pub fn expanded_settings(&self, server_id: &str) -> Option<Value> {
        self.servers
            .read()
            .recover_poison("SessionRegistry::expanded_settings")
            .get(server_id)
            .map(|config| expand_dotted_keys(&config.settings))
    }

    /// Every configured server; `running` says which have a live connection.
    pub fn list(&self, running: impl Fn(&str) -> bool) -> Vec<SessionStatus> {
        self.servers
            .read()
            .recover_poison("SessionRegistry::list")
            .iter()
            .map(|(id, config)| SessionStatus {
                id: id.clone(),
                display_name: config.display_name(id).to_string(),
                languages: config.languages.clone(),
                priority: config.priority(),
                running: running(id),
            })
            .collect()
    }
}

//! Client capabilities we announce and server capabilities we learn.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;
use tower_lsp_server::ls_types::{Registration, Unregistration};

use crate::config::deep_merge;
use crate::error::LockResultExt;

/// Server capability key announcing support for a request method.
pub fn capability_for_method(method: &str) -> Option<&'static str> {
    let key = match method {
        "textDocument/completion" => "completionProvider",
        "textDocument/hover" => "hoverProvider",
        "textDocument/signatureHelp" => "signatureHelpProvider",
        "textDocument/declaration" => "declarationProvider",
        "textDocument/definition" => "definitionProvider",
        "textDocument/typeDefinition" => "typeDefinitionProvider",
        "textDocument/implementation" => "implementationProvider",
        "textDocument/references" => "referencesProvider",
        "textDocument/documentHighlight" => "documentHighlightProvider",
        "textDocument/documentSymbol" => "documentSymbolProvider",
        "textDocument/codeAction" => "codeActionProvider",
        "textDocument/formatting" => "documentFormattingProvider",
        "textDocument/rangeFormatting" => "documentRangeFormattingProvider",
        "textDocument/rename" => "renameProvider",
        "textDocument/diagnostic" => "diagnosticProvider",
        "textDocument/semanticTokens" => "semanticTokensProvider",
        "textDocument/didOpen"
        | "textDocument/didChange"
        | "textDocument/didSave"
        | "textDocument/didClose" => "textDocumentSync",
        "workspace/symbol" => "workspaceSymbolProvider",
        "workspace/executeCommand" => "executeCommandProvider",
        _ => return None,
    };
    Some(key)
}

/// Capabilities every connection announces regardless of features.
pub fn base_client_capabilities() -> Value {
    serde_json::json!({
        "textDocument": {
            "synchronization": {
                "dynamicRegistration": true,
                "didSave": true,
                "willSave": false,
                "willSaveWaitUntil": false
            }
        },
        "workspace": {
            "configuration": true,
            "didChangeConfiguration": { "dynamicRegistration": true },
            "workspaceFolders": true
        },
        "window": {
            "showMessage": {}
        }
    })
}

/// Union of the base capabilities and every feature's fragment.
pub fn merge_client_capabilities<I>(fragments: I) -> Value
where
    I: IntoIterator<Item = Value>,
{
    let mut merged = base_client_capabilities();
    for fragment in fragments {
        deep_merge(&mut merged, fragment);
    }
    merged
}

/// Thread-safe store for dynamically registered capabilities.
///
/// Keyed by registration id, so several registrations of one method with
/// different document selectors coexist.
#[derive(Debug, Default)]
pub(crate) struct DynamicCapabilityRegistry {
    registrations: RwLock<HashMap<String, Registration>>,
}

impl DynamicCapabilityRegistry {
    pub(crate) fn register(&self, registrations: Vec<Registration>) {
        let mut guard = self
            .registrations
            .write()
            .recover_poison("DynamicCapabilityRegistry::register()");
        for reg in registrations {
            guard.insert(reg.id.clone(), reg);
        }
    }

    pub(crate) fn unregister(&self, unregistrations: Vec<Unregistration>) {
        let mut guard = self
            .registrations
            .write()
            .recover_poison("DynamicCapabilityRegistry::unregister()");
        for unreg in unregistrations {
            guard.remove(&unreg.id);
        }
    }

    pub(crate) fn has_registration(&self, method: &str) -> bool {
        self.registrations
            .read()
            .recover_poison("DynamicCapabilityRegistry::has_registration()")
            .values()
            .any(|r| r.method == method)
    }

    /// Registered methods as capability entries (`key -> options or true`).
    fn as_capabilities(&self) -> Value {
        let guard = self
            .registrations
            .read()
            .recover_poison("DynamicCapabilityRegistry::as_capabilities()");
        let mut capabilities = serde_json::Map::new();
        for reg in guard.values() {
            if let Some(key) = capability_for_method(&reg.method) {
                let options = reg.register_options.clone().unwrap_or(Value::Bool(true));
                capabilities.insert(key.to_string(), options);
            }
        }
        Value::Object(capabilities)
    }
}

/// What a server can do: its initialize result plus dynamic registrations.
#[derive(Debug, Default)]
pub(crate) struct ServerCapabilitySet {
    advertised: RwLock<Value>,
    dynamic: DynamicCapabilityRegistry,
}

impl ServerCapabilitySet {
    pub(crate) fn set_advertised(&self, capabilities: Value) {
        *self
            .advertised
            .write()
            .recover_poison("ServerCapabilitySet::set_advertised()") = capabilities;
    }

    pub(crate) fn dynamic(&self) -> &DynamicCapabilityRegistry {
        &self.dynamic
    }

    /// Whether `capability` (e.g. `hoverProvider`) is advertised or was
    /// registered dynamically.
    pub(crate) fn provides(&self, capability: &str) -> bool {
        let advertised = self
            .advertised
            .read()
            .recover_poison("ServerCapabilitySet::provides()")
            .get(capability)
            .is_some_and(|value| !matches!(value, Value::Null | Value::Bool(false)));
        advertised
            || self
                .dynamic
                .registrations
                .read()
                .recover_poison("ServerCapabilitySet::provides()")
                .values()
                .any(|r| capability_for_method(&r.method) == Some(capability))
    }

    /// Advertised capabilities with dynamic registrations merged in.
    pub(crate) fn merged(&self) -> Value {
        let mut merged = self
            .advertised
            .read()
            .recover_poison("ServerCapabilitySet::merged()")
            .clone();
        if !merged.is_object() {
            merged = Value::Object(serde_json::Map::new());
        }
        deep_merge(&mut merged, self.dynamic.as_capabilities());
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registration(id: &str, method: &str) -> Registration {
        Registration {
            id: id.to_string(),
            method: method.to_string(),
            register_options: None,
        }
    }

    fn unregistration(id: &str, method: &str) -> Unregistration {
        Unregistration {
            id: id.to_string(),
            method: method.to_string(),
        }
    }

    #[test]
    fn same_method_registrations_coexist_until_all_are_removed() {
        let registry = DynamicCapabilityRegistry::default();
        registry.register(vec![
            registration("1", "textDocument/diagnostic"),
            registration("2", "textDocument/diagnostic"),
        ]);

        registry.unregister(vec![unregistration("1", "textDocument/diagnostic")]);
        assert!(registry.has_registration("textDocument/diagnostic"));

        registry.unregister(vec![unregistration("2", "textDocument/diagnostic")]);
        assert!(!registry.has_registration("textDocument/diagnostic"));
    }

    #[test]
    fn provides_checks_advertised_values() {
        let set = ServerCapabilitySet::default();
        set.set_advertised(json!({
            "hoverProvider": true,
            "renameProvider": false,
            "completionProvider": {"triggerCharacters": ["."]}
        }));

        assert!(set.provides("hoverProvider"));
        assert!(set.provides("completionProvider"));
        assert!(!set.provides("renameProvider"));
        assert!(!set.provides("definitionProvider"));
    }

    #[test]
    fn dynamic_registrations_are_merged_into_capabilities() {
        let set = ServerCapabilitySet::default();
        set.set_advertised(json!({"hoverProvider": true}));
        set.dynamic()
            .register(vec![registration("c", "textDocument/completion")]);

        assert!(set.provides("completionProvider"));
        assert_eq!(
            set.merged(),
            json!({"hoverProvider": true, "completionProvider": true})
        );

        set.dynamic()
            .unregister(vec![unregistration("c", "textDocument/completion")]);
        assert!(!set.provides("completionProvider"));
    }

    #[test]
    fn client_capabilities_are_the_union_of_fragments() {
        let merged = merge_client_capabilities([
            json!({"textDocument": {"hover": {"contentFormat": ["markdown"]}}}),
            json!({"textDocument": {"completion": {"dynamicRegistration": true}}}),
        ]);

        assert_eq!(merged["textDocument"]["hover"]["contentFormat"], json!(["markdown"]));
        assert_eq!(merged["textDocument"]["completion"]["dynamicRegistration"], true);
        assert_eq!(merged["textDocument"]["synchronization"]["didSave"], true);
        assert_eq!(merged["workspace"]["configuration"], true);
    }

    #[test]
    fn sync_notifications_map_to_text_document_sync() {
        assert_eq!(capability_for_method("textDocument/didSave"), Some("textDocumentSync"));
        assert_eq!(capability_for_method("custom/method"), None);
    }
}

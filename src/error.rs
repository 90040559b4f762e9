//! Error types for polylsp.
//!
//! Failures here never abort the host process: they degrade a single
//! language's features. Mapping misses are modelled as `Option` instead.

use std::sync::PoisonError;
use thiserror::Error;

/// Error type for bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Socket or process level failure
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The initialize handshake was rejected or malformed
    #[error("Handshake with {server_id} failed: {message}")]
    Handshake { server_id: String, message: String },

    /// A server did not become ready within the allowed window
    #[error("Timed out waiting for {what}")]
    Timeout { what: String },

    /// The connection closed while an operation was in flight
    #[error("Connection to {server_id} is closed")]
    ConnectionClosed { server_id: String },

    /// Server answered a request with a JSON-RPC error
    #[error("Protocol error ({code}): {message}")]
    Protocol { code: i64, message: String },

    /// Settings could not be read or parsed
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// No configured server handles this language, or it was blacklisted
    #[error("No language server available for {language}")]
    UnsupportedLanguage { language: String },

    /// An extractor returned foreign code without a range
    #[error("Extractor for {language} broke its contract: {message}")]
    ExtractorContract { language: String, message: String },
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    pub fn handshake(server_id: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::Handshake {
            server_id: server_id.into(),
            message: message.into(),
        }
    }

    pub fn timeout(what: impl Into<String>) -> Self {
        BridgeError::Timeout { what: what.into() }
    }

    pub fn connection_closed(server_id: impl Into<String>) -> Self {
        BridgeError::ConnectionClosed {
            server_id: server_id.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        BridgeError::Config {
            message: message.into(),
        }
    }

    pub fn unsupported_language(language: impl Into<String>) -> Self {
        BridgeError::UnsupportedLanguage {
            language: language.into(),
        }
    }

    /// Build a protocol error from a JSON-RPC `error` object.
    pub fn from_rpc_error(error: &serde_json::Value) -> Self {
        BridgeError::Protocol {
            code: error.get("code").and_then(|c| c.as_i64()).unwrap_or(-1),
            message: error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string(),
        }
    }
}

/// Recover the guard from a poisoned `std::sync` lock.
pub trait LockResultExt<T> {
    /// The context names the operation that hit the poisoned lock.
    fn recover_poison(self, context: &str) -> T;
}

impl<T> LockResultExt<T> for Result<T, PoisonError<T>> {
    fn recover_poison(self, context: &str) -> T {
        match self {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!(
                    target: "polylsp::lock_recovery",
                    "Recovered from poisoned lock in {}",
                    context
                );
                poisoned.into_inner()
            }
        }
    }
}

//! JSON-RPC message shapes exchanged with language servers.
//!
//! Builders return `serde_json::Value` so the connection layer stays
//! independent of any particular transport.

mod close_code;
mod lifecycle;
mod message;
mod request_id;
mod text_document;

pub use close_code::{CloseCode, CloseKind};
pub use lifecycle::{
    build_exit_notification, build_initialize_request, build_initialized_notification,
    build_shutdown_request, validate_initialize_response,
};
pub use message::{
    Incoming, METHOD_NOT_FOUND, build_error_response, build_notification, build_request,
    build_response,
};
pub use request_id::RequestId;
pub use text_document::{
    build_did_change_configuration, build_did_change_notification, build_did_close_notification,
    build_did_open_notification, build_did_save_notification,
};

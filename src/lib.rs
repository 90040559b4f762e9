//! Language-server plumbing for documents that embed several languages.
//!
//! A notebook cell may mix a host language with snippets of other
//! languages. Language servers expect one coherent file per language, so
//! this crate peels foreign spans out of host text into synthetic
//! *virtual documents*, keeps the coordinate tables needed to map
//! positions back and forth, and multiplexes those documents onto a small
//! number of shared server connections.

pub mod adapter;
pub mod config;
pub mod document;
pub mod error;
pub mod extractor;
pub mod lsp;
pub mod position;

pub use adapter::{AdapterState, DocumentWidget, WidgetAdapter, WidgetTracker};
pub use config::{BridgeSettings, ServerConfig};
pub use document::{CellType, CodeBlock, EditorId, VirtualDocument};
pub use error::{BridgeError, BridgeResult};
pub use extractor::{ExtractedSpan, ExtractorRegistry, ForeignCodeExtractor};
pub use lsp::{DocumentConnectionManager, LspConnection};
pub use position::{Editor, Position, Range, Root, Source, Virtual};

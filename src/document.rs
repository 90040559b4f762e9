//! Virtual documents.
//!
//! A [`VirtualDocument`] synthesizes one coherent single-language text out
//! of the code blocks of a host document. Foreign code found by the
//! extractors moves into child documents, forming a tree owned by the root.
//! Every rebuild is `clear()`, then one `append_code_block()` per block,
//! then `close_expired_documents()` (see [`update_documents`]).

pub mod block;
mod coordinates;
pub mod events;
mod extraction;
mod lines;
pub mod update;
pub mod uri;

pub use block::{CellType, CodeBlock, EditorId};
pub use events::{
    DocumentEvent, DocumentEventReceiver, DocumentEventSender, DocumentInfo, document_events,
    drain_events,
};
pub use update::{UpdateGuard, UpdateLock, update_documents};

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::extractor::{ExtractorRegistry, ForeignCodeExtractor};
use crate::position::{Editor, Position, Range, Source, Virtual, position_at_offset};

use extraction::{Extraction, ForeignPiece, extract};
use lines::{ColumnRun, EditorBlock, ForeignSpanRef, SourceLine, VirtualLine};

/// Blank lines separating two blocks in a document's text.
pub const BLANK_LINES_BETWEEN_BLOCKS: usize = 2;

/// Rebuilds an unused foreign document survives before it is closed.
pub const FOREIGN_DOCUMENT_LIFETIME: u32 = 6;

/// Disambiguates standalone documents of the same language.
static STANDALONE_INSTANCES: AtomicU64 = AtomicU64::new(0);

/// What a root document is made of.
#[derive(Debug, Clone)]
pub struct DocumentOptions {
    pub language: String,
    /// Path of the host document relative to the workspace root
    pub path: String,
    pub file_extension: String,
    pub registry: Arc<ExtractorRegistry>,
}

#[derive(Debug)]
struct ForeignChild {
    document: VirtualDocument,
    remaining_lifetime: u32,
    /// Received a span during the current rebuild
    used: bool,
    /// Creation order among standalone siblings, 0 when continuous
    instance: u64,
}

/// One node of the virtual document tree.
#[derive(Debug)]
pub struct VirtualDocument {
    options: DocumentOptions,
    /// `None` for the root
    virtual_id: Option<String>,
    id_path: String,
    standalone: bool,
    events: DocumentEventSender,

    line_blocks: Vec<String>,
    source_lines: Vec<SourceLine>,
    virtual_lines: Vec<VirtualLine>,
    editors: HashMap<EditorId, EditorBlock>,
    children: BTreeMap<String, ForeignChild>,
}

impl VirtualDocument {
    /// Create a root document publishing foreign document changes to `events`.
    pub fn new(options: DocumentOptions, events: DocumentEventSender) -> Self {
        let id_path = options.language.clone();
        Self::from_parts(options, None, id_path, false, events)
    }

    fn from_parts(
        options: DocumentOptions,
        virtual_id: Option<String>,
        id_path: String,
        standalone: bool,
        events: DocumentEventSender,
    ) -> Self {
        Self {
            options,
            virtual_id,
            id_path,
            standalone,
            events,
            line_blocks: Vec::new(),
            source_lines: Vec::new(),
            virtual_lines: Vec::new(),
            editors: HashMap::new(),
            children: BTreeMap::new(),
        }
    }

    pub fn language(&self) -> &str {
        &self.options.language
    }

    pub fn file_extension(&self) -> &str {
        &self.options.file_extension
    }

    pub fn path(&self) -> &str {
        &self.options.path
    }

    /// Key of this document in its parent's children.
    pub fn virtual_id(&self) -> Option<&str> {
        self.virtual_id.as_deref()
    }

    /// Ancestry chain, e.g. `python-r` for an R document inside a Python root.
    pub fn id_path(&self) -> &str {
        &self.id_path
    }

    pub fn is_root(&self) -> bool {
        self.virtual_id.is_none()
    }

    pub fn is_standalone(&self) -> bool {
        self.standalone
    }

    /// URI relative to the workspace root.
    pub fn uri(&self) -> String {
        let foreign = (!self.is_root()).then_some((self.id_path.as_str(), self.file_extension()));
        uri::virtual_document_uri(self.path(), foreign)
    }

    pub fn info(&self) -> DocumentInfo {
        DocumentInfo {
            uri: self.uri(),
            language: self.language().to_string(),
            id_path: self.id_path.clone(),
        }
    }

    /// Text sent to a language server: the line blocks joined by blank lines.
    pub fn value(&self) -> String {
        self.line_blocks
            .join(&"\n".repeat(BLANK_LINES_BETWEEN_BLOCKS + 1))
    }

    pub fn source_line_count(&self) -> usize {
        self.source_lines.len()
    }

    pub fn virtual_line_count(&self) -> usize {
        self.virtual_lines.len()
    }

    /// Editors that contributed a block during the current rebuild.
    pub fn editors(&self) -> impl Iterator<Item = &EditorId> {
        self.editors.keys()
    }

    pub fn has_editor(&self, editor: &EditorId) -> bool {
        self.editors.contains_key(editor)
    }

    pub fn child(&self, virtual_id: &str) -> Option<&VirtualDocument> {
        self.children.get(virtual_id).map(|child| &child.document)
    }

    /// Virtual ids of every direct child, used or not.
    pub fn foreign_document_ids(&self) -> Vec<String> {
        self.children.keys().cloned().collect()
    }

    /// Rebuilds left before the child `virtual_id` is closed.
    pub fn remaining_lifetime(&self, virtual_id: &str) -> Option<u32> {
        self.children
            .get(virtual_id)
            .map(|child| child.remaining_lifetime)
    }

    /// This document followed by every descendant that received code in the
    /// current rebuild, depth first.
    pub fn active_documents(&self) -> Vec<&VirtualDocument> {
        let mut documents = vec![self];
        for child in self.children.values().filter(|child| child.used) {
            documents.extend(child.document.active_documents());
        }
        documents
    }

    /// Append one block to this document.
    ///
    /// `editor_shift` is where the block's region starts in its editor and
    /// `virtual_shift` where the text itself starts inside that region.
    /// Foreign code found in the block is appended to the matching child.
    pub fn append_code_block(
        &mut self,
        block: &CodeBlock,
        editor_shift: Position<Editor>,
        virtual_shift: Option<Position<Editor>>,
    ) {
        let shift = editor_shift.translate(virtual_shift.unwrap_or_default());
        let extractors = self.options.registry.extractors_for(self.language());
        let extraction = extract(&block.text, block.cell_type, &extractors, self.language());
        let block_lines: Vec<&str> = block.text.split('\n').collect();

        if !self.line_blocks.is_empty() {
            for _ in 0..BLANK_LINES_BETWEEN_BLOCKS {
                self.virtual_lines.push(VirtualLine::padding());
            }
        }
        let first_source_line = self.source_lines.len() as u32;
        let first_virtual_line = self.virtual_lines.len() as u32;

        self.source_lines
            .extend((0..block_lines.len()).map(|line| SourceLine {
                editor: block.editor.clone(),
                block_line: line as u32,
                editor_shift: shift,
                runs: Vec::new(),
                foreign: Vec::new(),
            }));
        let remainder_line_count = extraction.remainder.split('\n').count();
        self.virtual_lines
            .extend((0..remainder_line_count).map(|_| VirtualLine {
                editor: Some(block.editor.clone()),
                runs: Vec::new(),
            }));
        self.record_runs(&extraction, &block_lines, first_source_line, first_virtual_line);

        self.editors
            .entry(block.editor.clone())
            .or_insert(EditorBlock {
                first_source_line,
                line_count: block_lines.len() as u32,
            });

        let Extraction {
            remainder, foreign, ..
        } = extraction;
        self.line_blocks.push(remainder);
        for piece in foreign {
            self.append_foreign(piece, block, shift, first_source_line);
        }
    }

    fn record_runs(
        &mut self,
        extraction: &Extraction,
        block_lines: &[&str],
        first_source_line: u32,
        first_virtual_line: u32,
    ) {
        let remainder_lines: Vec<&str> = extraction.remainder.split('\n').collect();

        for segment in extraction.segments.iter() {
            let Some(origin) = segment.origin else {
                continue;
            };
            let Some(text) = extraction
                .remainder
                .get(segment.start..segment.start + segment.len)
            else {
                continue;
            };

            let mut offset = segment.start;
            let mut block_offset = origin;
            for part in text.split('\n') {
                let local: Position<Virtual> = position_at_offset(offset, &remainder_lines);
                let source: Position<Source> = position_at_offset(block_offset, block_lines);
                let virtual_position = Position::new(first_virtual_line + local.line, local.column);
                let source_position = Position::new(first_source_line + source.line, source.column);
                let len = part.encode_utf16().count() as u32;

                if let Some(line) = self.source_lines.get_mut(source_position.line as usize) {
                    line.runs
                        .push(ColumnRun::new(source_position.column, len, virtual_position));
                }
                if let Some(line) = self.virtual_lines.get_mut(virtual_position.line as usize) {
                    line.runs
                        .push(ColumnRun::new(virtual_position.column, len, source_position));
                }

                offset += part.len() + 1;
                block_offset += part.len() + 1;
            }
        }
    }

    fn append_foreign(
        &mut self,
        piece: ForeignPiece,
        block: &CodeBlock,
        block_shift: Position<Editor>,
        first_source_line: u32,
    ) {
        let ForeignPiece {
            extractor,
            code,
            range,
            origin,
        } = piece;
        let child_block = CodeBlock::new(block.editor.clone(), code, CellType::Code);

        let child = self.choose_foreign_document(&extractor);
        let child_source_line = child.source_lines.len() as u32;
        child.append_code_block(
            &child_block,
            block_shift.translate(range.start),
            range.start.localize(origin),
        );
        let child_id = child.virtual_id().unwrap_or_default().to_string();

        let to_source = |p: Position<Editor>| Position::<Source>::new(first_source_line + p.line, p.column);
        let span = ForeignSpanRef {
            range: Range::new(to_source(range.start), to_source(range.end)),
            origin: to_source(origin),
            child_id,
            child_source_line,
        };
        for line in range.start.line..=range.end.line {
            if let Some(source_line) = self.source_lines.get_mut((first_source_line + line) as usize) {
                source_line.foreign.push(span.clone());
            }
        }
    }

    /// Child document receiving the next span of `extractor`.
    ///
    /// A continuous language reuses its existing child and renews its
    /// lifetime. A standalone span takes the oldest sibling of its language
    /// that has not received a span in this rebuild, and opens a new child
    /// only when every sibling is taken.
    pub fn choose_foreign_document(
        &mut self,
        extractor: &Arc<dyn ForeignCodeExtractor>,
    ) -> &mut VirtualDocument {
        let language = extractor.language();
        let (virtual_id, instance) = if extractor.is_standalone() {
            match self.unused_standalone(language) {
                Some(virtual_id) => (virtual_id, 0),
                None => {
                    let instance = STANDALONE_INSTANCES.fetch_add(1, Ordering::Relaxed) + 1;
                    (format!("{language}-{instance}"), instance)
                }
            }
        } else {
            (language.to_string(), 0)
        };

        match self.children.entry(virtual_id) {
            Entry::Occupied(entry) => {
                let child = entry.into_mut();
                child.used = true;
                child.remaining_lifetime = FOREIGN_DOCUMENT_LIFETIME;
                &mut child.document
            }
            Entry::Vacant(entry) => {
                let options = DocumentOptions {
                    language: language.to_string(),
                    path: self.options.path.clone(),
                    file_extension: extractor.file_extension().to_string(),
                    registry: Arc::clone(&self.options.registry),
                };
                let id_path = format!("{}-{}", self.id_path, entry.key());
                let document = VirtualDocument::from_parts(
                    options,
                    Some(entry.key().clone()),
                    id_path,
                    extractor.is_standalone(),
                    self.events.clone(),
                );
                log::debug!(
                    target: "polylsp::document",
                    "Opened foreign document {}",
                    document.id_path
                );
                // The tree keeps working when nobody listens
                let _ = self
                    .events
                    .send(DocumentEvent::ForeignOpened(document.info()));
                let child = entry.insert(ForeignChild {
                    document,
                    remaining_lifetime: FOREIGN_DOCUMENT_LIFETIME,
                    used: true,
                    instance,
                });
                &mut child.document
            }
        }
    }

    fn unused_standalone(&self, language: &str) -> Option<String> {
        self.children
            .iter()
            .filter(|(_, child)| {
                !child.used && child.document.standalone && child.document.language() == language
            })
            .min_by_key(|(_, child)| child.instance)
            .map(|(virtual_id, _)| virtual_id.clone())
    }

    /// Reset this document and every descendant for a rebuild.
    ///
    /// Children are kept but marked unused until a span claims them again.
    pub fn clear(&mut self) {
        self.line_blocks.clear();
        self.source_lines.clear();
        self.virtual_lines.clear();
        self.editors.clear();
        for child in self.children.values_mut() {
            child.used = false;
            child.document.clear();
        }
    }

    /// Age unused children by one rebuild and close those that expired.
    pub fn close_expired_documents(&mut self) {
        let mut expired = Vec::new();
        for (virtual_id, child) in self.children.iter_mut() {
            if child.used {
                child.document.close_expired_documents();
                continue;
            }
            child.remaining_lifetime = child.remaining_lifetime.saturating_sub(1);
            if child.remaining_lifetime == 0 {
                expired.push(virtual_id.clone());
            }
        }

        for virtual_id in expired {
            if let Some(mut child) = self.children.remove(&virtual_id) {
                log::debug!(
                    target: "polylsp::document",
                    "Closing expired foreign document {}",
                    child.document.id_path
                );
                child.document.close_children();
                let _ = self
                    .events
                    .send(DocumentEvent::ForeignClosed(child.document.info()));
            }
        }
    }

    fn close_children(&mut self) {
        for (_, mut child) in std::mem::take(&mut self.children) {
            child.document.close_children();
            let _ = self
                .events
                .send(DocumentEvent::ForeignClosed(child.document.info()));
        }
    }

    /// Close every descendant and drop all content.
    pub fn dispose(&mut self) {
        self.close_children();
        self.clear();
    }
}

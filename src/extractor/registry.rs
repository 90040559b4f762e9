use std::collections::HashMap;
use std::sync::Arc;

use super::ForeignCodeExtractor;

/// Host language key whose extractors apply to every host.
pub const ANY_HOST_LANGUAGE: &str = "*";

/// Extractors grouped by the host language they scan.
#[derive(Debug, Default, Clone)]
pub struct ExtractorRegistry {
    by_host: HashMap<String, Vec<Arc<dyn ForeignCodeExtractor>>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `extractor` for `host_language`, after any already registered.
    pub fn register(
        &mut self,
        host_language: impl Into<String>,
        extractor: Arc<dyn ForeignCodeExtractor>,
    ) {
        self.by_host
            .entry(host_language.into())
            .or_default()
            .push(extractor);
    }

    /// Extractors to fold over a block of `host_language` code.
    ///
    /// Extractors registered for [`ANY_HOST_LANGUAGE`] come first, followed
    /// by the host-specific ones, each group in registration order.
    pub fn extractors_for(&self, host_language: &str) -> Vec<Arc<dyn ForeignCodeExtractor>> {
        let any = self.by_host.get(ANY_HOST_LANGUAGE).into_iter().flatten();
        let scoped = (host_language != ANY_HOST_LANGUAGE)
            .then(|| self.by_host.get(host_language))
            .flatten()
            .into_iter()
            .flatten();
        any.chain(scoped).cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_host.values().all(Vec::is_empty)
    }
}

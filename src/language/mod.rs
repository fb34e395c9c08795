//! Per-language code discovery
//!
//! Providers are registered up front. [`LanguageRegistry::locate`] caches
//! the provider chosen for each language id and falls back to
//! [`NoopDiscoveryProvider`] when no provider claims the language.

mod detect;

pub use detect::{detect_language, language_for_file};

use crate::error::DiscoveryError;
use crate::types::{CodeLocation, CodeObjectId, DocumentInfo, FileUri, MethodUnderCaret};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Snapshot of an open file handed to discovery providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub uri: FileUri,
    /// Language id reported by the editor, empty if unknown
    pub language_id: String,
    pub text: Arc<str>,
    pub caret_offset: usize,
}

impl SourceFile {
    pub fn new(uri: impl Into<FileUri>, language_id: &str, text: &str, caret_offset: usize) -> Self {
        Self {
            uri: uri.into(),
            language_id: language_id.to_string(),
            text: Arc::from(text),
            caret_offset,
        }
    }

    /// Reported language id, or one derived from the file extension
    pub fn effective_language(&self) -> String {
        if self.language_id.is_empty() {
            language_for_file(&self.uri).to_string()
        } else {
            self.language_id.to_lowercase()
        }
    }
}

/// Capability implemented once per source language
///
/// Calls may block on host indexing; the engine only invokes them from
/// blocking worker threads.
pub trait DiscoveryProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Whether this provider handles files of the given language id
    fn handles_language(&self, language_id: &str) -> bool;

    fn is_supported_file(&self, file: &SourceFile) -> bool;

    fn detect_method_under_caret(
        &self,
        file: &SourceFile,
        offset: usize,
    ) -> Result<MethodUnderCaret, DiscoveryError>;

    fn build_document_info(&self, file: &SourceFile) -> Result<DocumentInfo, DiscoveryError>;

    fn find_locations_for_code_object_ids(
        &self,
        ids: &[CodeObjectId],
    ) -> Result<HashMap<CodeObjectId, CodeLocation>, DiscoveryError>;
}

/// Provider used for languages nobody claims. Finds nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiscoveryProvider;

impl DiscoveryProvider for NoopDiscoveryProvider {
    fn name(&self) -> &str {
        "noop"
    }

    fn handles_language(&self, _language_id: &str) -> bool {
        false
    }

    fn is_supported_file(&self, _file: &SourceFile) -> bool {
        false
    }

    fn detect_method_under_caret(
        &self,
        file: &SourceFile,
        _offset: usize,
    ) -> Result<MethodUnderCaret, DiscoveryError> {
        Ok(MethodUnderCaret::unsupported(file.uri.clone()))
    }

    fn build_document_info(&self, file: &SourceFile) -> Result<DocumentInfo, DiscoveryError> {
        Ok(DocumentInfo {
            file_uri: file.uri.clone(),
            methods: HashMap::new(),
        })
    }

    fn find_locations_for_code_object_ids(
        &self,
        _ids: &[CodeObjectId],
    ) -> Result<HashMap<CodeObjectId, CodeLocation>, DiscoveryError> {
        Ok(HashMap::new())
    }
}

/// Static language id -> provider registry
pub struct LanguageRegistry {
    providers: Vec<Arc<dyn DiscoveryProvider>>,
    resolved: RwLock<HashMap<String, Arc<dyn DiscoveryProvider>>>,
    noop: Arc<dyn DiscoveryProvider>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            resolved: RwLock::new(HashMap::new()),
            noop: Arc::new(NoopDiscoveryProvider),
        }
    }

    /// Register a provider. Earlier registrations win when two claim a language.
    pub fn with_provider(mut self, provider: Arc<dyn DiscoveryProvider>) -> Self {
        tracing::debug!("Registered discovery provider '{}'", provider.name());
        self.providers.push(provider);
        self
    }

    pub fn providers(&self) -> &[Arc<dyn DiscoveryProvider>] {
        &self.providers
    }

    /// Provider for a language id; the answer is cached for the registry's lifetime
    pub fn locate(&self, language_id: &str) -> Arc<dyn DiscoveryProvider> {
        let key = language_id.to_lowercase();

        if let Some(provider) = self
            .resolved
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return provider.clone();
        }

        let provider = self
            .providers
            .iter()
            .find(|p| p.handles_language(&key))
            .cloned()
            .unwrap_or_else(|| self.noop.clone());

        tracing::debug!("Language '{}' resolved to provider '{}'", key, provider.name());

        self.resolved
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key)
            .or_insert(provider)
            .clone()
    }

    pub fn locate_for(&self, file: &SourceFile) -> Arc<dyn DiscoveryProvider> {
        self.locate(&file.effective_language())
    }

    /// Ask every provider where the given code objects live. Provider
    /// failures are logged and skipped; the first provider to answer for an
    /// id wins.
    pub fn find_locations(&self, ids: &[CodeObjectId]) -> HashMap<CodeObjectId, CodeLocation> {
        let mut locations = HashMap::new();
        for provider in &self.providers {
            match provider.find_locations_for_code_object_ids(ids) {
                Ok(found) => {
                    for (id, location) in found {
                        locations.entry(id).or_insert(location);
                    }
                }
                Err(e) => {
                    tracing::warn!("Provider '{}' failed to find locations: {}", provider.name(), e)
                }
            }
        }
        locations
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

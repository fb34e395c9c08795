//! Per-file store of discovery results and backend summaries
//!
//! The cache owns every [`DocumentInfoContainer`]. Each operation takes the
//! lock once and touches a single file, so readers always see a consistent
//! snapshot of a container.

use crate::types::{CodeObjectId, CodeObjectSummary, DocumentInfo, FileUri, MethodInfo};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Discovery result for one file plus the summaries last fetched for it
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInfoContainer {
    document: Arc<DocumentInfo>,
    generation: u64,
    environment: Option<String>,
    summaries: HashMap<CodeObjectId, CodeObjectSummary>,
}

impl DocumentInfoContainer {
    fn new(document: DocumentInfo, generation: u64) -> Self {
        Self {
            document: Arc::new(document),
            generation,
            environment: None,
            summaries: HashMap::new(),
        }
    }

    pub fn document(&self) -> &DocumentInfo {
        &self.document
    }

    /// Resolve sequence number that produced this discovery result
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Environment the current summaries were fetched for
    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn summaries(&self) -> &HashMap<CodeObjectId, CodeObjectSummary> {
        &self.summaries
    }

    pub fn summary(&self, id: &CodeObjectId) -> Option<&CodeObjectSummary> {
        self.summaries.get(id)
    }

    pub fn method(&self, id: &CodeObjectId) -> Option<&MethodInfo> {
        self.document.methods.get(id)
    }

    pub fn code_object_ids(&self) -> Vec<CodeObjectId> {
        self.document.code_object_ids()
    }

    fn owns(&self, id: &CodeObjectId) -> bool {
        self.document.contains_code_object(id) || self.summaries.contains_key(id)
    }
}

/// Outcome of [`DocumentInfoCache::update_summaries`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryUpdate {
    /// The summary map was replaced; `changed` is false when it is identical
    Replaced { changed: bool },
    /// The fetch produced nothing usable, the previous summaries are kept
    Retained,
    /// The file is not (or no longer) cached
    FileNotCached,
    /// The fetch was issued for an older discovery result and was dropped
    Stale,
}

/// Shared cache of open files
#[derive(Debug, Default)]
pub struct DocumentInfoCache {
    files: RwLock<HashMap<FileUri, DocumentInfoContainer>>,
}

impl DocumentInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a discovery result, replacing whatever the file had. Last writer wins.
    pub async fn upsert(&self, file: &FileUri, document: DocumentInfo) {
        let mut files = self.files.write().await;
        let generation = files.get(file).map(|c| c.generation).unwrap_or(0);
        files.insert(file.clone(), DocumentInfoContainer::new(document, generation));
        tracing::debug!("Cached document info for {}", file);
    }

    /// Store a discovery result unless a newer resolve already stored one.
    /// Returns false when the result was stale and dropped.
    pub async fn upsert_generation(
        &self,
        file: &FileUri,
        generation: u64,
        document: DocumentInfo,
    ) -> bool {
        self.upsert_generation_if(file, generation, document, || true)
            .await
    }

    /// Like [`upsert_generation`](Self::upsert_generation), with `wanted`
    /// checked under the write lock so a file closed concurrently is never
    /// brought back.
    pub async fn upsert_generation_if(
        &self,
        file: &FileUri,
        generation: u64,
        document: DocumentInfo,
        wanted: impl FnOnce() -> bool,
    ) -> bool {
        let mut files = self.files.write().await;
        if !wanted() {
            tracing::debug!("Not caching document info for {} (generation {})", file, generation);
            return false;
        }
        if let Some(existing) = files.get(file)
            && existing.generation > generation
        {
            tracing::debug!(
                "Dropping stale document info for {} (generation {} < {})",
                file,
                generation,
                existing.generation
            );
            return false;
        }
        files.insert(file.clone(), DocumentInfoContainer::new(document, generation));
        true
    }

    /// Snapshot of a file's container
    pub async fn get(&self, file: &FileUri) -> Option<DocumentInfoContainer> {
        self.files.read().await.get(file).cloned()
    }

    pub async fn contains(&self, file: &FileUri) -> bool {
        self.files.read().await.contains_key(file)
    }

    /// Forget a file. Safe to call for files that were never cached.
    pub async fn remove(&self, file: &FileUri) -> bool {
        let removed = self.files.write().await.remove(file).is_some();
        if removed {
            tracing::debug!("Removed document info for {}", file);
        }
        removed
    }

    /// Apply the result of a summary fetch for a file
    ///
    /// `generation` is the container generation the fetch was issued for; a
    /// result for any other generation is dropped. `Some` replaces the map
    /// entirely (an empty list clears it), `None` keeps the previous summaries.
    pub async fn update_summaries(
        &self,
        file: &FileUri,
        generation: u64,
        environment: &str,
        fetched: Option<Vec<CodeObjectSummary>>,
    ) -> SummaryUpdate {
        let mut files = self.files.write().await;
        let Some(container) = files.get_mut(file) else {
            return SummaryUpdate::FileNotCached;
        };
        if container.generation != generation {
            tracing::debug!(
                "Dropping summaries for {} fetched for generation {} (now {})",
                file,
                generation,
                container.generation
            );
            return SummaryUpdate::Stale;
        }

        let Some(fetched) = fetched else {
            tracing::debug!("Keeping previous summaries for {}", file);
            return SummaryUpdate::Retained;
        };

        let summaries: HashMap<CodeObjectId, CodeObjectSummary> = fetched
            .into_iter()
            .map(|s| (s.code_object_id().clone(), s))
            .collect();

        let changed = container.summaries != summaries
            || container.environment.as_deref() != Some(environment);
        container.summaries = summaries;
        container.environment = Some(environment.to_string());

        SummaryUpdate::Replaced { changed }
    }

    pub async fn find_method_info(&self, file: &FileUri, id: &CodeObjectId) -> Option<MethodInfo> {
        self.files
            .read()
            .await
            .get(file)
            .and_then(|c| c.method(id).cloned())
    }

    /// Container of whichever open file declares the code object
    pub async fn find_container_owning_code_object(
        &self,
        id: &CodeObjectId,
    ) -> Option<DocumentInfoContainer> {
        self.files
            .read()
            .await
            .values()
            .find(|c| c.owns(id))
            .cloned()
    }

    pub async fn files(&self) -> Vec<FileUri> {
        let mut files: Vec<FileUri> = self.files.read().await.keys().cloned().collect();
        files.sort();
        files
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

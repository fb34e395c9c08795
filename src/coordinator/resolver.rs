use super::ResolveTracker;
use crate::document_cache::{DocumentInfoCache, SummaryUpdate};
use crate::environment::EnvironmentTracker;
use crate::error::DiscoveryError;
use crate::events::EngineEvent;
use crate::gateway::{AnalyticsApi, ResilientGateway};
use crate::language::{DiscoveryProvider, LanguageRegistry, SourceFile};
use crate::orchestrator::{OrchestratorHandle, OrchestratorMessage};
use crate::types::{ConnectionState, DocumentInfo, FileUri, MethodUnderCaret};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Access to the editor's view of open files
///
/// Implemented by the host integration. Must be cheap: it is called on every
/// resolve to snapshot the file text and caret.
pub trait EditorHost: Send + Sync {
    /// Current content of an open file, `None` if the file is not open
    fn snapshot(&self, file: &FileUri) -> Option<SourceFile>;
}

/// One unit of resolve work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub file: FileUri,
    pub sequence: u64,
    /// Caret offset from the triggering event; the host's caret otherwise
    pub offset: Option<usize>,
    /// Rebuild the document info even if the file is cached
    pub rediscover: bool,
}

/// Resolves the method under the caret and keeps the cache in sync
pub struct Resolver {
    host: Arc<dyn EditorHost>,
    registry: Arc<LanguageRegistry>,
    cache: Arc<DocumentInfoCache>,
    gateway: Arc<ResilientGateway>,
    environments: Arc<EnvironmentTracker>,
    orchestrator: OrchestratorHandle,
    events: broadcast::Sender<EngineEvent>,
    tracker: Arc<ResolveTracker>,
}

impl Resolver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: Arc<dyn EditorHost>,
        registry: Arc<LanguageRegistry>,
        cache: Arc<DocumentInfoCache>,
        gateway: Arc<ResilientGateway>,
        environments: Arc<EnvironmentTracker>,
        orchestrator: OrchestratorHandle,
        events: broadcast::Sender<EngineEvent>,
        tracker: Arc<ResolveTracker>,
    ) -> Self {
        Self {
            host,
            registry,
            cache,
            gateway,
            environments,
            orchestrator,
            events,
            tracker,
        }
    }

    pub fn tracker(&self) -> &Arc<ResolveTracker> {
        &self.tracker
    }

    /// Run a resolve to completion
    ///
    /// Discovery runs on a blocking thread. Provider errors and panics turn
    /// into an unsupported-file resolution for this file only. Results of a
    /// resolve that has been superseded are dropped.
    pub async fn resolve(&self, request: ResolveRequest) {
        let ResolveRequest {
            file,
            sequence,
            offset,
            rediscover,
        } = request;

        let Some(source) = self.host.snapshot(&file) else {
            tracing::debug!("{} is no longer open, skipping resolve {}", file, sequence);
            return;
        };
        let offset = offset.unwrap_or(source.caret_offset);
        let rediscover = rediscover || !self.cache.contains(&file).await;
        let provider = self.registry.locate_for(&source);
        let provider_name = provider.name().to_string();

        tracing::debug!(
            "Resolving {} at offset {} with '{}' (sequence {}, rediscover {})",
            file,
            offset,
            provider_name,
            sequence,
            rediscover
        );

        let outcome =
            tokio::task::spawn_blocking(move || discover(provider.as_ref(), &source, offset, rediscover))
                .await;

        let (caret, document) = match outcome {
            Ok(Ok(resolved)) => resolved,
            Ok(Err(e)) => {
                tracing::warn!("Discovery failed for {}: {}", file, e);
                (MethodUnderCaret::unsupported(file.clone()), None)
            }
            Err(e) => {
                let error = DiscoveryError::Panicked(file.to_string());
                tracing::error!("{} ('{}'): {}", error, provider_name, e);
                (MethodUnderCaret::unsupported(file.clone()), None)
            }
        };

        if !self.tracker.is_current(&file, sequence) {
            tracing::debug!("Resolve {} for {} was superseded, dropping result", sequence, file);
            return;
        }

        let stored = match document {
            Some(document) => {
                self.cache
                    .upsert_generation_if(&file, sequence, document, || {
                        self.tracker.is_current(&file, sequence)
                    })
                    .await
            }
            None => false,
        };

        if self.tracker.is_focused(&file) {
            self.orchestrator
                .send(OrchestratorMessage::Resolved { sequence, caret });
            if stored {
                self.orchestrator.send(OrchestratorMessage::Recompute);
            }
        }

        if stored {
            self.refresh_summaries(&file).await;
        }
    }

    /// Fetch summaries for a cached file in the current environment
    ///
    /// Skipped while the backend is unreachable or before an environment is
    /// known. The result is dropped if the file was rediscovered or the
    /// environment switched while the fetch was in flight. Emits [`EngineEvent::CodeLensRefresh`] when the summaries
    /// changed.
    pub async fn refresh_summaries(&self, file: &FileUri) -> SummaryUpdate {
        if self.gateway.monitor().state() == ConnectionState::Lost {
            tracing::trace!("Connection lost, not fetching summaries for {}", file);
            return SummaryUpdate::Retained;
        }
        let Some(environment) = self.environments.current() else {
            tracing::trace!("No environment yet, not fetching summaries for {}", file);
            return SummaryUpdate::Retained;
        };
        let Some(container) = self.cache.get(file).await else {
            return SummaryUpdate::FileNotCached;
        };

        let ids = container.code_object_ids();
        let fetched = if ids.is_empty() {
            Some(Vec::new())
        } else {
            self.gateway
                .fetch_summaries(&environment, &ids)
                .await
                .ok()
                .flatten()
        };

        if self.environments.current().as_deref() != Some(environment.as_str()) {
            tracing::debug!("Environment switched while fetching summaries for {}", file);
            return SummaryUpdate::Stale;
        }
        let update = self
            .cache
            .update_summaries(file, container.generation(), &environment, fetched)
            .await;
        if update == (SummaryUpdate::Replaced { changed: true }) {
            tracing::debug!("Summaries changed for {}", file);
            let _ = self.events.send(EngineEvent::CodeLensRefresh(file.clone()));
        }
        update
    }
}

fn discover(
    provider: &dyn DiscoveryProvider,
    file: &SourceFile,
    offset: usize,
    rediscover: bool,
) -> Result<(MethodUnderCaret, Option<DocumentInfo>), DiscoveryError> {
    if !provider.is_supported_file(file) {
        return Ok((MethodUnderCaret::unsupported(file.uri.clone()), None));
    }
    // a caret from an older snapshot may sit past the end of a shorter text
    let offset = offset.min(file.text.len());

    let caret = provider.detect_method_under_caret(file, offset)?;
    let document = if rediscover {
        Some(provider.build_document_info(file)?)
    } else {
        None
    };
    Ok((caret, document))
}

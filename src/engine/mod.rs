//! Engine entry point
//!
//! [`ContextEngine`] is constructed once per open workspace and owns every
//! component: cache, language registry, analytics gateway, debounce
//! coordinator and the orchestrator task. Host callbacks are cheap and never
//! block; all work is spawned on the tokio runtime.

use crate::config::Config;
use crate::connection::ConnectionMonitor;
use crate::coordinator::{EditorHost, EventCoordinator, ReasonClass, ResolveTracker, Resolver};
use crate::document_cache::DocumentInfoCache;
use crate::environment::EnvironmentTracker;
use crate::error::{SyncError, ValidationError};
use crate::events::EngineEvent;
use crate::gateway::{AnalyticsApi, AnalyticsGateway, HttpAnalyticsClient, LastError, ResilientGateway};
use crate::language::LanguageRegistry;
use crate::orchestrator::{
    ContextOrchestrator, ContextState, MethodContext, OrchestratorHandle, OrchestratorMessage,
};
use crate::types::{
    CodeLocation, CodeObjectError, CodeObjectId, CodeObjectInsight, ConnectionState, Environment,
    FileUri, MethodUnderCaret,
};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 256;

/// Context synchronization engine for one workspace
///
/// # Example
///
/// ```no_run
/// use context_sync::{Config, ContextEngine, EditorHost, FileUri, LanguageRegistry, SourceFile};
/// use std::sync::Arc;
///
/// struct Host;
///
/// impl EditorHost for Host {
///     fn snapshot(&self, file: &FileUri) -> Option<SourceFile> {
///         Some(SourceFile::new(file.clone(), "python", "def foo(): pass", 4))
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let engine = ContextEngine::new(Config::new()?, Arc::new(Host), LanguageRegistry::new())?;
///     let mut events = engine.subscribe();
///     engine.start();
///
///     engine.file_opened(&FileUri::new("file:///src/app.py"));
///     println!("{:?}", events.recv().await?);
///
///     engine.shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ContextEngine {
    config: Arc<ArcSwap<Config>>,
    cache: Arc<DocumentInfoCache>,
    registry: Arc<LanguageRegistry>,
    // Raw client holder, swapped on reconfiguration
    gateway: Arc<AnalyticsGateway>,
    // What the engine actually calls; never returns an error
    api: Arc<ResilientGateway>,
    monitor: Arc<ConnectionMonitor>,
    environments: Arc<EnvironmentTracker>,
    resolver: Arc<Resolver>,
    coordinator: Arc<EventCoordinator>,
    orchestrator: OrchestratorHandle,
    idle_orchestrator: Arc<Mutex<Option<ContextOrchestrator>>>,
    events: broadcast::Sender<EngineEvent>,
    shutdown: CancellationToken,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ContextEngine {
    /// Create an engine talking HTTP to the configured analytics backend
    pub fn new(
        config: Config,
        host: Arc<dyn EditorHost>,
        registry: LanguageRegistry,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let client = HttpAnalyticsClient::new(&config.analytics)?;
        Self::with_api(config, host, registry, Arc::new(client))
    }

    /// Create an engine on top of an existing analytics client
    pub fn with_api(
        config: Config,
        host: Arc<dyn EditorHost>,
        registry: LanguageRegistry,
        api: Arc<dyn AnalyticsApi>,
    ) -> Result<Self, SyncError> {
        config.validate()?;

        let shutdown = CancellationToken::new();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let cache = Arc::new(DocumentInfoCache::new());
        let registry = Arc::new(registry);
        let monitor = Arc::new(ConnectionMonitor::new(config.connection.clone()));
        let gateway = Arc::new(AnalyticsGateway::new(api));
        let resilient = Arc::new(
            ResilientGateway::new(
                gateway.clone(),
                monitor.clone(),
                ResilientGateway::policy_from_config(&config.analytics),
            )
            .with_events(events.clone())
            .with_cancellation(shutdown.clone()),
        );
        let environments = Arc::new(EnvironmentTracker::new());

        let orchestrator = ContextOrchestrator::new(cache.clone(), events.clone());
        let handle = orchestrator.handle();

        let resolver = Arc::new(Resolver::new(
            host,
            registry.clone(),
            cache.clone(),
            resilient.clone(),
            environments.clone(),
            handle.clone(),
            events.clone(),
            Arc::new(ResolveTracker::new()),
        ));
        let coordinator = Arc::new(EventCoordinator::new(
            resolver.clone(),
            config.context.quiet_period(),
            shutdown.clone(),
        ));

        tracing::info!(
            "Context engine created for {} ({} discovery providers)",
            config.analytics.base_url,
            registry.providers().len()
        );

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            cache,
            registry,
            gateway,
            api: resilient,
            monitor,
            environments,
            resolver,
            coordinator,
            orchestrator: handle,
            idle_orchestrator: Arc::new(Mutex::new(Some(orchestrator))),
            events,
            shutdown,
            tasks: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Spawn the orchestrator, the refresh loop and the reconnect watcher,
    /// then fetch the environment list. Calling it twice is a no-op.
    pub fn start(&self) {
        let Some(orchestrator) = self
            .idle_orchestrator
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        else {
            tracing::warn!("Context engine already started");
            return;
        };

        let (_, orchestrator_task) =
            orchestrator.spawn(self.monitor.subscribe(), self.shutdown.clone());

        let engine = self.clone();
        let refresh_task = tokio::spawn(async move { engine.refresh_loop().await });

        let engine = self.clone();
        let reconnect_task = tokio::spawn(async move { engine.watch_reconnects().await });

        let engine = self.clone();
        let initial_task = tokio::spawn(async move {
            engine.refresh_environments().await;
        });

        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend([orchestrator_task, refresh_task, reconnect_task, initial_task]);
        tracing::info!("Context engine started");
    }

    /// Cancel timers, pending retries and background tasks, then wait for them
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!("Background task failed: {}", e);
            }
        }
        tracing::info!("Context engine stopped");
    }

    // ===== Host events =====

    pub fn file_opened(&self, file: &FileUri) {
        tracing::debug!("File opened: {}", file);
        self.coordinator.resolve_now(file, true);
    }

    pub fn file_closed(&self, file: &FileUri) {
        tracing::debug!("File closed: {}", file);
        self.coordinator.tracker().forget(file);

        let cache = self.cache.clone();
        let orchestrator = self.orchestrator.clone();
        let file = file.clone();
        tokio::spawn(async move {
            cache.remove(&file).await;
            orchestrator.send(OrchestratorMessage::FileClosed(file));
        });
    }

    /// The editor switched tabs. `new_file` is `None` when no file is focused.
    pub fn selection_changed(&self, new_file: Option<&FileUri>, old_file: Option<&FileUri>) {
        tracing::debug!("Selection changed: {:?} -> {:?}", old_file, new_file);
        self.coordinator.cancel(ReasonClass::CaretMove);

        match new_file {
            Some(file) => self.coordinator.resolve_now(file, false),
            None => {
                self.coordinator.tracker().focus(None);
                self.orchestrator.send(OrchestratorMessage::Resolved {
                    sequence: 0,
                    caret: MethodUnderCaret::no_file(),
                });
            }
        }
    }

    pub fn caret_moved(&self, file: &FileUri, offset: usize) {
        self.coordinator.caret_moved(file, offset);
    }

    pub fn document_changed(&self, file: &FileUri) {
        self.coordinator.document_changed(file);
    }

    // ===== Configuration =====

    pub fn config(&self) -> Arc<Config> {
        self.config.load_full()
    }

    /// Swap in a new configuration without restarting
    ///
    /// A changed `[analytics]` section replaces the HTTP client atomically;
    /// calls already running finish on the old one. If the new client cannot
    /// be built the previous configuration stays in effect.
    pub async fn apply_config(&self, config: Config) -> Result<(), SyncError> {
        config.validate()?;
        let previous = self.config.load_full();

        let analytics_changed = previous.analytics != config.analytics;
        if analytics_changed {
            self.gateway.reconfigure(&config.analytics)?;
            self.api
                .set_policy(ResilientGateway::policy_from_config(&config.analytics));
        }
        if previous.connection != config.connection {
            self.monitor.update_config(config.connection.clone());
        }
        if previous.context != config.context {
            self.coordinator
                .set_quiet_period(config.context.quiet_period());
        }

        self.config.store(Arc::new(config));
        tracing::info!("Configuration applied");

        if analytics_changed {
            self.refresh_environments().await;
        }
        Ok(())
    }

    // ===== Environments =====

    pub fn environment(&self) -> Environment {
        self.environments.snapshot()
    }

    /// Ask the backend for its environments. Returns `None` if the call failed.
    pub async fn refresh_environments(&self) -> Option<Environment> {
        let all = self.api.list_environments().await.ok().flatten()?;

        let previous = self.environments.current();
        if self.environments.update_all(all) {
            let snapshot = self.environments.snapshot();
            let _ = self
                .events
                .send(EngineEvent::EnvironmentsChanged(snapshot));
            if self.environments.current() != previous {
                self.refresh_all_summaries().await;
            }
        }
        Some(self.environments.snapshot())
    }

    /// Explicit environment switch by the user
    pub async fn switch_environment(&self, name: &str) -> Result<(), SyncError> {
        if !self.environments.set_current(name)? {
            return Ok(());
        }
        let _ = self
            .events
            .send(EngineEvent::EnvironmentsChanged(self.environments.snapshot()));
        self.refresh_all_summaries().await;
        self.orchestrator.send(OrchestratorMessage::Recompute);
        Ok(())
    }

    // ===== Queries =====

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Last visible state, `None` before the first transition
    pub fn current_state(&self) -> Option<ContextState> {
        self.orchestrator.current()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.monitor.state()
    }

    pub fn needs_authentication(&self) -> bool {
        self.monitor.needs_authentication()
    }

    /// Most recent backend failure swallowed by the engine
    pub fn last_error(&self) -> Option<LastError> {
        self.api.last_error()
    }

    pub fn cache(&self) -> &Arc<DocumentInfoCache> {
        &self.cache
    }

    /// Insights for a method and its spans in the current environment
    pub async fn insights_for(
        &self,
        context: &MethodContext,
    ) -> Result<Vec<CodeObjectInsight>, SyncError> {
        let Some(environment) = self.linked_environment(context)? else {
            return Ok(Vec::new());
        };
        let ids = context.method.code_object_ids();
        Ok(self
            .api
            .fetch_insights(&environment, &ids)
            .await
            .ok()
            .flatten()
            .unwrap_or_default())
    }

    /// Errors recorded for a method in the current environment
    pub async fn errors_for(
        &self,
        context: &MethodContext,
    ) -> Result<Vec<CodeObjectError>, SyncError> {
        let Some(environment) = self.linked_environment(context)? else {
            return Ok(Vec::new());
        };
        Ok(self
            .api
            .fetch_errors_for_code_object(&environment, &context.method.id)
            .await
            .ok()
            .flatten()
            .unwrap_or_default())
    }

    /// Source locations of code objects, asked of every discovery provider
    pub async fn find_code_locations(
        &self,
        ids: &[CodeObjectId],
    ) -> HashMap<CodeObjectId, CodeLocation> {
        let registry = self.registry.clone();
        let ids = ids.to_vec();
        match tokio::task::spawn_blocking(move || registry.find_locations(&ids)).await {
            Ok(locations) => locations,
            Err(e) => {
                tracing::error!("Location lookup panicked: {}", e);
                HashMap::new()
            }
        }
    }

    fn linked_environment(&self, context: &MethodContext) -> Result<Option<String>, SyncError> {
        if !context.linked {
            return Err(ValidationError::UnlinkedMethod(context.method.name.clone()).into());
        }
        Ok(self.environments.current())
    }

    // ===== Background work =====

    /// Refresh summaries of every cached file
    pub async fn refresh_all_summaries(&self) {
        let files = self.cache.files().await;
        tracing::debug!("Refreshing summaries for {} files", files.len());
        futures::future::join_all(files.iter().map(|file| self.resolver.refresh_summaries(file)))
            .await;
    }

    /// One tick of the refresh loop: probe the backend while disconnected,
    /// refresh summaries otherwise
    pub async fn refresh_tick(&self) {
        if self.monitor.state() == ConnectionState::Lost {
            tracing::debug!("Probing analytics backend");
            self.refresh_environments().await;
        } else {
            self.refresh_all_summaries().await;
        }
    }

    async fn refresh_loop(self) {
        loop {
            let interval = self.config.load().context.refresh_interval();
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            self.refresh_tick().await;
        }
        tracing::debug!("Refresh loop stopped");
    }

    async fn watch_reconnects(self) {
        let mut connection = self.monitor.subscribe();
        let mut previous = *connection.borrow_and_update();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                changed = connection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            let state = *connection.borrow_and_update();
            if previous == ConnectionState::Lost && state == ConnectionState::Connected {
                tracing::info!("Backend reachable again, refreshing");
                if self.refresh_environments().await.is_some() {
                    self.refresh_all_summaries().await;
                }
            }
            previous = state;
        }
    }
}

#[cfg(test)]
mod tests;

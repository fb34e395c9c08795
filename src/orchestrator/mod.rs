//! Visible context state machine
//!
//! The orchestrator is the only owner of the visible state. It runs as a
//! single task fed by a channel, so every transition happens in order on one
//! logical thread:
//!
//! ```text
//!  resolver ──Resolved/Recompute──┐
//!  engine   ──FileClosed──────────┼──> ContextOrchestrator ──> EngineEvent::StateChanged
//!  monitor  ──watch<Connection>───┘
//! ```
//!
//! While the backend is unreachable the state is pinned to
//! [`ContextState::NoConnection`]; resolutions are still recorded so the
//! context can be rebuilt the moment the connection comes back.

use crate::document_cache::DocumentInfoCache;
use crate::events::EngineEvent;
use crate::types::{ConnectionState, FileUri, MethodInfo, MethodUnderCaret};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// A method the caret is in
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodContext {
    pub method: MethodInfo,
    /// False when `method` was synthesized from the caret resolution because
    /// discovery has no entry for it yet. Backend queries need a linked method.
    pub linked: bool,
}

/// What the UI should show
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all_fields = "camelCase")]
pub enum ContextState {
    NoFile,
    UnsupportedFile { file_uri: FileUri },
    /// Supported file, caret outside of any method
    FilePreview { file_uri: FileUri },
    MethodContext(MethodContext),
    NoConnection,
}

/// Input of the orchestrator task
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorMessage {
    /// A caret resolution finished
    Resolved {
        sequence: u64,
        caret: MethodUnderCaret,
    },
    /// Cached discovery data changed, re-derive the state from the last resolution
    Recompute,
    FileClosed(FileUri),
}

/// Cheap handle used to talk to the orchestrator task
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::UnboundedSender<OrchestratorMessage>,
    state: watch::Receiver<Option<ContextState>>,
}

impl OrchestratorHandle {
    pub fn send(&self, message: OrchestratorMessage) {
        if self.tx.send(message).is_err() {
            tracing::debug!("Orchestrator is gone, dropping message");
        }
    }

    /// Last state emitted, `None` before the first transition
    pub fn current(&self) -> Option<ContextState> {
        self.state.borrow().clone()
    }
}

/// Visible state machine
pub struct ContextOrchestrator {
    cache: Arc<DocumentInfoCache>,
    events: broadcast::Sender<EngineEvent>,
    state_tx: watch::Sender<Option<ContextState>>,
    connection: ConnectionState,
    last_caret: Option<MethodUnderCaret>,
    latest_sequence: HashMap<FileUri, u64>,
    tx: mpsc::UnboundedSender<OrchestratorMessage>,
    rx: Option<mpsc::UnboundedReceiver<OrchestratorMessage>>,
}

impl ContextOrchestrator {
    pub fn new(cache: Arc<DocumentInfoCache>, events: broadcast::Sender<EngineEvent>) -> Self {
        let (state_tx, _) = watch::channel(None);
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            cache,
            events,
            state_tx,
            connection: ConnectionState::Unknown,
            last_caret: None,
            latest_sequence: HashMap::new(),
            tx,
            rx: Some(rx),
        }
    }

    /// Handle for sending messages. Messages sent before [`spawn`](Self::spawn)
    /// are queued and processed once the task runs.
    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle {
            tx: self.tx.clone(),
            state: self.state_tx.subscribe(),
        }
    }

    pub fn current(&self) -> Option<ContextState> {
        self.state_tx.borrow().clone()
    }

    pub fn last_caret(&self) -> Option<&MethodUnderCaret> {
        self.last_caret.as_ref()
    }

    /// Spawn the orchestrator task
    pub fn spawn(
        self,
        connection: watch::Receiver<ConnectionState>,
        shutdown: CancellationToken,
    ) -> (OrchestratorHandle, tokio::task::JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run(connection, shutdown));
        (handle, task)
    }

    async fn run(
        mut self,
        mut connection: watch::Receiver<ConnectionState>,
        shutdown: CancellationToken,
    ) {
        let Some(mut rx) = self.rx.take() else {
            tracing::warn!("Orchestrator already running");
            return;
        };

        let initial = *connection.borrow_and_update();
        if initial != ConnectionState::Unknown {
            self.on_connection_changed(initial).await;
        }

        let mut connection_open = true;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => self.dispatch(message).await,
                    None => break,
                },
                changed = connection.changed(), if connection_open => {
                    if changed.is_err() {
                        connection_open = false;
                        continue;
                    }
                    let state = *connection.borrow_and_update();
                    self.on_connection_changed(state).await;
                }
            }
        }
        tracing::debug!("Orchestrator stopped");
    }

    pub async fn dispatch(&mut self, message: OrchestratorMessage) {
        match message {
            OrchestratorMessage::Resolved { sequence, caret } => {
                self.on_resolved(sequence, caret).await
            }
            OrchestratorMessage::Recompute => self.recompute().await,
            OrchestratorMessage::FileClosed(file) => self.on_file_closed(&file).await,
        }
    }

    /// Apply a caret resolution unless a newer one for the same file was applied
    pub async fn on_resolved(&mut self, sequence: u64, caret: MethodUnderCaret) {
        if !caret.file_uri.is_empty() {
            let latest = self
                .latest_sequence
                .entry(caret.file_uri.clone())
                .or_insert(0);
            if sequence < *latest {
                tracing::debug!(
                    "Discarding stale resolution {} for {} (latest {})",
                    sequence,
                    caret.file_uri,
                    latest
                );
                return;
            }
            *latest = sequence;
        }

        if self.last_caret.as_ref() == Some(&caret) {
            tracing::trace!("Caret still in the same context, nothing to do");
            return;
        }
        self.last_caret = Some(caret);

        if self.connection == ConnectionState::Lost {
            return;
        }
        self.recompute().await;
    }

    pub async fn on_connection_changed(&mut self, state: ConnectionState) {
        if state == self.connection {
            return;
        }
        let previous = self.connection;
        self.connection = state;
        let _ = self.events.send(EngineEvent::ConnectionChanged(state));

        match state {
            ConnectionState::Lost => self.emit(ContextState::NoConnection),
            _ if previous == ConnectionState::Lost => self.recompute().await,
            _ => {}
        }
    }

    pub async fn on_file_closed(&mut self, file: &FileUri) {
        self.latest_sequence.remove(file);
        if self
            .last_caret
            .as_ref()
            .is_some_and(|caret| &caret.file_uri == file)
        {
            self.last_caret = Some(MethodUnderCaret::no_file());
            self.recompute().await;
        }
    }

    /// Re-derive the visible state from the most recent resolution
    pub async fn recompute(&mut self) {
        if self.connection == ConnectionState::Lost {
            self.emit(ContextState::NoConnection);
            return;
        }
        let state = match &self.last_caret {
            Some(caret) => self.decide(caret).await,
            None => ContextState::NoFile,
        };
        self.emit(state);
    }

    async fn decide(&self, caret: &MethodUnderCaret) -> ContextState {
        if caret.file_uri.is_empty() {
            return ContextState::NoFile;
        }
        if !caret.is_supported_file {
            return ContextState::UnsupportedFile {
                file_uri: caret.file_uri.clone(),
            };
        }
        if caret.id.is_empty() {
            return ContextState::FilePreview {
                file_uri: caret.file_uri.clone(),
            };
        }

        match self.cache.find_method_info(&caret.file_uri, &caret.id).await {
            Some(method) => ContextState::MethodContext(MethodContext {
                method,
                linked: true,
            }),
            None => {
                tracing::debug!(
                    "No discovery entry for {}, showing placeholder context",
                    caret.id
                );
                ContextState::MethodContext(MethodContext {
                    method: MethodInfo::placeholder(caret),
                    linked: false,
                })
            }
        }
    }

    fn emit(&mut self, state: ContextState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if current.as_ref() == Some(&state) {
                false
            } else {
                *current = Some(state.clone());
                true
            }
        });
        if changed {
            tracing::debug!("Context state changed: {:?}", state);
            let _ = self.events.send(EngineEvent::StateChanged(state));
        }
    }
}

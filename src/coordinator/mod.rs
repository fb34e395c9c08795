//! Debouncing of editor events into resolve work
//!
//! Caret moves and document edits arrive in bursts. Each reason class keeps
//! at most one armed timer; a new event cancels it and arms a fresh one.
//! When a timer survives its quiet period a single resolve is spawned on the
//! runtime. Resolves already running are never cancelled, their results are
//! dropped instead once a newer resolve for the same file has started.

mod resolver;

pub use resolver::{EditorHost, ResolveRequest, Resolver};

use crate::types::FileUri;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Events sharing a reason class debounce each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonClass {
    CaretMove,
    DocumentChange,
}

/// Per-file resolve sequence numbers and the focused file
#[derive(Debug, Default)]
pub struct ResolveTracker {
    next: AtomicU64,
    latest: Mutex<HashMap<FileUri, u64>>,
    focused: Mutex<Option<FileUri>>,
}

impl ResolveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a resolve for `file`, superseding any earlier one
    pub fn begin(&self, file: &FileUri) -> u64 {
        let sequence = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(file.clone(), sequence);
        sequence
    }

    /// True if `sequence` is the newest resolve started for `file`
    pub fn is_current(&self, file: &FileUri, sequence: u64) -> bool {
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(file)
            == Some(&sequence)
    }

    /// Drop tracking for a closed file; in-flight resolves for it become stale
    pub fn forget(&self, file: &FileUri) {
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(file);
        let mut focused = self.focused.lock().unwrap_or_else(|e| e.into_inner());
        if focused.as_ref() == Some(file) {
            *focused = None;
        }
    }

    pub fn focus(&self, file: Option<&FileUri>) {
        *self.focused.lock().unwrap_or_else(|e| e.into_inner()) = file.cloned();
    }

    pub fn is_focused(&self, file: &FileUri) -> bool {
        self.focused
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            == Some(file)
    }
}

/// Turns host events into debounced resolves
///
/// Must be used from within a tokio runtime.
pub struct EventCoordinator {
    resolver: Arc<Resolver>,
    pending: Mutex<HashMap<ReasonClass, CancellationToken>>,
    quiet_period_ms: AtomicU64,
    shutdown: CancellationToken,
}

impl EventCoordinator {
    pub fn new(resolver: Arc<Resolver>, quiet_period: Duration, shutdown: CancellationToken) -> Self {
        Self {
            resolver,
            pending: Mutex::new(HashMap::new()),
            quiet_period_ms: AtomicU64::new(quiet_period.as_millis() as u64),
            shutdown,
        }
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms.load(Ordering::Relaxed))
    }

    /// Takes effect for timers armed from now on
    pub fn set_quiet_period(&self, quiet_period: Duration) {
        self.quiet_period_ms
            .store(quiet_period.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn tracker(&self) -> &Arc<ResolveTracker> {
        self.resolver.tracker()
    }

    pub fn caret_moved(&self, file: &FileUri, offset: usize) {
        self.tracker().focus(Some(file));
        self.schedule(ReasonClass::CaretMove, file.clone(), Some(offset), false);
    }

    pub fn document_changed(&self, file: &FileUri) {
        self.schedule(ReasonClass::DocumentChange, file.clone(), None, true);
    }

    /// Resolve without waiting for a quiet period (file open, selection change)
    pub fn resolve_now(&self, file: &FileUri, rediscover: bool) {
        self.tracker().focus(Some(file));
        let sequence = self.tracker().begin(file);
        let request = ResolveRequest {
            file: file.clone(),
            sequence,
            offset: None,
            rediscover,
        };
        let resolver = self.resolver.clone();
        tokio::spawn(async move { resolver.resolve(request).await });
    }

    /// Cancel the armed timer of a reason class, if any
    pub fn cancel(&self, class: ReasonClass) {
        if let Some(token) = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&class)
        {
            token.cancel();
        }
    }

    fn schedule(&self, class: ReasonClass, file: FileUri, offset: Option<usize>, rediscover: bool) {
        let token = self.shutdown.child_token();
        if let Some(previous) = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(class, token.clone())
        {
            previous.cancel();
        }

        let quiet_period = self.quiet_period();
        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::trace!("{:?} timer for {} cancelled", class, file);
                    return;
                }
                _ = tokio::time::sleep(quiet_period) => {}
            }

            let sequence = resolver.tracker().begin(&file);
            resolver
                .resolve(ResolveRequest {
                    file,
                    sequence,
                    offset,
                    rediscover,
                })
                .await;
        });
    }
}

//! # context-sync - Caret Context Synchronization for IDE Integrations
//!
//! Keeps an editor's notion of "the method under the caret" in sync with a
//! remote runtime-analytics backend, so the UI can show live telemetry for
//! whatever the developer is looking at.
//!
//! ## Overview
//!
//! The host editor reports file, selection, caret and edit events. The engine
//! debounces them, asks a per-language discovery provider which code objects
//! a file declares and which method the caret is in, caches the result, and
//! fetches summaries for those code objects from the analytics API. A single
//! state machine turns all of that into the visible [`ContextState`].
//!
//! ## Key Features
//!
//! - **Debounced resolution**: bursts of caret moves or edits collapse into one resolve
//! - **Freshness**: per-file sequence numbers keep slow, stale results from overwriting newer ones
//! - **Resilient backend access**: retries, connection tracking, errors never reach event handling
//! - **Hot reconfiguration**: endpoint, token and timings swap without a restart
//! - **Degraded mode**: placeholder contexts while discovery catches up
//!
//! ## Architecture
//!
//! ```text
//!   editor events
//!        │
//! ┌──────▼────────┐   resolve    ┌────────────────┐  spawn_blocking  ┌───────────────────┐
//! │ContextEngine  ├─────────────►│EventCoordinator├─────────────────►│DiscoveryProvider  │
//! └──────┬────────┘  (debounced) └──────┬─────────┘                  └───────────────────┘
//!        │                              │ Resolved / Recompute
//!        │                       ┌──────▼──────────────┐
//!        │                       │ContextOrchestrator  ├──► EngineEvent (broadcast)
//!        │                       └──────▲──────────────┘
//! ┌──────▼────────────┐  watch    ┌──────┴────────────┐
//! │ResilientGateway   ├──────────►│ConnectionMonitor  │
//! └──────┬────────────┘           └───────────────────┘
//!        │ ArcSwap
//! ┌──────▼────────────┐
//! │HttpAnalyticsClient│
//! └───────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: the per-workspace entry point
//! - [`coordinator`]: debouncing and the resolve unit of work
//! - [`orchestrator`]: the visible state machine
//! - [`document_cache`]: per-file discovery results and summaries
//! - [`language`]: discovery provider registry and language detection
//! - [`gateway`]: analytics API client, hot swap and error swallowing
//! - [`retry`]: fixed-backoff retry executor
//! - [`connection`]: backend reachability tracking
//! - [`environment`]: current deployment environment
//! - [`config`]: configuration with environment variable support
//! - [`types`]: domain types and wire formats
//! - [`error`]: error types and result aliases
//!
//! ## Usage Example
//!
//! ```no_run
//! use context_sync::{Config, ContextEngine, EditorHost, FileUri, LanguageRegistry, SourceFile};
//! use std::sync::Arc;
//!
//! struct Host;
//!
//! impl EditorHost for Host {
//!     fn snapshot(&self, _file: &FileUri) -> Option<SourceFile> {
//!         None
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = ContextEngine::new(Config::new()?, Arc::new(Host), LanguageRegistry::new())?;
//!     engine.start();
//!
//!     engine.caret_moved(&FileUri::new("file:///src/app.py"), 120);
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

/// Configuration management with environment variable overrides
pub mod config;

/// Backend reachability tracking
pub mod connection;

/// Debounced event coordination and context resolution
pub mod coordinator;

/// Per-file cache of discovery results and summaries
pub mod document_cache;

/// Per-workspace engine wiring all components together
pub mod engine;

/// Deployment environment selection
pub mod environment;

/// Error types and utilities
pub mod error;

/// Notifications published to the host UI
pub mod events;

/// Analytics API access
pub mod gateway;

/// Discovery providers and language detection
pub mod language;

/// Visible context state machine
pub mod orchestrator;

/// Platform directories
pub mod paths;

/// Fixed-backoff retry executor
pub mod retry;

/// Domain types shared by all modules
pub mod types;

pub use config::Config;
pub use coordinator::EditorHost;
pub use engine::ContextEngine;
pub use error::{Result, SyncError};
pub use events::EngineEvent;
pub use language::{DiscoveryProvider, LanguageRegistry, SourceFile};
pub use orchestrator::{ContextState, MethodContext};
pub use types::{CodeObjectId, ConnectionState, FileUri, MethodUnderCaret};

//! Notifications emitted by the engine to the host UI

use crate::orchestrator::ContextState;
use crate::types::{ConnectionState, Environment, FileUri};
use serde::Serialize;

/// Everything the UI layer needs to react to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum EngineEvent {
    /// The visible context changed
    StateChanged(ContextState),
    /// Cached summaries of a file changed, annotations must be redrawn
    CodeLensRefresh(FileUri),
    ConnectionChanged(ConnectionState),
    EnvironmentsChanged(Environment),
    /// The backend rejected the credentials; context tracking continues
    AuthenticationRequired { status: u16 },
}

//! Current deployment environment selection

use crate::error::ValidationError;
use crate::types::Environment;
use std::sync::RwLock;

/// Keeps the environment list reported by the backend and the user's choice
#[derive(Debug, Default)]
pub struct EnvironmentTracker {
    state: RwLock<Environment>,
}

impl EnvironmentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Environment {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Current environment, `None` until the backend reported one
    pub fn current(&self) -> Option<String> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        if state.current.is_empty() {
            None
        } else {
            Some(state.current.clone())
        }
    }

    /// Replace the list of known environments. The current environment is
    /// kept while it is still listed, otherwise it falls back to the first
    /// entry. Returns true when anything changed.
    pub fn update_all(&self, all: Vec<String>) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        let current = if all.contains(&state.current) {
            state.current.clone()
        } else {
            all.first().cloned().unwrap_or_default()
        };

        let next = Environment { current, all };
        if next == *state {
            return false;
        }
        tracing::info!(
            "Environments updated: current='{}', all={:?}",
            next.current,
            next.all
        );
        *state = next;
        true
    }

    /// Explicit switch by the user. Returns true if the current environment changed.
    pub fn set_current(&self, name: &str) -> Result<bool, ValidationError> {
        if name.is_empty() {
            return Err(ValidationError::Empty("environment".to_string()));
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if !state.all.iter().any(|e| e == name) {
            return Err(ValidationError::UnknownEnvironment(name.to_string()));
        }

        if state.current == name {
            return Ok(false);
        }
        tracing::info!("Switching environment to '{}'", name);
        state.current = name.to_string();
        Ok(true)
    }
}

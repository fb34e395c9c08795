//! Reachability tracking for the analytics backend
//!
//! The monitor is fed by the resilient gateway after every logical call.
//! A run of consecutive network failures inside the configured window flips
//! the state to [`ConnectionState::Lost`]; any successful call flips it back
//! to [`ConnectionState::Connected`]. Transitions are published on a
//! `watch` channel.

use crate::config::ConnectionConfig;
use crate::types::ConnectionState;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct FailureStreak {
    count: u32,
    started_at: Option<Instant>,
}

/// Tracks backend reachability from observed gateway outcomes
pub struct ConnectionMonitor {
    state_tx: watch::Sender<ConnectionState>,
    streak: Mutex<FailureStreak>,
    config: Mutex<ConnectionConfig>,
    auth_failing: AtomicBool,
}

impl ConnectionMonitor {
    pub fn new(config: ConnectionConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Unknown);
        Self {
            state_tx,
            streak: Mutex::new(FailureStreak::default()),
            config: Mutex::new(config),
            auth_failing: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// True while the last answered call was rejected for authentication
    pub fn needs_authentication(&self) -> bool {
        self.auth_failing.load(Ordering::Acquire)
    }

    pub fn update_config(&self, config: ConnectionConfig) {
        *self.config.lock().unwrap_or_else(|e| e.into_inner()) = config;
    }

    /// A call completed successfully
    pub fn record_success(&self) {
        self.reset_streak();
        self.auth_failing.store(false, Ordering::Release);
        self.transition(ConnectionState::Connected);
    }

    /// A call failed with a transport error, after its retries
    pub fn record_network_failure(&self) {
        let config = self.config.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let now = Instant::now();

        let reached = {
            let mut streak = self.streak.lock().unwrap_or_else(|e| e.into_inner());
            let expired = streak
                .started_at
                .is_some_and(|start| now.duration_since(start) > config.failure_window());
            if expired || streak.started_at.is_none() {
                streak.count = 0;
                streak.started_at = Some(now);
            }
            streak.count += 1;
            tracing::debug!(
                "Network failure {}/{} within window",
                streak.count,
                config.failure_threshold
            );
            streak.count >= config.failure_threshold
        };

        if reached {
            self.transition(ConnectionState::Lost);
        }
    }

    /// The backend answered with 401/403. Returns true for the first
    /// rejection of a streak so callers can raise a single notification.
    pub fn record_authentication_failure(&self) -> bool {
        // the server answered, so the network streak is broken
        self.reset_streak();
        !self.auth_failing.swap(true, Ordering::AcqRel)
    }

    /// The backend answered with an unexpected status or body
    pub fn record_remote_failure(&self) {
        self.reset_streak();
    }

    fn reset_streak(&self) {
        let mut streak = self.streak.lock().unwrap_or_else(|e| e.into_inner());
        streak.count = 0;
        streak.started_at = None;
    }

    fn transition(&self, next: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            match next {
                ConnectionState::Lost => tracing::warn!("Connection to analytics backend lost"),
                ConnectionState::Connected => {
                    tracing::info!("Connection to analytics backend established")
                }
                ConnectionState::Unknown => {}
            }
        }
    }
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}

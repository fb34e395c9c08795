use super::{AnalyticsApi, ApiResult};
use crate::config::AnalyticsConfig;
use crate::connection::ConnectionMonitor;
use crate::error::{ErrorKind, GatewayError};
use crate::events::EngineEvent;
use crate::retry::{self, RetryPolicy};
use crate::types::{CodeObjectError, CodeObjectId, CodeObjectInsight, CodeObjectSummary};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// The most recent failure swallowed by the resilient gateway
#[derive(Debug, Clone, PartialEq)]
pub struct LastError {
    pub operation: &'static str,
    pub arguments: String,
    pub error: GatewayError,
    pub at: DateTime<Utc>,
}

/// Decorator used by the orchestration layer
///
/// Every call is retried on network failure, reported to the
/// [`ConnectionMonitor`], and on failure logged and turned into `Ok(None)`.
/// The error is kept as [`LastError`] for the UI to inspect.
pub struct ResilientGateway {
    inner: Arc<dyn AnalyticsApi>,
    monitor: Arc<ConnectionMonitor>,
    policy: Mutex<RetryPolicy>,
    last_error: Mutex<Option<LastError>>,
    events: Option<broadcast::Sender<EngineEvent>>,
    cancel: CancellationToken,
}

impl ResilientGateway {
    pub fn new(
        inner: Arc<dyn AnalyticsApi>,
        monitor: Arc<ConnectionMonitor>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            inner,
            monitor,
            policy: Mutex::new(policy),
            last_error: Mutex::new(None),
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Publish authentication prompts on this channel
    pub fn with_events(mut self, events: broadcast::Sender<EngineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Abort pending retries when this token is cancelled
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn policy_from_config(config: &AnalyticsConfig) -> RetryPolicy {
        RetryPolicy::new(config.max_attempts, config.retry_backoff())
    }

    pub fn set_policy(&self, policy: RetryPolicy) {
        *self.policy.lock().unwrap_or_else(|e| e.into_inner()) = policy;
    }

    pub fn last_error(&self) -> Option<LastError> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn monitor(&self) -> &Arc<ConnectionMonitor> {
        &self.monitor
    }

    async fn guarded<T, F, Fut>(
        &self,
        operation: &'static str,
        arguments: impl FnOnce() -> String,
        call: F,
    ) -> ApiResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let policy = *self.policy.lock().unwrap_or_else(|e| e.into_inner());

        let error = match retry::run(&policy, &self.cancel, call).await {
            Ok(value) => {
                self.monitor.record_success();
                return Ok(value);
            }
            Err(GatewayError::Cancelled) => {
                tracing::debug!("{} cancelled", operation);
                return Ok(None);
            }
            Err(error) => error,
        };

        let arguments = arguments();
        match error.kind() {
            ErrorKind::Network => self.monitor.record_network_failure(),
            ErrorKind::Authentication => {
                if self.monitor.record_authentication_failure()
                    && let (Some(events), GatewayError::Authentication { status }) =
                        (&self.events, &error)
                {
                    let _ = events.send(EngineEvent::AuthenticationRequired { status: *status });
                }
            }
            ErrorKind::Remote | ErrorKind::Decoding => self.monitor.record_remote_failure(),
            ErrorKind::Cancelled => {}
        }

        tracing::warn!("{}({}) failed: {}", operation, arguments, error);

        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(LastError {
            operation,
            arguments,
            error,
            at: Utc::now(),
        });
        Ok(None)
    }
}

fn format_ids(ids: &[CodeObjectId]) -> String {
    ids.iter()
        .map(CodeObjectId::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait::async_trait]
impl AnalyticsApi for ResilientGateway {
    async fn list_environments(&self) -> ApiResult<String> {
        let inner = &self.inner;
        self.guarded("list_environments", String::new, |_| {
            inner.list_environments()
        })
        .await
    }

    async fn fetch_summaries(
        &self,
        environment: &str,
        ids: &[CodeObjectId],
    ) -> ApiResult<CodeObjectSummary> {
        let inner = &self.inner;
        self.guarded(
            "fetch_summaries",
            || format!("environment={}, ids=[{}]", environment, format_ids(ids)),
            |_| inner.fetch_summaries(environment, ids),
        )
        .await
    }

    async fn fetch_insights(
        &self,
        environment: &str,
        ids: &[CodeObjectId],
    ) -> ApiResult<CodeObjectInsight> {
        let inner = &self.inner;
        self.guarded(
            "fetch_insights",
            || format!("environment={}, ids=[{}]", environment, format_ids(ids)),
            |_| inner.fetch_insights(environment, ids),
        )
        .await
    }

    async fn fetch_errors_for_code_object(
        &self,
        environment: &str,
        id: &CodeObjectId,
    ) -> ApiResult<CodeObjectError> {
        let inner = &self.inner;
        self.guarded(
            "fetch_errors_for_code_object",
            || format!("environment={}, id={}", environment, id),
            |_| inner.fetch_errors_for_code_object(environment, id),
        )
        .await
    }
}

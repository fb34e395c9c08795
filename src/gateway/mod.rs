//! Typed access to the remote analytics API
//!
//! Three layers, each implementing [`AnalyticsApi`]:
//!
//! - [`HttpAnalyticsClient`]: one HTTP round trip per call, failures classified
//!   into [`GatewayError`].
//! - [`AnalyticsGateway`]: holds the current client behind an atomic swap so
//!   the endpoint and credentials can change while calls are in flight.
//! - [`ResilientGateway`]: retries network failures, reports outcomes to the
//!   connection monitor and never lets an error escape to event handling.

mod http_client;
mod resilient;

pub use http_client::HttpAnalyticsClient;
pub use resilient::{LastError, ResilientGateway};

use crate::config::AnalyticsConfig;
use crate::error::{GatewayError, SyncError};
use crate::types::{CodeObjectError, CodeObjectId, CodeObjectInsight, CodeObjectSummary};
use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// `Ok(None)` is a 2xx response without a body, distinct from an empty list
pub type ApiResult<T> = Result<Option<Vec<T>>, GatewayError>;

/// Operations offered by the analytics backend
#[async_trait::async_trait]
pub trait AnalyticsApi: Send + Sync {
    /// `GET /environments`
    async fn list_environments(&self) -> ApiResult<String>;

    /// `POST /summary`
    async fn fetch_summaries(
        &self,
        environment: &str,
        ids: &[CodeObjectId],
    ) -> ApiResult<CodeObjectSummary>;

    /// `POST /insights`
    async fn fetch_insights(
        &self,
        environment: &str,
        ids: &[CodeObjectId],
    ) -> ApiResult<CodeObjectInsight>;

    /// `GET /errors`
    async fn fetch_errors_for_code_object(
        &self,
        environment: &str,
        id: &CodeObjectId,
    ) -> ApiResult<CodeObjectError>;
}

/// Body of the batch endpoints
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CodeObjectsRequest<'a> {
    pub environment: &'a str,
    pub code_object_ids: &'a [CodeObjectId],
}

/// A client together with the generation it was installed as
pub struct ClientHandle {
    pub generation: u64,
    pub api: Arc<dyn AnalyticsApi>,
}

/// Hot-replaceable analytics client
///
/// Every call loads the current handle once and completes on it, so a
/// replacement only affects calls issued afterwards.
pub struct AnalyticsGateway {
    current: ArcSwap<ClientHandle>,
    generations: AtomicU64,
}

impl AnalyticsGateway {
    pub fn new(api: Arc<dyn AnalyticsApi>) -> Self {
        Self {
            current: ArcSwap::from_pointee(ClientHandle { generation: 0, api }),
            generations: AtomicU64::new(0),
        }
    }

    /// Build an HTTP-backed gateway from configuration
    pub fn from_config(config: &AnalyticsConfig) -> Result<Self, SyncError> {
        Ok(Self::new(Arc::new(HttpAnalyticsClient::new(config)?)))
    }

    /// Snapshot of the client currently installed
    pub fn handle(&self) -> Arc<ClientHandle> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    /// Install a new client, returning its generation
    pub fn replace(&self, api: Arc<dyn AnalyticsApi>) -> u64 {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        self.current.store(Arc::new(ClientHandle { generation, api }));
        tracing::info!("Analytics client replaced (generation {})", generation);
        generation
    }

    /// Build a client for the new endpoint and credentials, then swap it in.
    /// The old client stays installed if the new one cannot be built.
    pub fn reconfigure(&self, config: &AnalyticsConfig) -> Result<u64, SyncError> {
        let client = HttpAnalyticsClient::new(config)?;
        Ok(self.replace(Arc::new(client)))
    }
}

#[async_trait::async_trait]
impl AnalyticsApi for AnalyticsGateway {
    async fn list_environments(&self) -> ApiResult<String> {
        let handle = self.handle();
        handle.api.list_environments().await
    }

    async fn fetch_summaries(
        &self,
        environment: &str,
        ids: &[CodeObjectId],
    ) -> ApiResult<CodeObjectSummary> {
        let handle = self.handle();
        handle.api.fetch_summaries(environment, ids).await
    }

    async fn fetch_insights(
        &self,
        environment: &str,
        ids: &[CodeObjectId],
    ) -> ApiResult<CodeObjectInsight> {
        let handle = self.handle();
        handle.api.fetch_insights(environment, ids).await
    }

    async fn fetch_errors_for_code_object(
        &self,
        environment: &str,
        id: &CodeObjectId,
    ) -> ApiResult<CodeObjectError> {
        let handle = self.handle();
        handle.api.fetch_errors_for_code_object(environment, id).await
    }
}

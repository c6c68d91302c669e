pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod storage;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::auth::TokenService;
use crate::engine::RequestLifecycle;
use crate::storage::BlobStore;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub lifecycle: RequestLifecycle,
    pub tokens: Arc<TokenService>,
    pub blobs: Arc<dyn BlobStore>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: DbPool,
        tokens: Arc<TokenService>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            lifecycle: RequestLifecycle::new(db.clone()),
            config,
            db,
            tokens,
            blobs,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

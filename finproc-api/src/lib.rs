//! finproc-api library interface
//!
//! Exposes the router and job pipeline for the binary and for integration
//! tests.

pub mod api;
pub mod error;
pub mod jobs;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use finproc_common::ServiceConfig;

use crate::jobs::{JobContext, JobError, SheetInspector};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    /// Collaborators handed to every job run
    pub jobs: JobContext,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last job error, reported by /health
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(config: ServiceConfig, inspector: Arc<dyn SheetInspector>) -> Self {
        let config = Arc::new(config);
        Self {
            jobs: JobContext::new(Arc::clone(&config), inspector),
            config,
            startup_time: finproc_common::time::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn record_error(&self, err: &JobError) {
        *self.last_error.write().await = Some(err.to_string());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .merge(api::job_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

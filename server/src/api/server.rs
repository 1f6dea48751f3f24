//! API server initialization

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::ApiState;
use super::auth::{
    AdminAuthState, IngestAuthState, admin_auth_middleware, ingest_auth_middleware,
};
use super::rate_limit::{RateLimitState, rate_limit_middleware};
use super::routes::{admin, events, health, performance, sse};
use crate::core::ShutdownService;
use crate::core::constants::{DEFAULT_BODY_LIMIT, EVENT_BODY_LIMIT};
use crate::data::cache::{RateLimitBucket, RateLimiter};

pub struct ApiServer {
    state: ApiState,
    shutdown: ShutdownService,
}

impl ApiServer {
    pub fn new(state: ApiState, shutdown: ShutdownService) -> Self {
        Self { state, shutdown }
    }

    /// Build the router and serve until shutdown
    pub async fn start(self) -> Result<()> {
        let Self { state, shutdown } = self;

        let host = state.config.server.host.clone();
        let port = state.config.server.port;
        let addr = SocketAddr::new(host.parse()?, port);

        let ingest_auth = IngestAuthState {
            database: state.database.clone(),
            cache: state.cache.clone(),
            api_key_secret: state.config.api_key_secret.clone(),
        };

        // SDK-facing ingestion routes (API-key authenticated)
        let ingest_routes = Router::new()
            .route("/api/v1/events", post(events::submit))
            .route("/api/v1/performance/metrics", post(performance::submit_metrics))
            .route(
                "/api/v1/performance/transactions",
                post(performance::submit_transaction),
            )
            .route("/api/v1/stream", get(sse::stream))
            .layer(DefaultBodyLimit::max(EVENT_BODY_LIMIT))
            .layer(axum::middleware::from_fn_with_state(
                ingest_auth,
                ingest_auth_middleware,
            ));

        // Operator surface (separate credential, optionally rate limited by IP)
        let admin_routes = Router::new()
            .route("/admin/retention/stats", get(admin::retention_stats))
            .route("/admin/retention/cleanup", post(admin::run_retention_cleanup))
            .route("/admin/groups/update-counts", post(admin::update_group_counts))
            .route("/admin/quota/{project_id}", get(admin::project_quota))
            .route("/admin/queue/status", get(admin::queue_status))
            .route("/admin/queue/trigger", post(admin::trigger_job))
            .route(
                "/admin/queue/parked",
                get(admin::list_parked).delete(admin::clear_parked),
            )
            .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
            .layer(axum::middleware::from_fn_with_state(
                AdminAuthState {
                    admin_token: state.config.admin_token.clone(),
                },
                admin_auth_middleware,
            ));

        let admin_routes = if state.config.rate_limit.enabled {
            admin_routes.layer(axum::middleware::from_fn_with_state(
                RateLimitState {
                    limiter: Arc::new(RateLimiter::new(state.cache.clone())),
                    bucket: RateLimitBucket::api(state.config.rate_limit.api_rpm),
                },
                rate_limit_middleware,
            ))
        } else {
            admin_routes
        };

        let app = Router::new()
            .route("/health", get(health::health))
            .merge(ingest_routes)
            .merge(admin_routes)
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "API server listening");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.wait())
        .await?;

        Ok(())
    }
}

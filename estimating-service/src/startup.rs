use crate::config::{EditionFeatures, EstimatingConfig, StorageBackend};
use crate::handlers::{
    self, chapters, clients, edition, estimates, exports, invoices, library, lines, milestones,
    projects, purchase_orders, time_entries,
};
use crate::services::{init_metrics, Database, EstimatingStore, MemoryStore};
use axum::{
    middleware::from_fn,
    routing::{get, patch, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: EstimatingConfig,
    pub store: Arc<dyn EstimatingStore>,
    pub features: Arc<EditionFeatures>,
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
    state: AppState,
}

/// Open the configured store; Postgres runs pending migrations first.
pub async fn connect_store(config: &EstimatingConfig) -> Result<Arc<dyn EstimatingStore>, AppError> {
    match config.database.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Postgres => {
            let url = config.database.url.as_deref().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required for postgres"))
            })?;
            let db = Database::new(
                url,
                config.database.max_connections,
                config.database.min_connections,
            )
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to PostgreSQL: {}", e);
                e
            })?;
            db.run_migrations().await?;
            Ok(Arc::new(db))
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/edition", get(edition::get_edition))
        .route(
            "/clients",
            get(clients::list_clients).post(clients::create_client),
        )
        .route(
            "/clients/:client_id",
            get(clients::get_client)
                .patch(clients::update_client)
                .delete(clients::delete_client),
        )
        .route(
            "/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/projects/:project_id",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        .route(
            "/projects/:project_id/estimates",
            get(estimates::list_estimates).post(estimates::create_estimate),
        )
        .route(
            "/projects/:project_id/invoices",
            get(invoices::list_invoices).post(invoices::create_invoice),
        )
        .route(
            "/projects/:project_id/time-entries",
            get(time_entries::list_time_entries).post(time_entries::create_time_entry),
        )
        .route(
            "/projects/:project_id/milestones",
            get(milestones::list_milestones).post(milestones::create_milestone),
        )
        .route(
            "/projects/:project_id/purchase-orders",
            get(purchase_orders::list_purchase_orders)
                .post(purchase_orders::create_purchase_order),
        )
        .route(
            "/estimates/:estimate_id",
            get(estimates::get_estimate)
                .patch(estimates::update_estimate)
                .delete(estimates::delete_estimate),
        )
        .route(
            "/estimates/:estimate_id/recalculate",
            post(estimates::recalculate_estimate),
        )
        .route(
            "/estimates/:estimate_id/duplicate",
            post(estimates::duplicate_estimate),
        )
        .route(
            "/estimates/:estimate_id/versions",
            post(estimates::new_version),
        )
        .route(
            "/estimates/:estimate_id/invoice",
            post(estimates::invoice_estimate),
        )
        .route(
            "/estimates/:estimate_id/chapters",
            post(chapters::create_chapter),
        )
        .route("/estimates/:estimate_id/lines", post(lines::create_line))
        .route(
            "/estimates/:estimate_id/lines/bulk",
            post(lines::create_lines_bulk),
        )
        .route(
            "/estimates/:estimate_id/sync-prices",
            post(lines::sync_estimate_prices),
        )
        .route(
            "/estimates/:estimate_id/export/:format",
            get(exports::export_estimate),
        )
        .route(
            "/chapters/:chapter_id",
            patch(chapters::update_chapter).delete(chapters::delete_chapter),
        )
        .route(
            "/lines/:line_item_id",
            patch(lines::update_line).delete(lines::delete_line),
        )
        .route(
            "/lines/:line_item_id/sync-price",
            post(lines::sync_line_price),
        )
        .route(
            "/libraries",
            get(library::list_libraries).post(library::create_library),
        )
        .route(
            "/libraries/:library_id",
            get(library::get_library).delete(library::delete_library),
        )
        .route(
            "/libraries/:library_id/items",
            get(library::list_items).post(library::create_item),
        )
        .route(
            "/library-items/:library_item_id",
            get(library::get_item)
                .patch(library::update_item)
                .delete(library::delete_item),
        )
        .route(
            "/invoices/:invoice_id",
            get(invoices::get_invoice)
                .patch(invoices::update_invoice)
                .delete(invoices::delete_invoice),
        )
        .route(
            "/time-entries/:time_entry_id",
            patch(time_entries::update_time_entry)
                .delete(time_entries::delete_time_entry),
        )
        .route(
            "/milestones/:milestone_id",
            patch(milestones::update_milestone)
                .delete(milestones::delete_milestone),
        )
        .route(
            "/purchase-orders/:purchase_order_id",
            patch(purchase_orders::update_purchase_order)
                .delete(purchase_orders::delete_purchase_order),
        );

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .nest("/api", api)
        .with_state(state)
        // Add metrics middleware
        .layer(from_fn(metrics_middleware))
        // Add tracing layer
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                )
            }),
        )
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

impl Application {
    pub async fn build(config: EstimatingConfig) -> Result<Self, AppError> {
        init_metrics();

        let store = connect_store(&config).await?;
        let features = Arc::new(config.features());
        tracing::info!(
            edition = config.edition.as_str(),
            features = features.features.len(),
            "Edition loaded"
        );

        let state = AppState {
            config: config.clone(),
            store,
            features,
        };

        let app = build_router(state.clone());

        let addr = config.common.socket_addr();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(listener, app);

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn store(&self) -> Arc<dyn EstimatingStore> {
        self.state.store.clone()
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

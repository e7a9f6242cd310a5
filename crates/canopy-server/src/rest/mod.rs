mod handlers;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::{DefaultBodyLimit, FromRef, State};
use axum::http::Method;
use axum::middleware;
use axum::response::Response;
use axum::routing::{get, post};
use canopy_storage::{CollectionStore, UserStore};

const MAX_REQUEST_BODY_SIZE: usize = 1024 * 1024; // 1 MB

use crate::metrics::{self, Metrics};
use crate::middleware::identity::identity_middleware;
use crate::service::CollectionService;

pub struct AppState<S> {
    pub service: Arc<CollectionService<S>>,
    pub metrics: Arc<Metrics>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S> FromRef<AppState<S>> for Arc<Metrics> {
    fn from_ref(state: &AppState<S>) -> Self {
        state.metrics.clone()
    }
}

fn operation_name(method: &Method, path: &str) -> Option<&'static str> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match (method.as_str(), segments.as_slice()) {
        ("GET", ["v1", "collections"]) => Some("list_collections"),
        ("POST", ["v1", "collections"]) => Some("create_collection"),
        ("POST", ["v1", "collections", "move"]) => Some("move_collection"),
        ("GET", ["v1", "collections", _]) => Some("view_collection"),
        ("PUT", ["v1", "collections", _]) => Some("update_collection"),
        ("GET", ["v1", "collections", _, "permission"]) => Some("resolve_permission"),
        ("GET", ["v1", "links", _, "permission"]) => Some("resolve_permission"),
        ("POST", ["v1", "collections", _, "links"]) => Some("create_link"),
        ("POST", ["v1", "tree"]) => Some("build_tree"),
        _ => None,
    }
}

async fn metrics_middleware<S>(
    State(state): State<AppState<S>>,
    request: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> Response {
    state.metrics.record_request();

    let operation = operation_name(request.method(), request.uri().path());
    let start = std::time::Instant::now();

    let response = next.run(request).await;
    let elapsed = start.elapsed();

    if response.status().is_success() {
        state.metrics.record_success();
    } else {
        state.metrics.record_error();
    }

    if let Some(name) = operation {
        state.metrics.record_operation(name, elapsed);
    }

    response
}

pub fn create_router<S>(state: AppState<S>) -> Router
where
    S: CollectionStore + UserStore + 'static,
{
    Router::new()
        .route(
            "/v1/collections",
            get(handlers::list_collections).post(handlers::create_collection),
        )
        .route("/v1/collections/move", post(handlers::move_collection))
        .route(
            "/v1/collections/{id}",
            get(handlers::view_collection).put(handlers::update_collection),
        )
        .route(
            "/v1/collections/{id}/permission",
            get(handlers::collection_permission),
        )
        .route("/v1/collections/{id}/links", post(handlers::create_link))
        .route("/v1/links/{id}/permission", get(handlers::link_permission))
        .route("/v1/tree", post(handlers::build_tree))
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(middleware::from_fn(identity_middleware))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_SIZE))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .with_state(state)
}

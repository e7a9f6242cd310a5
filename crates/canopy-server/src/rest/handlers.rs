use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;

use canopy_core::collection::{CollectionId, LinkId, UserId};
use canopy_core::engine::{MoveError, ResolveTarget};
use canopy_core::tree::SortMode;
use canopy_storage::{CollectionStore, StorageError, UserStore};

use crate::error::ApiError;
use crate::service::{CreateCollectionInput, CreateLinkInput, TreeInput, UpdateCollectionInput};

use super::AppState;
use super::types::*;

fn api_error_to_response(err: ApiError) -> Response {
    let status = match &err {
        ApiError::NotFound(_) | ApiError::Storage(StorageError::NotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        ApiError::Forbidden(_)
        | ApiError::Move(MoveError::NotOwnerOfSource(_))
        | ApiError::Move(MoveError::NoCreateInDestination(_)) => StatusCode::FORBIDDEN,
        ApiError::Move(MoveError::CircularMove(_)) => StatusCode::CONFLICT,
        ApiError::InvalidRequest(_) | ApiError::Storage(StorageError::InvalidParent { .. }) => {
            StatusCode::BAD_REQUEST
        }
        ApiError::Engine(_)
        | ApiError::Move(MoveError::Engine(_))
        | ApiError::Storage(StorageError::Internal(_)) => {
            tracing::error!(error = %err, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, ApiError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(e) => api_error_to_response(e),
    }
}

pub async fn list_collections<S>(
    State(state): State<AppState<S>>,
    Extension(user_id): Extension<UserId>,
) -> Response
where
    S: CollectionStore + UserStore + 'static,
{
    let result = state
        .service
        .list_collections(user_id)
        .await
        .map(|views| ListCollectionsResponse {
            collections: views.iter().map(AccessibleCollectionResponse::from).collect(),
        });
    respond(StatusCode::OK, result)
}

pub async fn create_collection<S>(
    State(state): State<AppState<S>>,
    Extension(user_id): Extension<UserId>,
    Json(req): Json<CreateCollectionRequest>,
) -> Response
where
    S: CollectionStore + UserStore + 'static,
{
    let input = CreateCollectionInput {
        name: req.name,
        description: req.description,
        color: req.color,
        icon: req.icon,
        parent_id: req.parent_id.map(CollectionId::new),
        members: req.members.into_iter().map(Into::into).collect(),
    };

    let result = state
        .service
        .create_collection(user_id, input)
        .await
        .map(|c| CollectionResponse::from(&c));
    respond(StatusCode::CREATED, result)
}

pub async fn view_collection<S>(
    State(state): State<AppState<S>>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<i64>,
) -> Response
where
    S: CollectionStore + UserStore + 'static,
{
    let result = state
        .service
        .view_collection(user_id, CollectionId::new(id))
        .await
        .map(|view| AccessibleCollectionResponse::from(&view));
    respond(StatusCode::OK, result)
}

pub async fn update_collection<S>(
    State(state): State<AppState<S>>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCollectionRequest>,
) -> Response
where
    S: CollectionStore + UserStore + 'static,
{
    let input = UpdateCollectionInput {
        name: req.name,
        description: req.description,
        color: req.color,
        icon: req.icon,
        parent_id: req.parent_id.map(|parent| parent.map(CollectionId::new)),
        members: req
            .members
            .map(|members| members.into_iter().map(Into::into).collect()),
    };

    let result = state
        .service
        .update_collection(user_id, CollectionId::new(id), input)
        .await
        .map(|c| CollectionResponse::from(&c));
    respond(StatusCode::OK, result)
}

pub async fn collection_permission<S>(
    State(state): State<AppState<S>>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<i64>,
) -> Response
where
    S: CollectionStore + UserStore + 'static,
{
    let target = ResolveTarget::Collection(CollectionId::new(id));
    let result = state
        .service
        .resolve_permission(user_id, target)
        .await
        .map(|p| PermissionResponse::from(&p));
    respond(StatusCode::OK, result)
}

pub async fn link_permission<S>(
    State(state): State<AppState<S>>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<i64>,
) -> Response
where
    S: CollectionStore + UserStore + 'static,
{
    let target = ResolveTarget::Link(LinkId::new(id));
    let result = state
        .service
        .resolve_permission(user_id, target)
        .await
        .map(|p| PermissionResponse::from(&p));
    respond(StatusCode::OK, result)
}

pub async fn create_link<S>(
    State(state): State<AppState<S>>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<i64>,
    Json(req): Json<CreateLinkRequest>,
) -> Response
where
    S: CollectionStore + UserStore + 'static,
{
    let input = CreateLinkInput {
        name: req.name,
        url: req.url,
    };

    let result = state
        .service
        .create_link(user_id, CollectionId::new(id), input)
        .await
        .map(|link| LinkResponse::from(&link));
    respond(StatusCode::CREATED, result)
}

pub async fn move_collection<S>(
    State(state): State<AppState<S>>,
    Extension(user_id): Extension<UserId>,
    Json(req): Json<MoveRequest>,
) -> Response
where
    S: CollectionStore + UserStore + 'static,
{
    let result = state
        .service
        .move_collection(user_id, req.into())
        .await
        .map(|outcome| MoveResponse::from(&outcome));
    respond(StatusCode::OK, result)
}

pub async fn build_tree<S>(
    State(state): State<AppState<S>>,
    Extension(user_id): Extension<UserId>,
    Json(req): Json<TreeRequest>,
) -> Response
where
    S: CollectionStore + UserStore + 'static,
{
    let sort = match req.sort.as_deref().map(str::parse::<SortMode>).transpose() {
        Ok(sort) => sort.unwrap_or_default(),
        Err(e) => return api_error_to_response(ApiError::InvalidRequest(e.to_string())),
    };
    let input = TreeInput {
        sort,
        active: req.active.map(CollectionId::new),
        expanded: req.expanded.into_iter().map(CollectionId::new).collect(),
    };

    let result = state
        .service
        .build_tree(user_id, input)
        .await
        .map(|tree| TreeResponse::from_tree(&tree, sort.as_str()));
    respond(StatusCode::OK, result)
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

#[cfg(test)]
mod tests {
    use super::super::{AppState, create_router};
    use crate::metrics::Metrics;
    use crate::middleware::identity::USER_HEADER;
    use crate::service::CollectionService;
    use axum::http::{HeaderName, HeaderValue, StatusCode};
    use axum_test::{TestRequest, TestServer};
    use canopy_core::engine::EngineConfig;
    use canopy_storage::InMemoryStore;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn make_test_server() -> TestServer {
        let store = Arc::new(InMemoryStore::new());
        let service = Arc::new(CollectionService::new(store, EngineConfig::default()));
        let state = AppState {
            service,
            metrics: Arc::new(Metrics::new()),
        };
        TestServer::new(create_router(state)).unwrap()
    }

    fn as_user(request: TestRequest, user: i64) -> TestRequest {
        request.add_header(
            HeaderName::from_static(USER_HEADER),
            HeaderValue::from_str(&user.to_string()).unwrap(),
        )
    }

    async fn create(server: &TestServer, user: i64, name: &str, parent: Option<i64>) -> i64 {
        let response = as_user(server.post("/v1/collections"), user)
            .json(&json!({"name": name, "parent_id": parent}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        body["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn healthz_returns_200() {
        let server = make_test_server();
        let response = server.get("/healthz").await;
        response.assert_status_ok();
        response.assert_json(&json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn requests_without_user_are_unauthorized() {
        let server = make_test_server();
        let response = server.get("/v1/collections").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_and_list_collections() {
        let server = make_test_server();
        let root = create(&server, 1, "Root", None).await;
        create(&server, 1, "Child", Some(root)).await;

        let response = as_user(server.get("/v1/collections"), 1).await;

        response.assert_status_ok();
        let body: Value = response.json();
        let collections = body["collections"].as_array().unwrap();
        assert_eq!(collections.len(), 2);
        assert_eq!(collections[0]["name"], "Root");
    }

    #[tokio::test]
    async fn create_with_blank_name_returns_400() {
        let server = make_test_server();
        let response = as_user(server.post("/v1/collections"), 1)
            .json(&json!({"name": "  "}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_under_missing_parent_returns_403() {
        let server = make_test_server();
        let response = as_user(server.post("/v1/collections"), 1)
            .json(&json!({"name": "Lost", "parent_id": 404}))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn view_of_foreign_collection_returns_404() {
        let server = make_test_server();
        let root = create(&server, 1, "Private", None).await;

        let response = as_user(server.get(&format!("/v1/collections/{root}")), 2).await;

        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_by_stranger_returns_403() {
        let server = make_test_server();
        let root = create(&server, 1, "Root", None).await;

        let response = as_user(server.put(&format!("/v1/collections/{root}")), 2)
            .json(&json!({"name": "Mine now"}))
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn update_of_missing_collection_returns_403() {
        let server = make_test_server();
        create(&server, 1, "Root", None).await;

        let response = as_user(server.put("/v1/collections/404"), 1)
            .json(&json!({"name": "Ghost"}))
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn rename_without_parent_keeps_collection_nested() {
        let server = make_test_server();
        let root = create(&server, 1, "Root", None).await;
        let child = create(&server, 1, "Child", Some(root)).await;

        let response = as_user(server.put(&format!("/v1/collections/{child}")), 1)
            .json(&json!({"name": "Renamed"}))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["name"], "Renamed");
        assert_eq!(body["parent_id"], root);

        let detached = as_user(server.put(&format!("/v1/collections/{child}")), 1)
            .json(&json!({"name": "Renamed", "parent_id": null}))
            .await;
        detached.assert_status_ok();
        assert_eq!(detached.json::<Value>()["parent_id"], Value::Null);
    }

    #[tokio::test]
    async fn permission_reports_owner_and_none() {
        let server = make_test_server();
        let root = create(&server, 1, "Root", None).await;

        let owner = as_user(server.get(&format!("/v1/collections/{root}/permission")), 1).await;
        let stranger = as_user(server.get(&format!("/v1/collections/{root}/permission")), 2).await;

        owner.assert_status_ok();
        owner.assert_json(&json!({"kind": "owner"}));
        stranger.assert_json(&json!({"kind": "none"}));
    }

    #[tokio::test]
    async fn link_permission_follows_owning_collection() {
        let server = make_test_server();
        let root = create(&server, 1, "Root", None).await;
        let link = as_user(server.post(&format!("/v1/collections/{root}/links")), 1)
            .json(&json!({"name": "Docs", "url": "https://docs.rs"}))
            .await;
        link.assert_status(StatusCode::CREATED);
        let link_id = link.json::<Value>()["id"].as_i64().unwrap();

        let response = as_user(server.get(&format!("/v1/links/{link_id}/permission")), 1).await;

        response.assert_json(&json!({"kind": "owner"}));
    }

    #[tokio::test]
    async fn circular_move_returns_409() {
        let server = make_test_server();
        let root = create(&server, 1, "Root", None).await;
        let child = create(&server, 1, "Child", Some(root)).await;

        let response = as_user(server.post("/v1/collections/move"), 1)
            .json(&json!({
                "collection_id": root,
                "source": {"parent": null, "index": 0},
                "destination": {"parent": child}
            }))
            .await;

        response.assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn move_by_stranger_returns_403() {
        let server = make_test_server();
        let root = create(&server, 1, "Root", None).await;
        let other = create(&server, 2, "Other", None).await;

        let response = as_user(server.post("/v1/collections/move"), 2)
            .json(&json!({
                "collection_id": root,
                "source": {"parent": null, "index": 0},
                "destination": {"parent": other}
            }))
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn noop_move_reports_unmoved() {
        let server = make_test_server();
        let root = create(&server, 1, "Root", None).await;

        let response = as_user(server.post("/v1/collections/move"), 1)
            .json(&json!({
                "collection_id": root,
                "source": {"parent": null, "index": 0},
                "destination": {"parent": null, "index": 0}
            }))
            .await;

        response.assert_status_ok();
        response.assert_json(&json!({"moved": false, "parent_changed": false}));
    }

    #[tokio::test]
    async fn tree_sorts_and_flattens() {
        let server = make_test_server();
        let beta = create(&server, 1, "beta", None).await;
        let alpha = create(&server, 1, "Alpha", None).await;
        let nested = create(&server, 1, "nested", Some(beta)).await;

        let response = as_user(server.post("/v1/tree"), 1)
            .json(&json!({"sort": "name_asc", "expanded": [beta]}))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["sort"], "name_asc");
        assert_eq!(body["root_children"], json!([alpha, beta]));
        assert_eq!(
            body["visible"],
            json!([
                {"id": alpha, "depth": 0},
                {"id": beta, "depth": 0},
                {"id": nested, "depth": 1}
            ])
        );
    }

    #[tokio::test]
    async fn tree_rejects_unknown_sort() {
        let server = make_test_server();
        let response = as_user(server.post("/v1/tree"), 1)
            .json(&json!({"sort": "sideways"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn metrics_count_operations() {
        let server = make_test_server();
        create(&server, 1, "Root", None).await;

        let response = server.get("/metrics").await;

        response.assert_status_ok();
        let body = response.text();
        assert!(
            body.contains("canopy_operation_requests_total{operation=\"create_collection\"} 1"),
            "missing create_collection count: {body}"
        );
    }
}

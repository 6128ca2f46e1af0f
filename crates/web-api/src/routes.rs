use std::collections::HashSet;

use application::{Credentials, DispatchReport};
use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use domain::{DomainEvent, OfflineRecord, UserId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{auth::bearer_token, error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OnlineQueryPayload {
    ids: Vec<UserId>,
}

#[derive(Debug, Serialize)]
struct OnlineResponse {
    online_ids: Vec<UserId>,
}

impl From<HashSet<UserId>> for OnlineResponse {
    fn from(online: HashSet<UserId>) -> Self {
        let mut online_ids: Vec<UserId> = online.into_iter().collect();
        online_ids.sort();
        Self { online_ids }
    }
}

#[derive(Debug, Deserialize)]
struct NotificationQuery {
    limit: Option<u32>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(websocket_upgrade))
        .route("/events", post(dispatch_event))
        .route("/presence/online", post(online_subset))
        .route("/presence/following", get(online_following))
        .route("/notifications", get(list_notifications))
        .route("/notifications/read", post(mark_notifications_read))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "online_users": state.registry.online_user_count(),
        "connections": state.hub.connection_count(),
    }))
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .or_else(|| bearer_token(&headers).map(str::to_string))
        .ok_or_else(|| ApiError::unauthorized("Missing token"))?;

    // 握手前先校验一次，无效凭证直接返回 401
    state.jwt_service.verify_token(&token)?;

    Ok(ws.on_upgrade(move |socket| {
        WebSocketConnection::new(socket, state).run(Credentials::new(token))
    }))
}

/// CRUD 服务在提交后调用，发起者必须是当前认证用户
async fn dispatch_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<DomainEvent>,
) -> Result<Json<DispatchReport>, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;

    if event.actor_id != user_id {
        return Err(ApiError::forbidden("actor_id must match the authenticated user"));
    }
    if event.kind.is_internal() {
        return Err(ApiError::bad_request(format!(
            "{} events are emitted by the server only",
            event.kind
        )));
    }

    let report = state.router.dispatch(event).await?;
    Ok(Json(report))
}

async fn online_subset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<OnlineQueryPayload>,
) -> Result<Json<OnlineResponse>, ApiError> {
    state.jwt_service.extract_user_from_headers(&headers)?;
    let online = state.presence.online_subset_of(payload.ids);
    Ok(Json(online.into()))
}

async fn online_following(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<OnlineResponse>, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    Ok(Json(state.presence.online_following(user_id).into()))
}

async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<OfflineRecord>>, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let records = state.inbox.list(user_id, query.limit).await?;
    Ok(Json(records))
}

async fn mark_notifications_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let updated = state.inbox.mark_all_read(user_id).await?;
    Ok((StatusCode::OK, Json(json!({ "updated": updated }))))
}

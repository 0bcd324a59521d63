use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use application::UserStatus;
use domain::UserId;

use crate::{state::AppState, ws_connection};

#[derive(Debug, Deserialize)]
struct BulkStatusPayload {
    #[serde(rename = "userIds")]
    user_ids: Vec<Uuid>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/users/{user_id}/status", get(user_status))
        .route("/users/status", post(bulk_user_status))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// 查询单个用户是否在线。
async fn user_status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Json<UserStatus> {
    let user_id = UserId::from(user_id);
    Json(UserStatus {
        user_id,
        is_online: state.presence.is_online(user_id).await,
    })
}

/// 批量查询在线状态，一次返回每个请求用户的结果。
async fn bulk_user_status(
    State(state): State<AppState>,
    Json(payload): Json<BulkStatusPayload>,
) -> Json<Vec<UserStatus>> {
    let mut statuses = Vec::with_capacity(payload.user_ids.len());
    for user_id in payload.user_ids {
        let user_id = UserId::from(user_id);
        statuses.push(UserStatus {
            user_id,
            is_online: state.presence.is_online(user_id).await,
        });
    }
    Json(statuses)
}

async fn websocket_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| ws_connection::run(socket, state))
}

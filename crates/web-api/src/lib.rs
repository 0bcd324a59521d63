//! HTTP/WebSocket 接入层。
//!
//! 对外暴露三个面：
//! - `GET /api/ws` WebSocket 升级，实时收发消息
//! - `GET /api/users/{id}/status` 与 `POST /api/users/status` 在线状态查询
//! - `GET /health` 健康检查

pub mod error;
pub mod routes;
pub mod state;
pub mod ws_connection;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;

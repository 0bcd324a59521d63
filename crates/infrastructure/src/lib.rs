//! 基础设施层：PostgreSQL 消息存储与 JWT 令牌服务。

pub mod auth;
pub mod db;

pub use auth::{Claims, JwtTokenService};
pub use db::{create_pg_pool, PgMessageRepository};

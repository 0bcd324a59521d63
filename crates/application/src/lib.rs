//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务：在线状态注册表、消息投递路由、
//! 连接会话状态机，以及对外部适配器（令牌校验、消息存储）的抽象。

pub mod auth;
pub mod clock;
pub mod delivery;
pub mod dto;
pub mod error;
pub mod events;
pub mod presence;
pub mod repository;
pub mod session;

pub use auth::{AuthError, TokenVerifier};
pub use clock::{Clock, SystemClock};
pub use delivery::{ConnectionRegistry, DeliveryRouter};
pub use dto::{MessageView, UserStatus};
pub use error::ApplicationError;
pub use events::{ClientEvent, IncomingMessage, ServerEvent};
pub use presence::{PresenceEntry, PresenceEvent, PresenceRegistry};
pub use repository::MessageRepository;
pub use session::{ConnectionSession, SessionDependencies};

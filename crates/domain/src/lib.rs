//! 即时消息系统核心领域模型
//!
//! 包含消息实体、参与者标识等值对象，以及相关的校验规则。

pub mod errors;
pub mod message;
pub mod value_objects;

pub use errors::{DomainError, DomainResult, RepositoryError};
pub use message::{Message, MessageBody, MAX_TEXT_CHARS};
pub use value_objects::{ConnectionId, MessageId, Recipient, Timestamp, UserId};

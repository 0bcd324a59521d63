//! 领域模型错误定义

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 消息内容不合法（过长、为空、缺少必要字段）
    #[error("invalid message: {reason}")]
    InvalidMessage { reason: String },

    /// 收件人格式不合法
    #[error("invalid recipient: {value}")]
    InvalidRecipient { value: String },
}

impl DomainError {
    pub fn invalid_message(reason: impl Into<String>) -> Self {
        Self::InvalidMessage {
            reason: reason.into(),
        }
    }

    pub fn invalid_recipient(value: impl Into<String>) -> Self {
        Self::InvalidRecipient {
            value: value.into(),
        }
    }
}

/// 存储层错误类型
///
/// 仓储实现把底层驱动错误统一收敛到这里，调用方据此决定
/// 回滚、重试还是向用户汇报。
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("requested record not found")]
    NotFound,

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::auth::AuthError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),
    #[error("persistence failed: {0}")]
    Repository(#[from] RepositoryError),
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("operation requires an authenticated session")]
    NotAuthenticated,
}

impl ApplicationError {
    /// 认证失败必须断开连接，其余错误转成面向用户的 message_error。
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

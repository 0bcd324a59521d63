use async_trait::async_trait;
use domain::UserId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid or expired token")]
    InvalidToken,
}

/// 会话令牌校验器。
///
/// 具体实现（JWT 校验）放在 infrastructure 层；令牌的 24 小时有效期
/// 由实现方强制，核心只关心校验结果里的稳定用户标识。
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserId, AuthError>;
}

//! JWT 会话令牌服务。
//!
//! 既负责签发（登录流程的外围）也负责校验。有效期窗口
//! （默认 24 小时）在这里强制，核心层只看到稳定的用户标识。

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use application::{AuthError, TokenVerifier};
use config::JwtConfig;
use domain::UserId;

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

#[derive(Clone)]
pub struct JwtTokenService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtTokenService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 签发 token。
    pub fn issue_token(&self, user_id: UserId) -> Result<String, jsonwebtoken::errors::Error> {
        let exp = chrono::Utc::now() + chrono::Duration::hours(self.config.expiration_hours);
        let claims = Claims {
            user_id: Uuid::from(user_id),
            exp: exp.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
    }

    fn decode_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| token_data.claims)
    }
}

#[async_trait]
impl TokenVerifier for JwtTokenService {
    async fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        self.decode_token(token)
            .map(|claims| UserId::from(claims.user_id))
            .map_err(|err| {
                tracing::debug!(error = %err, "token 校验失败");
                AuthError::InvalidToken
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtTokenService {
        JwtTokenService::new(JwtConfig {
            secret: "test-secret-key-with-at-least-32-characters".to_string(),
            expiration_hours: 24,
        })
    }

    #[tokio::test]
    async fn issued_token_verifies_to_same_user() {
        let service = service();
        let user_id = UserId::from(Uuid::new_v4());

        let token = service.issue_token(user_id).unwrap();
        let verified = service.verify(&token).await.unwrap();

        assert_eq!(verified, user_id);
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let service = service();
        assert_eq!(
            service.verify("not-a-jwt").await,
            Err(AuthError::InvalidToken)
        );
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let service = service();
        let user_id = UserId::from(Uuid::new_v4());
        let claims = Claims {
            user_id: Uuid::from(user_id),
            exp: (chrono::Utc::now() - chrono::Duration::hours(1)).timestamp(),
        };
        let token = encode(&Header::default(), &claims, &service.encoding_key).unwrap();

        assert_eq!(
            service.verify(&token).await,
            Err(AuthError::InvalidToken)
        );
    }

    #[tokio::test]
    async fn token_signed_with_other_secret_is_rejected() {
        let service = service();
        let other = JwtTokenService::new(JwtConfig {
            secret: "another-secret-key-with-at-least-32-chars".to_string(),
            expiration_hours: 24,
        });
        let token = other.issue_token(UserId::from(Uuid::new_v4())).unwrap();

        assert_eq!(
            service.verify(&token).await,
            Err(AuthError::InvalidToken)
        );
    }
}

//! 连接会话状态机。
//!
//! 把一条裸连接绑定到用户身份：`Unauthenticated -> Authenticated`，
//! 单向，只有断开才能回退（届时整个会话对象销毁）。所有发消息
//! 操作都以这个绑定为前提。
//!
//! 入站事件通过 `handle_event` 显式分发，返回要写回本连接的出站
//! 事件，因此不需要真实 socket 就能做确定性的单元测试。

use std::sync::Arc;

use domain::{ConnectionId, UserId};

use crate::auth::TokenVerifier;
use crate::delivery::DeliveryRouter;
use crate::dto::MessageView;
use crate::error::ApplicationError;
use crate::events::{ClientEvent, ServerEvent};
use crate::presence::PresenceRegistry;
use crate::repository::MessageRepository;

pub struct SessionDependencies {
    pub verifier: Arc<dyn TokenVerifier>,
    pub repository: Arc<dyn MessageRepository>,
    pub presence: Arc<PresenceRegistry>,
    pub router: Arc<DeliveryRouter>,
}

pub struct ConnectionSession {
    connection_id: ConnectionId,
    user_id: Option<UserId>,
    deps: SessionDependencies,
}

impl ConnectionSession {
    pub fn new(connection_id: ConnectionId, deps: SessionDependencies) -> Self {
        Self {
            connection_id,
            user_id: None,
            deps,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// 处理一个入站事件，返回要写回本连接的出站事件。
    ///
    /// 只有认证失败是致命错误（调用方应当关闭连接）；存储等其他
    /// 失败一律转成 message_error 事件，不会让连接处理崩溃。
    pub async fn handle_event(
        &mut self,
        event: ClientEvent,
    ) -> Result<Vec<ServerEvent>, ApplicationError> {
        match event {
            ClientEvent::Authenticate { token } => self.handle_authenticate(&token).await,
            ClientEvent::Message(incoming) => Ok(self.handle_message(incoming).await),
            ClientEvent::UpdateActivity => {
                if let Some(user_id) = self.user_id {
                    self.deps.presence.touch(user_id).await;
                }
                Ok(Vec::new())
            }
            ClientEvent::Login { user_id } => {
                // 遗留握手：仅登记在线状态，不授予发消息的权限
                let user_id = UserId::from(user_id);
                self.deps.presence.bind(user_id, self.connection_id).await;
                Ok(vec![ServerEvent::OnlineUsers {
                    users: self.deps.presence.list_online().await,
                }])
            }
        }
    }

    async fn handle_authenticate(
        &mut self,
        token: &str,
    ) -> Result<Vec<ServerEvent>, ApplicationError> {
        let user_id = self.deps.verifier.verify(token).await.map_err(|err| {
            tracing::warn!(connection_id = %self.connection_id, "连接认证失败");
            ApplicationError::from(err)
        })?;

        self.user_id = Some(user_id);
        self.deps.presence.bind(user_id, self.connection_id).await;

        let mut events = Vec::with_capacity(2);
        match self.deps.repository.history(user_id).await {
            Ok(messages) => {
                let views = messages
                    .iter()
                    .map(|m| MessageView::for_user(m, user_id))
                    .collect();
                events.push(ServerEvent::OldMessages { messages: views });
            }
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "加载历史消息失败");
                events.push(ServerEvent::MessageError {
                    error: format!("failed to load message history: {err}"),
                });
            }
        }
        events.push(ServerEvent::OnlineUsers {
            users: self.deps.presence.list_online().await,
        });
        Ok(events)
    }

    async fn handle_message(&self, incoming: crate::events::IncomingMessage) -> Vec<ServerEvent> {
        let Some(user_id) = self.user_id else {
            return vec![ServerEvent::MessageError {
                error: "not authenticated".to_string(),
            }];
        };

        match self
            .deps
            .router
            .route(user_id, self.connection_id, incoming)
            .await
        {
            Ok((id, timestamp)) => vec![ServerEvent::MessageSent { id, timestamp }],
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "消息发送失败");
                vec![ServerEvent::MessageError {
                    error: err.to_string(),
                }]
            }
        }
    }

    /// 连接断开时的清理：解除在线绑定（触发下线广播）。
    pub async fn on_disconnect(&self) {
        self.deps
            .presence
            .unbind_connection(self.connection_id)
            .await;
    }
}

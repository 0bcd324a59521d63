//! 消息投递路由。
//!
//! 先持久化、后尝试实时投递：消息可能已落库但未送达（收件人离线，
//! 等下次认证时通过历史消息补齐），但绝不会送达一条没有落库的消息。

use std::collections::HashMap;
use std::sync::Arc;

use domain::{ConnectionId, DomainError, Message, MessageBody, MessageId, Recipient, Timestamp, UserId};
use tokio::sync::{mpsc, RwLock};

use crate::clock::Clock;
use crate::dto::MessageView;
use crate::error::ApplicationError;
use crate::events::{IncomingMessage, ServerEvent};
use crate::presence::PresenceRegistry;
use crate::repository::MessageRepository;

/// 连接出站通道注册表：连接标识 -> 该连接的发送端。
///
/// 在线状态注册表负责「用户在不在」，这里只负责「往哪个连接写」。
#[derive(Default)]
pub struct ConnectionRegistry {
    senders: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &self,
        connection_id: ConnectionId,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) {
        let mut senders = self.senders.write().await;
        senders.insert(connection_id, sender);
    }

    pub async fn unregister(&self, connection_id: ConnectionId) {
        let mut senders = self.senders.write().await;
        senders.remove(&connection_id);
    }

    /// 投递到单个连接。通道已关闭按离线处理，返回 false。
    pub async fn send(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let senders = self.senders.read().await;
        match senders.get(&connection_id) {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    /// 推送给所有已注册的连接（周期性 online_users 广播用）。
    pub async fn broadcast_all(&self, event: ServerEvent) {
        let senders = self.senders.read().await;
        for sender in senders.values() {
            let _ = sender.send(event.clone());
        }
    }
}

/// 投递路由器：校验 -> 持久化 -> 解析目标 -> 投递。
pub struct DeliveryRouter {
    repository: Arc<dyn MessageRepository>,
    presence: Arc<PresenceRegistry>,
    connections: Arc<ConnectionRegistry>,
    clock: Arc<dyn Clock>,
}

impl DeliveryRouter {
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        presence: Arc<PresenceRegistry>,
        connections: Arc<ConnectionRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            presence,
            connections,
            clock,
        }
    }

    /// 处理一条已认证发送者的消息。
    ///
    /// 返回 `(消息id, 时间戳)` 作为发送方的 message_sent 确认；无论
    /// 实时投递是否发生，只要落库成功就确认。持久化失败时不做任何
    /// 投递尝试，错误只反馈给发送者。
    pub async fn route(
        &self,
        sender_id: UserId,
        sender_connection: ConnectionId,
        incoming: IncomingMessage,
    ) -> Result<(MessageId, Timestamp), ApplicationError> {
        let body = Self::body_from(&incoming)?;
        let message = Message::new(sender_id, incoming.to, body, self.clock.now());

        self.repository.append(&message).await?;

        match message.receiver {
            Recipient::All => self.deliver_broadcast(&message, sender_connection).await,
            Recipient::User(receiver) => {
                self.deliver_direct(&message, receiver, sender_connection)
                    .await
            }
        }

        Ok((message.id, message.created_at))
    }

    /// 从线上载荷构造消息正文：文本和文件引用必须恰好给出一个。
    fn body_from(incoming: &IncomingMessage) -> Result<MessageBody, DomainError> {
        match (&incoming.text, &incoming.file_url) {
            (Some(_), Some(_)) => Err(DomainError::invalid_message(
                "message must carry either text or a file reference, not both",
            )),
            (Some(text), None) => MessageBody::text(text.clone()),
            (None, Some(file_url)) => {
                let file_type = incoming.file_type.clone().ok_or_else(|| {
                    DomainError::invalid_message("fileType is required for file messages")
                })?;
                MessageBody::file(
                    file_url.clone(),
                    file_type,
                    incoming.width,
                    incoming.height,
                    incoming.file_id.clone(),
                )
            }
            (None, None) => Err(DomainError::invalid_message(
                "message must carry text or a file reference",
            )),
        }
    }

    /// 广播：投给除发送者连接以外的每个在线连接。
    async fn deliver_broadcast(&self, message: &Message, sender_connection: ConnectionId) {
        let view = MessageView::for_receiver(message);
        for (user_id, connection_id) in self.presence.online_connections().await {
            if connection_id == sender_connection {
                continue;
            }
            let delivered = self
                .connections
                .send(
                    connection_id,
                    ServerEvent::Message {
                        message: view.clone(),
                    },
                )
                .await;
            if !delivered {
                tracing::debug!(user_id = %user_id, "广播投递失败，按离线处理");
            }
        }
    }

    /// 点对点：收件人在线就投给它的活动连接，离线则只落库。
    async fn deliver_direct(
        &self,
        message: &Message,
        receiver: UserId,
        sender_connection: ConnectionId,
    ) {
        let Some(connection_id) = self.presence.connection_of(receiver).await else {
            tracing::debug!(receiver = %receiver, "收件人离线，仅落库");
            return;
        };
        // 自己发给自己时不回显 message 事件，只有 message_sent 确认
        if connection_id == sender_connection {
            return;
        }
        let event = ServerEvent::Message {
            message: MessageView::for_receiver(message),
        };
        if !self.connections.send(connection_id, event).await {
            tracing::debug!(receiver = %receiver, "投递通道已关闭，按离线处理");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::repository::memory::InMemoryMessageRepository;
    use async_trait::async_trait;
    use chrono::Duration;
    use domain::{RepositoryError, MAX_TEXT_CHARS};
    use uuid::Uuid;

    struct Harness {
        repository: Arc<InMemoryMessageRepository>,
        presence: Arc<PresenceRegistry>,
        connections: Arc<ConnectionRegistry>,
        router: DeliveryRouter,
    }

    fn harness() -> Harness {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let repository = Arc::new(InMemoryMessageRepository::new());
        let presence = Arc::new(PresenceRegistry::new(clock.clone(), Duration::minutes(5)));
        let connections = Arc::new(ConnectionRegistry::new());
        let router = DeliveryRouter::new(
            repository.clone(),
            presence.clone(),
            connections.clone(),
            clock,
        );
        Harness {
            repository,
            presence,
            connections,
            router,
        }
    }

    async fn connect(
        harness: &Harness,
        user_id: UserId,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let connection_id = ConnectionId::generate();
        let (tx, rx) = mpsc::unbounded_channel();
        harness.connections.register(connection_id, tx).await;
        harness.presence.bind(user_id, connection_id).await;
        (connection_id, rx)
    }

    fn text_message(to: Recipient, text: &str) -> IncomingMessage {
        IncomingMessage {
            to,
            text: Some(text.to_string()),
            file_url: None,
            file_type: None,
            width: None,
            height: None,
            file_id: None,
        }
    }

    #[tokio::test]
    async fn direct_message_is_persisted_and_delivered_live() {
        let h = harness();
        let alice = UserId::from(Uuid::new_v4());
        let bob = UserId::from(Uuid::new_v4());
        let (alice_conn, mut alice_rx) = connect(&h, alice).await;
        let (_bob_conn, mut bob_rx) = connect(&h, bob).await;

        let (id, _ts) = h
            .router
            .route(alice, alice_conn, text_message(Recipient::User(bob), "hi"))
            .await
            .unwrap();

        assert_eq!(h.repository.len().await, 1);
        let event = bob_rx.recv().await.unwrap();
        let ServerEvent::Message { message } = event else {
            panic!("expected message event");
        };
        assert_eq!(message.id, id);
        assert!(!message.is_sender);
        assert_eq!(message.other_user_id, Recipient::User(alice));
        assert_eq!(message.content, MessageBody::text("hi").unwrap());

        // 发送者自己绝不会收到回显的 message 事件
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn offline_receiver_falls_back_to_persistence_only() {
        let h = harness();
        let alice = UserId::from(Uuid::new_v4());
        let bob = UserId::from(Uuid::new_v4());
        let (alice_conn, _alice_rx) = connect(&h, alice).await;

        let result = h
            .router
            .route(alice, alice_conn, text_message(Recipient::User(bob), "hi"))
            .await;

        assert!(result.is_ok());
        assert_eq!(h.repository.len().await, 1);
        let history = h.repository.history(bob).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn broadcast_reaches_everyone_except_sender() {
        let h = harness();
        let alice = UserId::from(Uuid::new_v4());
        let bob = UserId::from(Uuid::new_v4());
        let carol = UserId::from(Uuid::new_v4());
        let (alice_conn, mut alice_rx) = connect(&h, alice).await;
        let (_b, mut bob_rx) = connect(&h, bob).await;
        let (_c, mut carol_rx) = connect(&h, carol).await;

        h.router
            .route(alice, alice_conn, text_message(Recipient::All, "hello all"))
            .await
            .unwrap();

        assert_eq!(h.repository.len().await, 1);
        assert!(matches!(
            bob_rx.recv().await.unwrap(),
            ServerEvent::Message { .. }
        ));
        assert!(matches!(
            carol_rx.recv().await.unwrap(),
            ServerEvent::Message { .. }
        ));
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn oversized_text_is_rejected_before_persistence() {
        let h = harness();
        let alice = UserId::from(Uuid::new_v4());
        let (alice_conn, _rx) = connect(&h, alice).await;

        let oversized = "a".repeat(MAX_TEXT_CHARS + 1);
        let result = h
            .router
            .route(
                alice,
                alice_conn,
                text_message(Recipient::All, &oversized),
            )
            .await;

        assert!(matches!(result, Err(ApplicationError::Domain(_))));
        assert!(h.repository.is_empty().await);
    }

    #[tokio::test]
    async fn text_and_file_together_are_rejected() {
        let h = harness();
        let alice = UserId::from(Uuid::new_v4());
        let (alice_conn, _rx) = connect(&h, alice).await;

        let incoming = IncomingMessage {
            to: Recipient::All,
            text: Some("hi".into()),
            file_url: Some("https://cdn/x.png".into()),
            file_type: Some("image/png".into()),
            width: None,
            height: None,
            file_id: None,
        };
        let result = h.router.route(alice, alice_conn, incoming).await;

        assert!(matches!(result, Err(ApplicationError::Domain(_))));
        assert!(h.repository.is_empty().await);
    }

    struct FailingRepository;

    #[async_trait]
    impl MessageRepository for FailingRepository {
        async fn append(&self, _message: &Message) -> Result<MessageId, RepositoryError> {
            Err(RepositoryError::storage("connection refused"))
        }

        async fn history(&self, _user_id: UserId) -> Result<Vec<Message>, RepositoryError> {
            Err(RepositoryError::storage("connection refused"))
        }
    }

    #[tokio::test]
    async fn persistence_failure_skips_delivery() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let presence = Arc::new(PresenceRegistry::new(clock.clone(), Duration::minutes(5)));
        let connections = Arc::new(ConnectionRegistry::new());
        let router = DeliveryRouter::new(
            Arc::new(FailingRepository),
            presence.clone(),
            connections.clone(),
            clock,
        );

        let alice = UserId::from(Uuid::new_v4());
        let bob = UserId::from(Uuid::new_v4());
        let alice_conn = ConnectionId::generate();
        let bob_conn = ConnectionId::generate();
        let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
        connections.register(bob_conn, bob_tx).await;
        presence.bind(bob, bob_conn).await;

        let result = router
            .route(alice, alice_conn, text_message(Recipient::User(bob), "hi"))
            .await;

        assert!(matches!(result, Err(ApplicationError::Repository(_))));
        assert!(bob_rx.try_recv().is_err());
    }
}

use async_trait::async_trait;
use domain::{Message, MessageId, RepositoryError, UserId};

/// 消息存储。
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 持久化一条消息及其参与者关联行，整体在一个事务里提交。
    /// 失败时不留下任何部分写入。注意：没有幂等键，重试会产生
    /// 新的消息 id。
    async fn append(&self, message: &Message) -> Result<MessageId, RepositoryError>;

    /// 返回该用户参与的全部消息（作为发送者或收件人，包括自己
    /// 广播给 "All" 的），按创建时间升序。
    async fn history(&self, user_id: UserId) -> Result<Vec<Message>, RepositoryError>;
}

/// 内存实现的消息存储（用于测试和本地运行）。
pub mod memory {
    use super::*;
    use domain::Recipient;
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct InMemoryMessageRepository {
        messages: RwLock<Vec<Message>>,
    }

    impl InMemoryMessageRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn len(&self) -> usize {
            self.messages.read().await.len()
        }

        pub async fn is_empty(&self) -> bool {
            self.messages.read().await.is_empty()
        }
    }

    #[async_trait]
    impl MessageRepository for InMemoryMessageRepository {
        async fn append(&self, message: &Message) -> Result<MessageId, RepositoryError> {
            let mut messages = self.messages.write().await;
            messages.push(message.clone());
            Ok(message.id)
        }

        async fn history(&self, user_id: UserId) -> Result<Vec<Message>, RepositoryError> {
            let messages = self.messages.read().await;
            // 插入顺序即为提交顺序，作为同一创建时间的平局裁决
            let mut result: Vec<Message> = messages
                .iter()
                .filter(|m| {
                    m.sender_id == user_id || m.receiver == Recipient::User(user_id)
                })
                .cloned()
                .collect();
            result.sort_by_key(|m| m.created_at);
            Ok(result)
        }
    }
}

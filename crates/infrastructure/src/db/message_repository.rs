//! 消息存储的 PostgreSQL 实现。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Message, MessageId, Recipient, RepositoryError, UserId};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use application::MessageRepository;

/// 数据库消息行。`receiver` 是收件人字符串（uuid 或广播哨兵 "All"），
/// `content` 是序列化后的带标签正文联合体。
#[derive(Debug, Clone, FromRow)]
struct DbMessage {
    id: Uuid,
    sender_id: Uuid,
    receiver: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DbMessage> for Message {
    type Error = RepositoryError;

    fn try_from(row: DbMessage) -> Result<Self, Self::Error> {
        let receiver = Recipient::parse(&row.receiver)
            .map_err(|err| RepositoryError::storage(format!("corrupt receiver column: {err}")))?;
        let body = serde_json::from_str(&row.content)
            .map_err(|err| RepositoryError::storage(format!("corrupt content column: {err}")))?;
        Ok(Message {
            id: MessageId::from(row.id),
            sender_id: UserId::from(row.sender_id),
            receiver,
            body,
            created_at: row.created_at,
        })
    }
}

pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 消息行和参与者关联行都在这个事务里写入。
    async fn insert_message(
        tx: &mut Transaction<'_, Postgres>,
        message: &Message,
        content: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, sender_id, receiver, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.sender_id))
        .bind(message.receiver.to_string())
        .bind(content)
        .bind(message.created_at)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO message_participants (message_id, user_id, is_sender)
            VALUES ($1, $2, TRUE)
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.sender_id))
        .execute(&mut **tx)
        .await?;

        // 广播只有发送者一行；自己发给自己也只保留一行
        if let Recipient::User(receiver) = message.receiver {
            if receiver != message.sender_id {
                sqlx::query(
                    r#"
                    INSERT INTO message_participants (message_id, user_id, is_sender)
                    VALUES ($1, $2, FALSE)
                    "#,
                )
                .bind(Uuid::from(message.id))
                .bind(Uuid::from(receiver))
                .execute(&mut **tx)
                .await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn append(&self, message: &Message) -> Result<MessageId, RepositoryError> {
        let content = serde_json::to_string(&message.body)
            .map_err(|err| RepositoryError::storage(format!("serialize content: {err}")))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| RepositoryError::storage(err.to_string()))?;

        match Self::insert_message(&mut tx, message, &content).await {
            Ok(()) => {
                tx.commit()
                    .await
                    .map_err(|err| RepositoryError::storage(err.to_string()))?;
                Ok(message.id)
            }
            Err(err) => {
                // 错误路径也要先回滚再归还连接
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "事务回滚失败");
                }
                Err(RepositoryError::storage(err.to_string()))
            }
        }
    }

    async fn history(&self, user_id: UserId) -> Result<Vec<Message>, RepositoryError> {
        let rows: Vec<DbMessage> = sqlx::query_as(
            r#"
            SELECT m.id, m.sender_id, m.receiver, m.content, m.created_at
            FROM messages m
            INNER JOIN message_participants p ON p.message_id = m.id
            WHERE p.user_id = $1
            ORDER BY m.created_at ASC, m.seq ASC
            "#,
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(|err| RepositoryError::storage(err.to_string()))?;

        rows.into_iter().map(Message::try_from).collect()
    }
}

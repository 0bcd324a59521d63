use domain::{Message, MessageBody, MessageId, Recipient, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// 面向客户端的消息视图。
///
/// 统一采用 `{id, is_sender, other_user_id, content, timestamp}` 这一种
/// 形状：`other_user_id` 是对端参与者，自己发出的广播消息对端为 "All"。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: MessageId,
    pub is_sender: bool,
    pub other_user_id: Recipient,
    pub content: MessageBody,
    pub timestamp: Timestamp,
}

impl MessageView {
    /// 以指定用户的视角构造视图。
    pub fn for_user(message: &Message, user_id: UserId) -> Self {
        Self {
            id: message.id,
            is_sender: message.sender_id == user_id,
            other_user_id: message.counterpart_for(user_id),
            content: message.body.clone(),
            timestamp: message.created_at,
        }
    }

    /// 收件方视角的视图（实时投递用）。
    pub fn for_receiver(message: &Message) -> Self {
        Self {
            id: message.id,
            is_sender: false,
            other_user_id: Recipient::User(message.sender_id),
            content: message.body.clone(),
            timestamp: message.created_at,
        }
    }
}

/// 用户在线状态查询结果。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub user_id: UserId,
    pub is_online: bool,
}

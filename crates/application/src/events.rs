//! WebSocket 线上事件契约。
//!
//! 事件名和字段名必须与既有客户端保持逐字节兼容，
//! 因此这里的 serde 重命名不要随意改动。

use domain::{MessageId, Recipient, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::MessageView;

/// 客户端入站事件。
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event")]
pub enum ClientEvent {
    /// 携带会话令牌认证当前连接
    #[serde(rename = "authenticate")]
    Authenticate { token: String },

    /// 发送一条文本或文件消息
    #[serde(rename = "message")]
    Message(IncomingMessage),

    /// 活动信号，刷新在线状态的最近活动时间
    #[serde(rename = "updateActivity")]
    UpdateActivity,

    /// 遗留的仅在线状态握手，与 authenticate 不同，不携带凭证
    #[serde(rename = "login")]
    Login {
        #[serde(rename = "userId")]
        user_id: Uuid,
    },
}

/// message 事件的载荷。文本和文件引用互斥。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub to: Recipient,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub file_id: Option<String>,
}

/// 服务端出站事件。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum ServerEvent {
    /// 认证成功后推送的历史消息，旧的在前
    #[serde(rename = "old_messages")]
    OldMessages { messages: Vec<MessageView> },

    /// 当前在线用户列表
    #[serde(rename = "online_users")]
    OnlineUsers { users: Vec<UserId> },

    /// 单个用户上线/下线的状态变化
    #[serde(rename = "userStatusChanged")]
    UserStatusChanged {
        #[serde(rename = "userId")]
        user_id: UserId,
        #[serde(rename = "isOnline")]
        is_online: bool,
    },

    /// 实时投递给收件人的消息（绝不回显给发送者）
    #[serde(rename = "message")]
    Message { message: MessageView },

    /// 发送方的成功确认
    #[serde(rename = "message_sent")]
    MessageSent {
        id: MessageId,
        timestamp: Timestamp,
    },

    /// 发送方可读的失败原因
    #[serde(rename = "message_error")]
    MessageError { error: String },
}

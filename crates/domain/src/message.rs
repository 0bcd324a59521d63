use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{MessageId, Recipient, Timestamp, UserId};

/// 文本消息正文的最大长度（Unicode 码点数）。
pub const MAX_TEXT_CHARS: usize = 50_000;

/// 消息正文：文本或文件引用，二者必居其一。
///
/// 持久化和线上传输都使用同一个带 `kind` 标签的联合体。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum MessageBody {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "file")]
    #[serde(rename_all = "camelCase")]
    File {
        file_url: String,
        file_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_id: Option<String>,
    },
}

impl MessageBody {
    /// 构造文本正文，超过长度上限立即拒绝，不进入持久化。
    pub fn text(text: impl Into<String>) -> Result<Self, DomainError> {
        let text = text.into();
        if text.is_empty() {
            return Err(DomainError::invalid_message("text cannot be empty"));
        }
        let chars = text.chars().count();
        if chars > MAX_TEXT_CHARS {
            return Err(DomainError::invalid_message(format!(
                "text too long: {} chars, limit is {}",
                chars, MAX_TEXT_CHARS
            )));
        }
        Ok(Self::Text { text })
    }

    /// 构造文件引用正文。
    pub fn file(
        file_url: impl Into<String>,
        file_type: impl Into<String>,
        width: Option<u32>,
        height: Option<u32>,
        file_id: Option<String>,
    ) -> Result<Self, DomainError> {
        let file_url = file_url.into();
        let file_type = file_type.into();
        if file_url.trim().is_empty() {
            return Err(DomainError::invalid_message("fileUrl cannot be empty"));
        }
        if file_type.trim().is_empty() {
            return Err(DomainError::invalid_message("fileType cannot be empty"));
        }
        Ok(Self::File {
            file_url,
            file_type,
            width,
            height,
            file_id,
        })
    }
}

/// 消息实体。创建后不可变，没有编辑和删除生命周期。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver: Recipient,
    pub body: MessageBody,
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(
        sender_id: UserId,
        receiver: Recipient,
        body: MessageBody,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            sender_id,
            receiver,
            body,
            created_at,
        }
    }

    /// 消息对指定参与者的"对端"：自己发出的消息对端是收件人，
    /// 收到的消息对端是发送者。
    pub fn counterpart_for(&self, user_id: UserId) -> Recipient {
        if self.sender_id == user_id {
            self.receiver
        } else {
            Recipient::User(self.sender_id)
        }
    }
}

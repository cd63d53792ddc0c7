use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::user::User;
use crate::value_objects::{ChatId, MessageId, Timestamp, UserId};

/// 聊天消息实体。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub message: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ChatMessage {
    /// 校验消息正文：去除首尾空白后非空，且不超过 4000 字符。
    pub fn validate_body(body: &str) -> DomainResult<String> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_argument("message", "cannot be empty"));
        }
        if trimmed.chars().count() > 4000 {
            return Err(DomainError::invalid_argument("message", "too long"));
        }
        Ok(trimmed.to_owned())
    }
}

/// 消息及其作者，用于列表展示和事件载荷。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageWithAuthor {
    #[serde(flatten)]
    pub message: ChatMessage,
    pub author: User,
}

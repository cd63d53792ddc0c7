use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::user::User;
use crate::value_objects::{ChatId, Timestamp, UserId};

/// 聊天实体。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub topic: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Chat {
    /// 校验聊天主题：去除首尾空白后非空，且不超过 255 字符。
    pub fn validate_topic(topic: &str) -> DomainResult<String> {
        let trimmed = topic.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_argument("topic", "cannot be empty"));
        }
        if trimmed.chars().count() > 255 {
            return Err(DomainError::invalid_argument("topic", "too long"));
        }
        Ok(trimmed.to_owned())
    }
}

/// 聊天成员。
///
/// `seq` 是成员表的插入序号，既决定展示顺序也决定归属权：
/// seq 最小的成员即为所有者。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMember {
    pub user: User,
    pub seq: i64,
    pub joined_at: Timestamp,
}

/// 聊天快照：聊天本体加上按 seq 升序排列的成员列表。
///
/// 授权引擎以快照为决策依据，事件载荷也携带同一份快照。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatWithMembers {
    #[serde(flatten)]
    pub chat: Chat,
    pub members: Vec<ChatMember>,
}

impl ChatWithMembers {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_member(&self, user_id: UserId) -> bool {
        self.members.iter().any(|m| m.user.id == user_id)
    }

    /// 所有者 = seq 最小的成员。空聊天没有所有者。
    pub fn owner(&self) -> Option<&ChatMember> {
        self.members.iter().min_by_key(|m| m.seq)
    }
}

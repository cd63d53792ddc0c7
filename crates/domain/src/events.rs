//! 事件模型
//!
//! 每个成功的变更恰好产生一个事件。封闭的变体集合各自携带
//! 自己的载荷，`channels()` 给出变体到频道列表的映射，扇出
//! 调度器据此投递。

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::chat::ChatWithMembers;
use crate::errors::DomainError;
use crate::message::MessageWithAuthor;
use crate::value_objects::{ChatId, MessageId};

/// 具名频道。频道是应用定义的固定主题，不是任意用户主题。
///
/// `chat-updates` 与 `chat-updates:<id>` 对任何已认证身份开放；
/// `chat:<id>` 在订阅时要求订阅者是该聊天的成员。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// 全局聊天列表更新广播。
    ChatUpdates,
    /// 单个聊天的更新广播。
    ChatUpdatesFor(ChatId),
    /// 单个聊天的消息频道，订阅需要成员资格。
    Chat(ChatId),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::ChatUpdates => f.write_str("chat-updates"),
            Channel::ChatUpdatesFor(id) => write!(f, "chat-updates:{id}"),
            Channel::Chat(id) => write!(f, "chat:{id}"),
        }
    }
}

impl FromStr for Channel {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == "chat-updates" {
            return Ok(Channel::ChatUpdates);
        }
        if let Some(id) = value.strip_prefix("chat-updates:") {
            let id: i64 = id
                .parse()
                .map_err(|_| DomainError::invalid_argument("channel", "invalid chat id"))?;
            return Ok(Channel::ChatUpdatesFor(ChatId::new(id)));
        }
        if let Some(id) = value.strip_prefix("chat:") {
            let id: i64 = id
                .parse()
                .map_err(|_| DomainError::invalid_argument("channel", "invalid chat id"))?;
            return Ok(Channel::Chat(ChatId::new(id)));
        }
        Err(DomainError::invalid_argument("channel", "unknown channel"))
    }
}

impl Serialize for Channel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 聊天领域事件。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ChatEvent {
    /// 聊天已创建，载荷为含成员的完整快照。
    ChatCreated { chat: ChatWithMembers },
    /// 主题更新或成员变动（加入、非级联的退出）。
    ChatUpdated { chat: ChatWithMembers },
    /// 聊天已删除（显式删除或最后一人退出的级联），载荷只有 id。
    ChatDeleted { chat_id: ChatId },
    /// 新消息，载荷为含作者的完整消息。
    MessageAdded { message: MessageWithAuthor },
    /// 消息已编辑。
    MessageUpdated { message: MessageWithAuthor },
    /// 消息已删除，载荷只有消息 id；chat_id 仅用于频道路由。
    MessageDeleted {
        #[serde(skip)]
        chat_id: ChatId,
        message_id: MessageId,
    },
}

impl ChatEvent {
    /// 事件的线上名称。
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::ChatCreated { .. } => "chat_created",
            ChatEvent::ChatUpdated { .. } => "chat_updated",
            ChatEvent::ChatDeleted { .. } => "chat_deleted",
            ChatEvent::MessageAdded { .. } => "message_added",
            ChatEvent::MessageUpdated { .. } => "message_updated",
            ChatEvent::MessageDeleted { .. } => "message_deleted",
        }
    }

    /// 变体到频道列表的映射，扇出调度器唯一的路由来源。
    pub fn channels(&self) -> Vec<Channel> {
        match self {
            ChatEvent::ChatCreated { .. } => vec![Channel::ChatUpdates],
            ChatEvent::ChatUpdated { chat } => vec![
                Channel::ChatUpdates,
                Channel::ChatUpdatesFor(chat.chat.id),
            ],
            ChatEvent::ChatDeleted { chat_id } => vec![
                Channel::ChatUpdates,
                Channel::ChatUpdatesFor(*chat_id),
            ],
            ChatEvent::MessageAdded { message }
            | ChatEvent::MessageUpdated { message } => {
                vec![Channel::Chat(message.message.chat_id)]
            }
            ChatEvent::MessageDeleted { chat_id, .. } => vec![Channel::Chat(*chat_id)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Chat;
    use crate::user::User;
    use crate::value_objects::{Timestamp, UserId};
    use chrono::Utc;

    fn snapshot(id: i64) -> ChatWithMembers {
        let now: Timestamp = Utc::now();
        ChatWithMembers {
            chat: Chat {
                id: ChatId::new(id),
                topic: "general".to_owned(),
                created_at: now,
                updated_at: now,
            },
            members: vec![],
        }
    }

    fn message_in(chat_id: i64) -> MessageWithAuthor {
        let now = Utc::now();
        MessageWithAuthor {
            message: crate::message::ChatMessage {
                id: MessageId::new(9),
                chat_id: ChatId::new(chat_id),
                user_id: UserId::new(1),
                message: "hi".to_owned(),
                created_at: now,
                updated_at: now,
            },
            author: User {
                id: UserId::new(1),
                name: "a".to_owned(),
                email: "a@example.com".to_owned(),
            },
        }
    }

    #[test]
    fn channel_names_round_trip() {
        for channel in [
            Channel::ChatUpdates,
            Channel::ChatUpdatesFor(ChatId::new(7)),
            Channel::Chat(ChatId::new(7)),
        ] {
            let parsed: Channel = channel.to_string().parse().unwrap();
            assert_eq!(parsed, channel);
        }
        assert!("presence:7".parse::<Channel>().is_err());
        assert!("chat:abc".parse::<Channel>().is_err());
    }

    #[test]
    fn created_goes_to_broadcast_only() {
        let event = ChatEvent::ChatCreated { chat: snapshot(3) };
        assert_eq!(event.name(), "chat_created");
        assert_eq!(event.channels(), vec![Channel::ChatUpdates]);
    }

    #[test]
    fn updated_and_deleted_target_both_broadcast_channels() {
        let updated = ChatEvent::ChatUpdated { chat: snapshot(3) };
        assert_eq!(
            updated.channels(),
            vec![Channel::ChatUpdates, Channel::ChatUpdatesFor(ChatId::new(3))]
        );

        let deleted = ChatEvent::ChatDeleted { chat_id: ChatId::new(3) };
        assert_eq!(deleted.name(), "chat_deleted");
        assert_eq!(
            deleted.channels(),
            vec![Channel::ChatUpdates, Channel::ChatUpdatesFor(ChatId::new(3))]
        );
    }

    #[test]
    fn message_events_target_the_chat_channel() {
        let added = ChatEvent::MessageAdded { message: message_in(5) };
        assert_eq!(added.channels(), vec![Channel::Chat(ChatId::new(5))]);

        let deleted = ChatEvent::MessageDeleted {
            chat_id: ChatId::new(5),
            message_id: MessageId::new(9),
        };
        assert_eq!(deleted.channels(), vec![Channel::Chat(ChatId::new(5))]);
    }

    #[test]
    fn deleted_payload_carries_only_the_id() {
        let event = ChatEvent::MessageDeleted {
            chat_id: ChatId::new(5),
            message_id: MessageId::new(9),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "message_deleted");
        assert_eq!(value["payload"], serde_json::json!({ "message_id": 9 }));
    }
}

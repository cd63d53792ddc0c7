//! 授权引擎
//!
//! 无状态决策函数：输入（身份，能力，快照），输出允许/拒绝。
//! 不修改任何状态，没有副作用。调用方负责把拒绝映射为统一的
//! `DomainError::Unauthorized`。

use crate::chat::ChatWithMembers;
use crate::identity::Identity;
use crate::message::ChatMessage;

/// 固定的能力集合，按（身份，聊天）或（身份，消息）逐一求值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ListMessages,
    Create,
    Update,
    Join,
    Leave,
    AddMessage,
    Delete,
}

/// 对聊天求值一个能力。
///
/// 超级管理员对 `ListMessages` / `Update` / `AddMessage` / `Delete`
/// 一律放行；`Join` / `Leave` 是相对身份本身的检查，没有豁免。
pub fn authorize_chat(identity: &Identity, capability: Capability, chat: &ChatWithMembers) -> bool {
    match capability {
        Capability::Create => true,
        Capability::ListMessages | Capability::AddMessage => {
            identity.is_admin || chat.is_member(identity.user_id)
        }
        Capability::Update => {
            if identity.is_admin {
                return true;
            }
            // 只有当前所有者可以更新；空聊天对所有人拒绝
            chat.owner()
                .map(|owner| owner.user.id == identity.user_id)
                .unwrap_or(false)
        }
        Capability::Join => !chat.is_member(identity.user_id),
        Capability::Leave => chat.is_member(identity.user_id),
        Capability::Delete => {
            identity.is_admin
                || (chat.member_count() == 1 && chat.is_member(identity.user_id))
        }
    }
}

/// 对消息求值一个能力。
///
/// `is_chat_member` 表示调用方当前是否仍是消息所属聊天的成员，
/// 由调用方在求值前查询；只有 `Update` 用得到它。
pub fn authorize_message(
    identity: &Identity,
    capability: Capability,
    message: &ChatMessage,
    is_chat_member: bool,
) -> bool {
    match capability {
        Capability::Update => {
            identity.is_admin || (is_chat_member && message.user_id == identity.user_id)
        }
        Capability::Delete => identity.is_admin || message.user_id == identity.user_id,
        // 其余能力不适用于消息
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{Chat, ChatMember};
    use crate::user::User;
    use crate::value_objects::{ChatId, MessageId, UserId};
    use chrono::Utc;

    fn user(id: i64) -> User {
        User {
            id: UserId::new(id),
            name: format!("user-{id}"),
            email: format!("user-{id}@example.com"),
        }
    }

    fn chat_with(member_ids: &[i64]) -> ChatWithMembers {
        let now = Utc::now();
        ChatWithMembers {
            chat: Chat {
                id: ChatId::new(1),
                topic: "general".to_owned(),
                created_at: now,
                updated_at: now,
            },
            members: member_ids
                .iter()
                .enumerate()
                .map(|(i, id)| ChatMember {
                    user: user(*id),
                    seq: i as i64 + 1,
                    joined_at: now,
                })
                .collect(),
        }
    }

    fn message_from(author: i64) -> ChatMessage {
        let now = Utc::now();
        ChatMessage {
            id: MessageId::new(1),
            chat_id: ChatId::new(1),
            user_id: UserId::new(author),
            message: "hello".to_owned(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn create_is_allowed_for_everyone() {
        let chat = chat_with(&[1]);
        assert!(authorize_chat(&Identity::user(99), Capability::Create, &chat));
        assert!(authorize_chat(&Identity::admin(99), Capability::Create, &chat));
    }

    #[test]
    fn membership_gates_listing_and_posting() {
        let chat = chat_with(&[1, 2]);
        for cap in [Capability::ListMessages, Capability::AddMessage] {
            assert!(authorize_chat(&Identity::user(1), cap, &chat));
            assert!(!authorize_chat(&Identity::user(3), cap, &chat));
            assert!(authorize_chat(&Identity::admin(3), cap, &chat));
        }
    }

    #[test]
    fn only_first_joiner_owns_update() {
        let chat = chat_with(&[7, 8, 9]);
        assert!(authorize_chat(&Identity::user(7), Capability::Update, &chat));
        assert!(!authorize_chat(&Identity::user(8), Capability::Update, &chat));
        assert!(authorize_chat(&Identity::admin(8), Capability::Update, &chat));
    }

    #[test]
    fn owner_follows_minimum_seq_not_list_position() {
        let mut chat = chat_with(&[7, 8]);
        // 列表顺序被打乱也不影响归属判断
        chat.members.swap(0, 1);
        assert!(authorize_chat(&Identity::user(7), Capability::Update, &chat));
        assert!(!authorize_chat(&Identity::user(8), Capability::Update, &chat));
    }

    #[test]
    fn empty_chat_denies_update_to_everyone_but_admin() {
        let chat = chat_with(&[]);
        assert!(!authorize_chat(&Identity::user(1), Capability::Update, &chat));
        assert!(authorize_chat(&Identity::admin(1), Capability::Update, &chat));
    }

    #[test]
    fn join_denied_to_current_member() {
        let chat = chat_with(&[1]);
        assert!(!authorize_chat(&Identity::user(1), Capability::Join, &chat));
        assert!(authorize_chat(&Identity::user(2), Capability::Join, &chat));
        // 管理员加入同样受成员检查约束
        let member_admin = Identity::admin(1);
        assert!(!authorize_chat(&member_admin, Capability::Join, &chat));
    }

    #[test]
    fn leave_requires_membership() {
        let chat = chat_with(&[1]);
        assert!(authorize_chat(&Identity::user(1), Capability::Leave, &chat));
        assert!(!authorize_chat(&Identity::user(2), Capability::Leave, &chat));
        assert!(!authorize_chat(&Identity::admin(2), Capability::Leave, &chat));
    }

    #[test]
    fn delete_requires_sole_membership_or_admin() {
        let sole = chat_with(&[1]);
        assert!(authorize_chat(&Identity::user(1), Capability::Delete, &sole));
        assert!(!authorize_chat(&Identity::user(2), Capability::Delete, &sole));

        let multi = chat_with(&[1, 2]);
        assert!(!authorize_chat(&Identity::user(1), Capability::Delete, &multi));
        assert!(!authorize_chat(&Identity::user(2), Capability::Delete, &multi));
        assert!(authorize_chat(&Identity::admin(3), Capability::Delete, &multi));
    }

    #[test]
    fn message_update_needs_authorship_and_membership() {
        let message = message_from(1);
        assert!(authorize_message(&Identity::user(1), Capability::Update, &message, true));
        // 作者已退出聊天
        assert!(!authorize_message(&Identity::user(1), Capability::Update, &message, false));
        assert!(!authorize_message(&Identity::user(2), Capability::Update, &message, true));
        assert!(authorize_message(&Identity::admin(2), Capability::Update, &message, false));
    }

    #[test]
    fn message_delete_needs_authorship_only() {
        let message = message_from(1);
        assert!(authorize_message(&Identity::user(1), Capability::Delete, &message, false));
        assert!(!authorize_message(&Identity::user(2), Capability::Delete, &message, true));
        assert!(authorize_message(&Identity::admin(2), Capability::Delete, &message, false));
    }

    #[test]
    fn inapplicable_message_capabilities_deny() {
        let message = message_from(1);
        assert!(!authorize_message(&Identity::admin(1), Capability::Join, &message, true));
        assert!(!authorize_message(&Identity::user(1), Capability::AddMessage, &message, true));
    }
}

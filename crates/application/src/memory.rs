//! 内存仓储实现
//!
//! 单元测试和本地运行使用。每张表维护自己的自增序列，保证 id
//! 按创建顺序严格递增，与数据库的 BIGSERIAL 行为一致。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    paginate_by_id, Chat, ChatId, ChatMember, ChatMessage, ChatWithMembers, CursorPage,
    CursorQuery, MessageId, MessageWithAuthor, RepositoryError, Timestamp, User, UserId,
};
use tokio::sync::RwLock;

use crate::repository::{ChatListFilter, ChatMemberRepository, ChatRepository, MessageRepository};

#[derive(Debug, Clone)]
struct MemberRow {
    seq: i64,
    chat_id: ChatId,
    user_id: UserId,
    joined_at: Timestamp,
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    chats: BTreeMap<i64, Chat>,
    members: Vec<MemberRow>,
    messages: BTreeMap<i64, ChatMessage>,
    next_user_id: i64,
    next_chat_id: i64,
    next_member_seq: i64,
    next_message_id: i64,
}

impl Tables {
    fn user(&self, user_id: UserId) -> Result<User, RepositoryError> {
        self.users
            .get(&user_id.0)
            .cloned()
            .ok_or_else(|| RepositoryError::storage(format!("dangling user reference {user_id}")))
    }

    fn snapshot(&self, chat_id: ChatId) -> Result<Option<ChatWithMembers>, RepositoryError> {
        let Some(chat) = self.chats.get(&chat_id.0).cloned() else {
            return Ok(None);
        };
        let mut rows: Vec<&MemberRow> =
            self.members.iter().filter(|m| m.chat_id == chat_id).collect();
        rows.sort_by_key(|m| m.seq);

        let mut members = Vec::with_capacity(rows.len());
        for row in rows {
            members.push(ChatMember {
                user: self.user(row.user_id)?,
                seq: row.seq,
                joined_at: row.joined_at,
            });
        }
        Ok(Some(ChatWithMembers { chat, members }))
    }

    fn with_author(&self, message: ChatMessage) -> Result<MessageWithAuthor, RepositoryError> {
        let author = self.user(message.user_id)?;
        Ok(MessageWithAuthor { message, author })
    }

    /// 三字段子串搜索：主题、成员名字/邮箱、消息正文。
    fn matches_search(&self, chat: &Chat, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        if chat.topic.to_lowercase().contains(&needle) {
            return true;
        }
        let member_hit = self
            .members
            .iter()
            .filter(|m| m.chat_id == chat.id)
            .filter_map(|m| self.users.get(&m.user_id.0))
            .any(|u| {
                u.name.to_lowercase().contains(&needle)
                    || u.email.to_lowercase().contains(&needle)
            });
        if member_hit {
            return true;
        }
        self.messages
            .values()
            .filter(|msg| msg.chat_id == chat.id)
            .any(|msg| msg.message.to_lowercase().contains(&needle))
    }
}

/// 把所有仓储端口实现在同一张内存表集合上。
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 身份提供方的测试替身：登记一个用户。
    pub async fn add_user(
        &self,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> User {
        let mut tables = self.tables.write().await;
        tables.next_user_id += 1;
        let user = User {
            id: UserId::new(tables.next_user_id),
            name: name.into(),
            email: email.into(),
        };
        tables.users.insert(user.id.0, user.clone());
        user
    }
}

#[async_trait]
impl ChatRepository for MemoryStore {
    async fn create_with_owner(
        &self,
        topic: &str,
        owner_id: UserId,
        now: Timestamp,
    ) -> Result<ChatWithMembers, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&owner_id.0) {
            return Err(RepositoryError::NotFound);
        }

        tables.next_chat_id += 1;
        let chat = Chat {
            id: ChatId::new(tables.next_chat_id),
            topic: topic.to_owned(),
            created_at: now,
            updated_at: now,
        };
        tables.chats.insert(chat.id.0, chat.clone());

        tables.next_member_seq += 1;
        let row = MemberRow {
            seq: tables.next_member_seq,
            chat_id: chat.id,
            user_id: owner_id,
            joined_at: now,
        };
        tables.members.push(row);

        tables
            .snapshot(chat.id)?
            .ok_or_else(|| RepositoryError::storage("chat vanished during create"))
    }

    async fn find_with_members(
        &self,
        chat_id: ChatId,
    ) -> Result<Option<ChatWithMembers>, RepositoryError> {
        self.tables.read().await.snapshot(chat_id)
    }

    async fn update_topic(
        &self,
        chat_id: ChatId,
        topic: &str,
        now: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let chat = tables
            .chats
            .get_mut(&chat_id.0)
            .ok_or(RepositoryError::NotFound)?;
        chat.topic = topic.to_owned();
        chat.updated_at = now;
        Ok(())
    }

    async fn delete(&self, chat_id: ChatId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables
            .chats
            .remove(&chat_id.0)
            .ok_or(RepositoryError::NotFound)?;
        tables.members.retain(|m| m.chat_id != chat_id);
        tables.messages.retain(|_, msg| msg.chat_id != chat_id);
        Ok(())
    }

    async fn list(
        &self,
        filter: &ChatListFilter,
        query: &CursorQuery,
    ) -> Result<CursorPage<ChatWithMembers>, RepositoryError> {
        let tables = self.tables.read().await;

        let matching: Vec<Chat> = tables
            .chats
            .values()
            .filter(|chat| match filter.member_user_id {
                Some(user_id) => tables
                    .members
                    .iter()
                    .any(|m| m.chat_id == chat.id && m.user_id == user_id),
                None => true,
            })
            .filter(|chat| match filter.search.as_deref() {
                Some(needle) => tables.matches_search(chat, needle),
                None => true,
            })
            .cloned()
            .collect();

        let page = paginate_by_id(&matching, |chat| chat.id.0, query);
        let total = page.total;
        let mut items = Vec::with_capacity(page.items.len());
        for chat in page.items {
            items.push(
                tables
                    .snapshot(chat.id)?
                    .ok_or_else(|| RepositoryError::storage("chat vanished during list"))?,
            );
        }
        Ok(CursorPage { items, total })
    }
}

#[async_trait]
impl ChatMemberRepository for MemoryStore {
    async fn add_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: Timestamp,
    ) -> Result<ChatMember, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.chats.contains_key(&chat_id.0) {
            return Err(RepositoryError::NotFound);
        }
        let user = tables
            .users
            .get(&user_id.0)
            .cloned()
            .ok_or(RepositoryError::NotFound)?;
        if tables
            .members
            .iter()
            .any(|m| m.chat_id == chat_id && m.user_id == user_id)
        {
            return Err(RepositoryError::Conflict);
        }

        tables.next_member_seq += 1;
        let row = MemberRow {
            seq: tables.next_member_seq,
            chat_id,
            user_id,
            joined_at: now,
        };
        tables.members.push(row.clone());
        Ok(ChatMember {
            user,
            seq: row.seq,
            joined_at: row.joined_at,
        })
    }

    async fn remove_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<u64, RepositoryError> {
        // 单锁内完成移除与清点，杜绝先读后写的竞态
        let mut tables = self.tables.write().await;
        tables
            .members
            .retain(|m| !(m.chat_id == chat_id && m.user_id == user_id));
        let remaining = tables.members.iter().filter(|m| m.chat_id == chat_id).count();
        Ok(remaining as u64)
    }

    async fn is_member(&self, chat_id: ChatId, user_id: UserId) -> Result<bool, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .members
            .iter()
            .any(|m| m.chat_id == chat_id && m.user_id == user_id))
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn create(
        &self,
        chat_id: ChatId,
        author_id: UserId,
        body: &str,
        now: Timestamp,
    ) -> Result<MessageWithAuthor, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.chats.contains_key(&chat_id.0) {
            return Err(RepositoryError::NotFound);
        }
        if !tables.users.contains_key(&author_id.0) {
            return Err(RepositoryError::NotFound);
        }

        tables.next_message_id += 1;
        let message = ChatMessage {
            id: MessageId::new(tables.next_message_id),
            chat_id,
            user_id: author_id,
            message: body.to_owned(),
            created_at: now,
            updated_at: now,
        };
        tables.messages.insert(message.id.0, message.clone());
        tables.with_author(message)
    }

    async fn find_by_id(
        &self,
        message_id: MessageId,
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        Ok(self.tables.read().await.messages.get(&message_id.0).cloned())
    }

    async fn update_body(
        &self,
        message_id: MessageId,
        body: &str,
        now: Timestamp,
    ) -> Result<MessageWithAuthor, RepositoryError> {
        let mut tables = self.tables.write().await;
        let message = tables
            .messages
            .get_mut(&message_id.0)
            .ok_or(RepositoryError::NotFound)?;
        message.message = body.to_owned();
        message.updated_at = now;
        let message = message.clone();
        tables.with_author(message)
    }

    async fn delete(&self, message_id: MessageId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables
            .messages
            .remove(&message_id.0)
            .ok_or(RepositoryError::NotFound)?;
        Ok(())
    }

    async fn list_by_chat(
        &self,
        chat_id: ChatId,
        query: &CursorQuery,
    ) -> Result<CursorPage<MessageWithAuthor>, RepositoryError> {
        let tables = self.tables.read().await;
        let matching: Vec<ChatMessage> = tables
            .messages
            .values()
            .filter(|msg| msg.chat_id == chat_id)
            .cloned()
            .collect();

        let page = paginate_by_id(&matching, |msg| msg.id.0, query);
        let total = page.total;
        let mut items = Vec::with_capacity(page.items.len());
        for message in page.items {
            items.push(tables.with_author(message)?);
        }
        Ok(CursorPage { items, total })
    }
}

//! PostgreSQL 仓储实现
//!
//! 领域 id 一律对应 BIGSERIAL 列，按插入顺序严格递增，游标分页
//! 直接建立在主键比较上。成员行的主键同时充当加入序号。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use application::{ChatListFilter, ChatMemberRepository, ChatRepository, MessageRepository};
use domain::{
    Chat, ChatId, ChatMember, ChatMessage, ChatWithMembers, CursorPage, CursorQuery, MessageId,
    MessageWithAuthor, RepositoryError, SortDirection, Timestamp, User, UserId,
};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) => match db.kind() {
            sqlx::error::ErrorKind::UniqueViolation => RepositoryError::Conflict,
            sqlx::error::ErrorKind::ForeignKeyViolation => RepositoryError::NotFound,
            _ => RepositoryError::storage(err.to_string()),
        },
        _ => RepositoryError::storage(err.to_string()),
    }
}

#[derive(Debug, FromRow)]
struct ChatRecord {
    id: i64,
    topic: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ChatRecord> for Chat {
    fn from(value: ChatRecord) -> Self {
        Chat {
            id: ChatId::new(value.id),
            topic: value.topic,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MemberRecord {
    seq: i64,
    chat_id: i64,
    joined_at: DateTime<Utc>,
    user_id: i64,
    user_name: String,
    user_email: String,
}

impl From<MemberRecord> for ChatMember {
    fn from(value: MemberRecord) -> Self {
        ChatMember {
            user: User {
                id: UserId::new(value.user_id),
                name: value.user_name,
                email: value.user_email,
            },
            seq: value.seq,
            joined_at: value.joined_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: i64,
    chat_id: i64,
    user_id: i64,
    message: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MessageRecord> for ChatMessage {
    fn from(value: MessageRecord) -> Self {
        ChatMessage {
            id: MessageId::new(value.id),
            chat_id: ChatId::new(value.chat_id),
            user_id: UserId::new(value.user_id),
            message: value.message,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageAuthorRecord {
    id: i64,
    chat_id: i64,
    user_id: i64,
    message: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    author_name: String,
    author_email: String,
}

impl From<MessageAuthorRecord> for MessageWithAuthor {
    fn from(value: MessageAuthorRecord) -> Self {
        MessageWithAuthor {
            message: ChatMessage {
                id: MessageId::new(value.id),
                chat_id: ChatId::new(value.chat_id),
                user_id: UserId::new(value.user_id),
                message: value.message,
                created_at: value.created_at,
                updated_at: value.updated_at,
            },
            author: User {
                id: UserId::new(value.user_id),
                name: value.author_name,
                email: value.author_email,
            },
        }
    }
}

/// 把列表过滤条件翻译成 WHERE 子句，count 查询和分页查询共用。
fn push_chat_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ChatListFilter) {
    builder.push(" WHERE TRUE");
    if let Some(user_id) = filter.member_user_id {
        builder.push(
            " AND EXISTS (SELECT 1 FROM chat_members m WHERE m.chat_id = c.id AND m.user_id = ",
        );
        builder.push_bind(user_id.0);
        builder.push(")");
    }
    if let Some(search) = filter.search.as_deref() {
        let pattern = format!("%{search}%");
        builder.push(" AND (c.topic ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(
            " OR EXISTS (SELECT 1 FROM chat_members m JOIN users u ON u.id = m.user_id \
             WHERE m.chat_id = c.id AND (u.name ILIKE ",
        );
        builder.push_bind(pattern.clone());
        builder.push(" OR u.email ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(
            ")) OR EXISTS (SELECT 1 FROM chat_messages msg \
             WHERE msg.chat_id = c.id AND msg.message ILIKE ",
        );
        builder.push_bind(pattern);
        builder.push("))");
    }
}

fn push_cursor_window(builder: &mut QueryBuilder<'_, Postgres>, query: &CursorQuery) {
    if let Some(after) = query.after_id {
        builder.push(match query.direction {
            SortDirection::Asc => " AND c.id > ",
            SortDirection::Desc => " AND c.id < ",
        });
        builder.push_bind(after);
    }
    builder.push(match query.direction {
        SortDirection::Asc => " ORDER BY c.id ASC",
        SortDirection::Desc => " ORDER BY c.id DESC",
    });
    builder.push(" LIMIT ");
    builder.push_bind(query.page_size);
}

#[derive(Clone)]
pub struct PgChatRepository {
    pool: PgPool,
}

impl PgChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 成员加载按 seq（成员行主键）升序，保持加入顺序。
    async fn load_members(
        &self,
        chat_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<ChatMember>>, RepositoryError> {
        let records = sqlx::query_as::<_, MemberRecord>(
            r#"
            SELECT cm.id AS seq, cm.chat_id, cm.joined_at,
                   u.id AS user_id, u.name AS user_name, u.email AS user_email
            FROM chat_members cm
            JOIN users u ON u.id = cm.user_id
            WHERE cm.chat_id = ANY($1)
            ORDER BY cm.id
            "#,
        )
        .bind(chat_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let mut members: HashMap<i64, Vec<ChatMember>> = HashMap::new();
        for record in records {
            members
                .entry(record.chat_id)
                .or_default()
                .push(record.into());
        }
        Ok(members)
    }

    async fn snapshot(
        &self,
        chat_id: ChatId,
    ) -> Result<Option<ChatWithMembers>, RepositoryError> {
        let record = sqlx::query_as::<_, ChatRecord>(
            "SELECT id, topic, created_at, updated_at FROM chats WHERE id = $1",
        )
        .bind(chat_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let Some(record) = record else {
            return Ok(None);
        };
        let mut members = self.load_members(&[record.id]).await?;
        Ok(Some(ChatWithMembers {
            chat: record.into(),
            members: members.remove(&chat_id.0).unwrap_or_default(),
        }))
    }
}

#[async_trait]
impl ChatRepository for PgChatRepository {
    async fn create_with_owner(
        &self,
        topic: &str,
        owner_id: UserId,
        now: Timestamp,
    ) -> Result<ChatWithMembers, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let record = sqlx::query_as::<_, ChatRecord>(
            r#"
            INSERT INTO chats (topic, created_at, updated_at)
            VALUES ($1, $2, $2)
            RETURNING id, topic, created_at, updated_at
            "#,
        )
        .bind(topic)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query("INSERT INTO chat_members (chat_id, user_id, joined_at) VALUES ($1, $2, $3)")
            .bind(record.id)
            .bind(owner_id.0)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;

        self.snapshot(ChatId::new(record.id))
            .await?
            .ok_or_else(|| RepositoryError::storage("chat vanished during create"))
    }

    async fn find_with_members(
        &self,
        chat_id: ChatId,
    ) -> Result<Option<ChatWithMembers>, RepositoryError> {
        self.snapshot(chat_id).await
    }

    async fn update_topic(
        &self,
        chat_id: ChatId,
        topic: &str,
        now: Timestamp,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE chats SET topic = $1, updated_at = $2 WHERE id = $3")
            .bind(topic)
            .bind(now)
            .bind(chat_id.0)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, chat_id: ChatId) -> Result<(), RepositoryError> {
        // 成员行与消息由外键 ON DELETE CASCADE 一并清除
        let result = sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(chat_id.0)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list(
        &self,
        filter: &ChatListFilter,
        query: &CursorQuery,
    ) -> Result<CursorPage<ChatWithMembers>, RepositoryError> {
        let mut count_query = QueryBuilder::new("SELECT count(*) FROM chats c");
        push_chat_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        let mut page_query =
            QueryBuilder::new("SELECT c.id, c.topic, c.created_at, c.updated_at FROM chats c");
        push_chat_filters(&mut page_query, filter);
        push_cursor_window(&mut page_query, query);
        let records: Vec<ChatRecord> = page_query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        let chat_ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        let mut members = self.load_members(&chat_ids).await?;

        let items = records
            .into_iter()
            .map(|record| {
                let chat_members = members.remove(&record.id).unwrap_or_default();
                ChatWithMembers {
                    chat: record.into(),
                    members: chat_members,
                }
            })
            .collect();
        Ok(CursorPage {
            items,
            total: total as u64,
        })
    }
}

#[derive(Clone)]
pub struct PgChatMemberRepository {
    pool: PgPool,
}

impl PgChatMemberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatMemberRepository for PgChatMemberRepository {
    async fn add_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: Timestamp,
    ) -> Result<ChatMember, RepositoryError> {
        #[derive(FromRow)]
        struct InsertedMember {
            seq: i64,
            joined_at: DateTime<Utc>,
        }

        let inserted = sqlx::query_as::<_, InsertedMember>(
            r#"
            INSERT INTO chat_members (chat_id, user_id, joined_at)
            VALUES ($1, $2, $3)
            RETURNING id AS seq, joined_at
            "#,
        )
        .bind(chat_id.0)
        .bind(user_id.0)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let user = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT id, name, email FROM users WHERE id = $1",
        )
        .bind(user_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(ChatMember {
            user: User {
                id: UserId::new(user.0),
                name: user.1,
                email: user.2,
            },
            seq: inserted.seq,
            joined_at: inserted.joined_at,
        })
    }

    async fn remove_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<u64, RepositoryError> {
        // 同一条语句内完成移除与清点：外层子查询读到的是语句开始
        // 时的快照，减去被移除的行数才是真正的剩余成员数。
        let remaining: i64 = sqlx::query_scalar(
            r#"
            WITH removed AS (
                DELETE FROM chat_members
                WHERE chat_id = $1 AND user_id = $2
                RETURNING id
            )
            SELECT (SELECT count(*) FROM chat_members WHERE chat_id = $1)
                 - (SELECT count(*) FROM removed)
            "#,
        )
        .bind(chat_id.0)
        .bind(user_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(remaining.max(0) as u64)
    }

    async fn is_member(&self, chat_id: ChatId, user_id: UserId) -> Result<bool, RepositoryError> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM chat_members WHERE chat_id = $1 AND user_id = $2)",
        )
        .bind(chat_id.0)
        .bind(user_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_with_author(
        &self,
        message_id: i64,
    ) -> Result<MessageWithAuthor, RepositoryError> {
        let record = sqlx::query_as::<_, MessageAuthorRecord>(
            r#"
            SELECT m.id, m.chat_id, m.user_id, m.message, m.created_at, m.updated_at,
                   u.name AS author_name, u.email AS author_email
            FROM chat_messages m
            JOIN users u ON u.id = m.user_id
            WHERE m.id = $1
            "#,
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        record.map(Into::into).ok_or(RepositoryError::NotFound)
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(
        &self,
        chat_id: ChatId,
        author_id: UserId,
        body: &str,
        now: Timestamp,
    ) -> Result<MessageWithAuthor, RepositoryError> {
        let message_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO chat_messages (chat_id, user_id, message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id
            "#,
        )
        .bind(chat_id.0)
        .bind(author_id.0)
        .bind(body)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        self.fetch_with_author(message_id).await
    }

    async fn find_by_id(
        &self,
        message_id: MessageId,
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, chat_id, user_id, message, created_at, updated_at
            FROM chat_messages
            WHERE id = $1
            "#,
        )
        .bind(message_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(Into::into))
    }

    async fn update_body(
        &self,
        message_id: MessageId,
        body: &str,
        now: Timestamp,
    ) -> Result<MessageWithAuthor, RepositoryError> {
        let result =
            sqlx::query("UPDATE chat_messages SET message = $1, updated_at = $2 WHERE id = $3")
                .bind(body)
                .bind(now)
                .bind(message_id.0)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        self.fetch_with_author(message_id.0).await
    }

    async fn delete(&self, message_id: MessageId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE id = $1")
            .bind(message_id.0)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_by_chat(
        &self,
        chat_id: ChatId,
        query: &CursorQuery,
    ) -> Result<CursorPage<MessageWithAuthor>, RepositoryError> {
        let total: i64 = sqlx::query_scalar("SELECT count(*) FROM chat_messages WHERE chat_id = $1")
            .bind(chat_id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        let mut page_query = QueryBuilder::new(
            r#"
            SELECT c.id, c.chat_id, c.user_id, c.message, c.created_at, c.updated_at,
                   u.name AS author_name, u.email AS author_email
            FROM chat_messages c
            JOIN users u ON u.id = c.user_id
            WHERE c.chat_id = "#,
        );
        page_query.push_bind(chat_id.0);
        push_cursor_window(&mut page_query, query);
        let records: Vec<MessageAuthorRecord> = page_query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(CursorPage {
            items: records.into_iter().map(Into::into).collect(),
            total: total as u64,
        })
    }
}

use async_trait::async_trait;
use domain::{
    ChatId, ChatMember, ChatMessage, ChatWithMembers, CursorPage, CursorQuery, MessageId,
    MessageWithAuthor, RepositoryError, Timestamp, UserId,
};

/// 聊天列表的查询条件。
///
/// `search` 是跨字段的子串过滤：主题、任一成员的名字或邮箱、
/// 任一消息正文，命中其一即命中该聊天。
#[derive(Debug, Clone, Default)]
pub struct ChatListFilter {
    pub member_user_id: Option<UserId>,
    pub search: Option<String>,
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// 原子地创建聊天并写入创建者的成员行（创建者因最先插入而成为所有者）。
    async fn create_with_owner(
        &self,
        topic: &str,
        owner_id: UserId,
        now: Timestamp,
    ) -> Result<ChatWithMembers, RepositoryError>;

    async fn find_with_members(
        &self,
        chat_id: ChatId,
    ) -> Result<Option<ChatWithMembers>, RepositoryError>;

    async fn update_topic(
        &self,
        chat_id: ChatId,
        topic: &str,
        now: Timestamp,
    ) -> Result<(), RepositoryError>;

    /// 删除聊天，级联删除成员行和消息。
    async fn delete(&self, chat_id: ChatId) -> Result<(), RepositoryError>;

    /// 过滤 + 游标分页的聊天列表；`total` 不受游标影响。
    async fn list(
        &self,
        filter: &ChatListFilter,
        query: &CursorQuery,
    ) -> Result<CursorPage<ChatWithMembers>, RepositoryError>;
}

#[async_trait]
pub trait ChatMemberRepository: Send + Sync {
    async fn add_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: Timestamp,
    ) -> Result<ChatMember, RepositoryError>;

    /// 原子地移除成员并返回剩余成员数，级联删除的判定只依据这个
    /// 返回值，不做先读后写。
    async fn remove_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<u64, RepositoryError>;

    async fn is_member(&self, chat_id: ChatId, user_id: UserId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(
        &self,
        chat_id: ChatId,
        author_id: UserId,
        body: &str,
        now: Timestamp,
    ) -> Result<MessageWithAuthor, RepositoryError>;

    async fn find_by_id(
        &self,
        message_id: MessageId,
    ) -> Result<Option<ChatMessage>, RepositoryError>;

    async fn update_body(
        &self,
        message_id: MessageId,
        body: &str,
        now: Timestamp,
    ) -> Result<MessageWithAuthor, RepositoryError>;

    async fn delete(&self, message_id: MessageId) -> Result<(), RepositoryError>;

    /// 单个聊天内的消息分页，按请求方向的抓取顺序返回；
    /// 页内的升序调整由服务层完成。
    async fn list_by_chat(
        &self,
        chat_id: ChatId,
        query: &CursorQuery,
    ) -> Result<CursorPage<MessageWithAuthor>, RepositoryError>;
}

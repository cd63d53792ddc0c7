//! 聊天用例服务
//!
//! 每个变更操作的固定流程：目标存在性检查（NotFound 先于授权）、
//! 授权决策、输入校验、持久化变更、事件发射。授权或校验失败
//! 不产生任何状态变化，也不发射事件。

use std::sync::Arc;

use domain::{
    authorize_chat, Capability, Chat, ChatEvent, ChatId, ChatWithMembers, CursorPage, CursorQuery,
    DomainError, Identity,
};
use tracing::warn;

use crate::broadcaster::EventBroadcaster;
use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::repository::{ChatListFilter, ChatMemberRepository, ChatRepository};

pub struct ChatServiceDependencies {
    pub chat_repository: Arc<dyn ChatRepository>,
    pub member_repository: Arc<dyn ChatMemberRepository>,
    pub clock: Arc<dyn Clock>,
    pub broadcaster: Arc<dyn EventBroadcaster>,
}

/// `leave_chat` 的两种结局：聊天仍在，或随最后一人退出而消亡。
#[derive(Debug, Clone, PartialEq)]
pub enum LeaveOutcome {
    Left(ChatWithMembers),
    ChatDeleted,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    async fn load_chat(&self, chat_id: ChatId) -> Result<ChatWithMembers, ApplicationError> {
        self.deps
            .chat_repository
            .find_with_members(chat_id)
            .await?
            .ok_or_else(|| DomainError::ChatNotFound.into())
    }

    /// 持久化提交之后发射事件；投递失败只记日志，不影响请求结果。
    async fn emit(&self, event: ChatEvent) {
        if let Err(err) = self.deps.broadcaster.broadcast(event).await {
            warn!(error = %err, "event broadcast failed");
        }
    }

    pub async fn create_chat(
        &self,
        identity: &Identity,
        topic: &str,
    ) -> Result<ChatWithMembers, ApplicationError> {
        let topic = Chat::validate_topic(topic)?;
        let now = self.deps.clock.now();

        let chat = self
            .deps
            .chat_repository
            .create_with_owner(&topic, identity.user_id, now)
            .await?;

        self.emit(ChatEvent::ChatCreated { chat: chat.clone() }).await;
        Ok(chat)
    }

    pub async fn update_chat(
        &self,
        identity: &Identity,
        chat_id: ChatId,
        topic: &str,
    ) -> Result<ChatWithMembers, ApplicationError> {
        let chat = self.load_chat(chat_id).await?;
        if !authorize_chat(identity, Capability::Update, &chat) {
            return Err(DomainError::Unauthorized.into());
        }
        let topic = Chat::validate_topic(topic)?;

        let now = self.deps.clock.now();
        self.deps
            .chat_repository
            .update_topic(chat_id, &topic, now)
            .await?;

        let chat = self.load_chat(chat_id).await?;
        self.emit(ChatEvent::ChatUpdated { chat: chat.clone() }).await;
        Ok(chat)
    }

    pub async fn delete_chat(
        &self,
        identity: &Identity,
        chat_id: ChatId,
    ) -> Result<(), ApplicationError> {
        let chat = self.load_chat(chat_id).await?;
        if !authorize_chat(identity, Capability::Delete, &chat) {
            return Err(DomainError::Unauthorized.into());
        }

        self.deps.chat_repository.delete(chat_id).await?;
        self.emit(ChatEvent::ChatDeleted { chat_id }).await;
        Ok(())
    }

    pub async fn join_chat(
        &self,
        identity: &Identity,
        chat_id: ChatId,
    ) -> Result<ChatWithMembers, ApplicationError> {
        let chat = self.load_chat(chat_id).await?;
        if !authorize_chat(identity, Capability::Join, &chat) {
            // 重复加入是唯一映射为冲突而非统一拒绝的场景
            return Err(DomainError::AlreadyMember.into());
        }

        let now = self.deps.clock.now();
        self.deps
            .member_repository
            .add_member(chat_id, identity.user_id, now)
            .await?;

        let chat = self.load_chat(chat_id).await?;
        self.emit(ChatEvent::ChatUpdated { chat: chat.clone() }).await;
        Ok(chat)
    }

    /// 退出聊天。最后一名成员退出时级联删除聊天本体，并发射与
    /// 显式删除相同的 `chat_deleted` 事件，订阅者无法区分两种成因。
    pub async fn leave_chat(
        &self,
        identity: &Identity,
        chat_id: ChatId,
    ) -> Result<LeaveOutcome, ApplicationError> {
        let chat = self.load_chat(chat_id).await?;
        if !authorize_chat(identity, Capability::Leave, &chat) {
            return Err(DomainError::Unauthorized.into());
        }

        let remaining = self
            .deps
            .member_repository
            .remove_member(chat_id, identity.user_id)
            .await?;

        if remaining == 0 {
            self.deps.chat_repository.delete(chat_id).await?;
            self.emit(ChatEvent::ChatDeleted { chat_id }).await;
            return Ok(LeaveOutcome::ChatDeleted);
        }

        let chat = self.load_chat(chat_id).await?;
        self.emit(ChatEvent::ChatUpdated { chat: chat.clone() }).await;
        Ok(LeaveOutcome::Left(chat))
    }

    /// 聊天列表：可选的成员过滤和跨字段搜索，游标分页。
    /// 任何已认证身份都可以调用，无需逐项授权。
    pub async fn list_chats(
        &self,
        filter: &ChatListFilter,
        query: &CursorQuery,
    ) -> Result<CursorPage<ChatWithMembers>, ApplicationError> {
        Ok(self.deps.chat_repository.list(filter, query).await?)
    }
}

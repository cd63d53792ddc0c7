//! 消息用例服务

use std::sync::Arc;

use domain::{
    authorize_chat, authorize_message, Capability, ChatEvent, ChatId, ChatMessage, CursorPage,
    CursorQuery, DomainError, Identity, MessageId, MessageWithAuthor, SortDirection,
};
use tracing::warn;

use crate::broadcaster::EventBroadcaster;
use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::repository::{ChatMemberRepository, ChatRepository, MessageRepository};

pub struct MessageServiceDependencies {
    pub chat_repository: Arc<dyn ChatRepository>,
    pub member_repository: Arc<dyn ChatMemberRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub clock: Arc<dyn Clock>,
    pub broadcaster: Arc<dyn EventBroadcaster>,
}

pub struct MessageService {
    deps: MessageServiceDependencies,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        Self { deps }
    }

    async fn emit(&self, event: ChatEvent) {
        if let Err(err) = self.deps.broadcaster.broadcast(event).await {
            warn!(error = %err, "event broadcast failed");
        }
    }

    async fn load_message(
        &self,
        message_id: MessageId,
    ) -> Result<ChatMessage, ApplicationError> {
        self.deps
            .message_repository
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| DomainError::MessageNotFound.into())
    }

    /// 消息列表。仓储按请求方向抓取（默认从最新到最旧，便于取
    /// "最近 N 条"），返回前把页内调整为按 id 升序，客户端在页内
    /// 始终从旧读到新，翻页仍沿请求方向进行。
    pub async fn list_messages(
        &self,
        identity: &Identity,
        chat_id: ChatId,
        query: &CursorQuery,
    ) -> Result<CursorPage<MessageWithAuthor>, ApplicationError> {
        let chat = self
            .deps
            .chat_repository
            .find_with_members(chat_id)
            .await?
            .ok_or(DomainError::ChatNotFound)?;
        if !authorize_chat(identity, Capability::ListMessages, &chat) {
            return Err(DomainError::Unauthorized.into());
        }

        let mut page = self
            .deps
            .message_repository
            .list_by_chat(chat_id, query)
            .await?;
        if query.direction == SortDirection::Desc {
            page.items.reverse();
        }
        Ok(page)
    }

    pub async fn add_message(
        &self,
        identity: &Identity,
        chat_id: ChatId,
        body: &str,
    ) -> Result<MessageWithAuthor, ApplicationError> {
        let chat = self
            .deps
            .chat_repository
            .find_with_members(chat_id)
            .await?
            .ok_or(DomainError::ChatNotFound)?;
        if !authorize_chat(identity, Capability::AddMessage, &chat) {
            return Err(DomainError::Unauthorized.into());
        }
        let body = ChatMessage::validate_body(body)?;

        let now = self.deps.clock.now();
        let message = self
            .deps
            .message_repository
            .create(chat_id, identity.user_id, &body, now)
            .await?;

        self.emit(ChatEvent::MessageAdded {
            message: message.clone(),
        })
        .await;
        Ok(message)
    }

    pub async fn update_message(
        &self,
        identity: &Identity,
        message_id: MessageId,
        body: &str,
    ) -> Result<MessageWithAuthor, ApplicationError> {
        let message = self.load_message(message_id).await?;
        let is_member = self
            .deps
            .member_repository
            .is_member(message.chat_id, identity.user_id)
            .await?;
        if !authorize_message(identity, Capability::Update, &message, is_member) {
            return Err(DomainError::Unauthorized.into());
        }
        let body = ChatMessage::validate_body(body)?;

        let now = self.deps.clock.now();
        let message = self
            .deps
            .message_repository
            .update_body(message_id, &body, now)
            .await?;

        self.emit(ChatEvent::MessageUpdated {
            message: message.clone(),
        })
        .await;
        Ok(message)
    }

    pub async fn delete_message(
        &self,
        identity: &Identity,
        message_id: MessageId,
    ) -> Result<(), ApplicationError> {
        let message = self.load_message(message_id).await?;
        if !authorize_message(identity, Capability::Delete, &message, false) {
            return Err(DomainError::Unauthorized.into());
        }

        self.deps.message_repository.delete(message_id).await?;
        self.emit(ChatEvent::MessageDeleted {
            chat_id: message.chat_id,
            message_id,
        })
        .await;
        Ok(())
    }
}

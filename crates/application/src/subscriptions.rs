//! 频道订阅
//!
//! 广播频道（`chat-updates`、`chat-updates:<id>`）对任何已认证
//! 身份开放；消息频道（`chat:<id>`）在订阅时检查一次成员资格，
//! 之后不再持续复查。

use std::sync::Arc;

use domain::{Channel, DomainError, Identity};

use crate::error::ApplicationError;
use crate::local_broadcast::{EventStream, LocalEventBroadcaster};
use crate::repository::ChatMemberRepository;

pub struct SubscriptionService {
    member_repository: Arc<dyn ChatMemberRepository>,
    broadcaster: Arc<LocalEventBroadcaster>,
}

impl SubscriptionService {
    pub fn new(
        member_repository: Arc<dyn ChatMemberRepository>,
        broadcaster: Arc<LocalEventBroadcaster>,
    ) -> Self {
        Self {
            member_repository,
            broadcaster,
        }
    }

    pub async fn subscribe(
        &self,
        identity: &Identity,
        channel: Channel,
    ) -> Result<EventStream, ApplicationError> {
        if let Channel::Chat(chat_id) = channel {
            let is_member = self
                .member_repository
                .is_member(chat_id, identity.user_id)
                .await?;
            if !is_member {
                return Err(DomainError::Unauthorized.into());
            }
        }
        Ok(self.broadcaster.subscribe_channel(channel))
    }
}

use async_trait::async_trait;
use domain::{Channel, ChatEvent};
use serde::Serialize;
use thiserror::Error;

/// 投递到单个频道的一条事件。
///
/// 同一个事件会按 `ChatEvent::channels()` 给出的顺序被扇出成
/// 多条 `EventBroadcast`，订阅者按频道过滤。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventBroadcast {
    pub channel: Channel,
    #[serde(flatten)]
    pub event: ChatEvent,
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 事件扇出调度器。
///
/// 发射发生在持久化提交之后；发射失败不会回滚持久化，调用方
/// 记录日志后忽略（fire and forget）。
#[async_trait]
pub trait EventBroadcaster: Send + Sync {
    async fn broadcast(&self, event: ChatEvent) -> Result<(), BroadcastError>;
}

// 单进程内的本地广播器实现
use async_trait::async_trait;
use domain::{Channel, ChatEvent};
use tokio::sync::broadcast;

use crate::broadcaster::{BroadcastError, EventBroadcast, EventBroadcaster};

const DEFAULT_CAPACITY: usize = 1000;

/// 基于 `tokio::sync::broadcast` 的扇出实现。
///
/// 所有频道共享一条广播队列，订阅端按频道过滤；离线的订阅者
/// 错过的事件不会重放。
#[derive(Clone)]
pub struct LocalEventBroadcaster {
    sender: broadcast::Sender<EventBroadcast>,
}

impl LocalEventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 订阅单个频道。成员资格检查在 `SubscriptionService` 完成，
    /// 这里只负责过滤投递。
    pub fn subscribe_channel(&self, channel: Channel) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
            channel,
        }
    }
}

impl Default for LocalEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBroadcaster for LocalEventBroadcaster {
    async fn broadcast(&self, event: ChatEvent) -> Result<(), BroadcastError> {
        for channel in event.channels() {
            // 没有活跃订阅者时 send 会报错，这不算投递失败
            let _ = self.sender.send(EventBroadcast {
                channel,
                event: event.clone(),
            });
        }
        Ok(())
    }
}

/// 过滤出单个频道事件的订阅流。
pub struct EventStream {
    receiver: broadcast::Receiver<EventBroadcast>,
    channel: Channel,
}

impl EventStream {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// 收取下一条属于本频道的事件；广播器关闭后返回 `None`。
    /// 订阅端落后太多时丢弃错过的事件继续收取（尽力而为投递）。
    pub async fn recv(&mut self) -> Option<EventBroadcast> {
        loop {
            match self.receiver.recv().await {
                Ok(broadcast) => {
                    if broadcast.channel == self.channel {
                        return Some(broadcast);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

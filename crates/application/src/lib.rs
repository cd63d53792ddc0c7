//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，处理输入校验、NotFound 先于
//! 授权的求值顺序、持久化提交之后的事件发射，以及对外部适配器
//! （仓储、时钟、广播）的抽象。

pub mod broadcaster;
pub mod clock;
pub mod error;
pub mod local_broadcast;
pub mod memory;
pub mod repository;
pub mod services;
pub mod subscriptions;

pub use broadcaster::{BroadcastError, EventBroadcast, EventBroadcaster};
pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use local_broadcast::{EventStream, LocalEventBroadcaster};
pub use memory::MemoryStore;
pub use repository::{ChatListFilter, ChatMemberRepository, ChatRepository, MessageRepository};
pub use services::{
    ChatService, ChatServiceDependencies, LeaveOutcome, MessageService, MessageServiceDependencies,
};
pub use subscriptions::SubscriptionService;

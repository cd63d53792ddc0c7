//! 群聊系统核心领域模型
//!
//! 包含聊天、成员、消息等核心实体，以及授权引擎、游标分页契约
//! 和事件模型。本层不做任何 I/O。

pub mod authorization;
pub mod chat;
pub mod errors;
pub mod events;
pub mod identity;
pub mod message;
pub mod pagination;
pub mod user;
pub mod value_objects;

pub use authorization::{authorize_chat, authorize_message, Capability};
pub use chat::{Chat, ChatMember, ChatWithMembers};
pub use errors::{DomainError, DomainResult, RepositoryError};
pub use events::{Channel, ChatEvent};
pub use identity::Identity;
pub use message::{ChatMessage, MessageWithAuthor};
pub use pagination::{paginate_by_id, CursorPage, CursorQuery, SortDirection, DEFAULT_PAGE_SIZE};
pub use user::User;
pub use value_objects::{ChatId, MessageId, Timestamp, UserId};

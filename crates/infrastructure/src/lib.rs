//! 基础设施层：PostgreSQL 仓储实现与连接池装配。

mod db;
mod repository;

pub use db::create_pg_pool;
pub use repository::{PgChatMemberRepository, PgChatRepository, PgMessageRepository};

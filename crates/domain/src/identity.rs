use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 每个请求的调用方身份。
///
/// 超级管理员标记由身份提供方注入（例如从 JWT claim 读取），
/// 授权引擎本身绝不推导该标记。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Identity {
    pub fn user(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: false,
        }
    }

    pub fn admin(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: true,
        }
    }
}

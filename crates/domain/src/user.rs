use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 用户实体。
///
/// 用户归身份提供方所有，这里只读：本核心不修改用户资料，
/// 只按 id 比较身份，并在事件载荷中原样携带。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

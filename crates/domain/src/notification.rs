//! 离线通知记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::value_objects::UserId;

/// 收件人离线时落库的通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineRecord {
    pub id: Uuid,
    pub recipient_id: UserId,
    /// 触发通知的用户
    pub actor_id: UserId,
    pub payload: JsonValue,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl OfflineRecord {
    pub fn new(recipient_id: UserId, actor_id: UserId, payload: JsonValue) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            actor_id,
            payload,
            is_read: false,
            created_at: Utc::now(),
        }
    }
}

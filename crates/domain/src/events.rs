//! 社交领域事件
//!
//! 每个事件要么是广播事件（受众由 `subject_owner_id` 的社交关系决定），
//! 要么是定向事件（显式收件人列表），二者互斥。

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::UserId;

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Like,
    Unlike,
    CommentCreated,
    CommentDeleted,
    Follow,
    Unfollow,
    Notification,
    /// 在线状态变化，仅由连接生命周期管理器产生
    PresenceChanged,
}

impl EventKind {
    /// 是否为定向事件
    pub fn is_addressed(&self) -> bool {
        matches!(self, EventKind::Notification | EventKind::PresenceChanged)
    }

    /// 收件人离线时是否需要落库
    ///
    /// 点赞、评论、关注只是界面信号，真实状态由 CRUD 层持久化，不做离线补偿；
    /// 在线状态通知本身是瞬时的。
    pub fn persists_offline(&self) -> bool {
        matches!(self, EventKind::Notification)
    }

    /// 只能由服务内部产生的事件
    pub fn is_internal(&self) -> bool {
        matches!(self, EventKind::PresenceChanged)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Like => "like",
            EventKind::Unlike => "unlike",
            EventKind::CommentCreated => "comment_created",
            EventKind::CommentDeleted => "comment_deleted",
            EventKind::Follow => "follow",
            EventKind::Unfollow => "unfollow",
            EventKind::Notification => "notification",
            EventKind::PresenceChanged => "presence_changed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 受众选择规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudienceRule {
    /// 帖子所有者的粉丝，加上所有者本人（多端回显）
    OwnerAndFollowers(UserId),
    /// 仅被关注的用户
    FollowTarget(UserId),
    /// 显式收件人，已去重，保持首次出现的顺序
    Addressed(Vec<UserId>),
}

/// 领域事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub kind: EventKind,
    pub actor_id: UserId,
    /// 帖子作者或被关注者；定向事件为空
    #[serde(default)]
    pub subject_owner_id: Option<UserId>,
    /// 定向事件的收件人；广播事件为空
    #[serde(default)]
    pub recipient_ids: Vec<UserId>,
    /// 对路由器不透明的负载
    #[serde(default)]
    pub payload: JsonValue,
}

impl DomainEvent {
    fn broadcast(kind: EventKind, actor_id: UserId, owner_id: UserId, payload: JsonValue) -> Self {
        Self {
            kind,
            actor_id,
            subject_owner_id: Some(owner_id),
            recipient_ids: Vec::new(),
            payload,
        }
    }

    pub fn like(actor_id: UserId, post_owner_id: UserId, payload: JsonValue) -> Self {
        Self::broadcast(EventKind::Like, actor_id, post_owner_id, payload)
    }

    pub fn unlike(actor_id: UserId, post_owner_id: UserId, payload: JsonValue) -> Self {
        Self::broadcast(EventKind::Unlike, actor_id, post_owner_id, payload)
    }

    pub fn comment_created(actor_id: UserId, post_owner_id: UserId, payload: JsonValue) -> Self {
        Self::broadcast(EventKind::CommentCreated, actor_id, post_owner_id, payload)
    }

    pub fn comment_deleted(actor_id: UserId, post_owner_id: UserId, payload: JsonValue) -> Self {
        Self::broadcast(EventKind::CommentDeleted, actor_id, post_owner_id, payload)
    }

    pub fn follow(actor_id: UserId, target_id: UserId, payload: JsonValue) -> Self {
        Self::broadcast(EventKind::Follow, actor_id, target_id, payload)
    }

    pub fn unfollow(actor_id: UserId, target_id: UserId, payload: JsonValue) -> Self {
        Self::broadcast(EventKind::Unfollow, actor_id, target_id, payload)
    }

    pub fn notification(
        actor_id: UserId,
        recipient_ids: impl IntoIterator<Item = UserId>,
        payload: JsonValue,
    ) -> Self {
        Self {
            kind: EventKind::Notification,
            actor_id,
            subject_owner_id: None,
            recipient_ids: recipient_ids.into_iter().collect(),
            payload,
        }
    }

    pub fn presence_changed(
        user_id: UserId,
        online: bool,
        recipient_ids: impl IntoIterator<Item = UserId>,
    ) -> Self {
        Self {
            kind: EventKind::PresenceChanged,
            actor_id: user_id,
            subject_owner_id: None,
            recipient_ids: recipient_ids.into_iter().collect(),
            payload: json!({ "user_id": user_id, "online": online }),
        }
    }

    /// 校验字段并给出受众规则
    pub fn audience(&self) -> DomainResult<AudienceRule> {
        let kind = self.kind;

        if kind.is_addressed() {
            if self.subject_owner_id.is_some() {
                return Err(DomainError::malformed_event(
                    kind.as_str(),
                    "addressed event must not carry subject_owner_id",
                ));
            }
            if self.recipient_ids.is_empty() {
                return Err(DomainError::malformed_event(
                    kind.as_str(),
                    "recipient_ids is required",
                ));
            }

            let mut seen = HashSet::with_capacity(self.recipient_ids.len());
            let recipients = self
                .recipient_ids
                .iter()
                .copied()
                .filter(|id| seen.insert(*id))
                .collect();
            return Ok(AudienceRule::Addressed(recipients));
        }

        if !self.recipient_ids.is_empty() {
            return Err(DomainError::malformed_event(
                kind.as_str(),
                "broadcast event must not carry recipient_ids",
            ));
        }
        let owner_id = self.subject_owner_id.ok_or_else(|| {
            DomainError::malformed_event(kind.as_str(), "subject_owner_id is required")
        })?;

        match kind {
            EventKind::Follow | EventKind::Unfollow => {
                if owner_id == self.actor_id {
                    return Err(DomainError::malformed_event(
                        kind.as_str(),
                        "a user cannot follow themselves",
                    ));
                }
                Ok(AudienceRule::FollowTarget(owner_id))
            }
            _ => Ok(AudienceRule::OwnerAndFollowers(owner_id)),
        }
    }

    /// 推送给客户端时使用的事件名
    pub fn client_event_name(&self) -> &'static str {
        match self.kind {
            EventKind::Like => "likeToClient",
            EventKind::Unlike => "unLikeToClient",
            EventKind::CommentCreated => "createCommentToClient",
            EventKind::CommentDeleted => "deleteCommentToClient",
            EventKind::Follow => "followToClient",
            EventKind::Unfollow => "unFollowToClient",
            EventKind::Notification => "createNotifyToClient",
            EventKind::PresenceChanged => {
                let online = self
                    .payload
                    .get("online")
                    .and_then(JsonValue::as_bool)
                    .unwrap_or(false);
                if online {
                    "userOnlineToClient"
                } else {
                    "userOfflineToClient"
                }
            }
        }
    }
}

/// 推送到单个连接的消息帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<UserId>,
    pub data: JsonValue,
}

impl OutboundMessage {
    pub fn new(event: impl Into<String>, data: JsonValue) -> Self {
        Self {
            event: event.into(),
            actor_id: None,
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("error", json!({ "message": message.into() }))
    }
}

impl From<&DomainEvent> for OutboundMessage {
    fn from(event: &DomainEvent) -> Self {
        Self {
            event: event.client_event_name().to_string(),
            actor_id: Some(event.actor_id),
            data: event.payload.clone(),
        }
    }
}

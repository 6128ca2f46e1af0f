//! 客户端 WebSocket 帧：`{"event": <name>, "data": {...}}`

use domain::{DomainEvent, UserId};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid frame: {0}")]
    InvalidFrame(#[source] serde_json::Error),
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("invalid data for {event}: {source}")]
    InvalidData {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("createNotify requires at least one recipient")]
    MissingRecipient,
}

#[derive(Debug, Deserialize)]
struct ClientFrame {
    event: String,
    #[serde(default)]
    data: JsonValue,
}

#[derive(Debug, Deserialize)]
struct PostData {
    owner_id: UserId,
    #[serde(default)]
    post: JsonValue,
}

#[derive(Debug, Deserialize)]
struct FollowData {
    target_id: UserId,
}

#[derive(Debug, Deserialize)]
struct NotifyData {
    #[serde(default)]
    recipient_ids: Vec<UserId>,
    #[serde(default)]
    recipient_id: Option<UserId>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CheckOnlineData {
    #[serde(default)]
    ids: Option<Vec<UserId>>,
}

/// 帖子相关的四种广播事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    Like,
    Unlike,
    CommentCreated,
    CommentDeleted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Post {
        action: PostAction,
        owner_id: UserId,
        post: JsonValue,
    },
    Follow {
        target_id: UserId,
    },
    Unfollow {
        target_id: UserId,
    },
    Notify {
        recipient_ids: Vec<UserId>,
        text: Option<String>,
        url: Option<String>,
    },
    /// `ids` 为空时查询自己的关注列表
    CheckOnline {
        ids: Option<Vec<UserId>>,
    },
}

fn data<T: DeserializeOwned>(event: &str, value: JsonValue) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidData {
        event: event.to_string(),
        source,
    })
}

impl ClientCommand {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let frame: ClientFrame = serde_json::from_str(text).map_err(ProtocolError::InvalidFrame)?;
        let event = frame.event.as_str();

        let action = match event {
            "likePost" => Some(PostAction::Like),
            "unLikePost" => Some(PostAction::Unlike),
            "createComment" => Some(PostAction::CommentCreated),
            "deleteComment" => Some(PostAction::CommentDeleted),
            _ => None,
        };
        if let Some(action) = action {
            let PostData { owner_id, post } = data(event, frame.data)?;
            return Ok(ClientCommand::Post {
                action,
                owner_id,
                post,
            });
        }

        match event {
            "follow" => {
                let FollowData { target_id } = data(event, frame.data)?;
                Ok(ClientCommand::Follow { target_id })
            }
            "unfollow" => {
                let FollowData { target_id } = data(event, frame.data)?;
                Ok(ClientCommand::Unfollow { target_id })
            }
            "createNotify" => {
                let notify: NotifyData = data(event, frame.data)?;
                let mut recipient_ids = notify.recipient_ids;
                recipient_ids.extend(notify.recipient_id);
                if recipient_ids.is_empty() {
                    return Err(ProtocolError::MissingRecipient);
                }
                Ok(ClientCommand::Notify {
                    recipient_ids,
                    text: notify.text,
                    url: notify.url,
                })
            }
            "checkUserOnline" => {
                let check: CheckOnlineData = if frame.data.is_null() {
                    CheckOnlineData::default()
                } else {
                    data(event, frame.data)?
                };
                Ok(ClientCommand::CheckOnline { ids: check.ids })
            }
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    /// 转换为以 `actor_id` 为发起者的领域事件；查询类命令返回 `None`
    pub fn into_event(self, actor_id: UserId) -> Option<DomainEvent> {
        match self {
            ClientCommand::Post {
                action,
                owner_id,
                post,
            } => {
                let payload = json!({ "owner_id": owner_id, "post": post });
                let event = match action {
                    PostAction::Like => DomainEvent::like(actor_id, owner_id, payload),
                    PostAction::Unlike => DomainEvent::unlike(actor_id, owner_id, payload),
                    PostAction::CommentCreated => {
                        DomainEvent::comment_created(actor_id, owner_id, payload)
                    }
                    PostAction::CommentDeleted => {
                        DomainEvent::comment_deleted(actor_id, owner_id, payload)
                    }
                };
                Some(event)
            }
            ClientCommand::Follow { target_id } => Some(DomainEvent::follow(
                actor_id,
                target_id,
                json!({ "target_id": target_id }),
            )),
            ClientCommand::Unfollow { target_id } => Some(DomainEvent::unfollow(
                actor_id,
                target_id,
                json!({ "target_id": target_id }),
            )),
            ClientCommand::Notify {
                recipient_ids,
                text,
                url,
            } => Some(DomainEvent::notification(
                actor_id,
                recipient_ids,
                json!({ "text": text, "url": url }),
            )),
            ClientCommand::CheckOnline { .. } => None,
        }
    }
}

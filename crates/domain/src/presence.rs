//! 在线会话相关的领域实体

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{ConnectionId, UserId};

/// 用户的社交关系快照（关注 / 粉丝）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialEdges {
    pub following_ids: HashSet<UserId>,
    pub follower_ids: HashSet<UserId>,
}

impl SocialEdges {
    pub fn new(
        following_ids: impl IntoIterator<Item = UserId>,
        follower_ids: impl IntoIterator<Item = UserId>,
    ) -> Self {
        Self {
            following_ids: following_ids.into_iter().collect(),
            follower_ids: follower_ids.into_iter().collect(),
        }
    }
}

/// 一个在线会话
///
/// 同一 (user_id, connection_id) 最多一条；同一用户可以有多条（多端登录）。
/// 社交关系在加入时快照，刷新时整体替换，不做局部修改。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    pub following_ids: HashSet<UserId>,
    pub follower_ids: HashSet<UserId>,
    pub joined_at: DateTime<Utc>,
}

impl PresenceEntry {
    pub fn new(user_id: UserId, connection_id: ConnectionId, edges: SocialEdges) -> Self {
        Self {
            user_id,
            connection_id,
            following_ids: edges.following_ids,
            follower_ids: edges.follower_ids,
            joined_at: Utc::now(),
        }
    }
}

/// 单个连接的生命周期：Connecting -> Joined -> Left（终态）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionPhase {
    /// 已建立传输连接，尚未完成注册
    Connecting,
    /// 已注册到在线状态表
    Joined,
    /// 已断开，终态
    Left,
}

impl ConnectionPhase {
    /// 进入 Joined。重复 join 视为刷新快照，允许。
    pub fn join(self) -> DomainResult<Self> {
        match self {
            ConnectionPhase::Connecting | ConnectionPhase::Joined => Ok(ConnectionPhase::Joined),
            ConnectionPhase::Left => Err(DomainError::InvalidTransition {
                from: self,
                to: ConnectionPhase::Joined,
            }),
        }
    }

    /// 进入 Left。任何状态都可以离开，离开是幂等的。
    pub fn leave(self) -> Self {
        ConnectionPhase::Left
    }

    pub fn is_joined(&self) -> bool {
        matches!(self, ConnectionPhase::Joined)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionPhase::Left)
    }
}

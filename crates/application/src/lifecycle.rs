//! 连接生命周期：加入、刷新、离开，以及上下线通知

use std::collections::HashSet;
use std::sync::Arc;

use domain::{ConnectionId, DomainEvent, SocialGraphRepository, UserId};
use tokio::sync::Mutex;

use crate::error::ApplicationError;
use crate::identity::{Credentials, IdentityResolver};
use crate::registry::{Departure, PresenceRegistry};
use crate::router::FanoutRouter;

/// 成功加入后的会话信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinedSession {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    pub first_session: bool,
}

pub struct LifecycleDependencies {
    pub registry: Arc<PresenceRegistry>,
    pub router: Arc<FanoutRouter>,
    pub identity: Arc<dyn IdentityResolver>,
    pub social_graph: Arc<dyn SocialGraphRepository>,
    /// 首个会话上线时通知在线粉丝
    pub announce_online: bool,
}

/// 上下线通知按用户散列到固定数量的锁上串行发送
const NOTICE_STRIPES: usize = 64;

pub struct ConnectionLifecycleManager {
    deps: LifecycleDependencies,
    notice_stripes: Vec<Mutex<()>>,
}

impl ConnectionLifecycleManager {
    pub fn new(deps: LifecycleDependencies) -> Self {
        Self {
            deps,
            notice_stripes: (0..NOTICE_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// 认证并注册连接
    ///
    /// 身份解析或关系快照获取失败时返回错误，连接不会进入注册表。
    pub async fn on_join(
        &self,
        connection_id: ConnectionId,
        credentials: &Credentials,
    ) -> Result<JoinedSession, ApplicationError> {
        let user_id = self.deps.identity.resolve(credentials).await?;
        let edges = self.deps.social_graph.fetch_edges(user_id).await?;
        let follower_ids = edges.follower_ids.clone();

        let outcome = self.deps.registry.join(user_id, connection_id, edges);
        tracing::info!(
            user_id = %user_id,
            connection_id = %connection_id,
            first_session = outcome.first_session,
            "用户连接已加入"
        );

        if outcome.first_session && self.deps.announce_online {
            self.notify_followers(user_id, &follower_ids, true).await;
        }

        Ok(JoinedSession {
            user_id,
            connection_id,
            first_session: outcome.first_session,
        })
    }

    /// 重新获取关系快照并整体替换
    pub async fn refresh(&self, connection_id: ConnectionId) -> Result<bool, ApplicationError> {
        let Some(user_id) = self.deps.registry.user_of(connection_id) else {
            return Ok(false);
        };

        let edges = self.deps.social_graph.fetch_edges(user_id).await?;
        // 获取期间连接可能已经断开，此时不再写回
        if !self
            .deps
            .registry
            .replace_snapshot(user_id, connection_id, edges)
        {
            return Ok(false);
        }

        tracing::debug!(user_id = %user_id, connection_id = %connection_id, "关系快照已刷新");
        Ok(true)
    }

    /// 刷新用户全部在线会话的快照，返回刷新的连接数
    pub async fn refresh_user(&self, user_id: UserId) -> Result<usize, ApplicationError> {
        let mut refreshed = 0;
        for connection_id in self.deps.registry.live_connections(user_id) {
            if self.refresh(connection_id).await? {
                refreshed += 1;
            }
        }
        Ok(refreshed)
    }

    /// 注销连接；用户最后一个会话离开时通知在线粉丝
    pub async fn on_leave(&self, connection_id: ConnectionId) -> Option<Departure> {
        let Some(departure) = self.deps.registry.leave(connection_id) else {
            tracing::debug!(connection_id = %connection_id, "断开未知连接，忽略");
            return None;
        };

        let user_id = departure.entry.user_id;
        tracing::info!(
            user_id = %user_id,
            connection_id = %connection_id,
            last_session = departure.last_session,
            "用户连接已离开"
        );

        if departure.last_session && self.deps.registry.live_connections(user_id).is_empty() {
            self.notify_followers(user_id, &departure.entry.follower_ids, false)
                .await;
        }

        Some(departure)
    }

    /// 向在线粉丝发送上下线通知，不落库
    ///
    /// 同一用户的通知串行发送；拿到锁时用户状态已经翻转的通知直接丢弃。
    async fn notify_followers(&self, user_id: UserId, follower_ids: &HashSet<UserId>, online: bool) {
        let _guard = self.notice_stripe(user_id).lock().await;
        if self.deps.registry.is_online(user_id) != online {
            tracing::debug!(user_id = %user_id, online, "在线状态已变化，丢弃过期的上下线通知");
            return;
        }

        let mut candidates: HashSet<UserId> = follower_ids.clone();
        candidates.extend(self.deps.registry.watchers_of(user_id));
        candidates.remove(&user_id);

        let recipients = self.deps.registry.online_subset_of(candidates);
        if recipients.is_empty() {
            return;
        }

        let event = DomainEvent::presence_changed(user_id, online, recipients);
        if let Err(err) = self.deps.router.dispatch(event).await {
            tracing::warn!(error = %err, user_id = %user_id, online, "上下线通知发送失败");
        }
    }

    fn notice_stripe(&self, user_id: UserId) -> &Mutex<()> {
        let index = (user_id.0.as_u128() % self.notice_stripes.len() as u128) as usize;
        &self.notice_stripes[index]
    }
}

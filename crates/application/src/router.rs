//! 实时分发路由
//!
//! 根据事件类型计算受众，在注册表中查找在线连接并逐个投递；
//! 离线的定向通知交给离线补偿。单个目标的失败只记录日志，不影响其他目标。

use std::collections::HashSet;
use std::sync::Arc;

use domain::{AudienceRule, ConnectionId, DomainEvent, OutboundMessage, UserId};
use futures_util::future::join_all;
use serde::Serialize;

use crate::connection_hub::ConnectionSink;
use crate::error::ApplicationError;
use crate::fallback::OfflineFallbackSink;
use crate::registry::PresenceRegistry;

/// 一次分发的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// 去重后的受众人数
    pub recipients: usize,
    /// 成功写入的连接数
    pub delivered: usize,
    /// 写入失败的连接数
    pub failed: usize,
    /// 离线补偿成功数
    pub persisted: usize,
    /// 离线补偿失败数
    pub persist_failed: usize,
    /// 离线且无需补偿的受众
    pub skipped_offline: usize,
}

pub struct FanoutRouter {
    registry: Arc<PresenceRegistry>,
    sink: Arc<dyn ConnectionSink>,
    fallback: Arc<OfflineFallbackSink>,
}

impl FanoutRouter {
    pub fn new(
        registry: Arc<PresenceRegistry>,
        sink: Arc<dyn ConnectionSink>,
        fallback: Arc<OfflineFallbackSink>,
    ) -> Self {
        Self {
            registry,
            sink,
            fallback,
        }
    }

    /// 分发事件
    ///
    /// 只有事件本身不合法时返回错误；部分投递失败体现在 `DispatchReport` 中。
    pub async fn dispatch(&self, event: DomainEvent) -> Result<DispatchReport, ApplicationError> {
        let rule = event.audience()?;
        let audience = self.resolve_audience(&rule);
        let message = OutboundMessage::from(&event);

        let mut report = DispatchReport {
            recipients: audience.len(),
            ..DispatchReport::default()
        };

        // 注册表只做快照复制，实际写入在锁外进行
        let mut targets: Vec<(UserId, ConnectionId)> = Vec::new();
        let mut offline: Vec<UserId> = Vec::new();
        for user_id in audience {
            let connections = self.registry.live_connections(user_id);
            if connections.is_empty() {
                offline.push(user_id);
            } else {
                targets.extend(connections.into_iter().map(|conn| (user_id, conn)));
            }
        }

        let deliveries = targets.into_iter().map(|(user_id, connection_id)| {
            let message = message.clone();
            async move {
                let result = self.sink.deliver(connection_id, message).await;
                (user_id, connection_id, result)
            }
        });

        for (user_id, connection_id, result) in join_all(deliveries).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        error = %err,
                        user_id = %user_id,
                        connection_id = %connection_id,
                        kind = %event.kind,
                        "投递到连接失败"
                    );
                }
            }
        }

        for recipient_id in offline {
            if !event.kind.persists_offline() {
                report.skipped_offline += 1;
                continue;
            }

            match self.fallback.persist(recipient_id, &event).await {
                Ok(()) => report.persisted += 1,
                Err(err) => {
                    report.persist_failed += 1;
                    tracing::warn!(
                        error = %err,
                        recipient_id = %recipient_id,
                        actor_id = %event.actor_id,
                        "离线通知保存失败"
                    );
                }
            }
        }

        tracing::debug!(
            kind = %event.kind,
            actor_id = %event.actor_id,
            recipients = report.recipients,
            delivered = report.delivered,
            failed = report.failed,
            persisted = report.persisted,
            "事件分发完成"
        );

        Ok(report)
    }

    /// 计算去重后的受众
    fn resolve_audience(&self, rule: &AudienceRule) -> Vec<UserId> {
        match rule {
            AudienceRule::Addressed(recipients) => recipients.clone(),
            AudienceRule::FollowTarget(target) => vec![*target],
            AudienceRule::OwnerAndFollowers(owner) => {
                let mut audience = HashSet::new();
                audience.insert(*owner);
                if let Some(edges) = self.registry.edges_of(*owner) {
                    audience.extend(edges.follower_ids);
                }
                audience.extend(self.registry.watchers_of(*owner));
                audience.into_iter().collect()
            }
        }
    }
}

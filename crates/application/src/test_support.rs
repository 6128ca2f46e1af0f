//! 单元测试共用的替身实现

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use domain::{ConnectionId, OutboundMessage, UserId};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::connection_hub::{ConnectionSink, DeliveryError};
use crate::error::ApplicationError;
use crate::identity::{Credentials, IdentityResolver};

pub fn user() -> UserId {
    UserId::from(Uuid::new_v4())
}

/// 记录所有写入的连接出站通道，可指定某些连接写入失败
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<(ConnectionId, OutboundMessage)>>,
    failing: Mutex<HashSet<ConnectionId>>,
}

impl RecordingSink {
    pub fn fail_on(&self, connection_id: ConnectionId) {
        self.failing.lock().insert(connection_id);
    }

    pub fn delivered(&self) -> Vec<(ConnectionId, OutboundMessage)> {
        self.delivered.lock().clone()
    }

    pub fn count_for(&self, connection_id: ConnectionId) -> usize {
        self.delivered
            .lock()
            .iter()
            .filter(|(conn, _)| *conn == connection_id)
            .count()
    }

    pub fn events_for(&self, connection_id: ConnectionId) -> Vec<String> {
        self.delivered
            .lock()
            .iter()
            .filter(|(conn, _)| *conn == connection_id)
            .map(|(_, message)| message.event.clone())
            .collect()
    }
}

#[async_trait]
impl ConnectionSink for RecordingSink {
    async fn deliver(
        &self,
        connection_id: ConnectionId,
        message: OutboundMessage,
    ) -> Result<(), DeliveryError> {
        if self.failing.lock().contains(&connection_id) {
            return Err(DeliveryError::ConnectionGone(connection_id));
        }
        self.delivered.lock().push((connection_id, message));
        Ok(())
    }
}

/// 按令牌查表的身份解析
#[derive(Default)]
pub struct StaticIdentity {
    tokens: Mutex<HashMap<String, UserId>>,
}

impl StaticIdentity {
    pub fn issue(&self, user_id: UserId) -> Credentials {
        let token = format!("token-{user_id}");
        self.tokens.lock().insert(token.clone(), user_id);
        Credentials::new(token)
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentity {
    async fn resolve(&self, credentials: &Credentials) -> Result<UserId, ApplicationError> {
        self.tokens
            .lock()
            .get(&credentials.token)
            .copied()
            .ok_or_else(|| ApplicationError::authentication("unknown token"))
    }
}

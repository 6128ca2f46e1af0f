//! 连接出站通道
//!
//! 路由器只通过 `ConnectionSink` 写入连接；本地实现为每个连接维护一个有界队列，
//! 由连接自己的发送任务消费，保证单个连接内的投递顺序。

use async_trait::async_trait;
use dashmap::DashMap;
use domain::{ConnectionId, OutboundMessage};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

/// 单个连接的瞬时投递失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("connection {0} is gone")]
    ConnectionGone(ConnectionId),
    #[error("outbound buffer of connection {0} is full")]
    BufferFull(ConnectionId),
}

#[async_trait]
pub trait ConnectionSink: Send + Sync {
    async fn deliver(
        &self,
        connection_id: ConnectionId,
        message: OutboundMessage,
    ) -> Result<(), DeliveryError>;
}

/// 进程内连接发送器表
pub struct LocalConnectionHub {
    senders: DashMap<ConnectionId, mpsc::Sender<OutboundMessage>>,
    buffer: usize,
}

impl LocalConnectionHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            senders: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// 注册连接，返回该连接的出站接收端
    pub fn register(&self, connection_id: ConnectionId) -> mpsc::Receiver<OutboundMessage> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.senders.insert(connection_id, tx);
        rx
    }

    pub fn unregister(&self, connection_id: ConnectionId) -> bool {
        self.senders.remove(&connection_id).is_some()
    }

    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }
}

#[async_trait]
impl ConnectionSink for LocalConnectionHub {
    async fn deliver(
        &self,
        connection_id: ConnectionId,
        message: OutboundMessage,
    ) -> Result<(), DeliveryError> {
        // 复制发送端后立即释放分片锁
        let sender = self
            .senders
            .get(&connection_id)
            .map(|sender| sender.clone())
            .ok_or(DeliveryError::ConnectionGone(connection_id))?;

        sender.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::BufferFull(connection_id),
            TrySendError::Closed(_) => {
                self.senders.remove(&connection_id);
                DeliveryError::ConnectionGone(connection_id)
            }
        })
    }
}

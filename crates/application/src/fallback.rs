use std::sync::Arc;

use domain::{DomainEvent, NotificationStore, OfflineRecord, RepositoryError, UserId};

/// 离线补偿：收件人没有在线连接时，把通知写入外部通知存储
pub struct OfflineFallbackSink {
    store: Arc<dyn NotificationStore>,
}

impl OfflineFallbackSink {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    pub async fn persist(
        &self,
        recipient_id: UserId,
        event: &DomainEvent,
    ) -> Result<(), RepositoryError> {
        let record = OfflineRecord::new(recipient_id, event.actor_id, event.payload.clone());
        let record_id = record.id;
        self.store.persist(record).await?;

        tracing::debug!(
            recipient_id = %recipient_id,
            record_id = %record_id,
            "离线通知已保存"
        );
        Ok(())
    }
}

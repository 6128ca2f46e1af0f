use std::sync::Arc;

use domain::{NotificationStore, OfflineRecord, UserId};

use crate::error::ApplicationError;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

/// 离线通知收件箱，供用户重新上线后拉取
pub struct NotificationInbox {
    store: Arc<dyn NotificationStore>,
}

impl NotificationInbox {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// 最新的通知在前
    pub async fn list(
        &self,
        recipient_id: UserId,
        limit: Option<u32>,
    ) -> Result<Vec<OfflineRecord>, ApplicationError> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        Ok(self.store.list_for(recipient_id, limit).await?)
    }

    pub async fn mark_all_read(&self, recipient_id: UserId) -> Result<u64, ApplicationError> {
        let updated = self.store.mark_all_read(recipient_id).await?;
        tracing::debug!(recipient_id = %recipient_id, updated, "通知已标记为已读");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::user;
    use domain::{MockNotificationStore, RepositoryError};
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_list_clamps_limit() {
        let recipient = user();
        let mut store = MockNotificationStore::new();
        store
            .expect_list_for()
            .with(eq(recipient), eq(MAX_LIMIT))
            .times(1)
            .returning(|_, _| Ok(Vec::new()));
        store
            .expect_list_for()
            .with(eq(recipient), eq(DEFAULT_LIMIT))
            .times(1)
            .returning(|_, _| Ok(Vec::new()));

        let inbox = NotificationInbox::new(Arc::new(store));
        inbox.list(recipient, Some(10_000)).await.unwrap();
        inbox.list(recipient, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_mark_all_read_propagates_storage_error() {
        let mut store = MockNotificationStore::new();
        store
            .expect_mark_all_read()
            .returning(|_| Err(RepositoryError::storage("down")));

        let inbox = NotificationInbox::new(Arc::new(store));
        let err = inbox.mark_all_read(user()).await.unwrap_err();
        assert!(matches!(err, ApplicationError::Repository(_)));
    }
}

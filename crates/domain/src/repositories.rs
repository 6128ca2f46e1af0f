//! 外部协作方接口
//!
//! 社交关系与通知的持久化都由 CRUD 层拥有，这里只定义实时分发所需的最小接口。

use async_trait::async_trait;

use crate::errors::RepositoryResult;
use crate::notification::OfflineRecord;
use crate::presence::SocialEdges;
use crate::value_objects::UserId;

/// 社交关系快照查询
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SocialGraphRepository: Send + Sync {
    /// 获取用户当前的关注 / 粉丝列表
    async fn fetch_edges(&self, user_id: UserId) -> RepositoryResult<SocialEdges>;
}

/// 离线通知存储
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn persist(&self, record: OfflineRecord) -> RepositoryResult<()>;

    /// 按时间倒序列出收件人的通知
    async fn list_for(&self, recipient_id: UserId, limit: u32)
        -> RepositoryResult<Vec<OfflineRecord>>;

    /// 标记全部已读，返回受影响条数
    async fn mark_all_read(&self, recipient_id: UserId) -> RepositoryResult<u64>;
}

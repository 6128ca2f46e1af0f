//! 进程内存储实现，未配置数据库时使用，也供测试使用

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use dashmap::DashMap;
use domain::{
    NotificationStore, OfflineRecord, RepositoryResult, SocialEdges, SocialGraphRepository,
    UserId,
};
use parking_lot::RwLock;

/// 内存关注关系表
#[derive(Default)]
pub struct InMemorySocialGraph {
    // follower -> followees
    following: RwLock<HashMap<UserId, HashSet<UserId>>>,
}

impl InMemorySocialGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 自己关注自己会被忽略
    pub fn follow(&self, follower_id: UserId, followee_id: UserId) -> bool {
        if follower_id == followee_id {
            return false;
        }
        self.following
            .write()
            .entry(follower_id)
            .or_default()
            .insert(followee_id)
    }

    pub fn unfollow(&self, follower_id: UserId, followee_id: UserId) -> bool {
        let mut following = self.following.write();
        let Some(followees) = following.get_mut(&follower_id) else {
            return false;
        };
        let removed = followees.remove(&followee_id);
        if followees.is_empty() {
            following.remove(&follower_id);
        }
        removed
    }
}

#[async_trait]
impl SocialGraphRepository for InMemorySocialGraph {
    async fn fetch_edges(&self, user_id: UserId) -> RepositoryResult<SocialEdges> {
        let following = self.following.read();

        let following_ids = following.get(&user_id).cloned().unwrap_or_default();
        let follower_ids = following
            .iter()
            .filter(|(_, followees)| followees.contains(&user_id))
            .map(|(follower, _)| *follower)
            .collect();

        Ok(SocialEdges {
            following_ids,
            follower_ids,
        })
    }
}

#[derive(Default)]
pub struct InMemoryNotificationStore {
    records: DashMap<UserId, Vec<OfflineRecord>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_for(&self, recipient_id: UserId) -> usize {
        self.records
            .get(&recipient_id)
            .map(|records| records.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn persist(&self, record: OfflineRecord) -> RepositoryResult<()> {
        self.records
            .entry(record.recipient_id)
            .or_default()
            .push(record);
        Ok(())
    }

    async fn list_for(&self, recipient_id: UserId, limit: u32) -> RepositoryResult<Vec<OfflineRecord>> {
        let Some(records) = self.records.get(&recipient_id) else {
            return Ok(Vec::new());
        };

        let mut newest_first: Vec<OfflineRecord> = records.iter().rev().cloned().collect();
        newest_first.truncate(limit as usize);
        Ok(newest_first)
    }

    async fn mark_all_read(&self, recipient_id: UserId) -> RepositoryResult<u64> {
        let Some(mut records) = self.records.get_mut(&recipient_id) else {
            return Ok(0);
        };

        let mut updated = 0;
        for record in records.iter_mut().filter(|record| !record.is_read) {
            record.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }
}

use std::collections::HashSet;
use std::sync::Arc;

use domain::UserId;

use crate::registry::PresenceRegistry;

/// “我关注的 / 关注我的人里谁在线”
pub struct PresenceQueryService {
    registry: Arc<PresenceRegistry>,
}

impl PresenceQueryService {
    pub fn new(registry: Arc<PresenceRegistry>) -> Self {
        Self { registry }
    }

    pub fn online_subset_of(&self, ids: impl IntoIterator<Item = UserId>) -> HashSet<UserId> {
        self.registry.online_subset_of(ids)
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.registry.is_online(user_id)
    }

    /// 按在线快照中的关注列表过滤；调用方离线时为空
    pub fn online_following(&self, user_id: UserId) -> HashSet<UserId> {
        match self.registry.edges_of(user_id) {
            Some(edges) => self.registry.online_subset_of(edges.following_ids),
            None => HashSet::new(),
        }
    }

    pub fn online_followers(&self, user_id: UserId) -> HashSet<UserId> {
        match self.registry.edges_of(user_id) {
            Some(edges) => self.registry.online_subset_of(edges.follower_ids),
            None => HashSet::new(),
        }
    }
}

//! 进程内在线状态注册表
//!
//! - `sessions`：用户 → 该用户全部在线会话（按用户分片加锁，不同用户互不竞争）
//! - `connections`：连接 → 用户的反向索引，断开时 O(1) 清理
//! - `watchers`：被关注者 → 在线关注者及其连接数，由加入时的快照推导
//!
//! `snapshot_gate` 只在 `online_subset_of` 时以写锁独占，
//! 其余变更以共享读锁进入，使批量查询看到同一时刻的状态。

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use domain::{ConnectionId, PresenceEntry, SocialEdges, UserId};
use parking_lot::RwLock;

/// `join` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// 用户此前没有任何在线会话
    pub first_session: bool,
    /// 同一连接重复加入，快照被整体替换
    pub replaced: bool,
}

/// `leave` 移除的会话
#[derive(Debug, Clone)]
pub struct Departure {
    pub entry: PresenceEntry,
    /// 移除后该用户已没有在线会话
    pub last_session: bool,
}

#[derive(Default)]
pub struct PresenceRegistry {
    sessions: DashMap<UserId, HashMap<ConnectionId, PresenceEntry>>,
    connections: DashMap<ConnectionId, UserId>,
    watchers: DashMap<UserId, HashMap<UserId, usize>>,
    snapshot_gate: RwLock<()>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册会话；同一 (user, connection) 再次加入时替换快照
    pub fn join(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
        edges: SocialEdges,
    ) -> JoinOutcome {
        let entry = PresenceEntry::new(user_id, connection_id, edges);
        let following: Vec<UserId> = entry.following_ids.iter().copied().collect();

        let _gate = self.snapshot_gate.read();

        // 观察者索引在会话分片锁内更新，避免与并发的刷新或离开交错
        let (replaced, first_session) = {
            let mut sessions = self.sessions.entry(user_id).or_default();
            let first_session = sessions.is_empty();
            let previous = sessions.insert(connection_id, entry);
            if let Some(previous) = &previous {
                self.unwatch(previous);
            }
            self.watch(user_id, &following);
            (previous.is_some(), first_session)
        };

        if let Some(previous_owner) = self.connections.insert(connection_id, user_id) {
            if previous_owner != user_id {
                // 连接标识被重新分配给另一个用户
                if let Some((stale, _)) = self.remove_session(previous_owner, connection_id) {
                    self.unwatch(&stale);
                }
            }
        }

        JoinOutcome {
            first_session,
            replaced,
        }
    }

    /// 替换仍在线会话的关系快照
    ///
    /// 会话已经离开时返回 `false`，不会重新插入。
    pub fn replace_snapshot(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
        edges: SocialEdges,
    ) -> bool {
        let entry = PresenceEntry::new(user_id, connection_id, edges);
        let following: Vec<UserId> = entry.following_ids.iter().copied().collect();

        let _gate = self.snapshot_gate.read();

        let Some(mut sessions) = self.sessions.get_mut(&user_id) else {
            return false;
        };
        let Some(current) = sessions.get_mut(&connection_id) else {
            return false;
        };

        let previous = std::mem::replace(current, entry);
        self.unwatch(&previous);
        self.watch(user_id, &following);
        true
    }

    /// 按连接移除会话；未知连接直接返回 `None`
    pub fn leave(&self, connection_id: ConnectionId) -> Option<Departure> {
        let _gate = self.snapshot_gate.read();

        let (_, user_id) = self.connections.remove(&connection_id)?;
        let (entry, last_session) = self.remove_session(user_id, connection_id)?;
        self.unwatch(&entry);

        Some(Departure {
            entry,
            last_session,
        })
    }

    pub fn live_connections(&self, user_id: UserId) -> HashSet<ConnectionId> {
        self.sessions
            .get(&user_id)
            .map(|sessions| sessions.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.sessions
            .get(&user_id)
            .map(|sessions| !sessions.is_empty())
            .unwrap_or(false)
    }

    /// 连接当前归属的用户
    pub fn user_of(&self, connection_id: ConnectionId) -> Option<UserId> {
        self.connections.get(&connection_id).map(|user| *user)
    }

    pub fn entries(&self, user_id: UserId) -> Vec<PresenceEntry> {
        self.sessions
            .get(&user_id)
            .map(|sessions| sessions.values().cloned().collect())
            .unwrap_or_default()
    }

    /// 用户所有在线会话快照的并集；离线时为 `None`
    pub fn edges_of(&self, user_id: UserId) -> Option<SocialEdges> {
        let sessions = self.sessions.get(&user_id)?;
        if sessions.is_empty() {
            return None;
        }

        let mut edges = SocialEdges::default();
        for entry in sessions.values() {
            edges.following_ids.extend(entry.following_ids.iter().copied());
            edges.follower_ids.extend(entry.follower_ids.iter().copied());
        }
        Some(edges)
    }

    /// 在线且在加入快照中关注了 `user_id` 的用户
    pub fn watchers_of(&self, user_id: UserId) -> Vec<UserId> {
        self.watchers
            .get(&user_id)
            .map(|watchers| watchers.keys().copied().collect())
            .unwrap_or_default()
    }

    /// 同一时刻下，输入集合中在线的用户
    pub fn online_subset_of(&self, ids: impl IntoIterator<Item = UserId>) -> HashSet<UserId> {
        let _gate = self.snapshot_gate.write();
        ids.into_iter().filter(|id| self.is_online(*id)).collect()
    }

    pub fn online_user_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn remove_session(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Option<(PresenceEntry, bool)> {
        let mut removed = None;
        let mut last_session = false;

        // 移除与判空在同一个分片锁内完成，并发断开时只有一方看到最后一个会话
        self.sessions.remove_if_mut(&user_id, |_, sessions| {
            removed = sessions.remove(&connection_id);
            last_session = sessions.is_empty();
            last_session
        });

        removed.map(|entry| (entry, last_session))
    }

    fn watch(&self, user_id: UserId, following: &[UserId]) {
        for followed in following {
            *self
                .watchers
                .entry(*followed)
                .or_default()
                .entry(user_id)
                .or_insert(0) += 1;
        }
    }

    fn unwatch(&self, entry: &PresenceEntry) {
        for followed in &entry.following_ids {
            self.watchers.remove_if_mut(followed, |_, watchers| {
                if let Some(count) = watchers.get_mut(&entry.user_id) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        watchers.remove(&entry.user_id);
                    }
                }
                watchers.is_empty()
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user() -> UserId {
        UserId::from(Uuid::new_v4())
    }

    fn following(ids: &[UserId]) -> SocialEdges {
        SocialEdges::new(ids.iter().copied(), [])
    }

    #[test]
    fn test_join_and_leave_single_session() {
        let registry = PresenceRegistry::new();
        let alice = user();
        let conn = ConnectionId::generate();

        let outcome = registry.join(alice, conn, SocialEdges::default());
        assert!(outcome.first_session);
        assert!(!outcome.replaced);
        assert!(registry.is_online(alice));
        assert_eq!(registry.live_connections(alice), HashSet::from([conn]));
        assert_eq!(registry.user_of(conn), Some(alice));

        let departure = registry.leave(conn).expect("departure");
        assert!(departure.last_session);
        assert_eq!(departure.entry.user_id, alice);
        assert!(!registry.is_online(alice));
        assert!(registry.live_connections(alice).is_empty());
        assert_eq!(registry.online_user_count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_leave_unknown_connection_is_noop() {
        let registry = PresenceRegistry::new();
        assert!(registry.leave(ConnectionId::generate()).is_none());

        let alice = user();
        let conn = ConnectionId::generate();
        registry.join(alice, conn, SocialEdges::default());
        assert!(registry.leave(conn).is_some());
        // 重复断开
        assert!(registry.leave(conn).is_none());
    }

    #[test]
    fn test_multi_device_presence() {
        let registry = PresenceRegistry::new();
        let alice = user();
        let phone = ConnectionId::generate();
        let laptop = ConnectionId::generate();

        assert!(registry.join(alice, phone, SocialEdges::default()).first_session);
        assert!(!registry.join(alice, laptop, SocialEdges::default()).first_session);
        assert_eq!(registry.live_connections(alice).len(), 2);

        let first = registry.leave(phone).unwrap();
        assert!(!first.last_session);
        assert!(registry.is_online(alice));

        let second = registry.leave(laptop).unwrap();
        assert!(second.last_session);
        assert!(!registry.is_online(alice));
    }

    #[test]
    fn test_rejoin_replaces_snapshot() {
        let registry = PresenceRegistry::new();
        let alice = user();
        let bob = user();
        let carol = user();
        let conn = ConnectionId::generate();

        registry.join(alice, conn, following(&[bob]));
        assert_eq!(registry.watchers_of(bob), vec![alice]);

        let outcome = registry.join(alice, conn, following(&[carol]));
        assert!(outcome.replaced);
        assert!(!outcome.first_session);
        assert_eq!(registry.entries(alice).len(), 1);
        assert!(registry.watchers_of(bob).is_empty());
        assert_eq!(registry.watchers_of(carol), vec![alice]);
    }

    #[test]
    fn test_watchers_track_connection_count() {
        let registry = PresenceRegistry::new();
        let owner = user();
        let fan = user();
        let s1 = ConnectionId::generate();
        let s2 = ConnectionId::generate();

        registry.join(fan, s1, following(&[owner]));
        registry.join(fan, s2, following(&[owner]));
        assert_eq!(registry.watchers_of(owner), vec![fan]);

        registry.leave(s1);
        assert_eq!(registry.watchers_of(owner), vec![fan]);

        registry.leave(s2);
        assert!(registry.watchers_of(owner).is_empty());
    }

    #[test]
    fn test_edges_of_merges_sessions() {
        let registry = PresenceRegistry::new();
        let alice = user();
        let bob = user();
        let carol = user();

        assert!(registry.edges_of(alice).is_none());

        registry.join(alice, ConnectionId::generate(), SocialEdges::new([bob], []));
        registry.join(alice, ConnectionId::generate(), SocialEdges::new([carol], [bob]));

        let edges = registry.edges_of(alice).unwrap();
        assert_eq!(edges.following_ids, HashSet::from([bob, carol]));
        assert_eq!(edges.follower_ids, HashSet::from([bob]));
    }

    #[test]
    fn test_connection_reassigned_to_other_user() {
        let registry = PresenceRegistry::new();
        let alice = user();
        let bob = user();
        let conn = ConnectionId::generate();

        registry.join(alice, conn, SocialEdges::default());
        registry.join(bob, conn, SocialEdges::default());

        assert!(!registry.is_online(alice));
        assert!(registry.is_online(bob));
        assert_eq!(registry.user_of(conn), Some(bob));
    }

    #[test]
    fn test_replace_snapshot_reindexes_watchers() {
        let registry = PresenceRegistry::new();
        let alice = user();
        let bob = user();
        let carol = user();
        let conn = ConnectionId::generate();

        registry.join(alice, conn, following(&[bob]));
        assert!(registry.replace_snapshot(alice, conn, following(&[carol])));

        assert_eq!(registry.entries(alice).len(), 1);
        assert!(registry.watchers_of(bob).is_empty());
        assert_eq!(registry.watchers_of(carol), vec![alice]);
    }

    #[test]
    fn test_replace_snapshot_never_resurrects_departed_session() {
        let registry = PresenceRegistry::new();
        let alice = user();
        let bob = user();
        let conn = ConnectionId::generate();

        registry.join(alice, conn, SocialEdges::default());
        registry.leave(conn);

        assert!(!registry.replace_snapshot(alice, conn, following(&[bob])));
        assert!(!registry.is_online(alice));
        assert_eq!(registry.user_of(conn), None);
        assert_eq!(registry.connection_count(), 0);
        assert!(registry.watchers_of(bob).is_empty());

        // 连接属于其他用户时同样不写入
        let other = ConnectionId::generate();
        registry.join(bob, other, SocialEdges::default());
        assert!(!registry.replace_snapshot(alice, other, SocialEdges::default()));
        assert!(registry.entries(alice).is_empty());
    }

    #[test]
    fn test_online_subset_of() {
        let registry = PresenceRegistry::new();
        let a = user();
        let b = user();
        let c = user();
        let conn_a = ConnectionId::generate();

        registry.join(a, conn_a, SocialEdges::default());
        registry.join(b, ConnectionId::generate(), SocialEdges::default());
        registry.leave(conn_a);

        assert_eq!(registry.online_subset_of([a, b, c]), HashSet::from([b]));
    }
}

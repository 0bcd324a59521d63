//! 在线状态注册表。
//!
//! 维护「用户 -> 活动连接」的内存映射。进程重启会清空所有在线状态，
//! 这是有意为之的取舍：在线状态不做持久化。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use domain::{ConnectionId, Timestamp, UserId};
use tokio::sync::{broadcast, RwLock};

use crate::clock::Clock;

/// 在线状态变化事件，广播给所有订阅者（包括刚上线的连接自己）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceEvent {
    pub user_id: UserId,
    pub is_online: bool,
}

/// 单个用户的在线条目。
#[derive(Debug, Clone, Copy)]
pub struct PresenceEntry {
    pub connection_id: ConnectionId,
    pub last_activity_at: Timestamp,
}

pub struct PresenceRegistry {
    entries: RwLock<HashMap<UserId, PresenceEntry>>,
    events: broadcast::Sender<PresenceEvent>,
    staleness_window: Duration,
    clock: Arc<dyn Clock>,
}

impl PresenceRegistry {
    pub fn new(clock: Arc<dyn Clock>, staleness_window: Duration) -> Self {
        let (events, _) = broadcast::channel(1000);
        Self {
            entries: RwLock::new(HashMap::new()),
            events,
            staleness_window,
            clock,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.events.subscribe()
    }

    /// 记录用户在线。同一用户的新连接直接覆盖旧绑定
    /// （last-connection-wins），被顶掉的连接本身不会被关闭。
    ///
    /// 一条连接同时只承载一个身份：同一连接换用户重新绑定时
    /// （例如先 login 后 authenticate），旧身份先下线再登记新身份，
    /// 否则断开时旧条目会一直残留到过期清理。
    pub async fn bind(&self, user_id: UserId, connection_id: ConnectionId) {
        let entry = PresenceEntry {
            connection_id,
            last_activity_at: self.clock.now(),
        };
        let displaced = {
            let mut entries = self.entries.write().await;
            let displaced = entries
                .iter()
                .find(|(other, e)| e.connection_id == connection_id && **other != user_id)
                .map(|(other, _)| *other);
            if let Some(other) = displaced {
                entries.remove(&other);
            }
            entries.insert(user_id, entry);
            displaced
        };

        if let Some(other) = displaced {
            tracing::info!(user_id = %other, connection_id = %connection_id, "连接换绑身份，旧用户下线");
            self.emit(PresenceEvent {
                user_id: other,
                is_online: false,
            });
        }
        tracing::info!(user_id = %user_id, connection_id = %connection_id, "用户上线");
        self.emit(PresenceEvent {
            user_id,
            is_online: true,
        });
    }

    /// 按连接标识解除绑定。
    ///
    /// 必须同时匹配用户和连接：断开事件和重连竞争时，旧连接的
    /// 迟到断开不能误删新绑定。
    pub async fn unbind_connection(&self, connection_id: ConnectionId) -> Option<UserId> {
        let removed = {
            let mut entries = self.entries.write().await;
            let user_id = entries
                .iter()
                .find(|(_, entry)| entry.connection_id == connection_id)
                .map(|(user_id, _)| *user_id);
            if let Some(user_id) = user_id {
                entries.remove(&user_id);
            }
            user_id
        };

        if let Some(user_id) = removed {
            tracing::info!(user_id = %user_id, connection_id = %connection_id, "用户下线");
            self.emit(PresenceEvent {
                user_id,
                is_online: false,
            });
        }
        removed
    }

    /// 刷新最近活动时间，不改变绑定。
    pub async fn touch(&self, user_id: UserId) {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&user_id) {
            entry.last_activity_at = now;
        }
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(&user_id)
            .map(|entry| self.is_fresh(entry, now))
            .unwrap_or(false)
    }

    /// 当前在线（未过期）的用户列表。
    pub async fn list_online(&self) -> Vec<UserId> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|(_, entry)| self.is_fresh(entry, now))
            .map(|(user_id, _)| *user_id)
            .collect()
    }

    /// 当前在线用户及其连接的快照，广播投递用。
    pub async fn online_connections(&self) -> Vec<(UserId, ConnectionId)> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|(_, entry)| self.is_fresh(entry, now))
            .map(|(user_id, entry)| (*user_id, entry.connection_id))
            .collect()
    }

    /// 查找用户的活动连接，过期条目视为离线。
    pub async fn connection_of(&self, user_id: UserId) -> Option<ConnectionId> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(&user_id)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| entry.connection_id)
    }

    /// 清理过期条目，由单个固定间隔的定时器驱动。
    ///
    /// 下线事件在释放写锁之后才发出，避免和同步的下游投递互相死锁。
    /// 单个条目的事件发送失败不影响其余条目。
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let evicted: Vec<UserId> = {
            let mut entries = self.entries.write().await;
            let stale: Vec<UserId> = entries
                .iter()
                .filter(|(_, entry)| !self.is_fresh(entry, now))
                .map(|(user_id, _)| *user_id)
                .collect();
            for user_id in &stale {
                entries.remove(user_id);
            }
            stale
        };

        for user_id in &evicted {
            tracing::info!(user_id = %user_id, "在线状态过期，清理");
            self.emit(PresenceEvent {
                user_id: *user_id,
                is_online: false,
            });
        }
        evicted.len()
    }

    fn is_fresh(&self, entry: &PresenceEntry, now: Timestamp) -> bool {
        now - entry.last_activity_at <= self.staleness_window
    }

    fn emit(&self, event: PresenceEvent) {
        // 没有任何订阅者时 send 会失败，忽略即可
        let _ = self.events.send(event);
    }
}

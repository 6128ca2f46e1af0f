//! 应用层实现。
//!
//! 在线状态注册表、事件分发路由、连接生命周期与在线查询。
//! 传输层（WebSocket）和外部存储只通过这里定义的 trait 接入。

pub mod connection_hub;
pub mod error;
pub mod fallback;
pub mod identity;
pub mod lifecycle;
pub mod notifications;
pub mod presence_query;
pub mod registry;
pub mod router;

#[cfg(test)]
mod test_support;

pub use connection_hub::{ConnectionSink, DeliveryError, LocalConnectionHub};
pub use error::ApplicationError;
pub use fallback::OfflineFallbackSink;
pub use identity::{Credentials, IdentityResolver};
pub use lifecycle::{ConnectionLifecycleManager, JoinedSession, LifecycleDependencies};
pub use notifications::NotificationInbox;
pub use presence_query::PresenceQueryService;
pub use registry::{Departure, JoinOutcome, PresenceRegistry};
pub use router::{DispatchReport, FanoutRouter};

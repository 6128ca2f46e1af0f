//! 基础设施层实现。
//!
//! 提供关注关系读取与离线通知存储的 PostgreSQL 与内存实现，实现领域层定义的接口。

pub mod builder;
pub mod memory;
pub mod migrations;
pub mod repository;

pub use builder::{Infrastructure, InfrastructureError};
pub use memory::{InMemoryNotificationStore, InMemorySocialGraph};
pub use migrations::MIGRATOR;
pub use repository::{create_pg_pool, PgNotificationStore, PgSocialGraphRepository, PgStorage};

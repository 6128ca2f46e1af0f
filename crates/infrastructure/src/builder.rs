use std::sync::Arc;

use config::DatabaseConfig;
use domain::{NotificationStore, SocialGraphRepository};
use thiserror::Error;

use crate::{
    memory::{InMemoryNotificationStore, InMemorySocialGraph},
    migrations::MIGRATOR,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 外部协作方：关系图与通知存储
#[derive(Clone)]
pub struct Infrastructure {
    pub social_graph: Arc<dyn SocialGraphRepository>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Infrastructure {
    /// 连接 PostgreSQL 并执行迁移
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, InfrastructureError> {
        let pool = create_pg_pool(&config.url, config.max_connections).await?;
        MIGRATOR.run(&pool).await?;
        tracing::info!(max_connections = config.max_connections, "数据库连接池已就绪");

        let storage = PgStorage::new(pool);
        Ok(Self {
            social_graph: storage.social_graph,
            notifications: storage.notifications,
        })
    }

    pub fn in_memory(social_graph: Arc<InMemorySocialGraph>) -> Self {
        Self {
            social_graph,
            notifications: Arc::new(InMemoryNotificationStore::new()),
        }
    }

    /// 未配置数据库地址时退回内存实现
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self, InfrastructureError> {
        if config.is_in_memory() {
            tracing::warn!("未配置 DATABASE_URL，使用内存存储");
            return Ok(Self::in_memory(Arc::new(InMemorySocialGraph::new())));
        }
        Self::connect(config).await
    }
}

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    NotificationStore, OfflineRecord, RepositoryError, RepositoryResult, SocialEdges,
    SocialGraphRepository, UserId,
};
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        other => RepositoryError::storage(other.to_string()),
    }
}

/// 从 follows 表读取关注 / 粉丝快照
#[derive(Clone)]
pub struct PgSocialGraphRepository {
    pool: PgPool,
}

impl PgSocialGraphRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SocialGraphRepository for PgSocialGraphRepository {
    async fn fetch_edges(&self, user_id: UserId) -> RepositoryResult<SocialEdges> {
        let following: Vec<Uuid> =
            sqlx::query_scalar(r#"SELECT followee_id FROM follows WHERE follower_id = $1"#)
                .bind(Uuid::from(user_id))
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

        let followers: Vec<Uuid> =
            sqlx::query_scalar(r#"SELECT follower_id FROM follows WHERE followee_id = $1"#)
                .bind(Uuid::from(user_id))
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

        Ok(SocialEdges {
            following_ids: following.into_iter().map(UserId::from).collect::<HashSet<_>>(),
            follower_ids: followers.into_iter().map(UserId::from).collect::<HashSet<_>>(),
        })
    }
}

#[derive(Debug, FromRow)]
struct NotificationRecord {
    id: Uuid,
    recipient_id: Uuid,
    actor_id: Uuid,
    payload: Json<serde_json::Value>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl From<NotificationRecord> for OfflineRecord {
    fn from(value: NotificationRecord) -> Self {
        OfflineRecord {
            id: value.id,
            recipient_id: UserId::from(value.recipient_id),
            actor_id: UserId::from(value.actor_id),
            payload: value.payload.0,
            is_read: value.is_read,
            created_at: value.created_at,
        }
    }
}

#[derive(Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn persist(&self, record: OfflineRecord) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, recipient_id, actor_id, payload, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(Uuid::from(record.recipient_id))
        .bind(Uuid::from(record.actor_id))
        .bind(Json(record.payload))
        .bind(record.is_read)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn list_for(&self, recipient_id: UserId, limit: u32) -> RepositoryResult<Vec<OfflineRecord>> {
        let records = sqlx::query_as::<_, NotificationRecord>(
            r#"
            SELECT id, recipient_id, actor_id, payload, is_read, created_at
            FROM notifications
            WHERE recipient_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(Uuid::from(recipient_id))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(OfflineRecord::from).collect())
    }

    async fn mark_all_read(&self, recipient_id: UserId) -> RepositoryResult<u64> {
        let result = sqlx::query(
            r#"UPDATE notifications SET is_read = TRUE WHERE recipient_id = $1 AND is_read = FALSE"#,
        )
        .bind(Uuid::from(recipient_id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}

pub struct PgStorage {
    pub pool: PgPool,
    pub social_graph: Arc<PgSocialGraphRepository>,
    pub notifications: Arc<PgNotificationStore>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            social_graph: Arc::new(PgSocialGraphRepository::new(pool.clone())),
            notifications: Arc::new(PgNotificationStore::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

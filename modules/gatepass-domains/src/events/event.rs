use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use gatepass_common::Result;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: Uuid,
    /// Owning principal. Set at creation, never reassigned.
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub name: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub location: String,
}

/// Partial update; absent fields keep their stored value. Patches are
/// set-only: a stored `description` cannot be cleared back to NULL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub location: Option<String>,
}

impl Event {
    pub async fn create(owner_id: Uuid, new: &NewEvent, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO events (user_id, name, description, date, location)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(owner_id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.date)
        .bind(&new.location)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// List events, newest first, with an optional name/description search.
    pub async fn list(
        search: Option<&str>,
        limit: i64,
        offset: i64,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        let mut qb = sqlx::QueryBuilder::new("SELECT * FROM events WHERE 1=1 ");

        if let Some(term) = search {
            let pattern = format!("%{term}%");
            qb.push("AND (name ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR description ILIKE ");
            qb.push_bind(pattern);
            qb.push(") ");
        }

        qb.push("ORDER BY created_at DESC LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        qb.build_query_as::<Self>()
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn update(id: Uuid, patch: &EventPatch, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE events
            SET name        = COALESCE($2, name),
                description = COALESCE($3, description),
                date        = COALESCE($4, date),
                location    = COALESCE($5, location)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.description)
        .bind(patch.date)
        .bind(&patch.location)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Hard delete. Packages, tickets and committee rows cascade.
    pub async fn delete(id: Uuid, pool: &PgPool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

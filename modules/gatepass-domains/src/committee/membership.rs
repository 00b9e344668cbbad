use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use gatepass_common::{GatepassError, Result};

use crate::events::Event;

/// One (event, principal) capability grant. The pair is unique.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CommitteeMembership {
    pub event_id: Uuid,
    pub user_id: Uuid,
}

/// Listing row joined with the member's directory entry.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CommitteeMember {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
}

impl CommitteeMembership {
    pub async fn add(event_id: Uuid, user_id: Uuid, pool: &PgPool) -> Result<Self> {
        let inserted = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO committee (event_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (event_id, user_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        inserted.ok_or_else(|| {
            GatepassError::InvalidState(format!(
                "user {user_id} is already on the committee for event {event_id}"
            ))
        })
    }

    pub async fn remove(event_id: Uuid, user_id: Uuid, pool: &PgPool) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM committee WHERE event_id = $1 AND user_id = $2")
            .bind(event_id)
            .bind(user_id)
            .execute(pool)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(GatepassError::NotFound(format!(
                "committee membership for user {user_id} on event {event_id}"
            )));
        }
        Ok(())
    }

    pub async fn find(event_id: Uuid, user_id: Uuid, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM committee WHERE event_id = $1 AND user_id = $2")
            .bind(event_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn is_member(event_id: Uuid, user_id: Uuid, pool: &PgPool) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM committee WHERE event_id = $1 AND user_id = $2)",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn list_by_event(event_id: Uuid, pool: &PgPool) -> Result<Vec<CommitteeMember>> {
        sqlx::query_as::<_, CommitteeMember>(
            r#"
            SELECT c.event_id, c.user_id, u.name, u.email
            FROM committee c
            JOIN users u ON u.id = c.user_id
            WHERE c.event_id = $1
            ORDER BY u.name
            "#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Events the principal serves on, soonest first.
    pub async fn events_for_member(user_id: Uuid, pool: &PgPool) -> Result<Vec<Event>> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT e.*
            FROM events e
            JOIN committee c ON c.event_id = e.id
            WHERE c.user_id = $1
            ORDER BY e.date
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}

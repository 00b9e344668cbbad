use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use gatepass_common::{GatepassError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Package {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    /// Informational multiplier (entries granted per ticket); never consulted
    /// by the stock accounting.
    pub tickets_per_package: i32,
    pub total_tickets_available: i32,
    pub price: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPackage {
    pub name: String,
    pub tickets_per_package: i32,
    pub total_tickets_available: i32,
    pub price: i64,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackagePatch {
    pub name: Option<String>,
    pub tickets_per_package: Option<i32>,
    pub total_tickets_available: Option<i32>,
    pub price: Option<i64>,
}

impl Package {
    pub async fn create(event_id: Uuid, new: &NewPackage, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO packages (event_id, name, tickets_per_package, total_tickets_available, price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(&new.name)
        .bind(new.tickets_per_package)
        .bind(new.total_tickets_available)
        .bind(new.price)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM packages WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn list_by_event(event_id: Uuid, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM packages WHERE event_id = $1 ORDER BY price")
            .bind(event_id)
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn update(id: Uuid, patch: &PackagePatch, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE packages
            SET name                    = COALESCE($2, name),
                tickets_per_package     = COALESCE($3, tickets_per_package),
                total_tickets_available = COALESCE($4, total_tickets_available),
                price                   = COALESCE($5, price)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&patch.name)
        .bind(patch.tickets_per_package)
        .bind(patch.total_tickets_available)
        .bind(patch.price)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn delete(id: Uuid, pool: &PgPool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM packages WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Atomically take `quantity` tickets off the shelf.
    ///
    /// The decrement and its stock precondition are one statement; the
    /// affected-row count decides the outcome. Stock is never read into
    /// application memory and written back. Runs on the caller's connection
    /// so it shares the transaction that issues the ticket.
    pub async fn reserve(package_id: Uuid, quantity: i32, conn: &mut PgConnection) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE packages
            SET total_tickets_available = total_tickets_available - $2
            WHERE id = $1 AND total_tickets_available >= $2
            "#,
        )
        .bind(package_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            let exists =
                sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM packages WHERE id = $1)")
                    .bind(package_id)
                    .fetch_one(&mut *conn)
                    .await?;
            if exists {
                return Err(GatepassError::InsufficientStock(package_id));
            }
            return Err(GatepassError::NotFound(format!("package {package_id}")));
        }
        Ok(())
    }

    /// Return `quantity` tickets to the shelf, the inverse of `reserve`.
    pub async fn release(package_id: Uuid, quantity: i32, conn: &mut PgConnection) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE packages SET total_tickets_available = total_tickets_available + $2 WHERE id = $1",
        )
        .bind(package_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(GatepassError::NotFound(format!("package {package_id}")));
        }
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use gatepass_common::{GatepassError, Result, TicketStatus};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ticket {
    pub id: Uuid,
    /// Current owner. Changes on transfer, nothing else.
    pub user_id: Uuid,
    pub package_id: Uuid,
    pub purchase_date: DateTime<Utc>,
    pub validated_by: Option<Uuid>,
    pub validated_at: Option<DateTime<Utc>>,
    /// Client-supplied idempotency key for the purchase, unique when present.
    pub purchase_key: Option<Uuid>,
}

/// Committee-side listing row: ticket plus owner and package names.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TicketWithOwner {
    pub id: Uuid,
    pub user_id: Uuid,
    pub package_id: Uuid,
    pub purchase_date: DateTime<Utc>,
    pub validated_by: Option<Uuid>,
    pub validated_at: Option<DateTime<Utc>>,
    pub owner_name: String,
    pub package_name: String,
}

/// Owner-side listing row: ticket plus the package and event it belongs to.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OwnedTicket {
    pub id: Uuid,
    pub package_id: Uuid,
    pub purchase_date: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub package_name: String,
    pub event_id: Uuid,
    pub event_name: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TicketCounts {
    pub total: i64,
    pub validated: i64,
}

impl Ticket {
    pub fn status(&self) -> TicketStatus {
        if self.validated_at.is_some() {
            TicketStatus::Validated
        } else {
            TicketStatus::Active
        }
    }

    /// Insert a new Active ticket on the caller's connection, inside the
    /// same transaction that reserved its stock.
    ///
    /// Returns `None` only when `purchase_key` is taken by an existing row:
    /// the conflict leaves nothing inserted and the caller must roll the
    /// reservation back and replay the original ticket.
    pub async fn issue(
        owner_id: Uuid,
        package_id: Uuid,
        purchase_key: Option<Uuid>,
        conn: &mut PgConnection,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO tickets (user_id, package_id, purchase_key)
            VALUES ($1, $2, $3)
            ON CONFLICT (purchase_key) WHERE purchase_key IS NOT NULL DO NOTHING
            RETURNING *
            "#,
        )
        .bind(owner_id)
        .bind(package_id)
        .bind(purchase_key)
        .fetch_optional(&mut *conn)
        .await
        .map_err(Into::into)
    }

    /// Active → Validated, exactly once. The transition rides a single
    /// conditional update so two concurrent validations cannot both win;
    /// re-validating is an error, never a no-op.
    pub async fn validate(ticket_id: Uuid, validator_id: Uuid, pool: &PgPool) -> Result<Self> {
        let updated = sqlx::query_as::<_, Self>(
            r#"
            UPDATE tickets
            SET validated_by = $2, validated_at = now()
            WHERE id = $1 AND validated_at IS NULL
            RETURNING *
            "#,
        )
        .bind(ticket_id)
        .bind(validator_id)
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(ticket) => Ok(ticket),
            None => match Self::find_by_id(ticket_id, pool).await? {
                Some(_) => Err(GatepassError::AlreadyValidated(ticket_id)),
                None => Err(GatepassError::NotFound(format!("ticket {ticket_id}"))),
            },
        }
    }

    /// Move an Active ticket to a new owner. Package linkage and validation
    /// columns are untouched. The owner and state preconditions sit in the
    /// update itself, so a stale caller loses cleanly.
    pub async fn transfer(
        ticket_id: Uuid,
        from_owner: Uuid,
        to_owner: Uuid,
        pool: &PgPool,
    ) -> Result<Self> {
        let updated = sqlx::query_as::<_, Self>(
            r#"
            UPDATE tickets
            SET user_id = $3
            WHERE id = $1 AND user_id = $2 AND validated_at IS NULL
            RETURNING *
            "#,
        )
        .bind(ticket_id)
        .bind(from_owner)
        .bind(to_owner)
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(ticket) => Ok(ticket),
            None => match Self::find_by_id(ticket_id, pool).await? {
                None => Err(GatepassError::NotFound(format!("ticket {ticket_id}"))),
                Some(t) if t.validated_at.is_some() => {
                    Err(GatepassError::AlreadyValidated(ticket_id))
                }
                Some(_) => Err(GatepassError::NotOwner(ticket_id)),
            },
        }
    }

    /// Hard delete on the caller's connection, returning the removed row.
    /// Whether the deletion releases stock is the workflow's policy call.
    pub async fn remove(ticket_id: Uuid, conn: &mut PgConnection) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("DELETE FROM tickets WHERE id = $1 RETURNING *")
            .bind(ticket_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM tickets WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_purchase_key(key: Uuid, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM tickets WHERE purchase_key = $1")
            .bind(key)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Tickets sold for an event, newest purchase first, with optional
    /// status filter and owner-name search.
    pub async fn list_by_event(
        event_id: Uuid,
        status: Option<TicketStatus>,
        search: Option<&str>,
        limit: i64,
        offset: i64,
        pool: &PgPool,
    ) -> Result<Vec<TicketWithOwner>> {
        let mut qb = sqlx::QueryBuilder::new(
            r#"SELECT t.id, t.user_id, t.package_id, t.purchase_date, t.validated_by,
                      t.validated_at, u.name AS owner_name, p.name AS package_name
               FROM tickets t
               JOIN users u ON u.id = t.user_id
               JOIN packages p ON p.id = t.package_id
               WHERE p.event_id = "#,
        );
        qb.push_bind(event_id);
        qb.push(" ");

        push_status_filter(&mut qb, status);

        if let Some(term) = search {
            qb.push("AND u.name ILIKE ");
            qb.push_bind(format!("%{term}%"));
            qb.push(" ");
        }

        qb.push("ORDER BY t.purchase_date DESC LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        qb.build_query_as::<TicketWithOwner>()
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    /// A principal's own tickets, newest purchase first.
    pub async fn list_by_owner(
        owner_id: Uuid,
        status: Option<TicketStatus>,
        limit: i64,
        offset: i64,
        pool: &PgPool,
    ) -> Result<Vec<OwnedTicket>> {
        let mut qb = sqlx::QueryBuilder::new(
            r#"SELECT t.id, t.package_id, t.purchase_date, t.validated_at,
                      p.name AS package_name, e.id AS event_id, e.name AS event_name
               FROM tickets t
               JOIN packages p ON p.id = t.package_id
               JOIN events e ON e.id = p.event_id
               WHERE t.user_id = "#,
        );
        qb.push_bind(owner_id);
        qb.push(" ");

        push_status_filter(&mut qb, status);

        qb.push("ORDER BY t.purchase_date DESC LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        qb.build_query_as::<OwnedTicket>()
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn count_by_event(event_id: Uuid, pool: &PgPool) -> Result<TicketCounts> {
        let (total, validated) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE t.validated_at IS NOT NULL)
            FROM tickets t
            JOIN packages p ON p.id = t.package_id
            WHERE p.event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_one(pool)
        .await?;

        Ok(TicketCounts { total, validated })
    }
}

fn push_status_filter(
    qb: &mut sqlx::QueryBuilder<'_, sqlx::Postgres>,
    status: Option<TicketStatus>,
) {
    match status {
        Some(TicketStatus::Active) => {
            qb.push("AND t.validated_at IS NULL ");
        }
        Some(TicketStatus::Validated) => {
            qb.push("AND t.validated_at IS NOT NULL ");
        }
        None => {}
    }
}

//! Shared fixtures for the integration suites.
//!
//! Every test builds its own users, event and package, so the suites can run
//! in parallel against one database without clobbering each other.
#![allow(dead_code)]

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tokio::sync::OnceCell;
use uuid::Uuid;

use gatepass_common::{Principal, Role};
use gatepass_domains::events::{self, Event, NewEvent};
use gatepass_domains::inventory::{self, NewPackage, Package};
use gatepass_domains::users::User;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id         UUID         PRIMARY KEY DEFAULT gen_random_uuid(),
        name       TEXT         NOT NULL,
        email      TEXT         NOT NULL UNIQUE,
        is_admin   BOOLEAN      NOT NULL DEFAULT false,
        created_at TIMESTAMPTZ  NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id          UUID         PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id     UUID         NOT NULL REFERENCES users(id),
        name        TEXT         NOT NULL,
        description TEXT,
        date        TIMESTAMPTZ  NOT NULL,
        location    TEXT         NOT NULL,
        created_at  TIMESTAMPTZ  NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS packages (
        id                      UUID    PRIMARY KEY DEFAULT gen_random_uuid(),
        event_id                UUID    NOT NULL REFERENCES events(id) ON DELETE CASCADE,
        name                    TEXT    NOT NULL,
        tickets_per_package     INTEGER NOT NULL DEFAULT 1,
        total_tickets_available INTEGER NOT NULL CHECK (total_tickets_available >= 0),
        price                   BIGINT  NOT NULL CHECK (price >= 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tickets (
        id            UUID         PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id       UUID         NOT NULL REFERENCES users(id),
        package_id    UUID         NOT NULL REFERENCES packages(id) ON DELETE CASCADE,
        purchase_date TIMESTAMPTZ  NOT NULL DEFAULT now(),
        validated_by  UUID         REFERENCES users(id),
        validated_at  TIMESTAMPTZ,
        purchase_key  UUID
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS tickets_purchase_key_idx
        ON tickets (purchase_key) WHERE purchase_key IS NOT NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS committee (
        event_id UUID NOT NULL REFERENCES events(id) ON DELETE CASCADE,
        user_id  UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        PRIMARY KEY (event_id, user_id)
    )
    "#,
];

static SETUP: OnceCell<()> = OnceCell::const_new();

/// Connect to `DATABASE_TEST_URL` and make sure the schema exists, or return
/// `None` so the caller skips the test.
pub async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    SETUP
        .get_or_init(|| async {
            for ddl in SCHEMA {
                // Two test binaries may race on the same CREATE; a retry settles it.
                if sqlx::query(ddl).execute(&pool).await.is_err() {
                    let _ = sqlx::query(ddl).execute(&pool).await;
                }
            }
        })
        .await;
    Some(pool)
}

pub async fn new_principal(admin: bool, pool: &PgPool) -> Principal {
    let email = format!("{}@example.test", Uuid::new_v4());
    let user = User::create("Test User", &email, admin, pool).await.unwrap();
    let roles = if admin { vec![Role::Admin] } else { vec![] };
    Principal::new(user.id, roles)
}

pub struct Scene {
    pub owner: Principal,
    pub event: Event,
    pub package: Package,
}

/// An admin-owned event with one package holding `stock` tickets.
pub async fn scene(stock: i32, pool: &PgPool) -> Scene {
    let owner = new_principal(true, pool).await;
    let event = events::create_event(
        &owner,
        &NewEvent {
            name: format!("Launch Night {}", Uuid::new_v4()),
            description: Some("door list fixture".into()),
            date: Utc::now() + Duration::days(30),
            location: "Main Hall".into(),
        },
        pool,
    )
    .await
    .unwrap();
    let package = inventory::create_package(
        &owner,
        event.id,
        &NewPackage {
            name: "General Admission".into(),
            tickets_per_package: 1,
            total_tickets_available: stock,
            price: 150_000,
        },
        pool,
    )
    .await
    .unwrap();
    Scene { owner, event, package }
}

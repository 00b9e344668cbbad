//! Schema and seed management for the gatepass database.
//!
//! `apply` is idempotent and safe to rerun on every deploy. `seed` loads a
//! small fixed demo dataset so a fresh environment has something to click on.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "gatepass-migrate", about = "Gatepass schema and seed management")]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update the schema (idempotent)
    Apply,
    /// Drop every gatepass table
    Reset {
        /// Confirm the drop
        #[arg(long)]
        yes: bool,
    },
    /// Insert the demo dataset (idempotent)
    Seed,
    /// Show row counts per table
    Status,
}

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
    // Purchase idempotency: one ticket per client-supplied key.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS tickets_purchase_key_idx
        ON tickets (purchase_key) WHERE purchase_key IS NOT NULL
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS tickets_user_idx ON tickets (user_id)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS tickets_package_idx ON tickets (package_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS committee (
        event_id UUID NOT NULL REFERENCES events(id) ON DELETE CASCADE,
        user_id  UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        PRIMARY KEY (event_id, user_id)
    )
    "#,
];

const TABLES: &[&str] = &["users", "events", "packages", "tickets", "committee"];

// Fixed ids so reseeding never duplicates rows.
const SEED_ADMIN: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_a001);
const SEED_MEMBER: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_a002);
const SEED_BUYER: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_a003);
const SEED_EVENT: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_e001);
const SEED_REGULAR: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_f001);
const SEED_VIP: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_f002);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&cli.database_url)
        .await?;

    match cli.command {
        Commands::Apply => apply(&pool).await,
        Commands::Reset { yes } => reset(&pool, yes).await,
        Commands::Seed => seed(&pool).await,
        Commands::Status => status(&pool).await,
    }
}

async fn apply(pool: &PgPool) -> Result<()> {
    for ddl in SCHEMA {
        sqlx::query(ddl).execute(pool).await?;
    }
    info!("Schema applied");
    Ok(())
}

async fn reset(pool: &PgPool, yes: bool) -> Result<()> {
    if !yes {
        bail!("reset drops every gatepass table; rerun with --yes to confirm");
    }
    for table in TABLES.iter().rev() {
        sqlx::query(&format!("DROP TABLE IF EXISTS {table} CASCADE"))
            .execute(pool)
            .await?;
        info!(table = %table, "Dropped");
    }
    Ok(())
}

async fn seed(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, is_admin) VALUES
            ($1, 'Dewi Santoso', 'dewi@gatepass.dev', true),
            ($2, 'Raka Pratama', 'raka@gatepass.dev', false),
            ($3, 'Maya Lestari', 'maya@gatepass.dev', false)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(SEED_ADMIN)
    .bind(SEED_MEMBER)
    .bind(SEED_BUYER)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO events (id, user_id, name, description, date, location)
        VALUES ($1, $2, 'Campus Music Festival',
                'Annual open-air showcase of student bands',
                now() + interval '30 days', 'North Quad')
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(SEED_EVENT)
    .bind(SEED_ADMIN)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO packages (id, event_id, name, tickets_per_package,
                              total_tickets_available, price) VALUES
            ($1, $3, 'Regular', 1, 200, 50000),
            ($2, $3, 'VIP', 1, 25, 150000)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(SEED_REGULAR)
    .bind(SEED_VIP)
    .bind(SEED_EVENT)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO committee (event_id, user_id) VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(SEED_EVENT)
    .bind(SEED_MEMBER)
    .execute(pool)
    .await?;

    info!("Demo dataset seeded");
    Ok(())
}

async fn status(pool: &PgPool) -> Result<()> {
    for table in TABLES {
        let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await?;
        info!(table = %table, rows, "Table status");
    }
    Ok(())
}

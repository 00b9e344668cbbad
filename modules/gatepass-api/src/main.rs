use std::sync::Arc;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue},
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gatepass_common::Config;

mod auth;
mod jwt;
mod rest;

use jwt::JwtService;

pub struct AppState {
    pub pool: PgPool,
    pub jwt: JwtService,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gatepass=info".parse()?))
        .init();

    let config = Config::from_env();
    let pool = config.pg_pool().await?;

    let state = Arc::new(AppState {
        jwt: JwtService::new(&config.jwt_secret, config.jwt_issuer.clone()),
        pool,
    });

    let app = Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Event catalog
        .route(
            "/api/events",
            get(rest::api_events).post(rest::api_create_event),
        )
        .route(
            "/api/events/{id}",
            get(rest::api_event_detail)
                .put(rest::api_update_event)
                .delete(rest::api_delete_event),
        )
        // Ticket packages
        .route(
            "/api/events/{id}/packages",
            get(rest::api_event_packages).post(rest::api_create_package),
        )
        .route(
            "/api/packages/{id}",
            put(rest::api_update_package).delete(rest::api_delete_package),
        )
        // Tickets
        .route("/api/packages/{id}/buy", post(rest::api_buy_ticket))
        .route("/api/events/{id}/tickets", get(rest::api_event_tickets))
        .route("/api/tickets/mine", get(rest::api_my_tickets))
        .route("/api/tickets/{id}/validate", post(rest::api_validate_ticket))
        .route("/api/tickets/{id}/transfer", post(rest::api_transfer_ticket))
        .route("/api/tickets/{id}", delete(rest::api_delete_ticket))
        // Committee registry
        .route(
            "/api/events/{id}/committee",
            get(rest::api_committee_members)
                .post(rest::api_add_committee_member)
                .delete(rest::api_quit_committee),
        )
        .route(
            "/api/events/{id}/committee/{user_id}",
            delete(rest::api_remove_committee_member),
        )
        .route("/api/committee/mine", get(rest::api_my_committees))
        .with_state(state)
        // CORS
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Ticket and roster data must never be cached
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // Logging layer: method + path + status + latency only (no query params)
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("Gatepass API listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

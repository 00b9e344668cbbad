use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use gatepass_common::{GatepassError, TicketStatus};
use gatepass_domains::committee::{self, CommitteeMembership};
use gatepass_domains::events::{self, Event, EventPatch, NewEvent};
use gatepass_domains::inventory::{self, NewPackage, Package, PackagePatch};
use gatepass_domains::tickets::{self, Ticket};

use crate::auth::AuthPrincipal;
use crate::AppState;

// --- Query structs ---

#[derive(Deserialize)]
pub struct EventsQuery {
    search: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Deserialize)]
pub struct TicketsQuery {
    status: Option<String>,
    search: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Deserialize)]
pub struct MineQuery {
    status: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Deserialize)]
pub struct TransferRequest {
    recipient_id: Uuid,
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    user_id: Uuid,
}

// --- Helpers ---

/// Map a domain error onto its HTTP status. Client-caused errors carry the
/// typed message; server faults are logged and answered generically.
fn domain_error(err: GatepassError, context: &str) -> Response {
    let status = match &err {
        GatepassError::NotFound(_) => StatusCode::NOT_FOUND,
        GatepassError::Forbidden(_) | GatepassError::NotOwner(_) => StatusCode::FORBIDDEN,
        GatepassError::InsufficientStock(_)
        | GatepassError::AlreadyValidated(_)
        | GatepassError::InvalidState(_) => StatusCode::CONFLICT,
        GatepassError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatepassError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(error = %err, "{context}");
        return (
            status,
            Json(serde_json::json!({ "error": "Internal error" })),
        )
            .into_response();
    }
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn parse_status(raw: Option<&str>) -> Result<Option<TicketStatus>, Response> {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        None | Some("") => Ok(None),
        Some("active") => Ok(Some(TicketStatus::Active)),
        Some("validated") => Ok(Some(TicketStatus::Validated)),
        Some(_) => Err(bad_request("Unknown status filter (use active or validated)")),
    }
}

fn page(limit: Option<u32>, offset: Option<u32>) -> (i64, i64) {
    (
        i64::from(limit.unwrap_or(20).min(100)),
        i64::from(offset.unwrap_or(0)),
    )
}

/// Read the optional `Idempotency-Key` header for a purchase.
fn purchase_key(headers: &HeaderMap) -> Result<Option<Uuid>, Response> {
    let Some(raw) = headers.get("idempotency-key") else {
        return Ok(None);
    };
    raw.to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .map(Some)
        .ok_or_else(|| bad_request("Idempotency-Key must be a UUID"))
}

// --- Event catalog ---

pub async fn api_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EventsQuery>,
) -> impl IntoResponse {
    let (limit, offset) = page(params.limit, params.offset);
    match Event::list(params.search.as_deref(), limit, offset, &state.pool).await {
        Ok(events) => Json(serde_json::json!({ "events": events })).into_response(),
        Err(e) => domain_error(e, "Failed to list events"),
    }
}

pub async fn api_create_event(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(body): Json<NewEvent>,
) -> impl IntoResponse {
    match events::create_event(&principal, &body, &state.pool).await {
        Ok(event) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "event": event })),
        )
            .into_response(),
        Err(e) => domain_error(e, "Failed to create event"),
    }
}

pub async fn api_event_detail(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<Uuid>,
) -> impl IntoResponse {
    match events::require_event(event_id, &state.pool).await {
        Ok(event) => Json(serde_json::json!({ "event": event })).into_response(),
        Err(e) => domain_error(e, "Failed to load event"),
    }
}

pub async fn api_update_event(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(event_id): Path<Uuid>,
    Json(body): Json<EventPatch>,
) -> impl IntoResponse {
    match events::update_event(&principal, event_id, &body, &state.pool).await {
        Ok(event) => Json(serde_json::json!({ "event": event })).into_response(),
        Err(e) => domain_error(e, "Failed to update event"),
    }
}

pub async fn api_delete_event(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(event_id): Path<Uuid>,
) -> impl IntoResponse {
    match events::delete_event(&principal, event_id, &state.pool).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => domain_error(e, "Failed to delete event"),
    }
}

// --- Packages ---

pub async fn api_event_packages(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<Uuid>,
) -> impl IntoResponse {
    match Package::list_by_event(event_id, &state.pool).await {
        Ok(packages) => Json(serde_json::json!({ "packages": packages })).into_response(),
        Err(e) => domain_error(e, "Failed to list packages"),
    }
}

pub async fn api_create_package(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(event_id): Path<Uuid>,
    Json(body): Json<NewPackage>,
) -> impl IntoResponse {
    match inventory::create_package(&principal, event_id, &body, &state.pool).await {
        Ok(package) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "package": package })),
        )
            .into_response(),
        Err(e) => domain_error(e, "Failed to create package"),
    }
}

pub async fn api_update_package(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(package_id): Path<Uuid>,
    Json(body): Json<PackagePatch>,
) -> impl IntoResponse {
    match inventory::update_package(&principal, package_id, &body, &state.pool).await {
        Ok(package) => Json(serde_json::json!({ "package": package })).into_response(),
        Err(e) => domain_error(e, "Failed to update package"),
    }
}

pub async fn api_delete_package(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(package_id): Path<Uuid>,
) -> impl IntoResponse {
    match inventory::delete_package(&principal, package_id, &state.pool).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => domain_error(e, "Failed to delete package"),
    }
}

// --- Tickets ---

pub async fn api_buy_ticket(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(package_id): Path<Uuid>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let key = match purchase_key(&headers) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    match tickets::buy(&principal, package_id, key, &state.pool).await {
        Ok(ticket) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "ticket": ticket })),
        )
            .into_response(),
        Err(e) => domain_error(e, "Failed to buy ticket"),
    }
}

pub async fn api_event_tickets(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(_principal): AuthPrincipal,
    Path(event_id): Path<Uuid>,
    Query(params): Query<TicketsQuery>,
) -> impl IntoResponse {
    let status = match parse_status(params.status.as_deref()) {
        Ok(status) => status,
        Err(resp) => return resp,
    };
    let (limit, offset) = page(params.limit, params.offset);

    let listing = Ticket::list_by_event(
        event_id,
        status,
        params.search.as_deref(),
        limit,
        offset,
        &state.pool,
    )
    .await;
    match listing {
        Ok(rows) => {
            let counts = match Ticket::count_by_event(event_id, &state.pool).await {
                Ok(counts) => counts,
                Err(e) => return domain_error(e, "Failed to count event tickets"),
            };
            Json(serde_json::json!({ "tickets": rows, "counts": counts })).into_response()
        }
        Err(e) => domain_error(e, "Failed to list event tickets"),
    }
}

pub async fn api_my_tickets(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(principal): AuthPrincipal,
    Query(params): Query<MineQuery>,
) -> impl IntoResponse {
    let status = match parse_status(params.status.as_deref()) {
        Ok(status) => status,
        Err(resp) => return resp,
    };
    let (limit, offset) = page(params.limit, params.offset);

    match Ticket::list_by_owner(principal.id, status, limit, offset, &state.pool).await {
        Ok(rows) => Json(serde_json::json!({ "tickets": rows })).into_response(),
        Err(e) => domain_error(e, "Failed to list own tickets"),
    }
}

pub async fn api_validate_ticket(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(ticket_id): Path<Uuid>,
) -> impl IntoResponse {
    match tickets::validate(&principal, ticket_id, &state.pool).await {
        Ok(ticket) => Json(serde_json::json!({ "ticket": ticket })).into_response(),
        Err(e) => domain_error(e, "Failed to validate ticket"),
    }
}

pub async fn api_transfer_ticket(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<TransferRequest>,
) -> impl IntoResponse {
    match tickets::transfer(&principal, ticket_id, body.recipient_id, &state.pool).await {
        Ok(ticket) => Json(serde_json::json!({ "ticket": ticket })).into_response(),
        Err(e) => domain_error(e, "Failed to transfer ticket"),
    }
}

pub async fn api_delete_ticket(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(ticket_id): Path<Uuid>,
) -> impl IntoResponse {
    match tickets::delete(&principal, ticket_id, &state.pool).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => domain_error(e, "Failed to delete ticket"),
    }
}

// --- Committee registry ---

pub async fn api_committee_members(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(_principal): AuthPrincipal,
    Path(event_id): Path<Uuid>,
) -> impl IntoResponse {
    match CommitteeMembership::list_by_event(event_id, &state.pool).await {
        Ok(members) => Json(serde_json::json!({ "members": members })).into_response(),
        Err(e) => domain_error(e, "Failed to list committee members"),
    }
}

pub async fn api_add_committee_member(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(event_id): Path<Uuid>,
    Json(body): Json<AddMemberRequest>,
) -> impl IntoResponse {
    match committee::add_member(&principal, event_id, body.user_id, &state.pool).await {
        Ok(membership) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "membership": membership })),
        )
            .into_response(),
        Err(e) => domain_error(e, "Failed to add committee member"),
    }
}

pub async fn api_remove_committee_member(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(principal): AuthPrincipal,
    Path((event_id, user_id)): Path<(Uuid, Uuid)>,
) -> impl IntoResponse {
    match committee::remove_member(&principal, event_id, user_id, &state.pool).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => domain_error(e, "Failed to remove committee member"),
    }
}

pub async fn api_quit_committee(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(event_id): Path<Uuid>,
) -> impl IntoResponse {
    match committee::quit(&principal, event_id, &state.pool).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => domain_error(e, "Failed to quit committee"),
    }
}

pub async fn api_my_committees(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(principal): AuthPrincipal,
) -> impl IntoResponse {
    match CommitteeMembership::events_for_member(principal.id, &state.pool).await {
        Ok(events) => Json(serde_json::json!({ "events": events })).into_response(),
        Err(e) => domain_error(e, "Failed to list own committees"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_clamps_limit() {
        assert_eq!(page(None, None), (20, 0));
        assert_eq!(page(Some(5), Some(40)), (5, 40));
        assert_eq!(page(Some(5000), None), (100, 0));
    }

    #[test]
    fn parse_status_accepts_known_values() {
        assert_eq!(parse_status(None).unwrap(), None);
        assert_eq!(parse_status(Some("")).unwrap(), None);
        assert_eq!(
            parse_status(Some("active")).unwrap(),
            Some(TicketStatus::Active)
        );
        assert_eq!(
            parse_status(Some(" Validated ")).unwrap(),
            Some(TicketStatus::Validated)
        );
        assert!(parse_status(Some("expired")).is_err());
    }

    #[test]
    fn purchase_key_parses_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(purchase_key(&headers).unwrap(), None);

        let key = Uuid::new_v4();
        headers.insert("idempotency-key", key.to_string().parse().unwrap());
        assert_eq!(purchase_key(&headers).unwrap(), Some(key));

        headers.insert("idempotency-key", "not-a-uuid".parse().unwrap());
        assert!(purchase_key(&headers).is_err());
    }
}

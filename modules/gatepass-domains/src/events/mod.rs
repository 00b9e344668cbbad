pub mod event;

pub use event::{Event, EventPatch, NewEvent};

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use gatepass_common::{GatepassError, Principal, Result};

use crate::authz::{self, Action, ResourceFacts};

/// Create an event owned by the caller. Admin only.
pub async fn create_event(principal: &Principal, new: &NewEvent, pool: &PgPool) -> Result<Event> {
    authz::require(
        principal,
        Action::CreateEvent,
        &ResourceFacts::default(),
        "create event",
    )?;

    let event = Event::create(principal.id, new, pool).await?;
    info!(event_id = %event.id, owner = %principal.id, "Event created");
    Ok(event)
}

pub async fn update_event(
    principal: &Principal,
    event_id: Uuid,
    patch: &EventPatch,
    pool: &PgPool,
) -> Result<Event> {
    let event = require_event(event_id, pool).await?;
    let facts = ResourceFacts {
        event_owner: Some(event.user_id),
        ..Default::default()
    };
    authz::require(principal, Action::UpdateEvent, &facts, "update event")?;

    Event::update(event_id, patch, pool)
        .await?
        .ok_or_else(|| GatepassError::NotFound(format!("event {event_id}")))
}

pub async fn delete_event(principal: &Principal, event_id: Uuid, pool: &PgPool) -> Result<()> {
    let event = require_event(event_id, pool).await?;
    let facts = ResourceFacts {
        event_owner: Some(event.user_id),
        ..Default::default()
    };
    authz::require(principal, Action::DeleteEvent, &facts, "delete event")?;

    if Event::delete(event_id, pool).await? == 0 {
        return Err(GatepassError::NotFound(format!("event {event_id}")));
    }
    info!(event_id = %event_id, by = %principal.id, "Event deleted");
    Ok(())
}

/// Fetch an event or fail with the typed not-found error.
pub async fn require_event(event_id: Uuid, pool: &PgPool) -> Result<Event> {
    Event::find_by_id(event_id, pool)
        .await?
        .ok_or_else(|| GatepassError::NotFound(format!("event {event_id}")))
}

pub mod membership;

pub use membership::{CommitteeMember, CommitteeMembership};

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use gatepass_common::{GatepassError, Principal, Result};

use crate::authz::{self, Action, ResourceFacts};
use crate::events;
use crate::users::User;

/// Grant the validate capability for one event. Admin who owns the event only.
pub async fn add_member(
    principal: &Principal,
    event_id: Uuid,
    user_id: Uuid,
    pool: &PgPool,
) -> Result<CommitteeMembership> {
    let event = events::require_event(event_id, pool).await?;
    let facts = ResourceFacts {
        event_owner: Some(event.user_id),
        ..Default::default()
    };
    authz::require(principal, Action::AddCommittee, &facts, "add committee member")?;

    User::find_by_id(user_id, pool)
        .await?
        .ok_or_else(|| GatepassError::NotFound(format!("user {user_id}")))?;

    let membership = CommitteeMembership::add(event_id, user_id, pool).await?;
    info!(event_id = %event_id, user_id = %user_id, by = %principal.id, "Committee member added");
    Ok(membership)
}

pub async fn remove_member(
    principal: &Principal,
    event_id: Uuid,
    user_id: Uuid,
    pool: &PgPool,
) -> Result<()> {
    let event = events::require_event(event_id, pool).await?;
    let facts = ResourceFacts {
        event_owner: Some(event.user_id),
        ..Default::default()
    };
    authz::require(
        principal,
        Action::RemoveCommittee,
        &facts,
        "remove committee member",
    )?;

    CommitteeMembership::remove(event_id, user_id, pool).await?;
    info!(event_id = %event_id, user_id = %user_id, by = %principal.id, "Committee member removed");
    Ok(())
}

/// Leave a committee. Needs no role at all, only an existing membership row
/// naming the caller.
pub async fn quit(principal: &Principal, event_id: Uuid, pool: &PgPool) -> Result<()> {
    let membership = CommitteeMembership::find(event_id, principal.id, pool)
        .await?
        .ok_or_else(|| {
            GatepassError::NotFound(format!("committee membership for event {event_id}"))
        })?;

    let facts = ResourceFacts {
        membership_principal: Some(membership.user_id),
        ..Default::default()
    };
    authz::require(principal, Action::QuitCommittee, &facts, "quit committee")?;

    CommitteeMembership::remove(event_id, principal.id, pool).await?;
    info!(event_id = %event_id, user_id = %principal.id, "Committee membership quit");
    Ok(())
}

//! Ticket workflows: purchase, validation, transfer, deletion.
//!
//! Each operation decides authorization first, on facts fetched outside any
//! transaction, then performs a single atomic mutation. A request dropped
//! mid-flight rolls its transaction back, so a reservation without a ticket
//! (or the reverse) cannot be left behind.

pub mod ticket;

pub use ticket::{OwnedTicket, Ticket, TicketCounts, TicketWithOwner};

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use gatepass_common::{GatepassError, Principal, Result};

use crate::authz::{self, Action, Decision, ResourceFacts};
use crate::committee::CommitteeMembership;
use crate::events;
use crate::inventory::{self, Package};
use crate::users::User;

/// Buy one ticket from a package.
///
/// The stock decrement and the ticket insert share one transaction; the
/// decrement carries its own precondition, so concurrent buys against the
/// last ticket leave exactly one winner. A `purchase_key` makes the call
/// replay-safe: retrying with the same key returns the original ticket and
/// charges stock once. The key is scoped to its first use; replaying it as
/// another buyer or against another package is rejected as key reuse.
pub async fn buy(
    principal: &Principal,
    package_id: Uuid,
    purchase_key: Option<Uuid>,
    pool: &PgPool,
) -> Result<Ticket> {
    authz::require(
        principal,
        Action::BuyTicket,
        &ResourceFacts::default(),
        "buy ticket",
    )?;

    if let Some(key) = purchase_key {
        if let Some(existing) = Ticket::find_by_purchase_key(key, pool).await? {
            return replay(existing, principal, package_id, key);
        }
    }

    let mut tx = pool.begin().await?;
    if let Err(err) = Package::reserve(package_id, 1, &mut *tx).await {
        tx.rollback().await?;
        // A concurrent retry of the same purchase may have drained the last
        // ticket between the pre-check and here; it still gets its ticket
        // back instead of InsufficientStock.
        if let (GatepassError::InsufficientStock(_), Some(key)) = (&err, purchase_key) {
            if let Some(existing) = Ticket::find_by_purchase_key(key, pool).await? {
                return replay(existing, principal, package_id, key);
            }
        }
        return Err(err);
    }
    let issued = Ticket::issue(principal.id, package_id, purchase_key, &mut *tx).await?;

    match issued {
        Some(ticket) => {
            tx.commit().await?;
            info!(
                ticket_id = %ticket.id,
                package_id = %package_id,
                buyer = %principal.id,
                "Ticket issued"
            );
            Ok(ticket)
        }
        None => {
            // Lost the purchase-key race to a concurrent request. Rolling
            // back undoes the reservation; the winner's ticket is the result.
            tx.rollback().await?;
            let key = purchase_key.ok_or_else(|| {
                GatepassError::InvalidState("ticket insert returned no row".into())
            })?;
            let existing = Ticket::find_by_purchase_key(key, pool)
                .await?
                .ok_or_else(|| {
                    GatepassError::InvalidState(format!("purchase key {key} has no ticket"))
                })?;
            replay(existing, principal, package_id, key)
        }
    }
}

/// A purchase key only replays the purchase it was first used for: same
/// buyer, same package. Anything else is key reuse, not a retry.
fn replay(existing: Ticket, principal: &Principal, package_id: Uuid, key: Uuid) -> Result<Ticket> {
    if existing.user_id != principal.id || existing.package_id != package_id {
        return Err(GatepassError::InvalidState(format!(
            "purchase key {key} was already used for a different purchase"
        )));
    }
    info!(ticket_id = %existing.id, purchase_key = %key, "Purchase replayed");
    Ok(existing)
}

/// Validate a ticket at the gate. Committee members of the ticket's event
/// only; one-way and exactly once.
pub async fn validate(principal: &Principal, ticket_id: Uuid, pool: &PgPool) -> Result<Ticket> {
    let ticket = require_ticket(ticket_id, pool).await?;
    let package = inventory::require_package(ticket.package_id, pool).await?;

    let member = CommitteeMembership::is_member(package.event_id, principal.id, pool).await?;
    let facts = ResourceFacts {
        committee_member: member,
        ..Default::default()
    };
    authz::require(principal, Action::ValidateTicket, &facts, "validate ticket")?;

    let validated = Ticket::validate(ticket_id, principal.id, pool).await?;
    info!(
        ticket_id = %ticket_id,
        event_id = %package.event_id,
        validator = %principal.id,
        "Ticket validated"
    );
    Ok(validated)
}

/// Hand a ticket to another user. Only the current owner may transfer, only
/// while the ticket is still Active, and only to a recipient that exists.
pub async fn transfer(
    principal: &Principal,
    ticket_id: Uuid,
    recipient_id: Uuid,
    pool: &PgPool,
) -> Result<Ticket> {
    let ticket = require_ticket(ticket_id, pool).await?;
    let facts = ResourceFacts {
        ticket_owner: Some(ticket.user_id),
        ..Default::default()
    };
    if authz::decide(principal, Action::TransferTicket, &facts) == Decision::Deny {
        return Err(GatepassError::NotOwner(ticket_id));
    }
    if ticket.validated_at.is_some() {
        return Err(GatepassError::AlreadyValidated(ticket_id));
    }

    User::find_by_id(recipient_id, pool)
        .await?
        .ok_or_else(|| GatepassError::NotFound(format!("recipient {recipient_id}")))?;

    let transferred = Ticket::transfer(ticket_id, principal.id, recipient_id, pool).await?;
    info!(
        ticket_id = %ticket_id,
        from = %principal.id,
        to = %recipient_id,
        "Ticket transferred"
    );
    Ok(transferred)
}

/// Delete a ticket. Owners may always delete their own; an admin may delete
/// any ticket of an event they own.
///
/// Deleting an Active ticket releases its reservation in the same
/// transaction. A Validated ticket was consumed at the gate, so its deletion
/// leaves stock untouched.
pub async fn delete(principal: &Principal, ticket_id: Uuid, pool: &PgPool) -> Result<()> {
    let ticket = require_ticket(ticket_id, pool).await?;
    let package = inventory::require_package(ticket.package_id, pool).await?;
    let event = events::require_event(package.event_id, pool).await?;

    let facts = ResourceFacts {
        ticket_owner: Some(ticket.user_id),
        event_owner: Some(event.user_id),
        ..Default::default()
    };
    authz::require(principal, Action::DeleteTicket, &facts, "delete ticket")?;

    let mut tx = pool.begin().await?;
    let removed = Ticket::remove(ticket_id, &mut *tx)
        .await?
        .ok_or_else(|| GatepassError::NotFound(format!("ticket {ticket_id}")))?;
    if removed.validated_at.is_none() {
        Package::release(removed.package_id, 1, &mut *tx).await?;
    }
    tx.commit().await?;

    info!(
        ticket_id = %ticket_id,
        by = %principal.id,
        restocked = removed.validated_at.is_none(),
        "Ticket deleted"
    );
    Ok(())
}

async fn require_ticket(ticket_id: Uuid, pool: &PgPool) -> Result<Ticket> {
    Ticket::find_by_id(ticket_id, pool)
        .await?
        .ok_or_else(|| GatepassError::NotFound(format!("ticket {ticket_id}")))
}

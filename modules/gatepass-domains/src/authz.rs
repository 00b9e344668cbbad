//! Authorization decisions for every mutating operation.
//!
//! The evaluator is a pure function over pre-fetched facts: callers resolve
//! event ownership, ticket ownership and committee membership first, then ask
//! for a decision. No I/O happens here, so the whole rule table is testable
//! as plain data.

use gatepass_common::{GatepassError, Principal, Result};
use uuid::Uuid;

/// A mutating operation a principal may attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
    AddCommittee,
    RemoveCommittee,
    QuitCommittee,
    CreatePackage,
    UpdatePackage,
    DeletePackage,
    BuyTicket,
    ValidateTicket,
    TransferTicket,
    DeleteTicket,
}

/// Ownership and membership facts about the resource under decision.
/// Fetched by the workflow before any transaction opens; absent facts
/// (None / false) can only ever deny.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceFacts {
    /// Owner of the event in play: the event itself for event actions, the
    /// parent event for packages, tickets and committee rows.
    pub event_owner: Option<Uuid>,
    /// Current owner of the ticket, for ticket actions.
    pub ticket_owner: Option<Uuid>,
    /// Principal named by the membership row being quit.
    pub membership_principal: Option<Uuid>,
    /// Whether the acting principal sits on the event's committee.
    pub committee_member: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Ordered rule set, first match wins, deny by default.
///
/// Committee membership is the only capability that validates tickets; the
/// admin role alone does not. Quit needs no role at all, only identity with
/// the membership row.
pub fn decide(principal: &Principal, action: Action, facts: &ResourceFacts) -> Decision {
    let owns_event = facts.event_owner == Some(principal.id);
    let owns_ticket = facts.ticket_owner == Some(principal.id);

    let allowed = match action {
        Action::CreateEvent => principal.is_admin(),
        Action::UpdateEvent | Action::DeleteEvent => principal.is_admin() && owns_event,
        Action::AddCommittee | Action::RemoveCommittee => principal.is_admin() && owns_event,
        Action::QuitCommittee => facts.membership_principal == Some(principal.id),
        Action::CreatePackage | Action::UpdatePackage | Action::DeletePackage => {
            principal.is_admin() && owns_event
        }
        Action::BuyTicket => true,
        Action::ValidateTicket => facts.committee_member,
        Action::TransferTicket => owns_ticket,
        Action::DeleteTicket => owns_ticket || (principal.is_admin() && owns_event),
    };

    if allowed {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

/// Gate for workflow call sites: deny becomes the typed `Forbidden` error.
pub fn require(
    principal: &Principal,
    action: Action,
    facts: &ResourceFacts,
    what: &str,
) -> Result<()> {
    match decide(principal, action, facts) {
        Decision::Allow => Ok(()),
        Decision::Deny => Err(GatepassError::Forbidden(what.to_string())),
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated actor. Resolved by the request layer (bearer token),
/// passed into the domain layer as a plain fact and never re-derived there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn new(id: Uuid, roles: Vec<Role>) -> Self {
        Self { id, roles }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

/// Global roles. Committee membership is deliberately not a role: it is a
/// per-event capability held in the committee registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// Ticket lifecycle state, derived from the validation columns.
/// Validated is terminal for both validation and transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Active,
    Validated,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketStatus::Active => write!(f, "active"),
            TicketStatus::Validated => write!(f, "validated"),
        }
    }
}

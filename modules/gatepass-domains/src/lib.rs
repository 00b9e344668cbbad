pub mod authz;
pub mod committee;
pub mod events;
pub mod inventory;
pub mod tickets;
pub mod users;

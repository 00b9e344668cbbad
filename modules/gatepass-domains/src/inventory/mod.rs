pub mod package;

pub use package::{NewPackage, Package, PackagePatch};

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use gatepass_common::{GatepassError, Principal, Result};

use crate::authz::{self, Action, ResourceFacts};
use crate::events;

pub async fn create_package(
    principal: &Principal,
    event_id: Uuid,
    new: &NewPackage,
    pool: &PgPool,
) -> Result<Package> {
    let event = events::require_event(event_id, pool).await?;
    let facts = ResourceFacts {
        event_owner: Some(event.user_id),
        ..Default::default()
    };
    authz::require(principal, Action::CreatePackage, &facts, "create package")?;

    if new.price < 0 {
        return Err(GatepassError::InvalidState("price must be non-negative".into()));
    }
    if new.total_tickets_available < 0 {
        return Err(GatepassError::InvalidState("stock must be non-negative".into()));
    }
    if new.tickets_per_package < 1 {
        return Err(GatepassError::InvalidState(
            "tickets_per_package must be at least 1".into(),
        ));
    }

    let package = Package::create(event_id, new, pool).await?;
    info!(package_id = %package.id, event_id = %event_id, "Package created");
    Ok(package)
}

pub async fn update_package(
    principal: &Principal,
    package_id: Uuid,
    patch: &PackagePatch,
    pool: &PgPool,
) -> Result<Package> {
    let package = require_package(package_id, pool).await?;
    let event = events::require_event(package.event_id, pool).await?;
    let facts = ResourceFacts {
        event_owner: Some(event.user_id),
        ..Default::default()
    };
    authz::require(principal, Action::UpdatePackage, &facts, "update package")?;

    if patch.price.is_some_and(|p| p < 0) {
        return Err(GatepassError::InvalidState("price must be non-negative".into()));
    }
    if patch.total_tickets_available.is_some_and(|t| t < 0) {
        return Err(GatepassError::InvalidState("stock must be non-negative".into()));
    }
    if patch.tickets_per_package.is_some_and(|t| t < 1) {
        return Err(GatepassError::InvalidState(
            "tickets_per_package must be at least 1".into(),
        ));
    }

    Package::update(package_id, patch, pool)
        .await?
        .ok_or_else(|| GatepassError::NotFound(format!("package {package_id}")))
}

pub async fn delete_package(principal: &Principal, package_id: Uuid, pool: &PgPool) -> Result<()> {
    let package = require_package(package_id, pool).await?;
    let event = events::require_event(package.event_id, pool).await?;
    let facts = ResourceFacts {
        event_owner: Some(event.user_id),
        ..Default::default()
    };
    authz::require(principal, Action::DeletePackage, &facts, "delete package")?;

    if Package::delete(package_id, pool).await? == 0 {
        return Err(GatepassError::NotFound(format!("package {package_id}")));
    }
    info!(package_id = %package_id, by = %principal.id, "Package deleted");
    Ok(())
}

/// Fetch a package or fail with the typed not-found error.
pub async fn require_package(package_id: Uuid, pool: &PgPool) -> Result<Package> {
    Package::find_by_id(package_id, pool)
        .await?
        .ok_or_else(|| GatepassError::NotFound(format!("package {package_id}")))
}

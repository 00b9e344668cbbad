//! Integration tests for the ticket workflows.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

mod support;

use sqlx::PgPool;
use uuid::Uuid;

use gatepass_common::{GatepassError, Principal, TicketStatus};
use gatepass_domains::committee;
use gatepass_domains::inventory::{self, NewPackage, Package};
use gatepass_domains::tickets::{self, Ticket};
use gatepass_domains::users::User;

use support::{new_principal, scene, test_pool, Scene};

async fn stock_of(package_id: Uuid, pool: &PgPool) -> i32 {
    Package::find_by_id(package_id, pool)
        .await
        .unwrap()
        .unwrap()
        .total_tickets_available
}

/// Put `principal` on the event's committee.
async fn enlist(scene: &Scene, principal: &Principal, pool: &PgPool) {
    committee::add_member(&scene.owner, scene.event.id, principal.id, pool)
        .await
        .unwrap();
}

// =========================================================================
// Purchase
// =========================================================================

#[tokio::test]
async fn buy_decrements_stock_and_issues_active_ticket() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(5, &pool).await;
    let buyer = new_principal(false, &pool).await;

    let ticket = tickets::buy(&buyer, scene.package.id, None, &pool)
        .await
        .unwrap();

    assert_eq!(ticket.user_id, buyer.id);
    assert_eq!(ticket.package_id, scene.package.id);
    assert_eq!(ticket.status(), TicketStatus::Active);
    assert_eq!(stock_of(scene.package.id, &pool).await, 4);
}

#[tokio::test]
async fn buy_unknown_package_is_not_found() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let buyer = new_principal(false, &pool).await;

    let err = tickets::buy(&buyer, Uuid::new_v4(), None, &pool)
        .await
        .unwrap_err();
    assert!(matches!(err, GatepassError::NotFound(_)));
}

#[tokio::test]
async fn sequential_buys_stop_at_zero_stock() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(2, &pool).await;
    let buyer = new_principal(false, &pool).await;

    tickets::buy(&buyer, scene.package.id, None, &pool).await.unwrap();
    tickets::buy(&buyer, scene.package.id, None, &pool).await.unwrap();
    let err = tickets::buy(&buyer, scene.package.id, None, &pool)
        .await
        .unwrap_err();

    assert!(matches!(err, GatepassError::InsufficientStock(_)));
    assert_eq!(stock_of(scene.package.id, &pool).await, 0);
}

#[tokio::test]
async fn concurrent_buys_on_last_ticket_leave_one_winner() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(1, &pool).await;
    let alice = new_principal(false, &pool).await;
    let bob = new_principal(false, &pool).await;

    let (a, b) = tokio::join!(
        tickets::buy(&alice, scene.package.id, None, &pool),
        tickets::buy(&bob, scene.package.id, None, &pool),
    );

    let results = [a, b];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one of two concurrent buys may succeed");
    let losses = results
        .iter()
        .filter(|r| matches!(r, Err(GatepassError::InsufficientStock(_))))
        .count();
    assert_eq!(losses, 1);
    assert_eq!(stock_of(scene.package.id, &pool).await, 0);
}

#[tokio::test]
async fn purchase_key_replay_returns_original_ticket() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(5, &pool).await;
    let buyer = new_principal(false, &pool).await;
    let key = Uuid::new_v4();

    let first = tickets::buy(&buyer, scene.package.id, Some(key), &pool)
        .await
        .unwrap();
    let replay = tickets::buy(&buyer, scene.package.id, Some(key), &pool)
        .await
        .unwrap();

    assert_eq!(first.id, replay.id);
    assert_eq!(stock_of(scene.package.id, &pool).await, 4, "stock charged once");
}

#[tokio::test]
async fn concurrent_buys_sharing_a_key_converge_on_one_ticket() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(3, &pool).await;
    let buyer = new_principal(false, &pool).await;
    let key = Uuid::new_v4();

    let (a, b) = tokio::join!(
        tickets::buy(&buyer, scene.package.id, Some(key), &pool),
        tickets::buy(&buyer, scene.package.id, Some(key), &pool),
    );

    let a = a.unwrap();
    let b = b.unwrap();
    assert_eq!(a.id, b.id, "both calls settle on the winner's ticket");
    assert_eq!(stock_of(scene.package.id, &pool).await, 2, "stock charged once");
}

#[tokio::test]
async fn concurrent_keyed_retry_on_last_ticket_still_replays() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(1, &pool).await;
    let buyer = new_principal(false, &pool).await;
    let key = Uuid::new_v4();

    // The loser may fail its reservation before it ever reaches the key
    // conflict; a retry of a successful purchase still gets the ticket
    // back, never InsufficientStock.
    let (a, b) = tokio::join!(
        tickets::buy(&buyer, scene.package.id, Some(key), &pool),
        tickets::buy(&buyer, scene.package.id, Some(key), &pool),
    );

    let a = a.unwrap();
    let b = b.unwrap();
    assert_eq!(a.id, b.id);
    assert_eq!(stock_of(scene.package.id, &pool).await, 0);
}

#[tokio::test]
async fn purchase_key_is_scoped_to_buyer_and_package() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(5, &pool).await;
    let alice = new_principal(false, &pool).await;
    let mallory = new_principal(false, &pool).await;
    let key = Uuid::new_v4();

    let ticket = tickets::buy(&alice, scene.package.id, Some(key), &pool)
        .await
        .unwrap();

    // Someone else replaying the key must not be handed Alice's ticket.
    let err = tickets::buy(&mallory, scene.package.id, Some(key), &pool)
        .await
        .unwrap_err();
    assert!(matches!(err, GatepassError::InvalidState(_)));

    // Nor does the key carry over to a different package.
    let other = inventory::create_package(
        &scene.owner,
        scene.event.id,
        &NewPackage {
            name: "Balcony".into(),
            tickets_per_package: 1,
            total_tickets_available: 5,
            price: 90_000,
        },
        &pool,
    )
    .await
    .unwrap();
    let err = tickets::buy(&alice, other.id, Some(key), &pool)
        .await
        .unwrap_err();
    assert!(matches!(err, GatepassError::InvalidState(_)));

    let kept = Ticket::find_by_id(ticket.id, &pool).await.unwrap().unwrap();
    assert_eq!(kept.user_id, alice.id, "original purchase untouched");
    assert_eq!(stock_of(scene.package.id, &pool).await, 4);
    assert_eq!(stock_of(other.id, &pool).await, 5);
}

// =========================================================================
// Validation
// =========================================================================

#[tokio::test]
async fn validate_is_one_way_and_exactly_once() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(3, &pool).await;
    let buyer = new_principal(false, &pool).await;
    let gatekeeper = new_principal(false, &pool).await;
    enlist(&scene, &gatekeeper, &pool).await;

    let ticket = tickets::buy(&buyer, scene.package.id, None, &pool)
        .await
        .unwrap();

    let validated = tickets::validate(&gatekeeper, ticket.id, &pool)
        .await
        .unwrap();
    assert_eq!(validated.validated_by, Some(gatekeeper.id));
    assert!(validated.validated_at.is_some());
    assert_eq!(validated.status(), TicketStatus::Validated);

    let err = tickets::validate(&gatekeeper, ticket.id, &pool)
        .await
        .unwrap_err();
    assert!(matches!(err, GatepassError::AlreadyValidated(_)));
}

#[tokio::test]
async fn concurrent_validations_have_one_winner() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(3, &pool).await;
    let buyer = new_principal(false, &pool).await;
    let gate_a = new_principal(false, &pool).await;
    let gate_b = new_principal(false, &pool).await;
    enlist(&scene, &gate_a, &pool).await;
    enlist(&scene, &gate_b, &pool).await;

    let ticket = tickets::buy(&buyer, scene.package.id, None, &pool)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        tickets::validate(&gate_a, ticket.id, &pool),
        tickets::validate(&gate_b, ticket.id, &pool),
    );

    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(GatepassError::AlreadyValidated(_))))
            .count(),
        1
    );
}

#[tokio::test]
async fn validate_requires_committee_membership() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(3, &pool).await;
    let buyer = new_principal(false, &pool).await;
    let ticket = tickets::buy(&buyer, scene.package.id, None, &pool)
        .await
        .unwrap();

    // The event's owning admin is not on the committee either.
    let err = tickets::validate(&scene.owner, ticket.id, &pool)
        .await
        .unwrap_err();
    assert!(matches!(err, GatepassError::Forbidden(_)));

    // Nor may the ticket's own holder wave themselves through.
    let err = tickets::validate(&buyer, ticket.id, &pool).await.unwrap_err();
    assert!(matches!(err, GatepassError::Forbidden(_)));
}

// =========================================================================
// Transfer
// =========================================================================

#[tokio::test]
async fn transfer_moves_ownership_and_keeps_package() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(3, &pool).await;
    let alice = new_principal(false, &pool).await;
    let bob = new_principal(false, &pool).await;

    let ticket = tickets::buy(&alice, scene.package.id, None, &pool)
        .await
        .unwrap();
    let moved = tickets::transfer(&alice, ticket.id, bob.id, &pool)
        .await
        .unwrap();

    assert_eq!(moved.user_id, bob.id);
    assert_eq!(moved.package_id, ticket.package_id);

    // The previous owner has no say anymore.
    let err = tickets::transfer(&alice, ticket.id, alice.id, &pool)
        .await
        .unwrap_err();
    assert!(matches!(err, GatepassError::NotOwner(_)));
}

#[tokio::test]
async fn transfer_to_unknown_recipient_is_not_found() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(3, &pool).await;
    let alice = new_principal(false, &pool).await;
    let ticket = tickets::buy(&alice, scene.package.id, None, &pool)
        .await
        .unwrap();

    let err = tickets::transfer(&alice, ticket.id, Uuid::new_v4(), &pool)
        .await
        .unwrap_err();
    assert!(matches!(err, GatepassError::NotFound(_)));
}

#[tokio::test]
async fn validated_tickets_cannot_transfer() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(3, &pool).await;
    let alice = new_principal(false, &pool).await;
    let bob = new_principal(false, &pool).await;
    let gatekeeper = new_principal(false, &pool).await;
    enlist(&scene, &gatekeeper, &pool).await;

    let ticket = tickets::buy(&alice, scene.package.id, None, &pool)
        .await
        .unwrap();
    tickets::validate(&gatekeeper, ticket.id, &pool).await.unwrap();

    let err = tickets::transfer(&alice, ticket.id, bob.id, &pool)
        .await
        .unwrap_err();
    assert!(matches!(err, GatepassError::AlreadyValidated(_)));
}

// =========================================================================
// Deletion and the restock policy
// =========================================================================

#[tokio::test]
async fn delete_by_stranger_is_forbidden() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(3, &pool).await;
    let alice = new_principal(false, &pool).await;
    let stranger = new_principal(false, &pool).await;

    let ticket = tickets::buy(&alice, scene.package.id, None, &pool)
        .await
        .unwrap();

    let err = tickets::delete(&stranger, ticket.id, &pool).await.unwrap_err();
    assert!(matches!(err, GatepassError::Forbidden(_)));

    let still_there = Ticket::find_by_id(ticket.id, &pool).await.unwrap();
    assert!(still_there.is_some());
}

#[tokio::test]
async fn deleting_active_ticket_restocks() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(2, &pool).await;
    let alice = new_principal(false, &pool).await;

    let ticket = tickets::buy(&alice, scene.package.id, None, &pool)
        .await
        .unwrap();
    assert_eq!(stock_of(scene.package.id, &pool).await, 1);

    tickets::delete(&alice, ticket.id, &pool).await.unwrap();
    assert_eq!(stock_of(scene.package.id, &pool).await, 2);
}

#[tokio::test]
async fn deleting_validated_ticket_does_not_restock() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(2, &pool).await;
    let alice = new_principal(false, &pool).await;
    let gatekeeper = new_principal(false, &pool).await;
    enlist(&scene, &gatekeeper, &pool).await;

    let ticket = tickets::buy(&alice, scene.package.id, None, &pool)
        .await
        .unwrap();
    tickets::validate(&gatekeeper, ticket.id, &pool).await.unwrap();

    tickets::delete(&alice, ticket.id, &pool).await.unwrap();
    assert_eq!(
        stock_of(scene.package.id, &pool).await,
        1,
        "a consumed seat stays consumed"
    );
}

#[tokio::test]
async fn admin_event_owner_can_delete_any_ticket_of_their_event() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(2, &pool).await;
    let alice = new_principal(false, &pool).await;

    let ticket = tickets::buy(&alice, scene.package.id, None, &pool)
        .await
        .unwrap();
    tickets::delete(&scene.owner, ticket.id, &pool).await.unwrap();

    let gone = Ticket::find_by_id(ticket.id, &pool).await.unwrap();
    assert!(gone.is_none());
}

// =========================================================================
// Listings
// =========================================================================

#[tokio::test]
async fn event_listing_filters_by_status_and_owner_name() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(5, &pool).await;
    let gatekeeper = new_principal(false, &pool).await;
    enlist(&scene, &gatekeeper, &pool).await;

    let marker = Uuid::new_v4().simple().to_string();
    let named = User::create(
        &format!("Holder {marker}"),
        &format!("{}@example.test", Uuid::new_v4()),
        false,
        &pool,
    )
    .await
    .unwrap();
    let named = Principal::new(named.id, vec![]);
    let other = new_principal(false, &pool).await;

    let validated_ticket = tickets::buy(&named, scene.package.id, None, &pool)
        .await
        .unwrap();
    tickets::buy(&other, scene.package.id, None, &pool).await.unwrap();
    tickets::validate(&gatekeeper, validated_ticket.id, &pool)
        .await
        .unwrap();

    let validated = Ticket::list_by_event(
        scene.event.id,
        Some(TicketStatus::Validated),
        None,
        50,
        0,
        &pool,
    )
    .await
    .unwrap();
    assert_eq!(validated.len(), 1);
    assert_eq!(validated[0].id, validated_ticket.id);

    let by_name = Ticket::list_by_event(scene.event.id, None, Some(&marker), 50, 0, &pool)
        .await
        .unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].user_id, named.id);

    let counts = Ticket::count_by_event(scene.event.id, &pool).await.unwrap();
    assert_eq!(counts.total, 2);
    assert_eq!(counts.validated, 1);
}

#[tokio::test]
async fn owner_listing_is_newest_first_and_scoped() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let scene = scene(5, &pool).await;
    let alice = new_principal(false, &pool).await;
    let bob = new_principal(false, &pool).await;

    let first = tickets::buy(&alice, scene.package.id, None, &pool)
        .await
        .unwrap();
    let second = tickets::buy(&alice, scene.package.id, None, &pool)
        .await
        .unwrap();
    tickets::buy(&bob, scene.package.id, None, &pool).await.unwrap();

    let mine = Ticket::list_by_owner(alice.id, None, 50, 0, &pool)
        .await
        .unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].id, second.id, "newest purchase first");
    assert_eq!(mine[1].id, first.id);
    assert_eq!(mine[0].event_id, scene.event.id);
    assert_eq!(mine[0].event_name, scene.event.name);
}

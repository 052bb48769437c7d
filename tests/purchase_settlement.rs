//! Integration tests for purchase settlement
//!
//! Runs purchases, redos and resets through `TeamService` against the
//! in-memory store and checks balances, holdings and the transaction table.

mod common;

use pretty_assertions::assert_eq;
use std::sync::Arc;

use common::{world_with_settings, World};
use investment_game::{ErrorKind, PurchaseRequest, Settings, ShareChanges};

fn world_with_balance(amount: i64) -> World {
    world_with_settings(Settings {
        default_balance_amount: amount,
        ..Settings::default()
    })
}

fn shares<const N: usize>(pairs: [(i64, i64); N]) -> PurchaseRequest {
    PurchaseRequest::Shares(ShareChanges::from(pairs))
}

// ============================================================================
// Shares purchases
// ============================================================================

#[tokio::test]
async fn test_purchase_then_redo_replaces_round_transaction() {
    let world = world_with_balance(1000);
    let team_id = world.register_team("alpha").await;
    let company = world.company("acme", 100);
    world.open_trade();

    let balance = world.teams.purchase(team_id, shares([(company, 3)])).await.unwrap();
    assert_eq!(balance, 700);

    let balance = world.teams.purchase(team_id, shares([(company, 1)])).await.unwrap();
    assert_eq!(balance, 900);

    let detailed = world.teams.get_detailed_by_id(team_id).await.unwrap();
    assert_eq!(detailed.balance, 900);
    assert_eq!(detailed.team.shares.get(company), 1);

    let transactions = world.store.transactions_for(detailed.team.balance_id);
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].amount, 100);
    assert_eq!(transactions[0].details, Some(ShareChanges::from([(company, 1)])));
}

#[tokio::test]
async fn test_many_redos_keep_one_shares_transaction() {
    let world = world_with_balance(1000);
    let team_id = world.register_team("alpha").await;
    let first = world.company("first", 10);
    let second = world.company("second", 25);
    world.open_trade();

    for (a, b) in [(1, 0), (4, 2), (0, 3), (2, 2)] {
        world
            .teams
            .purchase(team_id, shares([(first, a), (second, b)]))
            .await
            .unwrap();
    }

    // equals buying the last change set from the untouched baseline
    let detailed = world.teams.get_detailed_by_id(team_id).await.unwrap();
    assert_eq!(detailed.balance, 1000 - (2 * 10 + 2 * 25));
    assert_eq!(detailed.team.shares.get(first), 2);
    assert_eq!(detailed.team.shares.get(second), 2);
    assert_eq!(
        world
            .store
            .transactions_for(detailed.team.balance_id)
            .iter()
            .filter(|tr| tr.is_shares_transaction())
            .count(),
        1
    );
}

#[tokio::test]
async fn test_selling_unowned_shares_is_rejected() {
    let world = world_with_balance(1000);
    let team_id = world.register_team("alpha").await;
    let company = world.company("acme", 100);
    world.open_trade();

    let err = world
        .teams
        .purchase(team_id, shares([(company, -5)]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::IncorrectShareCount);
    let detailed = world.teams.get_detailed_by_id(team_id).await.unwrap();
    assert_eq!(detailed.balance, 1000);
    assert_eq!(detailed.team.shares.get(company), 0);
    assert!(world.store.transactions_for(detailed.team.balance_id).is_empty());
}

#[tokio::test]
async fn test_insufficient_balance_leaves_state_untouched() {
    let world = world_with_balance(1000);
    let team_id = world.register_team("alpha").await;
    let company = world.company("acme", 100);
    world.open_trade();
    world.teams.purchase(team_id, shares([(company, 2)])).await.unwrap();

    let err = world
        .teams
        .purchase(team_id, shares([(company, 11)]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    let detailed = world.teams.get_detailed_by_id(team_id).await.unwrap();
    assert_eq!(detailed.balance, 800);
    assert_eq!(detailed.team.shares.get(company), 2);
    let transactions = world.store.transactions_for(detailed.team.balance_id);
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].details, Some(ShareChanges::from([(company, 2)])));
}

#[tokio::test]
async fn test_unpriced_company_costs_nothing() {
    let world = world_with_balance(100);
    let team_id = world.register_team("alpha").await;
    let unpriced = world.store.insert_company("stealth");
    world.open_trade();

    let balance = world.teams.purchase(team_id, shares([(unpriced, 7)])).await.unwrap();

    assert_eq!(balance, 100);
}

// ============================================================================
// Additional info purchases
// ============================================================================

#[tokio::test]
async fn test_info_purchase_can_spend_whole_balance() {
    let world = world_with_balance(50);
    let team_id = world.register_team("alpha").await;
    let expensive = world.company_info(50, 0);
    let cheap = world.company_info(10, 0);
    world.open_trade();

    let balance = world
        .teams
        .purchase(team_id, PurchaseRequest::AdditionalInfo(expensive))
        .await
        .unwrap();
    assert_eq!(balance, 0);

    let err = world
        .teams
        .purchase(team_id, PurchaseRequest::AdditionalInfo(cheap))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);

    let detailed = world.teams.get_detailed_by_id(team_id).await.unwrap();
    assert_eq!(detailed.balance, 0);
    assert_eq!(detailed.team.additional_info_ids, vec![expensive]);
    assert_eq!(detailed.additional_infos.len(), 1);
}

#[tokio::test]
async fn test_info_and_shares_transactions_coexist() {
    let world = world_with_balance(1000);
    let team_id = world.register_team("alpha").await;
    let company = world.company("acme", 100);
    let info = world.company_info(30, 0);
    world.open_trade();

    world.teams.purchase(team_id, shares([(company, 1)])).await.unwrap();
    world
        .teams
        .purchase(team_id, PurchaseRequest::AdditionalInfo(info))
        .await
        .unwrap();
    let balance = world.teams.purchase(team_id, shares([(company, 2)])).await.unwrap();

    assert_eq!(balance, 1000 - 30 - 200);
    let balance_id = world.teams.get_detailed_by_id(team_id).await.unwrap().team.balance_id;
    assert_eq!(world.store.transactions_for(balance_id).len(), 2);
}

// ============================================================================
// Reset
// ============================================================================

#[tokio::test]
async fn test_reset_restores_pre_purchase_view() {
    let world = world_with_balance(1000);
    let team_id = world.register_team("alpha").await;
    let company = world.company("acme", 100);
    world.open_trade();
    world.teams.purchase(team_id, shares([(company, 3)])).await.unwrap();

    let view = world.teams.reset_transaction(team_id).await.unwrap();
    assert_eq!(view.balance, 1000);
    assert!(!view.has_transaction_in_this_round);

    let again = world.teams.get_detailed_by_id(team_id).await.unwrap();
    assert_eq!(again, view);
    assert_eq!(again.team.shares.get(company), 0);
}

#[tokio::test]
async fn test_reset_works_outside_trade_period() {
    let world = world_with_balance(1000);
    let team_id = world.register_team("alpha").await;
    let company = world.company("acme", 100);
    world.open_trade();
    world.teams.purchase(team_id, shares([(company, 3)])).await.unwrap();
    world.teams.set_trade_period_active(false);

    let view = world.teams.reset_transaction(team_id).await.unwrap();

    assert_eq!(view.balance, 1000);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_purchases_cannot_double_spend() {
    let world = Arc::new(world_with_balance(1000));
    let team_id = world.register_team("alpha").await;
    let first = world.company_info(600, 0);
    let second = world.company_info(600, 0);
    world.open_trade();

    let handles: Vec<_> = [first, second]
        .into_iter()
        .map(|info| {
            let world = Arc::clone(&world);
            tokio::spawn(async move {
                world
                    .teams
                    .purchase(team_id, PurchaseRequest::AdditionalInfo(info))
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(balance) => {
                assert_eq!(balance, 400);
                succeeded += 1;
            }
            Err(e) => assert!(matches!(
                e.kind(),
                ErrorKind::InsufficientBalance | ErrorKind::ConcurrentModification
            )),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(world.balance_of(team_id).await, 400);
    let detailed = world.teams.get_detailed_by_id(team_id).await.unwrap();
    assert_eq!(detailed.team.additional_info_ids.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redos_leave_one_consistent_transaction() {
    let world = Arc::new(world_with_balance(1000));
    let team_id = world.register_team("alpha").await;
    let company = world.company("acme", 10);
    world.open_trade();

    let handles: Vec<_> = (1..=8)
        .map(|count| {
            let world = Arc::clone(&world);
            tokio::spawn(async move { world.teams.purchase(team_id, shares([(company, count)])).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let detailed = world.teams.get_detailed_by_id(team_id).await.unwrap();
    let transactions = world.store.transactions_for(detailed.team.balance_id);
    assert_eq!(transactions.len(), 1);
    let count = detailed.team.shares.get(company);
    assert_eq!(transactions[0].details, Some(ShareChanges::from([(company, count)])));
    assert_eq!(detailed.balance, 1000 - 10 * count);
}

//! Integration tests for settings side effects

mod common;

use pretty_assertions::assert_eq;
use std::time::Duration;

use common::world;
use investment_game::settings::UpdateParams;
use investment_game::store::AdditionalInfoStore;
use investment_game::{AdditionalInfo, AdditionalInfoType, Settings};

fn params_from(settings: &Settings) -> UpdateParams {
    UpdateParams {
        rounds_count: settings.rounds_count,
        round_duration: settings.round_duration,
        link_to_pdf: settings.link_to_pdf.clone(),
        enable_random_events: settings.enable_random_events,
        default_balance_amount: settings.default_balance_amount,
        default_additional_info_cost: settings.default_additional_info_cost,
    }
}

#[tokio::test]
async fn test_update_persists_plain_fields() {
    let world = world();
    let current = world.settings.get().await.unwrap();

    world
        .settings
        .update(UpdateParams {
            rounds_count: 5,
            link_to_pdf: "https://example.org/rules.pdf".to_string(),
            enable_random_events: true,
            ..params_from(&current)
        })
        .await
        .unwrap();

    let updated = world.settings.get().await.unwrap();
    assert_eq!(updated.rounds_count, 5);
    assert_eq!(updated.link_to_pdf, "https://example.org/rules.pdf");
    assert!(updated.enable_random_events);
}

#[tokio::test]
async fn test_round_duration_retimes_trade_periods() {
    let world = world();
    let current = world.settings.get().await.unwrap();

    world
        .settings
        .update(UpdateParams {
            round_duration: Duration::from_secs(90),
            ..params_from(&current)
        })
        .await
        .unwrap();

    assert_eq!(world.games.trade_controller().duration(), Duration::from_secs(90));
    assert_eq!(
        world.settings.get().await.unwrap().round_duration,
        Duration::from_secs(90)
    );
}

#[tokio::test]
async fn test_default_balance_resets_waiting_teams() {
    let world = world();
    let first = world.register_team("first").await;
    let second = world.register_team("second").await;
    let current = world.settings.get().await.unwrap();

    world
        .settings
        .update(UpdateParams {
            default_balance_amount: 2_500,
            ..params_from(&current)
        })
        .await
        .unwrap();

    assert_eq!(world.balance_of(first).await, 2_500);
    assert_eq!(world.balance_of(second).await, 2_500);

    // teams registered later get the new amount too
    let third = world.register_team("third").await;
    assert_eq!(world.balance_of(third).await, 2_500);
}

#[tokio::test]
async fn test_default_balance_leaves_started_game_alone() {
    let world = world();
    let team = world.register_team("alpha").await;
    world.games.start_game().await.unwrap();
    let current = world.settings.get().await.unwrap();

    world
        .settings
        .update(UpdateParams {
            default_balance_amount: 1,
            ..params_from(&current)
        })
        .await
        .unwrap();

    assert_eq!(world.balance_of(team).await, 10_000);
    assert_eq!(world.settings.get().await.unwrap().default_balance_amount, 1);
}

#[tokio::test]
async fn test_default_info_cost_reprices_company_infos_only() {
    let world = world();
    let company_info = world.company_info(40, 1);
    let analytics = world.store.insert_additional_info(AdditionalInfo {
        id: 0,
        name: "market outlook".to_string(),
        description: String::new(),
        info_type: AdditionalInfoType::Analytics,
        cost: 40,
        company_id: None,
        round: 1,
    });
    let current = world.settings.get().await.unwrap();

    world
        .settings
        .update(UpdateParams {
            default_additional_info_cost: 75,
            ..params_from(&current)
        })
        .await
        .unwrap();

    let company_info = AdditionalInfoStore::get_by_id(world.store.as_ref(), company_info)
        .await
        .unwrap();
    let analytics = AdditionalInfoStore::get_by_id(world.store.as_ref(), analytics)
        .await
        .unwrap();
    assert_eq!(company_info.cost, 75);
    assert_eq!(analytics.cost, 40);
}

//! Integration tests for the channel router: rule precedence, wildcard fallthrough and target resolution.

use chrono::Utc;
use meridian_payment_engine::{
    db_types::*,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::{RouteRequest, RouterManagement},
    RouterApi,
    SqliteDatabase,
};
use mpg_common::Money;
use rust_decimal_macros::dec;

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

fn rule(merchant_id: &str, priority: i64) -> RouterRule {
    RouterRule {
        id: 0,
        merchant_id: merchant_id.to_string(),
        trx_type: TrxType::Payin,
        priority,
        currency: None,
        trx_method: None,
        trx_mode: None,
        trx_app: None,
        device_id: None,
        package: None,
        min_amount: None,
        max_amount: None,
        channel_account_id: None,
        channel_code: None,
        channel_group_id: None,
        active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn channel_account(id: &str, channel_code: &str) -> ChannelAccount {
    ChannelAccount {
        id: 0,
        channel_account_id: id.to_string(),
        merchant_id: None,
        channel_code: channel_code.to_string(),
        currency: None,
        single_min: None,
        single_max: None,
        daily_limit: None,
        credential: None,
        active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn group(group_id: &str, strategy: RouteStrategy) -> ChannelGroup {
    ChannelGroup { id: 0, group_id: group_id.to_string(), strategy, active: true, created_at: Utc::now() }
}

fn member(group_id: &str, channel_account_id: &str, sort_order: i64) -> ChannelGroupMember {
    ChannelGroupMember {
        id: 0,
        group_id: group_id.to_string(),
        channel_account_id: channel_account_id.to_string(),
        sort_order,
    }
}

/// Mirrors the standard merchant setup: a EUR-only rule at priority 10 targeting a single account, and a wildcard
/// fallthrough at priority 20 targeting a two-member group.
async fn seed_standard_config(db: &SqliteDatabase) {
    db.upsert_channel_account(channel_account("A1", "CA")).await.unwrap();
    db.upsert_channel_account(channel_account("A2", "CB")).await.unwrap();
    db.upsert_channel_account(channel_account("A3", "CC")).await.unwrap();
    db.upsert_channel_group(group("G1", RouteStrategy::All), vec![member("G1", "A1", 1), member("G1", "A2", 2)])
        .await
        .unwrap();
    let mut eur_rule = rule("m_shop", 10);
    eur_rule.currency = Some("EUR".to_string());
    eur_rule.channel_account_id = Some("A3".to_string());
    db.insert_router_rule(eur_rule).await.unwrap();
    let mut wildcard = rule("m_shop", 20);
    wildcard.channel_group_id = Some("G1".to_string());
    db.insert_router_rule(wildcard).await.unwrap();
}

#[tokio::test]
async fn non_matching_rules_fall_through_to_the_wildcard() {
    let db = new_db().await;
    seed_standard_config(&db).await;
    let api = RouterApi::new(db);
    let req = RouteRequest::new("m_shop", TrxType::Payin, "req_1", "USD").with_amount(Money::new(dec!(100)));
    let info = api.route(req).await.unwrap();
    assert_eq!(info.channel_accounts, vec!["A1".to_string(), "A2".to_string()]);
    assert_eq!(info.strategy, RouteStrategy::All);
    assert_eq!(info.channel_codes.get("A1").map(String::as_str), Some("CA"));
    assert_eq!(info.channel_codes.get("A2").map(String::as_str), Some("CB"));
}

#[tokio::test]
async fn the_highest_priority_matching_rule_wins() {
    let db = new_db().await;
    seed_standard_config(&db).await;
    let api = RouterApi::new(db);
    let req = RouteRequest::new("m_shop", TrxType::Payin, "req_2", "EUR").with_amount(Money::new(dec!(100)));
    let info = api.route(req).await.unwrap();
    assert_eq!(info.channel_accounts, vec!["A3".to_string()]);
    assert_eq!(info.strategy, RouteStrategy::Once);
}

#[tokio::test]
async fn routing_is_deterministic_over_unchanged_configuration() {
    let db = new_db().await;
    seed_standard_config(&db).await;
    let api = RouterApi::new(db);
    let req = RouteRequest::new("m_shop", TrxType::Payin, "req_3", "USD");
    let first = api.route(req.clone()).await.unwrap();
    let second = api.route(req).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn amount_bounds_require_an_amount_on_the_request() {
    let db = new_db().await;
    db.upsert_channel_account(channel_account("A1", "CA")).await.unwrap();
    let mut bounded = rule("m_shop", 10);
    bounded.min_amount = Some(Money::new(dec!(100)));
    bounded.max_amount = Some(Money::new(dec!(500)));
    bounded.channel_account_id = Some("A1".to_string());
    db.insert_router_rule(bounded).await.unwrap();
    let api = RouterApi::new(db);
    let in_bounds =
        RouteRequest::new("m_shop", TrxType::Payin, "req_4", "USD").with_amount(Money::new(dec!(250)));
    assert!(!api.route(in_bounds).await.unwrap().is_empty());
    let too_small =
        RouteRequest::new("m_shop", TrxType::Payin, "req_5", "USD").with_amount(Money::new(dec!(99.99)));
    assert!(api.route(too_small).await.unwrap().is_empty());
    // A bounded rule cannot match a request that carries no amount at all.
    let no_amount = RouteRequest::new("m_shop", TrxType::Payin, "req_6", "USD");
    assert!(api.route(no_amount).await.unwrap().is_empty());
}

#[tokio::test]
async fn a_winning_rule_with_a_dead_target_yields_an_empty_route() {
    let db = new_db().await;
    let mut inactive = channel_account("A9", "CZ");
    inactive.active = false;
    db.upsert_channel_account(inactive).await.unwrap();
    let mut r = rule("m_shop", 10);
    r.channel_account_id = Some("A9".to_string());
    db.insert_router_rule(r).await.unwrap();
    let api = RouterApi::new(db);
    let req = RouteRequest::new("m_shop", TrxType::Payin, "req_7", "USD");
    assert!(api.route(req).await.unwrap().is_empty());
}

#[tokio::test]
async fn group_routing_skips_inactive_members() {
    let db = new_db().await;
    db.upsert_channel_account(channel_account("A1", "CA")).await.unwrap();
    let mut dead = channel_account("A2", "CB");
    dead.active = false;
    db.upsert_channel_account(dead).await.unwrap();
    db.upsert_channel_group(group("G1", RouteStrategy::Once), vec![member("G1", "A1", 1), member("G1", "A2", 2)])
        .await
        .unwrap();
    let mut r = rule("m_shop", 10);
    r.channel_group_id = Some("G1".to_string());
    db.insert_router_rule(r).await.unwrap();
    let api = RouterApi::new(db);
    let info = api.route(RouteRequest::new("m_shop", TrxType::Payin, "req_8", "USD")).await.unwrap();
    assert_eq!(info.channel_accounts, vec!["A1".to_string()]);
    assert_eq!(info.strategy, RouteStrategy::Once);
}

#[tokio::test]
async fn channel_code_targets_resolve_through_the_merchant_account() {
    let db = new_db().await;
    let mut owned = channel_account("A5", "CA");
    owned.merchant_id = Some("m_shop".to_string());
    db.upsert_channel_account(owned).await.unwrap();
    let mut r = rule("m_shop", 10);
    r.channel_code = Some("CA".to_string());
    db.insert_router_rule(r).await.unwrap();
    let api = RouterApi::new(db);
    let info = api.route(RouteRequest::new("m_shop", TrxType::Payin, "req_9", "USD")).await.unwrap();
    assert_eq!(info.channel_accounts, vec!["A5".to_string()]);
    // Another merchant holds no account on that channel code.
    let info = api.route(RouteRequest::new("m_other", TrxType::Payin, "req_10", "USD")).await.unwrap();
    assert!(info.is_empty());
}

#[tokio::test]
async fn requests_with_no_matching_rule_route_nowhere() {
    let db = new_db().await;
    seed_standard_config(&db).await;
    let api = RouterApi::new(db);
    // Different merchant and different transaction type both miss.
    let req = RouteRequest::new("m_unknown", TrxType::Payin, "req_11", "USD");
    assert!(api.route(req).await.unwrap().is_empty());
    let req = RouteRequest::new("m_shop", TrxType::Payout, "req_12", "USD");
    assert!(api.route(req).await.unwrap().is_empty());
}

#[tokio::test]
async fn method_filters_narrow_the_rule() {
    let db = new_db().await;
    db.upsert_channel_account(channel_account("A1", "CA")).await.unwrap();
    db.upsert_channel_account(channel_account("A2", "CB")).await.unwrap();
    let mut card_rule = rule("m_shop", 10);
    card_rule.trx_method = Some("card".to_string());
    card_rule.channel_account_id = Some("A1".to_string());
    db.insert_router_rule(card_rule).await.unwrap();
    let mut fallback = rule("m_shop", 20);
    fallback.channel_account_id = Some("A2".to_string());
    db.insert_router_rule(fallback).await.unwrap();
    let api = RouterApi::new(db);
    let card = RouteRequest::new("m_shop", TrxType::Payin, "req_13", "USD").with_method("card");
    assert_eq!(api.route(card).await.unwrap().channel_accounts, vec!["A1".to_string()]);
    let upi = RouteRequest::new("m_shop", TrxType::Payin, "req_14", "USD").with_method("upi");
    assert_eq!(api.route(upi).await.unwrap().channel_accounts, vec!["A2".to_string()]);
}

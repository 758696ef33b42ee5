//! Integration tests for the double-entry ledger: balance buckets, the fund-flow journal, and idempotent replay.

use log::*;
use meridian_payment_engine::{
    db_types::*,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::{FlowQuery, LedgerError, LedgerManagement, UpdateBalanceRequest},
    LedgerApi,
    SqliteDatabase,
};
use mpg_common::Money;
use rust_decimal_macros::dec;

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

fn req(op: BalanceOperation, amount: Money) -> UpdateBalanceRequest {
    UpdateBalanceRequest::new("m_alice", UserType::Merchant, "USD", op, amount)
}

#[tokio::test]
async fn add_creates_the_account_and_journals_the_flow() {
    let db = new_db().await;
    let update = db.update_balance(req(BalanceOperation::Add, Money::new(dec!(1000.00)))).await.unwrap();
    assert!(!update.replayed);
    assert_eq!(update.account.total, Money::new(dec!(1000.00)));
    assert_eq!(update.account.available, Money::new(dec!(1000.00)));
    assert_eq!(update.account.frozen, Money::zero());
    assert!(update.account.invariants_hold());
    assert_eq!(update.flow.flow_type, FlowType::Income);
    assert_eq!(update.flow.before_balance, Money::zero());
    assert_eq!(update.flow.after_balance, Money::new(dec!(1000.00)));
    info!("🧑️ Account {} created with flow {}", update.account.account_id, update.flow.flow_no);
}

#[tokio::test]
async fn freeze_moves_available_to_frozen_without_changing_total() {
    let db = new_db().await;
    db.update_balance(req(BalanceOperation::Add, Money::new(dec!(1000)))).await.unwrap();
    let update = db.update_balance(req(BalanceOperation::Freeze, Money::new(dec!(300)))).await.unwrap();
    assert_eq!(update.account.total, Money::new(dec!(1000)));
    assert_eq!(update.account.available, Money::new(dec!(700)));
    assert_eq!(update.account.frozen, Money::new(dec!(300)));
    assert!(update.account.invariants_hold());
    // Total is untouched, so before and after balances agree.
    assert_eq!(update.flow.before_balance, update.flow.after_balance);
}

#[tokio::test]
async fn subtract_beyond_available_is_rejected_and_writes_nothing() {
    let db = new_db().await;
    db.update_balance(req(BalanceOperation::Add, Money::new(dec!(1000)))).await.unwrap();
    db.update_balance(req(BalanceOperation::Freeze, Money::new(dec!(300)))).await.unwrap();
    let err = db.update_balance(req(BalanceOperation::Subtract, Money::new(dec!(800)))).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientAvailable { .. }), "unexpected error: {err}");
    // The failed attempt must not have touched the account or the journal.
    let balance = db.fetch_balance("m_alice", UserType::Merchant, "USD").await.unwrap().unwrap();
    assert_eq!(balance.available, Money::new(dec!(700)));
    assert_eq!(balance.total, Money::new(dec!(1000)));
    let flows = db.search_flows(FlowQuery::for_user("m_alice")).await.unwrap();
    assert_eq!(flows.len(), 2);
    // After unfreezing, the same subtraction succeeds.
    db.update_balance(req(BalanceOperation::Unfreeze, Money::new(dec!(300)))).await.unwrap();
    let update = db.update_balance(req(BalanceOperation::Subtract, Money::new(dec!(800)))).await.unwrap();
    assert_eq!(update.account.total, Money::new(dec!(200)));
    assert_eq!(update.account.available, Money::new(dec!(200)));
}

#[tokio::test]
async fn non_add_operations_never_create_accounts() {
    let db = new_db().await;
    let err = db.update_balance(req(BalanceOperation::Subtract, Money::new(dec!(50)))).await.unwrap_err();
    assert!(matches!(err, LedgerError::AccountNotFound(_)), "unexpected error: {err}");
    assert!(db.fetch_balance("m_alice", UserType::Merchant, "USD").await.unwrap().is_none());
}

#[tokio::test]
async fn margin_and_release_margin_round_trip() {
    let db = new_db().await;
    db.update_balance(req(BalanceOperation::Add, Money::new(dec!(500)))).await.unwrap();
    let update = db.update_balance(req(BalanceOperation::Margin, Money::new(dec!(120)))).await.unwrap();
    assert_eq!(update.account.margin, Money::new(dec!(120)));
    assert_eq!(update.account.available, Money::new(dec!(380)));
    let err = db.update_balance(req(BalanceOperation::ReleaseMargin, Money::new(dec!(121)))).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientMargin { .. }), "unexpected error: {err}");
    let update = db.update_balance(req(BalanceOperation::ReleaseMargin, Money::new(dec!(120)))).await.unwrap();
    assert_eq!(update.account.margin, Money::zero());
    assert_eq!(update.account.available, Money::new(dec!(500)));
    assert!(update.account.invariants_hold());
}

#[tokio::test]
async fn the_journal_is_coherent_over_a_sequence_of_operations() {
    let db = new_db().await;
    let ops = [
        (BalanceOperation::Add, dec!(1000)),
        (BalanceOperation::Freeze, dec!(300)),
        (BalanceOperation::Unfreeze, dec!(100)),
        (BalanceOperation::Margin, dec!(50)),
        (BalanceOperation::Subtract, dec!(200)),
        (BalanceOperation::Add, dec!(42.42)),
    ];
    for (op, amount) in ops {
        db.update_balance(req(op, Money::new(amount))).await.unwrap();
    }
    let account = &db.fetch_accounts("m_alice").await.unwrap()[0];
    assert_eq!(account.total, Money::new(dec!(842.42)));
    assert_eq!(account.available, Money::new(dec!(592.42)));
    assert_eq!(account.frozen, Money::new(dec!(200)));
    assert_eq!(account.margin, Money::new(dec!(50)));
    assert!(account.invariants_hold());
    assert_eq!(account.version, ops.len() as i64);
    // Each flow's opening balance is the previous flow's closing balance, and the chain ends at the live total.
    let flows = db.search_flows(FlowQuery::for_account(&account.account_id)).await.unwrap();
    assert_eq!(flows.len(), ops.len());
    for pair in flows.windows(2) {
        assert_eq!(pair[1].before_balance, pair[0].after_balance, "journal gap at flow {}", pair[1].flow_no);
    }
    assert_eq!(flows.last().unwrap().after_balance, account.total);
}

#[tokio::test]
async fn replaying_a_transaction_scoped_request_is_a_no_op() {
    let db = new_db().await;
    let request = req(BalanceOperation::Add, Money::new(dec!(250))).with_transaction_id("trx_dup_1");
    let first = db.update_balance(request.clone()).await.unwrap();
    assert!(!first.replayed);
    let second = db.update_balance(request).await.unwrap();
    assert!(second.replayed);
    assert_eq!(second.flow.flow_no, first.flow.flow_no);
    let balance = db.fetch_balance("m_alice", UserType::Merchant, "USD").await.unwrap().unwrap();
    assert_eq!(balance.total, Money::new(dec!(250)));
    let query = FlowQuery { transaction_id: Some("trx_dup_1".to_string()), page_size: 10, ..Default::default() };
    assert_eq!(db.search_flows(query).await.unwrap().len(), 1);
}

#[tokio::test]
async fn different_operations_may_share_a_transaction_id() {
    let db = new_db().await;
    db.update_balance(req(BalanceOperation::Add, Money::new(dec!(100))).with_transaction_id("trx_pair")).await.unwrap();
    let update =
        db.update_balance(req(BalanceOperation::Freeze, Money::new(dec!(40))).with_transaction_id("trx_pair")).await.unwrap();
    assert!(!update.replayed);
    let query = FlowQuery { transaction_id: Some("trx_pair".to_string()), page_size: 10, ..Default::default() };
    assert_eq!(db.search_flows(query).await.unwrap().len(), 2);
}

#[tokio::test]
async fn one_user_can_hold_accounts_in_several_currencies() {
    let db = new_db().await;
    db.update_balance(req(BalanceOperation::Add, Money::new(dec!(10)))).await.unwrap();
    let eur = UpdateBalanceRequest::new("m_alice", UserType::Merchant, "EUR", BalanceOperation::Add, Money::new(dec!(20)));
    db.update_balance(eur).await.unwrap();
    let accounts = db.fetch_accounts("m_alice").await.unwrap();
    assert_eq!(accounts.len(), 2);
    let usd = db.fetch_balance("m_alice", UserType::Merchant, "USD").await.unwrap().unwrap();
    let eur = db.fetch_balance("m_alice", UserType::Merchant, "EUR").await.unwrap().unwrap();
    assert_eq!(usd.total, Money::new(dec!(10)));
    assert_eq!(eur.total, Money::new(dec!(20)));
}

#[tokio::test]
async fn the_api_validates_currency_and_amount_before_touching_the_ledger() {
    let db = new_db().await;
    let api = LedgerApi::new(db.clone());
    let bad_ccy = UpdateBalanceRequest::new("m_alice", UserType::Merchant, "DOGE", BalanceOperation::Add, Money::new(dec!(1)));
    let err = api.update_balance(bad_ccy).await.unwrap_err();
    assert!(matches!(err, LedgerError::UnsupportedCurrency(_)), "unexpected error: {err}");
    let err = api.update_balance(req(BalanceOperation::Add, Money::zero())).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(_)), "unexpected error: {err}");
    let err = api.update_balance(req(BalanceOperation::Add, Money::new(dec!(-5)))).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(_)), "unexpected error: {err}");
    assert!(db.fetch_balance("m_alice", UserType::Merchant, "USD").await.unwrap().is_none());
}

#[tokio::test]
async fn oversized_journal_pages_are_clamped() {
    let db = new_db().await;
    for _ in 0..3 {
        db.update_balance(req(BalanceOperation::Add, Money::new(dec!(1)))).await.unwrap();
    }
    let query = FlowQuery::for_user("m_alice").page(0, 100_000);
    // The cap only limits the page size; with 3 flows we still see all of them.
    let flows = db.search_flows(query).await.unwrap();
    assert_eq!(flows.len(), 3);
    let query = FlowQuery::for_user("m_alice").page(1, 2);
    let flows = db.search_flows(query).await.unwrap();
    assert_eq!(flows.len(), 1);
}

//! Identifier generation.
//!
//! Identifiers are prefixed with their kind, carry a millisecond timestamp for rough chronological ordering,
//! and end with random hex to avoid collisions across concurrent writers. Uniqueness is ultimately enforced by
//! the database's unique indexes, not by this module.

use chrono::Utc;
use rand::Rng;

use crate::db_types::{SettleId, TrxId};

fn generate(prefix: &str) -> String {
    let ts = Utc::now().timestamp_millis();
    let salt: u64 = rand::thread_rng().gen();
    format!("{prefix}{ts}{salt:012x}")
}

pub fn new_trx_id() -> TrxId {
    TrxId(generate("trx_"))
}

pub fn new_flow_no() -> String {
    generate("flow_")
}

pub fn new_settle_id() -> SettleId {
    SettleId(generate("settle_"))
}

pub fn new_account_id() -> String {
    generate("acct_")
}

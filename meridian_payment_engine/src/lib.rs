//! Meridian Payment Engine
//!
//! The settlement core of the Meridian payment gateway: a double-entry ledger, a channel router, and a
//! contract-driven settlement pipeline that aggregates completed transactions into periodic settlement cycles and
//! posts matured cycles to merchant accounts.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`] and the [`mod@traits`] contracts). SQLite is the shipped
//!    backend; you should never need to access the database directly — use the public APIs instead. The exception
//!    is the data types used in the database, defined in [`mod@db_types`], which are public.
//! 2. The engine public API ([`LedgerApi`], [`RouterApi`], [`SettlementApi`]). Each API is generic over the
//!    backend traits it needs, so backends can be swapped without touching callers.
//! 3. The cron [`mod@scheduler`], which drives the periodic settlement, accounting and backfill jobs from the
//!    task table.
//!
//! The engine also emits events (fund flows, settled transactions, posted cycles) through a simple stateless
//! pub-sub system in [`mod@events`]; subscribers typically forward them to merchant webhooks.

pub mod db_types;
pub mod events;
pub mod helpers;
mod mpe_api;
pub mod scheduler;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use mpe_api::{
    ledger_api::LedgerApi,
    router_api::RouterApi,
    settlement_api::{compute_settlement, SettlementApi},
};

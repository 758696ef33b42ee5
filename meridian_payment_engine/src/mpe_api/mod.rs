//! # Meridian payment engine public API
//!
//! The `mpe_api` module exposes the programmatic API of the settlement core. The API is modular: clients pick the
//! pieces they need, and each API instance is created by supplying a database backend that implements the specific
//! traits it requires.
//!
//! * [`ledger_api`] — balance mutations and journal queries over the double-entry ledger.
//! * [`router_api`] — channel routing decisions for incoming transactions.
//! * [`settlement_api`] — the settlement pipeline, settlement accounting and the settle-id backfill job.
//!
//! ```rust,ignore
//! use meridian_payment_engine::{LedgerApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! // SqliteDatabase implements LedgerManagement
//! let api = LedgerApi::new(db);
//! let balance = api.balance("merchant_001", UserType::Merchant, "USD").await?;
//! ```

pub mod ledger_api;
pub mod router_api;
pub mod settlement_api;

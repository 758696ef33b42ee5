//! Interface contracts for the payment engine database backends.
//!
//! The engine's public APIs ([`crate::LedgerApi`], [`crate::RouterApi`], [`crate::SettlementApi`]) are generic over
//! these traits, so any storage backend that implements them can drive the engine. The crate ships a SQLite
//! implementation; the traits keep a Postgres port possible without touching the API layer.
//!
//! * [`LedgerManagement`] — double-entry account balances and the fund-flow journal.
//! * [`RouterManagement`] — routing rules, channel accounts and channel groups.
//! * [`SettlementDatabase`] — contracts, strategies, settlement cycles and per-transaction settlement records.
//! * [`TransactionManagement`] — the shared transaction store all flavours of payment write to.
//! * [`TaskManagement`] — the scheduled-task registry.

mod data_objects;
mod ledger;
mod router;
mod settlement;
mod tasks;
mod transactions;

pub use data_objects::{
    AccountingResult,
    BackfillResult,
    Balance,
    BalanceUpdate,
    FlowQuery,
    ModifyTransactionRequest,
    RouteInfo,
    RouteRequest,
    SettleComputation,
    SettleResult,
    SettlementRecord,
    UpdateBalanceRequest,
};
pub use ledger::{LedgerError, LedgerManagement};
pub use router::{RouterError, RouterManagement};
pub use settlement::{SettlementDatabase, SettlementError};
pub use tasks::{TaskError, TaskManagement};
pub use transactions::{TransactionError, TransactionManagement};

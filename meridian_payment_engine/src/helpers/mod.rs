//! Small pure helpers shared across the engine: settlement period math, id generation and the
//! filter-matching predicate used by routing and settlement strategies.

pub mod ids;
pub mod matcher;
pub mod periods;

pub use ids::{new_account_id, new_flow_no, new_settle_id, new_trx_id};
pub use matcher::{Condition, Op, Operand, Predicate};
pub use periods::{ms_to_utc, settle_window, utc_to_ms, PeriodError, SettleWindow};

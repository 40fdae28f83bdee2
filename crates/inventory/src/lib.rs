//! Inventory domain module: stock lines, balance reconciliation and the
//! stock-movement ledger.
//!
//! This crate contains business rules for stock bookkeeping, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage). The infrastructure
//! layer loads the touched balances inside a transaction, posts movements through
//! a [`StockBook`] and persists the resulting [`LedgerEntry`] records.

pub mod book;
pub mod ledger;
pub mod lines;

pub use book::{Movement, Posting, StockAccount, StockBook};
pub use ledger::{
    net_change_by_product, replay_balance, LedgerContext, LedgerEntry, MovementCause,
};
pub use lines::{LineDelta, LineSet, StockLine};

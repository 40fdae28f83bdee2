//! `stockroom-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the shared error model and the aggregate traits every
//! warehouse module implements.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot};
pub use error::{DomainError, DomainResult};
pub use id::{ActorId, CarId, DriverId, LedgerEntryId, OrderId, ProductId, ShiftId, SupplyId};

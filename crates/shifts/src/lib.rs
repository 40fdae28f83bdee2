//! Work shifts and the shift gate for immediate orders.

pub mod gate;
pub mod shift;

pub use gate::{is_immediate, ShiftGate};
pub use shift::Shift;

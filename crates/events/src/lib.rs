//! Domain events shared by the warehouse modules.

pub mod event;
pub mod handler;

pub use event::Event;
pub use handler::execute;

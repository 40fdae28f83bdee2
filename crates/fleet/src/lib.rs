//! Fleet domain module: drivers and cars attached to shipped orders.

pub mod car;
pub mod driver;

pub use car::Car;
pub use driver::Driver;

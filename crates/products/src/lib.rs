//! Product catalog domain module.
//!
//! Product details, thresholds and the derived stock level. The on-hand balance
//! lives on the product but is only ever changed through stock postings made by
//! the inventory reconciliation rules.

pub mod product;

pub use product::{
    CreateProduct, Product, ProductCommand, ProductCreated, ProductDetails, ProductDetailsUpdated,
    ProductEvent, StockLevel, UpdateProductDetails, DEFAULT_LOW_THRESHOLD,
    DEFAULT_NORMAL_THRESHOLD,
};

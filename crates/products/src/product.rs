use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{Aggregate, AggregateRoot, DomainError, ProductId};
use stockroom_events::Event;

pub const DEFAULT_LOW_THRESHOLD: i64 = 15_000;
pub const DEFAULT_NORMAL_THRESHOLD: i64 = 66_000;

/// Fill level of a product relative to its thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockLevel {
    /// At or below the low threshold.
    Low,
    Normal,
    /// At or above the normal threshold.
    High,
}

/// Editable product attributes (everything except the balance).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub name: String,
    pub company: String,
    pub units_per_pallet: i64,
    pub low_threshold: i64,
    pub normal_threshold: i64,
    pub notes: Option<String>,
}

impl ProductDetails {
    pub fn new(name: impl Into<String>, company: impl Into<String>, units_per_pallet: i64) -> Self {
        Self {
            name: name.into(),
            company: company.into(),
            units_per_pallet,
            low_threshold: DEFAULT_LOW_THRESHOLD,
            normal_threshold: DEFAULT_NORMAL_THRESHOLD,
            notes: None,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.company.trim().is_empty() {
            return Err(DomainError::validation("company cannot be empty"));
        }
        if self.units_per_pallet < 1 {
            return Err(DomainError::validation("units_per_pallet must be at least 1"));
        }
        if self.low_threshold < 0 {
            return Err(DomainError::validation("low_threshold cannot be negative"));
        }
        if self.normal_threshold < self.low_threshold {
            return Err(DomainError::validation(
                "normal_threshold must not be below low_threshold",
            ));
        }
        Ok(())
    }
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    id: ProductId,
    details: ProductDetails,
    balance: i64,
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            details: ProductDetails::new("", "", 1),
            balance: 0,
            version: 0,
            created: false,
        }
    }

    /// Rebuild a stored product.
    pub fn restore(id: ProductId, details: ProductDetails, balance: i64, version: u64) -> Self {
        Self {
            id,
            details,
            balance,
            version,
            created: true,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn details(&self) -> &ProductDetails {
        &self.details
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn company(&self) -> &str {
        &self.details.company
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// Store the balance produced by a stock posting.
    pub fn record_balance(&mut self, balance: i64) {
        self.balance = balance;
    }

    /// Number of complete pallets the balance fills.
    pub fn full_pallets(&self) -> i64 {
        if self.details.units_per_pallet > 0 {
            self.balance / self.details.units_per_pallet
        } else {
            0
        }
    }

    pub fn stock_level(&self) -> StockLevel {
        if self.balance <= self.details.low_threshold {
            StockLevel::Low
        } else if self.balance >= self.details.normal_threshold {
            StockLevel::High
        } else {
            StockLevel::Normal
        }
    }

    /// Case-insensitive match on name or company.
    pub fn matches(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.details.name.to_lowercase().contains(&q)
            || self.details.company.to_lowercase().contains(&q)
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProductDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProductDetails {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProductDetails(UpdateProductDetails),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDetailsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetailsUpdated {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductDetailsUpdated(ProductDetailsUpdated),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::ProductDetailsUpdated(_) => "products.product.details_updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductDetailsUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.details = e.details.clone();
                self.balance = 0;
                self.created = true;
            }
            ProductEvent::ProductDetailsUpdated(e) => {
                self.details = e.details.clone();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("product already exists"));
                }
                cmd.details.validate()?;
                Ok(vec![ProductEvent::ProductCreated(ProductCreated {
                    product_id: cmd.product_id,
                    details: cmd.details.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProductCommand::UpdateProductDetails(cmd) => {
                if !self.created {
                    return Err(DomainError::not_found("product"));
                }
                if cmd.product_id != self.id {
                    return Err(DomainError::invariant("product_id mismatch"));
                }
                cmd.details.validate()?;
                if cmd.details == self.details {
                    return Ok(vec![]);
                }
                Ok(vec![ProductEvent::ProductDetailsUpdated(ProductDetailsUpdated {
                    product_id: cmd.product_id,
                    details: cmd.details.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(balance: i64) -> Product {
        let mut details = ProductDetails::new("Stretch film", "Acme", 40);
        details.low_threshold = 100;
        details.normal_threshold = 500;
        Product::restore(ProductId::new(), details, balance, 1)
    }

    #[test]
    fn create_emits_product_created_with_zero_balance() {
        let id = ProductId::new();
        let mut product = Product::empty(id);
        let cmd = ProductCommand::CreateProduct(CreateProduct {
            product_id: id,
            details: ProductDetails::new("Stretch film", "Acme", 40),
            occurred_at: Utc::now(),
        });

        let events = product.handle(&cmd).unwrap();
        assert_eq!(events.len(), 1);
        product.apply(&events[0]);
        assert_eq!(product.balance(), 0);
        assert_eq!(product.version(), 1);
        assert_eq!(product.name(), "Stretch film");
    }

    #[test]
    fn invalid_details_are_rejected() {
        let id = ProductId::new();
        let mut details = ProductDetails::new("Film", "Acme", 0);
        let cmd = |details: ProductDetails| {
            ProductCommand::CreateProduct(CreateProduct {
                product_id: id,
                details,
                occurred_at: Utc::now(),
            })
        };
        assert!(matches!(
            Product::empty(id).handle(&cmd(details.clone())),
            Err(DomainError::Validation(_))
        ));

        details.units_per_pallet = 10;
        details.low_threshold = 10;
        details.normal_threshold = 5;
        assert!(matches!(
            Product::empty(id).handle(&cmd(details)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn stock_level_follows_thresholds() {
        assert_eq!(created(100).stock_level(), StockLevel::Low);
        assert_eq!(created(101).stock_level(), StockLevel::Normal);
        assert_eq!(created(500).stock_level(), StockLevel::High);
    }

    #[test]
    fn full_pallets_rounds_down() {
        assert_eq!(created(119).full_pallets(), 2);
        assert_eq!(created(39).full_pallets(), 0);
    }

    #[test]
    fn unchanged_details_emit_nothing() {
        let product = created(10);
        let cmd = ProductCommand::UpdateProductDetails(UpdateProductDetails {
            product_id: product.id_typed(),
            details: product.details().clone(),
            occurred_at: Utc::now(),
        });
        assert!(product.handle(&cmd).unwrap().is_empty());
    }

    #[test]
    fn search_matches_name_or_company_ignoring_case() {
        let product = created(0);
        assert!(product.matches("STRETCH"));
        assert!(product.matches("acm"));
        assert!(!product.matches("tape"));
    }
}

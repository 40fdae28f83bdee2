use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, ProductId};

/// One (product, quantity) line of an order or supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl StockLine {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Signed difference between a desired and a committed quantity for one product.
///
/// Positive: more is being taken from stock. Negative: stock is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDelta {
    pub product_id: ProductId,
    pub delta: i64,
}

/// Validated set of lines: one entry per product, every quantity >= 1.
///
/// Ordered by product id so that derived movements (and therefore ledger
/// entries) come out in a deterministic order. Serializes as a list of lines
/// and re-validates on the way back in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<StockLine>", try_from = "Vec<StockLine>")]
pub struct LineSet {
    lines: BTreeMap<ProductId, i64>,
}

impl LineSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a line set from a raw submission.
    ///
    /// Rejects a product appearing twice with `DuplicateLineItem` and
    /// non-positive quantities with `Validation`.
    pub fn from_lines(lines: &[StockLine]) -> DomainResult<Self> {
        let mut set = BTreeMap::new();
        for line in lines {
            if line.quantity < 1 {
                return Err(DomainError::validation(format!(
                    "quantity for product {} must be at least 1",
                    line.product_id
                )));
            }
            if set.insert(line.product_id, line.quantity).is_some() {
                return Err(DomainError::DuplicateLineItem(line.product_id));
            }
        }
        Ok(Self { lines: set })
    }

    /// Quantity for a product (0 when the product is not in the set).
    pub fn quantity(&self, product_id: ProductId) -> i64 {
        self.lines.get(&product_id).copied().unwrap_or(0)
    }

    pub fn contains(&self, product_id: ProductId) -> bool {
        self.lines.contains_key(&product_id)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of all quantities, saturating at `i64::MAX`.
    pub fn total_units(&self) -> i64 {
        self.lines.values().fold(0i64, |acc, q| acc.saturating_add(*q))
    }

    pub fn products(&self) -> impl Iterator<Item = ProductId> + '_ {
        self.lines.keys().copied()
    }

    pub fn to_lines(&self) -> Vec<StockLine> {
        self.lines
            .iter()
            .map(|(product_id, quantity)| StockLine::new(*product_id, *quantity))
            .collect()
    }

    /// Per-product `desired - committed`, nonzero entries only.
    ///
    /// `self` is the desired set, `committed` what is currently reserved.
    pub fn delta_from(&self, committed: &LineSet) -> Vec<LineDelta> {
        let mut products: Vec<ProductId> = self.products().chain(committed.products()).collect();
        products.sort();
        products.dedup();

        products
            .into_iter()
            .filter_map(|product_id| {
                let delta = self.quantity(product_id) - committed.quantity(product_id);
                (delta != 0).then_some(LineDelta { product_id, delta })
            })
            .collect()
    }
}

impl From<LineSet> for Vec<StockLine> {
    fn from(set: LineSet) -> Self {
        set.to_lines()
    }
}

impl TryFrom<Vec<StockLine>> for LineSet {
    type Error = DomainError;

    fn try_from(lines: Vec<StockLine>) -> Result<Self, Self::Error> {
        LineSet::from_lines(&lines)
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{CarId, DomainError, DriverId, OrderId, ProductId, ShiftId, SupplyId};
use stockroom_inventory::StockLine;
use stockroom_orders::{Order, OrderDraft, OrderStatus};
use stockroom_products::{
    Product, ProductDetails, StockLevel, DEFAULT_LOW_THRESHOLD, DEFAULT_NORMAL_THRESHOLD,
};
use stockroom_supplies::{Supply, SupplyStatus};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct ProductDetailsRequest {
    pub name: String,
    pub company: String,
    pub units_per_pallet: i64,
    pub low_threshold: Option<i64>,
    pub normal_threshold: Option<i64>,
    pub notes: Option<String>,
}

impl ProductDetailsRequest {
    pub fn into_details(self) -> ProductDetails {
        ProductDetails {
            name: self.name.trim().to_string(),
            company: self.company.trim().to_string(),
            units_per_pallet: self.units_per_pallet,
            low_threshold: self.low_threshold.unwrap_or(DEFAULT_LOW_THRESHOLD),
            normal_threshold: self.normal_threshold.unwrap_or(DEFAULT_NORMAL_THRESHOLD),
            notes: self
                .notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    #[serde(flatten)]
    pub details: ProductDetailsRequest,
    #[serde(default)]
    pub initial_stock: i64,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub change: i64,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteProductsRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterDriverRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterCarRequest {
    pub number: String,
}

#[derive(Debug, Deserialize)]
pub struct LineRequest {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    pub customer: String,
    pub notes: Option<String>,
    pub delivery_date: NaiveDate,
    pub lines: Vec<LineRequest>,
    pub driver_id: Option<String>,
    pub car_id: Option<String>,
}

impl OrderRequest {
    pub fn into_draft(self) -> Result<OrderDraft, DomainError> {
        Ok(OrderDraft {
            customer: self.customer,
            notes: self.notes,
            delivery_date: self.delivery_date,
            lines: parse_lines(self.lines)?,
            driver_id: parse_opt_id(self.driver_id.as_deref())?,
            car_id: parse_opt_id(self.car_id.as_deref())?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ShipOrderRequest {
    pub driver_id: Option<String>,
    pub car_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SupplyRequest {
    pub supplier: String,
    pub lines: Vec<LineRequest>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    pub search: Option<String>,
    pub delivery_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    /// `day`, `month` (default) or `year`.
    pub period: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub fn parse_lines(lines: Vec<LineRequest>) -> Result<Vec<StockLine>, DomainError> {
    lines
        .into_iter()
        .map(|l| Ok(StockLine::new(l.product_id.trim().parse()?, l.quantity)))
        .collect()
}

pub fn parse_opt_id<T>(raw: Option<&str>) -> Result<Option<T>, DomainError>
where
    T: std::str::FromStr<Err = DomainError>,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse().map(Some),
        None => Ok(None),
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,
    pub company: String,
    pub balance: i64,
    pub units_per_pallet: i64,
    pub full_pallets: i64,
    pub low_threshold: i64,
    pub normal_threshold: i64,
    pub stock_level: StockLevel,
    pub notes: Option<String>,
}

impl From<&Product> for ProductResponse {
    fn from(p: &Product) -> Self {
        let d = p.details();
        Self {
            id: p.id_typed(),
            name: d.name.clone(),
            company: d.company.clone(),
            balance: p.balance(),
            units_per_pallet: d.units_per_pallet,
            full_pallets: p.full_pallets(),
            low_threshold: d.low_threshold,
            normal_threshold: d.normal_threshold,
            stock_level: p.stock_level(),
            notes: d.notes.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub products: Vec<ProductResponse>,
    pub total_units: i64,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub customer: String,
    pub notes: Option<String>,
    pub delivery_date: NaiveDate,
    pub shift_id: Option<ShiftId>,
    pub driver_id: Option<DriverId>,
    pub car_id: Option<CarId>,
    pub status: OrderStatus,
    pub archived: bool,
    pub lines: Vec<StockLine>,
    pub total_units: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(o: &Order) -> Self {
        let s = o.state();
        Self {
            id: o.id_typed(),
            customer: s.customer.clone(),
            notes: s.notes.clone(),
            delivery_date: s.delivery_date,
            shift_id: s.shift_id,
            driver_id: s.driver_id,
            car_id: s.car_id,
            status: s.status,
            archived: s.archived,
            lines: s.lines.to_lines(),
            total_units: o.total_units(),
            created_at: s.created_at,
        }
    }
}

/// Orders sharing a delivery date (or a delivery month for archived lists).
#[derive(Debug, Serialize)]
pub struct OrderGroupResponse {
    pub date: NaiveDate,
    pub orders: Vec<OrderResponse>,
}

pub fn order_groups(groups: Vec<(NaiveDate, Vec<Order>)>) -> Vec<OrderGroupResponse> {
    groups
        .into_iter()
        .map(|(date, orders)| OrderGroupResponse {
            date,
            orders: orders.iter().map(OrderResponse::from).collect(),
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct SupplyResponse {
    pub id: SupplyId,
    pub supplier: String,
    pub status: SupplyStatus,
    pub lines: Vec<StockLine>,
    pub total_units: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&Supply> for SupplyResponse {
    fn from(s: &Supply) -> Self {
        let state = s.state();
        Self {
            id: s.id_typed(),
            supplier: state.supplier.clone(),
            status: state.status,
            lines: state.lines.to_lines(),
            total_units: s.total_units(),
            created_at: state.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_request_parses_ids_and_blank_references() {
        let product = ProductId::new();
        let body = serde_json::json!({
            "customer": "Northwind",
            "delivery_date": "2025-03-20",
            "lines": [{ "product_id": product.to_string(), "quantity": 4 }],
            "driver_id": "",
        });
        let req: OrderRequest = serde_json::from_value(body).unwrap();
        let draft = req.into_draft().unwrap();
        assert_eq!(draft.lines, vec![StockLine::new(product, 4)]);
        assert_eq!(draft.driver_id, None);
        assert_eq!(draft.car_id, None);
    }

    #[test]
    fn malformed_line_product_is_invalid_id() {
        let err = parse_lines(vec![LineRequest {
            product_id: "nope".to_string(),
            quantity: 1,
        }])
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(_)));
    }

    #[test]
    fn product_request_applies_default_thresholds() {
        let body = serde_json::json!({
            "name": " Film ",
            "company": "Acme",
            "units_per_pallet": 40,
            "initial_stock": 10,
        });
        let req: CreateProductRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.initial_stock, 10);
        let details = req.details.into_details();
        assert_eq!(details.name, "Film");
        assert_eq!(details.low_threshold, DEFAULT_LOW_THRESHOLD);
        assert_eq!(details.normal_threshold, DEFAULT_NORMAL_THRESHOLD);
    }
}

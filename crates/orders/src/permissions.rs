use serde::{Deserialize, Serialize};

use crate::order::OrderStatus;

/// Editable order attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderField {
    Customer,
    Notes,
    DeliveryDate,
    Lines,
    Driver,
    Car,
}

impl OrderField {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderField::Customer => "customer",
            OrderField::Notes => "notes",
            OrderField::DeliveryDate => "delivery_date",
            OrderField::Lines => "lines",
            OrderField::Driver => "driver",
            OrderField::Car => "car",
        }
    }
}

impl core::fmt::Display for OrderField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

const PENDING_FIELDS: &[OrderField] = &[
    OrderField::Customer,
    OrderField::Notes,
    OrderField::DeliveryDate,
    OrderField::Lines,
    OrderField::Driver,
    OrderField::Car,
];

const LOADED_FIELDS: &[OrderField] = &[OrderField::Driver, OrderField::Car];

/// Fields an edit may change while the order is in `status`.
pub fn mutable_fields(status: OrderStatus) -> &'static [OrderField] {
    match status {
        OrderStatus::Pending => PENDING_FIELDS,
        OrderStatus::Loaded => LOADED_FIELDS,
        OrderStatus::Shipped | OrderStatus::Cancelled => &[],
    }
}

pub fn is_mutable(status: OrderStatus, field: OrderField) -> bool {
    mutable_fields(status).contains(&field)
}

pub mod order;
pub mod permissions;
pub mod report;

pub use order::{
    ArchiveOrder, CancelOrder, LoadOrder, LoadRejected, Order, OrderArchived, OrderCancelled,
    OrderCommand, OrderDraft, OrderEvent, OrderLoaded, OrderPlaced, OrderPurged, OrderRevised,
    OrderShipped, OrderState, OrderStatus, PlaceOrder, PurgeOrder, RejectLoad, ReviseOrder,
    ShipOrder,
};
pub use permissions::{is_mutable, mutable_fields, OrderField};
pub use report::{
    group_by_delivery_date, group_by_delivery_month, order_summary, SummaryPeriod, SummaryRow,
};

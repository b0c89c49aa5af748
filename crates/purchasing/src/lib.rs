//! Purchasing domain module (purchase orders, event-sourced).
//!
//! Orders move `pending → approved → delivered`, or `pending → canceled`.
//! Pure domain logic: replenishing stock on delivery is done by the caller
//! from the items carried by `OrderDelivered`.

pub mod order;

pub use order::{
    ApproveOrder, CancelOrder, DeliverOrder, OrderApproved, OrderCanceled, OrderDelivered,
    OrderItem, OrderLine, OrderPlaced, OrderStatus, PlaceOrder, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderEvent, PurchaseOrderId, PURCHASE_ORDER_AGGREGATE_TYPE,
};

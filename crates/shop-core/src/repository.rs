//! # Persistence Ports
//!
//! Everything the orchestrators need from storage, behind one trait so a SQL
//! backend can replace [`crate::memory::InMemoryRepository`] without touching
//! business logic.
//!
//! Atomic units are single calls: [`OrderRepository::create_order`] and
//! [`OrderRepository::commit`] either apply every write they carry or none.

use crate::address::{CustomerAddress, ShippingAddress};
use crate::cart::{Cart, CartItem};
use crate::error::ShopResult;
use crate::order::{Order, OrderItem, OrderStatus, StatusHistoryEntry, TimelineEntry};
use crate::payment_method::CustomerPaymentMethod;
use async_trait::async_trait;
use std::sync::Arc;

/// What a commit does to the cart an order was created from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartEffect {
    /// Payment confirmed: `Locked -> Cleared`, items removed
    Clear,
    /// Order abandoned before payment: `Locked -> Open`
    Release,
}

/// Everything written when an order is created
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub timeline: Vec<TimelineEntry>,
    pub history: Vec<StatusHistoryEntry>,
    /// Upsert into this customer's address book and link it to the order
    pub save_address: Option<(String, ShippingAddress)>,
}

/// A versioned order update plus the log entries and cart effect it implies
#[derive(Debug, Clone)]
pub struct OrderCommit {
    /// Must carry `stored.version + 1`
    pub order: Order,
    pub timeline: Vec<TimelineEntry>,
    pub history: Vec<StatusHistoryEntry>,
    pub cart: Option<CartEffect>,
}

impl OrderCommit {
    pub fn new(order: Order) -> Self {
        Self {
            order,
            timeline: Vec::new(),
            history: Vec::new(),
            cart: None,
        }
    }

    pub fn with_timeline(mut self, entry: TimelineEntry) -> Self {
        self.timeline.push(entry);
        self
    }

    pub fn with_history(mut self, entry: StatusHistoryEntry) -> Self {
        self.history.push(entry);
        self
    }

    pub fn with_cart(mut self, effect: CartEffect) -> Self {
        self.cart = Some(effect);
        self
    }
}

/// Filter for order listings
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub customer_id: Option<String>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn for_customer(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: Some(customer_id.into()),
            status: None,
        }
    }

    pub fn with_status(status: Option<OrderStatus>) -> Self {
        Self {
            customer_id: None,
            status,
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.customer_id
            .as_deref()
            .map_or(true, |id| order.customer_id.as_deref() == Some(id))
            && self.status.map_or(true, |status| order.status == status)
    }
}

/// Storage port for carts, orders and their logs, addresses and saved cards
#[async_trait]
pub trait OrderRepository: Send + Sync {
    // Carts

    async fn save_cart(&self, cart: Cart) -> ShopResult<()>;

    async fn get_cart(&self, cart_id: &str) -> ShopResult<Option<Cart>>;

    /// Append a line; rejects carts that are not `Open` with `CartLocked`
    async fn add_cart_item(&self, cart_id: &str, item: CartItem) -> ShopResult<Cart>;

    /// Compare-and-set `Open -> Locked`; `CartLocked` when the cart is not open
    async fn lock_cart(&self, cart_id: &str) -> ShopResult<Cart>;

    /// `Locked -> Open`; no-op for carts in any other state
    async fn release_cart(&self, cart_id: &str) -> ShopResult<()>;

    // Orders

    async fn order_number_exists(&self, order_number: &str) -> ShopResult<bool>;

    /// Atomically write an order, its item snapshots, logs and optional
    /// address upsert. A taken order number is `Conflict`.
    async fn create_order(&self, new_order: NewOrder) -> ShopResult<Order>;

    async fn get_order(&self, order_id: &str) -> ShopResult<Option<Order>>;

    async fn find_by_number(&self, order_number: &str) -> ShopResult<Option<Order>>;

    /// Newest first
    async fn list_orders(&self, filter: &OrderFilter) -> ShopResult<Vec<Order>>;

    async fn items_for(&self, order_id: &str) -> ShopResult<Vec<OrderItem>>;

    async fn timeline_for(&self, order_id: &str) -> ShopResult<Vec<TimelineEntry>>;

    async fn history_for(&self, order_id: &str) -> ShopResult<Vec<StatusHistoryEntry>>;

    /// Atomically replace the order, append its log entries and apply the
    /// cart effect. A stale version is `Conflict` and nothing is written.
    async fn commit(&self, commit: OrderCommit) -> ShopResult<Order>;

    // Refunds

    /// Store the refund idempotency key unless one exists; returns the
    /// stored key either way.
    async fn persist_refund_key(&self, order_id: &str, key: &str) -> ShopResult<String>;

    /// Count a provider refund attempt and record its error, if any
    async fn record_refund_attempt(&self, order_id: &str, error: Option<String>)
        -> ShopResult<Order>;

    /// Captured orders with a refund initiated but not completed and fewer
    /// than `max_attempts` submissions
    async fn orders_awaiting_refund(&self, max_attempts: u32) -> ShopResult<Vec<Order>>;

    // Addresses

    async fn addresses_for(&self, customer_id: &str) -> ShopResult<Vec<CustomerAddress>>;

    // Saved cards

    /// Insert, or update token and card fields on `(customer_id, provider_ref)`.
    /// A customer's first card becomes the default.
    async fn upsert_payment_method(
        &self,
        method: CustomerPaymentMethod,
    ) -> ShopResult<CustomerPaymentMethod>;

    async fn get_payment_method(&self, method_id: &str)
        -> ShopResult<Option<CustomerPaymentMethod>>;

    /// Default first
    async fn payment_methods_for(&self, customer_id: &str)
        -> ShopResult<Vec<CustomerPaymentMethod>>;

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        method_id: &str,
    ) -> ShopResult<CustomerPaymentMethod>;

    async fn delete_payment_method(&self, customer_id: &str, method_id: &str) -> ShopResult<()>;
}

/// Type alias for a shared repository (dynamic dispatch)
pub type SharedRepository = Arc<dyn OrderRepository>;

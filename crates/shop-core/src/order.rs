//! # Order Types
//!
//! The durable order record, its immutable item snapshots, the append-only
//! timeline and audit history, and the two status enums whose legal moves
//! make up the order lifecycle.

use crate::address::ShippingAddress;
use crate::caller::Caller;
use crate::money::{Currency, OrderAmounts};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Business/fulfilment state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
    PaymentFailed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::PaymentFailed => "PAYMENT_FAILED",
        }
    }

    /// Legal forward moves of the hard-coded lifecycle
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Pending, PaymentFailed)
                | (PaymentFailed, Confirmed)
                | (PaymentFailed, Cancelled)
                | (Confirmed, Processing)
                | (Confirmed, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, OutForDelivery)
                | (Shipped, Delivered)
                | (OutForDelivery, Delivered)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Statuses in which the shipping snapshot may no longer change
    pub fn is_shipping_locked(&self) -> bool {
        matches!(
            self,
            OrderStatus::Shipped
                | OrderStatus::OutForDelivery
                | OrderStatus::Delivered
                | OrderStatus::Cancelled
        )
    }

    /// Statuses a customer may cancel from
    pub fn is_customer_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Money state of an order, tracked independently of [`OrderStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Failed,
    Paid,
    RefundInitiated,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::RefundInitiated => "REFUND_INITIATED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    // Failed sits beside Pending, not after it.
    fn rank(&self) -> u8 {
        match self {
            PaymentStatus::Pending | PaymentStatus::Failed => 0,
            PaymentStatus::Paid => 1,
            PaymentStatus::RefundInitiated => 2,
            PaymentStatus::Refunded => 3,
        }
    }

    /// Payment status never regresses: only strictly forward moves, plus
    /// the sideways `Pending -> Failed`.
    pub fn can_advance_to(&self, next: PaymentStatus) -> bool {
        if *self == PaymentStatus::Pending && next == PaymentStatus::Failed {
            return true;
        }
        next.rank() > self.rank()
    }

    /// Money has been captured at some point (and possibly refunded since)
    pub fn is_captured_or_later(&self) -> bool {
        self.rank() >= PaymentStatus::Paid.rank()
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who initiated a cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancellationSource {
    Customer,
    Admin,
}

/// Tag on customer-facing timeline entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineSource {
    Customer,
    Admin,
    Payment,
}

/// Customer-facing timeline entry (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub order_id: String,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<TimelineSource>,
    pub created_at: DateTime<Utc>,
}

impl TimelineEntry {
    pub fn new(order_id: impl Into<String>, status: OrderStatus) -> Self {
        Self {
            order_id: order_id.into(),
            status,
            note: None,
            source: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_source(mut self, source: TimelineSource) -> Self {
        self.source = Some(source);
        self
    }
}

/// Actor attributed on audit history entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Actor {
    System,
    Customer(String),
    Guest(String),
    Admin(String),
    Provider(String),
}

impl Actor {
    /// Attribute an action to the caller performing it
    pub fn from_caller(caller: &Caller) -> Self {
        match (&caller.customer_id, &caller.device_id) {
            (Some(id), _) => Actor::Customer(id.clone()),
            (None, Some(device)) => Actor::Guest(device.clone()),
            (None, None) => Actor::System,
        }
    }
}

/// Internal audit entry (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub order_id: String,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub actor: Actor,
    pub created_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn new(
        order_id: impl Into<String>,
        status: OrderStatus,
        actor: Actor,
        message: impl Into<String>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            status,
            message: Some(message.into()),
            actor,
            created_at: Utc::now(),
        }
    }
}

/// Progress of the provider-side refund
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    None,
    Initiated,
    Completed,
}

impl Default for RefundStatus {
    fn default() -> Self {
        RefundStatus::None
    }
}

/// Refund sub-record of an order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Refund {
    /// Intent recorded, provider has not confirmed completion
    pub initiated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    /// First write wins; reused for every retry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub status: RefundStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Deterministic refund idempotency key for an order
pub fn refund_idempotency_key(order_id: &str) -> String {
    format!("refund_{order_id}")
}

/// Immutable price/quantity snapshot of one cart line at purchase time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub order_id: String,
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    pub title: String,
    pub quantity: u32,
    pub unit_price_usd: Decimal,
    pub unit_price_local: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl OrderItem {
    pub fn line_total_local(&self) -> Decimal {
        self.unit_price_local * Decimal::from(self.quantity)
    }
}

/// Cancellation details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub cancelled_by: CancellationSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub cancelled_at: DateTime<Utc>,
    /// Payment status at the moment of cancellation
    pub payment_status_before: PaymentStatus,
}

/// Fulfilment details filled in by operators
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fulfilment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

/// The durable record of a checkout attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart_id: Option<String>,
    /// Device that placed a guest order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_note: Option<String>,

    pub shipping: ShippingAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address_id: Option<String>,

    pub currency: Currency,
    /// Amounts in `currency`
    pub amounts: OrderAmounts,
    /// Amounts in the base currency, immune to later rate changes
    pub amounts_base: OrderAmounts,
    pub exchange_rate: Decimal,

    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_provider: String,
    /// Last provider-reported status string ("pending", "initiated", "successful", "failed")
    pub provider_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<Cancellation>,
    #[serde(default)]
    pub fulfilment: Fulfilment,
    #[serde(default)]
    pub refund: Refund,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by every committed change
    pub version: u64,
}

impl Order {
    /// Whether `caller` may read or act on this order.
    ///
    /// Authenticated callers must own it; guests must present the device
    /// that placed an unclaimed order.
    pub fn is_owned_by(&self, caller: &Caller) -> bool {
        match &caller.customer_id {
            Some(customer_id) => self.customer_id.as_deref() == Some(customer_id.as_str()),
            None => {
                self.customer_id.is_none()
                    && caller.device_id.is_some()
                    && self.device_id == caller.device_id
            }
        }
    }

    /// Payment already captured or moving through refund
    pub fn is_paid(&self) -> bool {
        self.payment_status.is_captured_or_later()
    }

    /// Copy with the version bumped, ready to commit
    pub fn next_version(&self) -> Self {
        let mut next = self.clone();
        next.version = self.version + 1;
        next.updated_at = Utc::now();
        next
    }
}

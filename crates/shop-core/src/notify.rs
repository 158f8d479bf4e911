//! # Notifications
//!
//! Fire-and-forget customer and operator messages. Template rendering and
//! delivery belong to the [`Notifier`] implementation; the core only says
//! what happened and to whom.

use crate::money::Currency;
use crate::order::{CancellationSource, Order};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Order fields every message template needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: String,
    pub order_number: String,
    pub first_name: String,
    pub currency: Currency,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub item_count: usize,
    pub tracking_url: String,
}

impl OrderSummary {
    pub fn new(order: &Order, item_count: usize, app_url: &str) -> Self {
        Self {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            first_name: order.shipping.first_name().to_string(),
            currency: order.currency,
            subtotal: order.amounts.subtotal,
            shipping: order.amounts.shipping,
            total: order.amounts.total,
            item_count,
            tracking_url: format!(
                "{}/order/track/{}",
                app_url.trim_end_matches('/'),
                order.order_number
            ),
        }
    }
}

/// Something worth telling a person about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    OrderConfirmed {
        to: String,
        order: OrderSummary,
    },
    /// Sent to the operator mailbox
    NewOrder {
        to: String,
        order: OrderSummary,
        customer_email: String,
        transaction_id: Option<String>,
    },
    PaymentFailed {
        to: String,
        order: OrderSummary,
    },
    OrderCancelled {
        to: String,
        order: OrderSummary,
        cancelled_by: CancellationSource,
        refund_message: Option<String>,
    },
    RefundCompleted {
        to: String,
        order: OrderSummary,
        amount: Option<Decimal>,
    },
    OrderDelivered {
        to: String,
        order: OrderSummary,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::OrderConfirmed { .. } => "order_confirmed",
            Notification::NewOrder { .. } => "new_order",
            Notification::PaymentFailed { .. } => "payment_failed",
            Notification::OrderCancelled { .. } => "order_cancelled",
            Notification::RefundCompleted { .. } => "refund_completed",
            Notification::OrderDelivered { .. } => "order_delivered",
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Notification::OrderConfirmed { to, .. }
            | Notification::NewOrder { to, .. }
            | Notification::PaymentFailed { to, .. }
            | Notification::OrderCancelled { to, .. }
            | Notification::RefundCompleted { to, .. }
            | Notification::OrderDelivered { to, .. } => to,
        }
    }

    pub fn order(&self) -> &OrderSummary {
        match self {
            Notification::OrderConfirmed { order, .. }
            | Notification::NewOrder { order, .. }
            | Notification::PaymentFailed { order, .. }
            | Notification::OrderCancelled { order, .. }
            | Notification::RefundCompleted { order, .. }
            | Notification::OrderDelivered { order, .. } => order,
        }
    }
}

/// Outbound message sink
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), String>;
}

pub type SharedNotifier = Arc<dyn Notifier>;

/// Deliver without letting a failure reach the caller
pub async fn send_best_effort(notifier: &dyn Notifier, notification: Notification) {
    let kind = notification.kind();
    let order_number = notification.order().order_number.clone();
    if let Err(e) = notifier.send(notification).await {
        warn!(kind, order_number = %order_number, error = %e, "Notification failed");
    }
}

/// Notifier that only logs (development default)
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), String> {
        info!(
            kind = notification.kind(),
            to = notification.recipient(),
            order_number = %notification.order().order_number,
            "Notification"
        );
        Ok(())
    }
}

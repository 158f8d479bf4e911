//! # Order Lifecycle
//!
//! Customer and operator transitions over the order state machine, plus the
//! read views. Cancellation writes the refund intent in the same commit as
//! the status change; the provider refund runs afterwards through the
//! [`RefundOrchestrator`].

use crate::address::ShippingAddress;
use crate::caller::Caller;
use crate::config::ShopConfig;
use crate::error::{ShopError, ShopResult};
use crate::money::display_amount;
use crate::notify::{send_best_effort, Notification, OrderSummary, SharedNotifier};
use crate::order::{
    Actor, Cancellation, CancellationSource, Order, OrderItem, OrderStatus, PaymentStatus,
    StatusHistoryEntry, TimelineEntry, TimelineSource,
};
use crate::refund::RefundOrchestrator;
use crate::repository::{CartEffect, OrderCommit, OrderFilter, SharedRepository};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Operator request to move an order along
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<String>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub refund_amount: Option<Decimal>,
    #[serde(default)]
    pub refund_message: Option<String>,
}

impl StatusUpdate {
    pub fn to(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// An order with its items and customer-facing timeline
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub timeline: Vec<TimelineEntry>,
    /// Operator views only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<StatusHistoryEntry>>,
}

/// Who is cancelling, and on what terms
struct CancelRequest {
    source: CancellationSource,
    actor: Actor,
    reason: Option<String>,
    refund_amount: Option<Decimal>,
    refund_message: Option<String>,
    note: String,
}

pub struct OrderLifecycle {
    repo: SharedRepository,
    refunds: Arc<RefundOrchestrator>,
    notifier: SharedNotifier,
    config: ShopConfig,
}

impl OrderLifecycle {
    pub fn new(
        repo: SharedRepository,
        refunds: Arc<RefundOrchestrator>,
        notifier: SharedNotifier,
        config: ShopConfig,
    ) -> Self {
        Self {
            repo,
            refunds,
            notifier,
            config,
        }
    }

    async fn load(&self, order_id: &str) -> ShopResult<Order> {
        self.repo
            .get_order(order_id)
            .await?
            .ok_or_else(|| ShopError::not_found("Order", order_id))
    }

    async fn details(&self, order: Order, with_history: bool) -> ShopResult<OrderDetails> {
        let items = self.repo.items_for(&order.id).await?;
        let timeline = self.repo.timeline_for(&order.id).await?;
        let history = if with_history {
            Some(self.repo.history_for(&order.id).await?)
        } else {
            None
        };
        Ok(OrderDetails {
            order,
            items,
            timeline,
            history,
        })
    }

    async fn summary(&self, order: &Order) -> OrderSummary {
        let item_count = self
            .repo
            .items_for(&order.id)
            .await
            .map(|items| items.len())
            .unwrap_or(0);
        OrderSummary::new(order, item_count, &self.config.app_url)
    }

    // Reads

    /// Public lookup by order number
    pub async fn track(&self, order_number: &str) -> ShopResult<OrderDetails> {
        let order = self
            .repo
            .find_by_number(order_number)
            .await?
            .ok_or_else(|| ShopError::not_found("Order", order_number))?;
        self.details(order, false).await
    }

    pub async fn get_for_caller(&self, order_id: &str, caller: &Caller) -> ShopResult<OrderDetails> {
        let order = self.load(order_id).await?;
        check_order_ownership(&order, caller)?;
        self.details(order, false).await
    }

    pub async fn list_for_customer(&self, customer_id: &str) -> ShopResult<Vec<OrderDetails>> {
        let orders = self
            .repo
            .list_orders(&OrderFilter::for_customer(customer_id))
            .await?;
        let mut out = Vec::with_capacity(orders.len());
        for order in orders {
            out.push(self.details(order, false).await?);
        }
        Ok(out)
    }

    pub async fn admin_list(&self, status: Option<OrderStatus>) -> ShopResult<Vec<OrderDetails>> {
        let orders = self
            .repo
            .list_orders(&OrderFilter::with_status(status))
            .await?;
        let mut out = Vec::with_capacity(orders.len());
        for order in orders {
            out.push(self.details(order, true).await?);
        }
        Ok(out)
    }

    pub async fn admin_get(&self, order_id: &str) -> ShopResult<OrderDetails> {
        let order = self.load(order_id).await?;
        self.details(order, true).await
    }

    // Transitions

    /// Cancel on the customer's behalf; only from `Pending` or `Confirmed`
    #[instrument(skip(self, caller), fields(order_id = %order_id, actor = %caller.actor_tag()))]
    pub async fn customer_cancel(&self, order_id: &str, caller: &Caller) -> ShopResult<Order> {
        let order = self.load(order_id).await?;
        check_order_ownership(&order, caller)?;

        if !order.status.is_customer_cancellable() {
            return Err(ShopError::NotCancellable {
                status: order.status.to_string(),
            });
        }

        self.cancel(
            order,
            CancelRequest {
                source: CancellationSource::Customer,
                actor: Actor::from_caller(caller),
                reason: Some("Cancelled by customer".to_string()),
                refund_amount: None,
                refund_message: None,
                note: "Customer cancelled order".to_string(),
            },
        )
        .await
    }

    /// Operator status change, including cancellation with a refund
    #[instrument(skip(self, update), fields(order_id = %order_id, admin_id = %admin_id))]
    pub async fn admin_update_status(
        &self,
        order_id: &str,
        update: StatusUpdate,
        admin_id: &str,
    ) -> ShopResult<Order> {
        let status = update
            .status
            .ok_or_else(|| ShopError::Validation("status is required".into()))?;
        let order = self.load(order_id).await?;

        if !order.status.can_transition_to(status) {
            return Err(ShopError::InvalidTransition {
                from: order.status.to_string(),
                to: status.to_string(),
            });
        }

        if status == OrderStatus::Cancelled {
            let note = update
                .note
                .clone()
                .unwrap_or_else(|| "Order cancelled by admin".to_string());
            return self
                .cancel(
                    order,
                    CancelRequest {
                        source: CancellationSource::Admin,
                        actor: Actor::Admin(admin_id.to_string()),
                        reason: update.cancellation_reason,
                        refund_amount: update.refund_amount,
                        refund_message: update.refund_message,
                        note,
                    },
                )
                .await;
        }

        let previous = order.status;
        let mut next = order.next_version();
        next.status = status;
        if let Some(tracking_number) = update.tracking_number {
            next.fulfilment.tracking_number = Some(tracking_number);
        }
        if let Some(carrier) = update.carrier {
            next.fulfilment.carrier = Some(carrier);
        }
        if let Some(estimated_delivery) = update.estimated_delivery {
            next.fulfilment.estimated_delivery = Some(estimated_delivery);
        }
        if status == OrderStatus::Delivered {
            next.fulfilment.delivered_at = Some(update.delivered_at.unwrap_or_else(Utc::now));
        } else if let Some(delivered_at) = update.delivered_at {
            next.fulfilment.delivered_at = Some(delivered_at);
        }

        let mut timeline = TimelineEntry::new(&order.id, status).with_source(TimelineSource::Admin);
        if let Some(note) = &update.note {
            timeline = timeline.with_note(note.clone());
        }
        let message = update
            .note
            .unwrap_or_else(|| format!("Status changed from {previous} to {status}"));

        let updated = self
            .repo
            .commit(
                OrderCommit::new(next)
                    .with_timeline(timeline)
                    .with_history(StatusHistoryEntry::new(
                        &order.id,
                        status,
                        Actor::Admin(admin_id.to_string()),
                        message,
                    )),
            )
            .await?;
        info!(from = %previous, to = %status, "Order status updated");

        if status == OrderStatus::Delivered {
            send_best_effort(
                self.notifier.as_ref(),
                Notification::OrderDelivered {
                    to: updated.email.clone(),
                    order: self.summary(&updated).await,
                },
            )
            .await;
        }

        Ok(updated)
    }

    /// Replace the shipping snapshot while the order has not shipped
    #[instrument(skip(self, shipping, note), fields(order_id = %order_id, admin_id = %admin_id))]
    pub async fn update_shipping(
        &self,
        order_id: &str,
        shipping: ShippingAddress,
        note: Option<String>,
        admin_id: &str,
    ) -> ShopResult<Order> {
        let order = self.load(order_id).await?;
        if order.status.is_shipping_locked() {
            return Err(ShopError::ShippingLocked {
                status: order.status.to_string(),
            });
        }
        validate_shipping(&shipping)?;

        let mut next = order.next_version();
        next.shipping = shipping;

        let updated = self
            .repo
            .commit(
                OrderCommit::new(next)
                    .with_timeline(
                        TimelineEntry::new(&order.id, order.status)
                            .with_note(
                                note.clone()
                                    .unwrap_or_else(|| "Shipping address updated by admin".into()),
                            )
                            .with_source(TimelineSource::Admin),
                    )
                    .with_history(StatusHistoryEntry::new(
                        &order.id,
                        order.status,
                        Actor::Admin(admin_id.to_string()),
                        note.unwrap_or_else(|| "Admin updated shipping details".into()),
                    )),
            )
            .await?;

        info!("Shipping address updated");
        Ok(updated)
    }

    /// Phase one of the refund rides on the cancellation commit; phase two
    /// and the notification follow it.
    async fn cancel(&self, order: Order, request: CancelRequest) -> ShopResult<Order> {
        let total = order.amounts.total;
        let refund_amount = match request.refund_amount {
            Some(amount) if amount <= Decimal::ZERO || amount > total => {
                return Err(ShopError::Validation(format!(
                    "refundAmount must be greater than 0 and at most {total}"
                )));
            }
            Some(amount) => order.currency.round(amount),
            None => total,
        };
        let shown = display_amount(order.currency, refund_amount);
        let refund_message = request.refund_message.unwrap_or_else(|| match request.source {
            CancellationSource::Admin => {
                format!("Your refund of {shown} will be processed within 5–7 business days.")
            }
            CancellationSource::Customer => {
                format!("Your refund of {shown} is now being processed.")
            }
        });

        let was_paid = order.is_paid();
        let mut next = order.next_version();
        next.status = OrderStatus::Cancelled;
        next.cancellation = Some(Cancellation {
            cancelled_by: request.source,
            reason: request.reason,
            cancelled_at: Utc::now(),
            payment_status_before: order.payment_status,
        });
        next.payment_status = PaymentStatus::RefundInitiated;
        next.refund.initiated = true;
        next.refund.amount = Some(refund_amount);
        next.refund.currency = Some(order.currency);
        next.refund.message = Some(refund_message.clone());

        let source = match request.source {
            CancellationSource::Customer => TimelineSource::Customer,
            CancellationSource::Admin => TimelineSource::Admin,
        };
        let history_message = match request.source {
            CancellationSource::Customer => "Order cancelled by customer".to_string(),
            CancellationSource::Admin => request.note.clone(),
        };
        let mut commit = OrderCommit::new(next)
            .with_timeline(
                TimelineEntry::new(&order.id, OrderStatus::Cancelled)
                    .with_note(request.note)
                    .with_source(source),
            )
            .with_history(StatusHistoryEntry::new(
                &order.id,
                OrderStatus::Cancelled,
                request.actor,
                history_message,
            ));
        if !was_paid {
            commit = commit.with_cart(CartEffect::Release);
        }

        let cancelled = self.repo.commit(commit).await?;
        info!(
            cancelled_by = ?request.source,
            refund_amount = %refund_amount,
            was_paid,
            "Order cancelled"
        );

        if cancelled.provider_transaction_id.is_some() {
            self.refunds.execute(&cancelled.id).await;
        }

        send_best_effort(
            self.notifier.as_ref(),
            Notification::OrderCancelled {
                to: cancelled.email.clone(),
                order: self.summary(&cancelled).await,
                cancelled_by: request.source,
                refund_message: Some(refund_message),
            },
        )
        .await;

        // Refund phase two may have advanced the version.
        Ok(self.repo.get_order(&cancelled.id).await?.unwrap_or(cancelled))
    }
}

/// Customers must own the order; guests must present the placing device
pub fn check_order_ownership(order: &Order, caller: &Caller) -> ShopResult<()> {
    if caller.customer_id.is_none() && caller.device_id.is_none() {
        return Err(ShopError::OwnershipMismatch(
            "device id is required for guest order access".into(),
        ));
    }
    if !order.is_owned_by(caller) {
        warn!(order_id = %order.id, actor = %caller.actor_tag(), "Order ownership mismatch");
        return Err(ShopError::OwnershipMismatch(
            "you are not authorized to access this order".into(),
        ));
    }
    Ok(())
}

fn validate_shipping(shipping: &ShippingAddress) -> ShopResult<()> {
    let required = [
        ("shippingFullName", &shipping.full_name),
        ("shippingPhone", &shipping.phone),
        ("shippingStreet", &shipping.street),
        ("shippingCity", &shipping.city),
        ("shippingCountry", &shipping.country),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(ShopError::Validation(format!("{field} is required")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{Cart, CartItem, CartStatus};
    use crate::money::Currency;
    use crate::order::RefundStatus;
    use crate::repository::{NewOrder, OrderRepository};
    use crate::testing::{order_fixture, shipping_fixture, Harness};
    use rust_decimal_macros::dec;

    fn lifecycle(h: &Harness) -> OrderLifecycle {
        let refunds = Arc::new(RefundOrchestrator::new(h.repo.clone(), h.gateway.clone()));
        OrderLifecycle::new(h.repo.clone(), refunds, h.notifier.clone(), h.config.clone())
    }

    async fn store(h: &Harness, order: Order) -> Order {
        h.repo
            .create_order(NewOrder {
                order,
                items: Vec::new(),
                timeline: Vec::new(),
                history: Vec::new(),
                save_address: None,
            })
            .await
            .unwrap()
    }

    async fn paid_order(h: &Harness, status: OrderStatus) -> Order {
        let mut order = order_fixture(dec!(25), dec!(5), Currency::USD);
        order.status = status;
        order.payment_status = PaymentStatus::Paid;
        order.provider_transaction_id = Some("9001".into());
        store(h, order).await
    }

    #[tokio::test]
    async fn test_admin_cancel_paid_order_refunds_once() {
        let h = Harness::new();
        let order = paid_order(&h, OrderStatus::Confirmed).await;

        let cancelled = lifecycle(&h)
            .admin_update_status(&order.id, StatusUpdate::to(OrderStatus::Cancelled), "a1")
            .await
            .unwrap();

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::RefundInitiated);
        assert!(cancelled.refund.initiated);
        assert_eq!(cancelled.refund.amount, Some(dec!(30)));
        assert_eq!(cancelled.refund.status, RefundStatus::Initiated);
        assert_eq!(
            cancelled.refund.message.as_deref(),
            Some("Your refund of USD30.00 will be processed within 5–7 business days.")
        );
        let cancellation = cancelled.cancellation.unwrap();
        assert_eq!(cancellation.cancelled_by, CancellationSource::Admin);
        assert_eq!(cancellation.payment_status_before, PaymentStatus::Paid);

        let calls = h.gateway.refund_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].amount, dec!(30));
        assert_eq!(calls[0].idempotency_key, format!("refund_{}", order.id));
        assert_eq!(h.notifier.kinds(), vec!["order_cancelled"]);
    }

    #[tokio::test]
    async fn test_admin_partial_refund_amount() {
        let h = Harness::new();
        let order = paid_order(&h, OrderStatus::Processing).await;
        let l = lifecycle(&h);

        let too_much = StatusUpdate {
            refund_amount: Some(dec!(31)),
            ..StatusUpdate::to(OrderStatus::Cancelled)
        };
        assert!(matches!(
            l.admin_update_status(&order.id, too_much, "a1").await,
            Err(ShopError::Validation(_))
        ));
        let zero = StatusUpdate {
            refund_amount: Some(Decimal::ZERO),
            ..StatusUpdate::to(OrderStatus::Cancelled)
        };
        assert!(l.admin_update_status(&order.id, zero, "a1").await.is_err());

        let partial = StatusUpdate {
            refund_amount: Some(dec!(10)),
            refund_message: Some("Partial refund for the missing item.".into()),
            cancellation_reason: Some("Item unavailable".into()),
            ..StatusUpdate::to(OrderStatus::Cancelled)
        };
        let cancelled = l.admin_update_status(&order.id, partial, "a1").await.unwrap();

        assert_eq!(cancelled.refund.amount, Some(dec!(10)));
        assert_eq!(
            cancelled.refund.message.as_deref(),
            Some("Partial refund for the missing item.")
        );
        let calls = h.gateway.refund_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].amount, dec!(10));
        assert_eq!(calls[0].reason.as_deref(), Some("Item unavailable"));
    }

    #[tokio::test]
    async fn test_customer_cancel_of_shipped_order_rejected() {
        let h = Harness::new();
        let order = paid_order(&h, OrderStatus::Shipped).await;

        let result = lifecycle(&h)
            .customer_cancel(&order.id, &Caller::customer("c1"))
            .await;

        assert!(matches!(result, Err(ShopError::NotCancellable { .. })));
        let stored = h.repo.get_order(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Shipped);
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert!(h.gateway.refund_calls().is_empty());
    }

    #[tokio::test]
    async fn test_customer_cancel_unpaid_releases_cart() {
        let h = Harness::new();
        let cart = Cart::for_device("dev-1").with_item(CartItem::new("p1", "Tee", dec!(25), 1));
        h.repo.save_cart(cart.clone()).await.unwrap();
        h.repo.lock_cart(&cart.id).await.unwrap();
        let mut order = order_fixture(dec!(25), dec!(5), Currency::USD);
        order.customer_id = None;
        order.device_id = Some("dev-1".into());
        order.cart_id = Some(cart.id.clone());
        let order = store(&h, order).await;
        let l = lifecycle(&h);

        let wrong_device = l
            .customer_cancel(&order.id, &Caller::guest("dev-2"))
            .await;
        assert!(matches!(wrong_device, Err(ShopError::OwnershipMismatch(_))));

        let cancelled = l
            .customer_cancel(&order.id, &Caller::guest("dev-1"))
            .await
            .unwrap();

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::RefundInitiated);
        assert_eq!(
            cancelled.refund.message.as_deref(),
            Some("Your refund of USD30.00 is now being processed.")
        );
        assert!(h.gateway.refund_calls().is_empty());
        let cart = h.repo.get_cart(&cart.id).await.unwrap().unwrap();
        assert_eq!(cart.status, CartStatus::Open);

        let timeline = h.repo.timeline_for(&order.id).await.unwrap();
        assert_eq!(timeline.last().unwrap().source, Some(TimelineSource::Customer));
    }

    #[tokio::test]
    async fn test_invalid_transition_rejected() {
        let h = Harness::new();
        let order = store(&h, order_fixture(dec!(25), dec!(5), Currency::USD)).await;
        let l = lifecycle(&h);

        let result = l
            .admin_update_status(&order.id, StatusUpdate::to(OrderStatus::Shipped), "a1")
            .await;
        assert!(matches!(result, Err(ShopError::InvalidTransition { .. })));

        let missing = l
            .admin_update_status(&order.id, StatusUpdate::default(), "a1")
            .await;
        assert!(matches!(missing, Err(ShopError::Validation(_))));
    }

    #[tokio::test]
    async fn test_fulfilment_fields_and_delivery_notice() {
        let h = Harness::new();
        let order = paid_order(&h, OrderStatus::Processing).await;
        let l = lifecycle(&h);

        let shipped = StatusUpdate {
            tracking_number: Some("1Z999".into()),
            carrier: Some("UPS".into()),
            estimated_delivery: Some("2026-11-02".into()),
            note: Some("Handed to carrier".into()),
            ..StatusUpdate::to(OrderStatus::Shipped)
        };
        let updated = l.admin_update_status(&order.id, shipped, "a1").await.unwrap();
        assert_eq!(updated.fulfilment.tracking_number.as_deref(), Some("1Z999"));
        assert_eq!(updated.fulfilment.carrier.as_deref(), Some("UPS"));

        let delivered = l
            .admin_update_status(&order.id, StatusUpdate::to(OrderStatus::Delivered), "a1")
            .await
            .unwrap();
        assert!(delivered.fulfilment.delivered_at.is_some());
        assert_eq!(delivered.fulfilment.tracking_number.as_deref(), Some("1Z999"));
        assert_eq!(h.notifier.kinds(), vec!["order_delivered"]);

        let history = h.repo.history_for(&order.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].actor, Actor::Admin("a1".into()));
        assert_eq!(history[0].message.as_deref(), Some("Handed to carrier"));
    }

    #[tokio::test]
    async fn test_shipping_locked_after_shipment() {
        let h = Harness::new();
        let order = paid_order(&h, OrderStatus::Confirmed).await;
        let l = lifecycle(&h);

        let mut address = shipping_fixture();
        address.street = "99 New Road".into();
        let updated = l
            .update_shipping(&order.id, address.clone(), None, "a1")
            .await
            .unwrap();
        assert_eq!(updated.shipping.street, "99 New Road");

        for status in [OrderStatus::Processing, OrderStatus::Shipped] {
            l.admin_update_status(&order.id, StatusUpdate::to(status), "a1")
                .await
                .unwrap();
        }
        let locked = l.update_shipping(&order.id, address, None, "a1").await;
        assert!(matches!(locked, Err(ShopError::ShippingLocked { .. })));
    }

    #[tokio::test]
    async fn test_reads_enforce_ownership() {
        let h = Harness::new();
        let order = store(&h, order_fixture(dec!(25), dec!(5), Currency::USD)).await;
        store(&h, order_fixture(dec!(1), dec!(1), Currency::USD)).await;
        let l = lifecycle(&h);

        assert!(l.get_for_caller(&order.id, &Caller::customer("c1")).await.is_ok());
        assert!(matches!(
            l.get_for_caller(&order.id, &Caller::customer("c2")).await,
            Err(ShopError::OwnershipMismatch(_))
        ));
        assert!(matches!(
            l.get_for_caller(&order.id, &Caller::anonymous()).await,
            Err(ShopError::OwnershipMismatch(_))
        ));

        let tracked = l.track(&order.order_number).await.unwrap();
        assert_eq!(tracked.order.id, order.id);
        assert!(tracked.history.is_none());
        assert!(matches!(
            l.track("KBC-NOPE").await,
            Err(ShopError::NotFound { .. })
        ));

        assert_eq!(l.list_for_customer("c1").await.unwrap().len(), 2);
        assert_eq!(
            l.admin_list(Some(OrderStatus::Pending)).await.unwrap().len(),
            2
        );
        assert!(l.admin_list(Some(OrderStatus::Shipped)).await.unwrap().is_empty());
        assert!(l.admin_get(&order.id).await.unwrap().history.is_some());
    }
}

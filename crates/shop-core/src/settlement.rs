//! Payment-state transitions shared by the webhook processor and the
//! saved-card flow.
//!
//! Every transition is gated on the stored payment status so repeated or
//! concurrent deliveries of the same fact commit at most once. A lost
//! version race reloads the order and runs the gate again, once.

use crate::config::ShopConfig;
use crate::error::{ShopError, ShopResult};
use crate::notify::{send_best_effort, Notification, Notifier, OrderSummary};
use crate::order::{
    Actor, Order, OrderStatus, PaymentStatus, RefundStatus, StatusHistoryEntry, TimelineEntry,
    TimelineSource,
};
use crate::repository::{CartEffect, OrderCommit, OrderRepository};
use chrono::Utc;
use tracing::{debug, info};

/// A provider-confirmed fact about an order's money
#[derive(Debug, Clone)]
pub enum Settlement {
    /// Charge captured and independently verified
    Captured {
        transaction_id: String,
        tx_ref: Option<String>,
        actor: Actor,
        message: String,
    },
    /// Charge failed
    Failed { actor: Actor, message: String },
    /// Refund completed on the provider side
    Refunded { actor: Actor, message: String },
}

/// What the gate decided for a stored order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Apply,
    AlreadyProcessed,
    /// The fact does not apply to this order at all
    Ignore,
}

/// Result of [`settle`]
#[derive(Debug, Clone)]
pub enum Settled {
    Applied(Order),
    AlreadyProcessed(Order),
    Ignored(Order),
}

impl Settled {
    pub fn order(&self) -> &Order {
        match self {
            Settled::Applied(o) | Settled::AlreadyProcessed(o) | Settled::Ignored(o) => o,
        }
    }
}

impl Settlement {
    /// Idempotency gate: decide from stored state alone whether this fact
    /// still needs committing.
    pub fn gate(&self, order: &Order) -> Gate {
        match self {
            Settlement::Captured { .. } => {
                // A cancelled, never-captured order still needs the capture
                // recorded so the refund can go out.
                let awaiting_late_capture = order.payment_status
                    == PaymentStatus::RefundInitiated
                    && order.provider_transaction_id.is_none();
                if order.payment_status.can_advance_to(PaymentStatus::Paid) || awaiting_late_capture {
                    Gate::Apply
                } else {
                    Gate::AlreadyProcessed
                }
            }
            // Only Pending may move sideways to Failed; nothing downgrades.
            Settlement::Failed { .. } => {
                if order.payment_status.can_advance_to(PaymentStatus::Failed) {
                    Gate::Apply
                } else {
                    Gate::AlreadyProcessed
                }
            }
            Settlement::Refunded { .. } => match order.payment_status {
                PaymentStatus::Refunded => Gate::AlreadyProcessed,
                PaymentStatus::Pending | PaymentStatus::Failed => Gate::Ignore,
                PaymentStatus::Paid | PaymentStatus::RefundInitiated => Gate::Apply,
            },
        }
    }

    /// Build the versioned commit applying this fact to `order`
    pub fn commit_for(&self, order: &Order, config: &ShopConfig) -> OrderCommit {
        let now = Utc::now();
        let mut next = order.next_version();

        match self {
            Settlement::Captured {
                transaction_id,
                tx_ref,
                actor,
                message,
            } => {
                next.provider_transaction_id = Some(transaction_id.clone());
                next.provider_status = "successful".to_string();
                next.paid_at = Some(now);
                if let Some(tx_ref) = tx_ref {
                    next.tx_ref = Some(tx_ref.clone());
                }

                if order.status == OrderStatus::Cancelled {
                    // Paid after cancelling: keep the refund intent, record the capture.
                    let note = "Payment received after cancellation. A refund will be issued.";
                    return OrderCommit::new(next)
                        .with_timeline(
                            TimelineEntry::new(&order.id, OrderStatus::Cancelled)
                                .with_note(note)
                                .with_source(TimelineSource::Payment),
                        )
                        .with_history(StatusHistoryEntry::new(
                            &order.id,
                            OrderStatus::Cancelled,
                            actor.clone(),
                            note,
                        ));
                }

                next.payment_status = PaymentStatus::Paid;
                next.receipt_url = Some(config.receipt_url(&order.order_number));
                if order.status.can_transition_to(OrderStatus::Confirmed) {
                    next.status = OrderStatus::Confirmed;
                }

                OrderCommit::new(next)
                    .with_timeline(
                        TimelineEntry::new(&order.id, OrderStatus::Confirmed)
                            .with_note("Payment successful. Your order is being processed.")
                            .with_source(TimelineSource::Payment),
                    )
                    .with_history(StatusHistoryEntry::new(
                        &order.id,
                        OrderStatus::Confirmed,
                        actor.clone(),
                        message.clone(),
                    ))
                    .with_cart(CartEffect::Clear)
            }
            Settlement::Failed { actor, message } => {
                next.payment_status = PaymentStatus::Failed;
                next.provider_status = "failed".to_string();
                if order.status.can_transition_to(OrderStatus::PaymentFailed) {
                    next.status = OrderStatus::PaymentFailed;
                }

                OrderCommit::new(next)
                    .with_timeline(
                        TimelineEntry::new(&order.id, OrderStatus::PaymentFailed)
                            .with_note("Payment failed. Retry any time.")
                            .with_source(TimelineSource::Payment),
                    )
                    .with_history(StatusHistoryEntry::new(
                        &order.id,
                        OrderStatus::PaymentFailed,
                        actor.clone(),
                        message.clone(),
                    ))
            }
            Settlement::Refunded { actor, message } => {
                next.payment_status = PaymentStatus::Refunded;
                next.status = OrderStatus::Cancelled;
                next.refund.initiated = false;
                next.refund.status = RefundStatus::Completed;
                next.refund.refunded_at = Some(now);
                next.refund.last_error = None;

                OrderCommit::new(next)
                    .with_timeline(
                        TimelineEntry::new(&order.id, OrderStatus::Cancelled)
                            .with_note("Refund completed.")
                            .with_source(TimelineSource::Payment),
                    )
                    .with_history(StatusHistoryEntry::new(
                        &order.id,
                        OrderStatus::Cancelled,
                        actor.clone(),
                        message.clone(),
                    ))
            }
        }
    }
}

/// Gate and commit `settlement` against `order`; on a version conflict,
/// reload and re-gate once.
pub async fn settle(
    repo: &dyn OrderRepository,
    order: Order,
    settlement: &Settlement,
    config: &ShopConfig,
) -> ShopResult<Settled> {
    let mut order = order;
    let mut reloaded = false;

    loop {
        match settlement.gate(&order) {
            Gate::AlreadyProcessed => return Ok(Settled::AlreadyProcessed(order)),
            Gate::Ignore => return Ok(Settled::Ignored(order)),
            Gate::Apply => {}
        }

        match repo.commit(settlement.commit_for(&order, config)).await {
            Ok(committed) => {
                info!(
                    order_id = %committed.id,
                    payment_status = %committed.payment_status,
                    status = %committed.status,
                    "Payment state committed"
                );
                return Ok(Settled::Applied(committed));
            }
            Err(ShopError::Conflict { .. }) if !reloaded => {
                debug!(order_id = %order.id, "Version conflict, reloading order");
                reloaded = true;
                order = repo
                    .get_order(&order.id)
                    .await?
                    .ok_or_else(|| ShopError::not_found("Order", &order.id))?;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Customer confirmation plus the operator's new-order message
pub async fn notify_confirmed(
    notifier: &dyn Notifier,
    repo: &dyn OrderRepository,
    config: &ShopConfig,
    order: &Order,
) {
    let item_count = repo.items_for(&order.id).await.map(|i| i.len()).unwrap_or(0);
    let summary = OrderSummary::new(order, item_count, &config.app_url);

    send_best_effort(
        notifier,
        Notification::OrderConfirmed {
            to: order.email.clone(),
            order: summary.clone(),
        },
    )
    .await;
    send_best_effort(
        notifier,
        Notification::NewOrder {
            to: config.operator_email.clone(),
            order: summary,
            customer_email: order.email.clone(),
            transaction_id: order.provider_transaction_id.clone(),
        },
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{Cart, CartItem, CartStatus};
    use crate::memory::InMemoryRepository;
    use crate::money::Currency;
    use crate::repository::NewOrder;
    use crate::testing::order_fixture;
    use rust_decimal_macros::dec;

    fn captured() -> Settlement {
        Settlement::Captured {
            transaction_id: "9001".into(),
            tx_ref: None,
            actor: Actor::Provider("mock".into()),
            message: "Payment confirmed".into(),
        }
    }

    fn failed() -> Settlement {
        Settlement::Failed {
            actor: Actor::Provider("mock".into()),
            message: "Payment failed".into(),
        }
    }

    async fn stored_order(repo: &InMemoryRepository) -> Order {
        let cart = Cart::for_device("d1").with_item(CartItem::new("p1", "Tee", dec!(25), 1));
        repo.save_cart(cart.clone()).await.unwrap();
        repo.lock_cart(&cart.id).await.unwrap();
        let mut order = order_fixture(dec!(25), dec!(5), Currency::USD);
        order.cart_id = Some(cart.id);
        repo.create_order(NewOrder {
            order,
            items: Vec::new(),
            timeline: Vec::new(),
            history: Vec::new(),
            save_address: None,
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_gate_never_downgrades() {
        let mut order = order_fixture(dec!(1), dec!(1), Currency::USD);
        assert_eq!(captured().gate(&order), Gate::Apply);
        assert_eq!(failed().gate(&order), Gate::Apply);

        order.payment_status = PaymentStatus::Paid;
        order.provider_transaction_id = Some("1".into());
        assert_eq!(captured().gate(&order), Gate::AlreadyProcessed);
        assert_eq!(failed().gate(&order), Gate::AlreadyProcessed);

        order.payment_status = PaymentStatus::Failed;
        assert_eq!(failed().gate(&order), Gate::AlreadyProcessed);
        assert_eq!(captured().gate(&order), Gate::Apply);

        order.payment_status = PaymentStatus::Refunded;
        assert_eq!(captured().gate(&order), Gate::AlreadyProcessed);
        assert_eq!(failed().gate(&order), Gate::AlreadyProcessed);
    }

    #[test]
    fn test_late_capture_on_cancelled_order_applies_once() {
        let mut order = order_fixture(dec!(1), dec!(1), Currency::USD);
        order.status = OrderStatus::Cancelled;
        order.payment_status = PaymentStatus::RefundInitiated;
        assert_eq!(captured().gate(&order), Gate::Apply);

        let commit = captured().commit_for(&order, &ShopConfig::default());
        assert_eq!(commit.order.status, OrderStatus::Cancelled);
        assert_eq!(commit.order.payment_status, PaymentStatus::RefundInitiated);
        assert_eq!(commit.order.provider_transaction_id.as_deref(), Some("9001"));
        assert_eq!(captured().gate(&commit.order), Gate::AlreadyProcessed);
    }

    #[tokio::test]
    async fn test_capture_clears_cart_and_sets_receipt() {
        let repo = InMemoryRepository::new();
        let order = stored_order(&repo).await;
        let config = ShopConfig::new("https://shop.example");

        let settled = settle(&repo, order.clone(), &captured(), &config)
            .await
            .unwrap();
        let Settled::Applied(paid) = settled else {
            panic!("expected capture to apply");
        };

        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.status, OrderStatus::Confirmed);
        assert_eq!(
            paid.receipt_url,
            Some(format!(
                "https://shop.example/order/receipt/{}",
                order.order_number
            ))
        );
        let cart = repo
            .get_cart(order.cart_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cart.status, CartStatus::Cleared);
    }

    #[tokio::test]
    async fn test_stale_order_reloads_and_regates() {
        let repo = InMemoryRepository::new();
        let order = stored_order(&repo).await;
        let config = ShopConfig::default();

        // Another writer confirms first; we still hold the stale copy.
        settle(&repo, order.clone(), &captured(), &config)
            .await
            .unwrap();
        let second = settle(&repo, order.clone(), &captured(), &config)
            .await
            .unwrap();

        assert!(matches!(second, Settled::AlreadyProcessed(_)));
        assert_eq!(repo.timeline_for(&order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_cart_locked() {
        let repo = InMemoryRepository::new();
        let order = stored_order(&repo).await;

        let settled = settle(&repo, order.clone(), &failed(), &ShopConfig::default())
            .await
            .unwrap();
        assert_eq!(settled.order().status, OrderStatus::PaymentFailed);
        assert_eq!(settled.order().payment_status, PaymentStatus::Failed);

        let cart = repo
            .get_cart(order.cart_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cart.status, CartStatus::Locked);
    }

    #[test]
    fn test_refund_gate() {
        let refunded = Settlement::Refunded {
            actor: Actor::System,
            message: "Refund completed".into(),
        };
        let mut order = order_fixture(dec!(1), dec!(1), Currency::USD);
        assert_eq!(refunded.gate(&order), Gate::Ignore);

        order.payment_status = PaymentStatus::RefundInitiated;
        assert_eq!(refunded.gate(&order), Gate::Apply);
        let commit = refunded.commit_for(&order, &ShopConfig::default());
        assert_eq!(commit.order.payment_status, PaymentStatus::Refunded);
        assert_eq!(commit.order.refund.status, RefundStatus::Completed);
        assert!(!commit.order.refund.initiated);

        order.payment_status = PaymentStatus::Refunded;
        assert_eq!(refunded.gate(&order), Gate::AlreadyProcessed);
    }
}

//! # Webhook Reconciliation Processor
//!
//! Folds provider events into order state, safely under redelivery:
//!
//! ```text
//! authenticate ─► normalize ─► resolve order ─► idempotency gate
//!      ─► re-verify (success only) ─► commit ─► save card / notify
//! ```
//!
//! Every step may short-circuit with an outcome; business outcomes are all
//! acknowledged to the provider. Only authentication failures and storage
//! errors surface as errors.

use crate::caller::customer_from_actor_tag;
use crate::config::ShopConfig;
use crate::error::{ShopError, ShopResult};
use crate::event::{PaymentEvent, PaymentEventKind};
use crate::gateway::BoxedPaymentGateway;
use crate::notify::{send_best_effort, Notification, OrderSummary, SharedNotifier};
use crate::order::{Actor, Order, PaymentStatus};
use crate::payment_method::CustomerPaymentMethod;
use crate::refund::{RefundAttempt, RefundOrchestrator};
use crate::repository::SharedRepository;
use crate::settlement::{notify_confirmed, settle, Gate, Settled, Settlement};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// How an inbound event was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed,
    AlreadyProcessed,
    PaymentFailed,
    RefundCompleted,
    VerificationFailed,
    MissingTransactionId,
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::AlreadyProcessed => "already_processed",
            WebhookOutcome::PaymentFailed => "payment_failed",
            WebhookOutcome::RefundCompleted => "refund_completed",
            WebhookOutcome::VerificationFailed => "verification_failed",
            WebhookOutcome::MissingTransactionId => "missing_transaction_id",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

impl std::fmt::Display for WebhookOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ReconciliationProcessor {
    repo: SharedRepository,
    gateway: BoxedPaymentGateway,
    refunds: Arc<RefundOrchestrator>,
    notifier: SharedNotifier,
    config: ShopConfig,
}

impl ReconciliationProcessor {
    pub fn new(
        repo: SharedRepository,
        gateway: BoxedPaymentGateway,
        refunds: Arc<RefundOrchestrator>,
        notifier: SharedNotifier,
        config: ShopConfig,
    ) -> Self {
        Self {
            repo,
            gateway,
            refunds,
            notifier,
            config,
        }
    }

    /// Authenticate and process a raw webhook delivery
    pub async fn handle(&self, payload: &[u8], signature: Option<&str>) -> ShopResult<WebhookOutcome> {
        let event = match self.gateway.parse_webhook(payload, signature) {
            Ok(Some(event)) => event,
            Ok(None) => {
                warn!("Webhook payload missing event type or data");
                return Ok(WebhookOutcome::Ignored);
            }
            Err(e @ ShopError::WebhookVerificationFailed(_)) => {
                warn!(provider = self.gateway.provider_name(), "Invalid webhook signature");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.process(event).await
    }

    /// Process an authenticated, normalized event
    #[instrument(skip(self, event), fields(event_type = %event.event_type, shape = ?event.shape))]
    pub async fn process(&self, event: PaymentEvent) -> ShopResult<WebhookOutcome> {
        info!("Webhook received");

        let Some(order_id) = event.order_id() else {
            warn!("Webhook missing order id");
            return Ok(WebhookOutcome::Ignored);
        };
        let Some(order) = self.repo.get_order(&order_id).await? else {
            warn!(order_id = %order_id, "Webhook references unknown order");
            return Ok(WebhookOutcome::Ignored);
        };

        match &event.kind {
            PaymentEventKind::ChargeSucceeded => self.on_success(order, &event).await,
            PaymentEventKind::ChargeFailed => self.on_failure(order).await,
            PaymentEventKind::RefundCompleted => self.on_refund(order).await,
            PaymentEventKind::Unknown(event_type) => {
                warn!(event_type = %event_type, "Unhandled webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    fn provider_actor(&self) -> Actor {
        Actor::Provider(self.gateway.provider_name().to_string())
    }

    async fn on_success(&self, order: Order, event: &PaymentEvent) -> ShopResult<WebhookOutcome> {
        let provider = self.gateway.provider_name();
        let early = Settlement::Captured {
            transaction_id: String::new(),
            tx_ref: None,
            actor: self.provider_actor(),
            message: String::new(),
        };
        if early.gate(&order) == Gate::AlreadyProcessed {
            info!(order_id = %order.id, "Payment already processed");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let Some(transaction_id) = event.transaction.id else {
            warn!(order_id = %order.id, "Missing transaction id for verification");
            return Ok(WebhookOutcome::MissingTransactionId);
        };

        let verification = match self.gateway.verify_transaction(transaction_id).await {
            Ok(v) => v,
            Err(e) => {
                warn!(transaction_id, error = %e, "Transaction verification failed");
                return Ok(WebhookOutcome::VerificationFailed);
            }
        };
        if let Some(reason) = verification.mismatch_with(&order) {
            warn!(transaction_id, reason = %reason, "Transaction verification failed");
            return Ok(WebhookOutcome::VerificationFailed);
        }

        let settlement = Settlement::Captured {
            transaction_id: transaction_id.to_string(),
            tx_ref: event.transaction.tx_ref.clone(),
            actor: self.provider_actor(),
            message: format!("Payment confirmed via {provider} webhook"),
        };
        let paid = match settle(self.repo.as_ref(), order, &settlement, &self.config).await? {
            Settled::Applied(paid) => paid,
            Settled::AlreadyProcessed(_) => return Ok(WebhookOutcome::AlreadyProcessed),
            Settled::Ignored(_) => return Ok(WebhookOutcome::Ignored),
        };

        // Post-commit work is best-effort.
        let card = event
            .transaction
            .card
            .as_ref()
            .or(verification.card.as_ref());
        let customer_id = event
            .transaction
            .meta
            .actor
            .as_deref()
            .and_then(customer_from_actor_tag);
        if let (Some(customer_id), Some(card)) = (customer_id, card) {
            let method = CustomerPaymentMethod::from_card(
                customer_id,
                provider,
                transaction_id.to_string(),
                card,
            );
            if let Err(e) = self.repo.upsert_payment_method(method).await {
                warn!(order_id = %paid.id, error = %e, "Failed to save card");
            }
        }

        // Late capture on a cancelled order: refund now, the sweeper retries.
        if paid.payment_status == PaymentStatus::RefundInitiated {
            match self.refunds.execute(&paid.id).await {
                RefundAttempt::Submitted => {
                    info!(order_id = %paid.id, "Refund submitted for late capture")
                }
                RefundAttempt::Skipped(reason) => {
                    info!(order_id = %paid.id, reason = %reason, "Late capture refund skipped")
                }
                RefundAttempt::Failed(reason) => {
                    warn!(order_id = %paid.id, reason = %reason, "Late capture refund failed")
                }
            }
        }

        if paid.payment_status == PaymentStatus::Paid {
            notify_confirmed(
                self.notifier.as_ref(),
                self.repo.as_ref(),
                &self.config,
                &paid,
            )
            .await;
        }

        info!(order_id = %paid.id, transaction_id, "Payment processed");
        Ok(WebhookOutcome::Processed)
    }

    async fn on_failure(&self, order: Order) -> ShopResult<WebhookOutcome> {
        let settlement = Settlement::Failed {
            actor: self.provider_actor(),
            message: format!(
                "Payment failed via {} webhook",
                self.gateway.provider_name()
            ),
        };
        match settle(self.repo.as_ref(), order, &settlement, &self.config).await? {
            Settled::Applied(failed) => {
                warn!(order_id = %failed.id, "Payment failed");
                send_best_effort(
                    self.notifier.as_ref(),
                    Notification::PaymentFailed {
                        to: failed.email.clone(),
                        order: self.summary(&failed).await,
                    },
                )
                .await;
                Ok(WebhookOutcome::PaymentFailed)
            }
            Settled::AlreadyProcessed(_) => Ok(WebhookOutcome::AlreadyProcessed),
            Settled::Ignored(_) => Ok(WebhookOutcome::Ignored),
        }
    }

    async fn on_refund(&self, order: Order) -> ShopResult<WebhookOutcome> {
        let settlement = Settlement::Refunded {
            actor: self.provider_actor(),
            message: format!(
                "Refund completed via {} webhook",
                self.gateway.provider_name()
            ),
        };
        match settle(self.repo.as_ref(), order, &settlement, &self.config).await? {
            Settled::Applied(refunded) => {
                info!(order_id = %refunded.id, "Refund completed");
                send_best_effort(
                    self.notifier.as_ref(),
                    Notification::RefundCompleted {
                        to: refunded.email.clone(),
                        order: self.summary(&refunded).await,
                        amount: refunded.refund.amount,
                    },
                )
                .await;
                Ok(WebhookOutcome::RefundCompleted)
            }
            Settled::AlreadyProcessed(_) => Ok(WebhookOutcome::AlreadyProcessed),
            Settled::Ignored(order) => {
                warn!(order_id = %order.id, "Refund event for an order that was never paid");
                Ok(WebhookOutcome::Ignored)
            }
        }
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
}

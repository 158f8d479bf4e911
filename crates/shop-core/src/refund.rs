//! Refund Orchestrator.
//!
//! Phase one (the refund intent) is written inside the cancellation commit.
//! Phase two, here, runs afterwards: persist the idempotency key, call the
//! provider, record the attempt. It never fails the caller; anything left
//! over is picked up by [`RefundSweeper`].

use crate::error::{ShopError, ShopResult};
use crate::gateway::{BoxedPaymentGateway, RefundRequest};
use crate::order::{refund_idempotency_key, Order, PaymentStatus, RefundStatus};
use crate::repository::SharedRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// What one phase-two run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundAttempt {
    Submitted,
    Skipped(String),
    Failed(String),
}

pub struct RefundOrchestrator {
    repo: SharedRepository,
    gateway: BoxedPaymentGateway,
}

impl RefundOrchestrator {
    pub fn new(repo: SharedRepository, gateway: BoxedPaymentGateway) -> Self {
        Self { repo, gateway }
    }

    /// Submit the refund for a cancelled order. Errors are logged and
    /// reported in the returned attempt, never propagated.
    #[instrument(skip(self))]
    pub async fn execute(&self, order_id: &str) -> RefundAttempt {
        match self.try_execute(order_id).await {
            Ok(attempt) => attempt,
            Err(e) => {
                error!(order_id, error = %e, "Refund failed");
                RefundAttempt::Failed(e.to_string())
            }
        }
    }

    async fn try_execute(&self, order_id: &str) -> ShopResult<RefundAttempt> {
        let order = self
            .repo
            .get_order(order_id)
            .await?
            .ok_or_else(|| ShopError::not_found("Order", order_id))?;

        if let Some(reason) = skip_reason(&order) {
            debug!(order_id, reason, "Refund skipped");
            return Ok(RefundAttempt::Skipped(reason.to_string()));
        }
        let Some(transaction_id) = order.provider_transaction_id.clone() else {
            return Ok(RefundAttempt::Skipped("never captured".to_string()));
        };

        let key = self
            .repo
            .persist_refund_key(order_id, &refund_idempotency_key(order_id))
            .await?;

        let request = RefundRequest {
            transaction_id,
            amount: order.refund.amount.unwrap_or(order.amounts.total),
            reason: Some(
                order
                    .cancellation
                    .as_ref()
                    .and_then(|c| c.reason.clone())
                    .unwrap_or_else(|| "Order cancellation".to_string()),
            ),
            idempotency_key: key,
        };

        match self.gateway.refund(&request).await {
            Ok(disposition) => {
                self.repo.record_refund_attempt(order_id, None).await?;
                info!(
                    order_id,
                    amount = %request.amount,
                    refund_id = ?disposition.refund_id,
                    status = %disposition.status,
                    "Refund submitted"
                );
                Ok(RefundAttempt::Submitted)
            }
            Err(e) => {
                error!(order_id, error = %e, "Refund call failed");
                self.repo
                    .record_refund_attempt(order_id, Some(e.to_string()))
                    .await?;
                Ok(RefundAttempt::Failed(e.to_string()))
            }
        }
    }
}

fn skip_reason(order: &Order) -> Option<&'static str> {
    if order.payment_status == PaymentStatus::Refunded
        || order.refund.status == RefundStatus::Completed
    {
        return Some("already refunded");
    }
    if order.payment_status != PaymentStatus::RefundInitiated || !order.refund.initiated {
        return Some("no refund requested");
    }
    if order.provider_transaction_id.is_none() {
        return Some("never captured");
    }
    None
}

/// Periodically re-runs phase two for refunds that never went through
pub struct RefundSweeper {
    orchestrator: Arc<RefundOrchestrator>,
    repo: SharedRepository,
    interval: Duration,
    max_attempts: u32,
}

impl RefundSweeper {
    pub fn new(
        orchestrator: Arc<RefundOrchestrator>,
        repo: SharedRepository,
        interval: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            orchestrator,
            repo,
            interval,
            max_attempts,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Run until `shutdown` flips to true. Returns at once when disabled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if !self.is_enabled() {
            info!("Refund sweeper disabled");
            return;
        }
        info!(
            interval_secs = self.interval.as_secs(),
            max_attempts = self.max_attempts,
            "Starting refund sweeper"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "Refund sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Refund sweeper stopped");
    }

    /// One pass over every refund still owed; returns how many were submitted
    #[instrument(skip(self), name = "refund_sweep")]
    pub async fn sweep_once(&self) -> ShopResult<usize> {
        let pending = self.repo.orders_awaiting_refund(self.max_attempts).await?;
        let mut submitted = 0;

        for order in pending {
            // A submitted refund is waiting on the provider's webhook.
            if order.refund.attempts > 0 && order.refund.last_error.is_none() {
                continue;
            }
            match self.orchestrator.execute(&order.id).await {
                RefundAttempt::Submitted => submitted += 1,
                RefundAttempt::Failed(message) => {
                    warn!(order_id = %order.id, error = %message, "Refund retry failed");
                }
                RefundAttempt::Skipped(_) => {}
            }
        }

        if submitted > 0 {
            info!(submitted, "Refund sweep complete");
        }
        Ok(submitted)
    }
}

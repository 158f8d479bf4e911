//! # Payment Service
//!
//! Customer-initiated payment flows: inline widget config, saved-card
//! charges, retries, and saved-card management.

use crate::caller::Caller;
use crate::config::ShopConfig;
use crate::error::{ShopError, ShopResult};
use crate::event::{inline_tx_ref, token_tx_ref, CardDetails};
use crate::gateway::{BoxedPaymentGateway, PaymentConfig, PaymentConfigRequest, TokenCharge};
use crate::notify::SharedNotifier;
use crate::order::{Actor, Order, OrderStatus};
use crate::payment_method::CustomerPaymentMethod;
use crate::repository::{OrderCommit, SharedRepository};
use crate::settlement::{notify_confirmed, settle, Settled, Settlement};
use chrono::Utc;
use tracing::{info, instrument, warn};

/// Result of a retry: either a fresh widget config or a completed charge
#[derive(Debug, Clone)]
pub enum RetryOutcome {
    Inline(PaymentConfig),
    Charged(Order),
}

pub struct PaymentService {
    repo: SharedRepository,
    gateway: BoxedPaymentGateway,
    notifier: SharedNotifier,
    config: ShopConfig,
}

impl PaymentService {
    pub fn new(
        repo: SharedRepository,
        gateway: BoxedPaymentGateway,
        notifier: SharedNotifier,
        config: ShopConfig,
    ) -> Self {
        Self {
            repo,
            gateway,
            notifier,
            config,
        }
    }

    async fn load_payable(&self, order_id: &str) -> ShopResult<Order> {
        let order = self
            .repo
            .get_order(order_id)
            .await?
            .ok_or_else(|| ShopError::not_found("Order", order_id))?;

        if order.status == OrderStatus::Cancelled {
            return Err(ShopError::Validation(format!(
                "order {} is cancelled",
                order.order_number
            )));
        }
        if order.is_paid() {
            return Err(ShopError::AlreadyPaid {
                order_id: order.id.clone(),
            });
        }
        Ok(order)
    }

    /// Issue a new transaction reference and the widget config for it
    #[instrument(skip(self, caller), fields(order_id = %order_id, actor = %caller.actor_tag()))]
    pub async fn initiate_payment(
        &self,
        order_id: &str,
        caller: &Caller,
    ) -> ShopResult<PaymentConfig> {
        let order = self.load_payable(order_id).await?;
        if !order.is_owned_by(caller) {
            warn!("Payment initiation by non-owner");
            return Err(ShopError::OwnershipMismatch(
                "order does not belong to this caller".into(),
            ));
        }

        let tx_ref = inline_tx_ref(&order.id, Utc::now());
        let config = self
            .gateway
            .build_payment_config(&PaymentConfigRequest::for_order(
                &order,
                tx_ref.clone(),
                caller.actor_tag(),
            ));

        let mut next = order.next_version();
        next.tx_ref = Some(tx_ref);
        next.provider_status = "initiated".to_string();
        next.payment_provider = self.gateway.provider_name().to_string();
        self.repo.commit(OrderCommit::new(next)).await?;

        info!(tx_ref = %config.tx_ref, amount = %config.amount, "Payment initiated");
        Ok(config)
    }

    /// Charge a saved card, then verify the charge independently before
    /// committing it.
    #[instrument(skip(self), fields(order_id = %order_id, customer_id = %customer_id))]
    pub async fn pay_with_saved(
        &self,
        order_id: &str,
        customer_id: &str,
        payment_method_id: &str,
    ) -> ShopResult<Order> {
        let order = self.load_payable(order_id).await?;
        if order.customer_id.as_deref() != Some(customer_id) {
            warn!("Saved-card payment by non-owner");
            return Err(ShopError::OwnershipMismatch(
                "order does not belong to customer".into(),
            ));
        }

        let method = self
            .repo
            .get_payment_method(payment_method_id)
            .await?
            .filter(|m| m.customer_id == customer_id)
            .ok_or_else(|| ShopError::not_found("PaymentMethod", payment_method_id))?;
        if !method.has_token() {
            return Err(ShopError::Validation("saved card token missing".into()));
        }

        let tx_ref = token_tx_ref(&order.id, Utc::now());
        let charge = self
            .gateway
            .charge_token(&TokenCharge {
                token: method.token.clone(),
                currency: order.currency,
                amount: order.amounts.total,
                email: order.email.clone(),
                tx_ref: tx_ref.clone(),
                order_id: order.id.clone(),
                actor: format!("customer:{customer_id}"),
                narration: format!("Payment for order {}", order.order_number),
            })
            .await?;

        if !charge.is_successful() {
            let reason = charge
                .message
                .clone()
                .unwrap_or_else(|| "saved card payment failed".to_string());
            return Err(self.decline(order, reason).await);
        }

        let Some(transaction_id) = charge.transaction_id else {
            return Err(self
                .decline(order, "charge returned no transaction id".to_string())
                .await);
        };

        let mismatch = match self.gateway.verify_transaction(transaction_id).await {
            Ok(verification) => verification.mismatch_with(&order),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = mismatch {
            warn!(transaction_id, reason = %reason, "Saved-card verification failed");
            return Err(self
                .decline(order, "payment verification failed".to_string())
                .await);
        }

        let settlement = Settlement::Captured {
            transaction_id: transaction_id.to_string(),
            tx_ref: Some(tx_ref),
            actor: Actor::Customer(customer_id.to_string()),
            message: format!("Payment confirmed via saved {} card", self.gateway.provider_name()),
        };
        match settle(self.repo.as_ref(), order, &settlement, &self.config).await? {
            Settled::Applied(paid) => {
                notify_confirmed(
                    self.notifier.as_ref(),
                    self.repo.as_ref(),
                    &self.config,
                    &paid,
                )
                .await;
                Ok(paid)
            }
            Settled::AlreadyProcessed(order) | Settled::Ignored(order) => Ok(order),
        }
    }

    /// Record the failure and hand back the error to return
    async fn decline(&self, order: Order, reason: String) -> ShopError {
        let settlement = Settlement::Failed {
            actor: Actor::Provider(self.gateway.provider_name().to_string()),
            message: format!("Saved card payment failed: {reason}"),
        };
        if let Err(e) = settle(self.repo.as_ref(), order, &settlement, &self.config).await {
            warn!(error = %e, "Failed to record payment failure");
        }
        ShopError::PaymentDeclined { reason }
    }

    /// Retry payment of an unpaid order, with a saved card or a new inline attempt
    pub async fn retry_payment(
        &self,
        order_id: &str,
        caller: &Caller,
        payment_method_id: Option<&str>,
    ) -> ShopResult<RetryOutcome> {
        match payment_method_id {
            Some(method_id) => {
                let customer_id = caller.customer_id.as_deref().ok_or_else(|| {
                    ShopError::Unauthorized(
                        "you must be logged in to use a saved payment method".into(),
                    )
                })?;
                self.pay_with_saved(order_id, customer_id, method_id)
                    .await
                    .map(RetryOutcome::Charged)
            }
            None => self
                .initiate_payment(order_id, caller)
                .await
                .map(RetryOutcome::Inline),
        }
    }

    /// Remember a card reported on a verified capture
    pub async fn save_card(
        &self,
        customer_id: &str,
        provider_ref: &str,
        card: &CardDetails,
    ) -> ShopResult<CustomerPaymentMethod> {
        let method = CustomerPaymentMethod::from_card(
            customer_id,
            self.gateway.provider_name(),
            provider_ref,
            card,
        );
        self.repo.upsert_payment_method(method).await
    }

    pub async fn list_methods(&self, customer_id: &str) -> ShopResult<Vec<CustomerPaymentMethod>> {
        self.repo.payment_methods_for(customer_id).await
    }

    pub async fn set_default_method(
        &self,
        customer_id: &str,
        method_id: &str,
    ) -> ShopResult<CustomerPaymentMethod> {
        self.repo
            .set_default_payment_method(customer_id, method_id)
            .await
    }

    pub async fn delete_method(&self, customer_id: &str, method_id: &str) -> ShopResult<()> {
        self.repo.delete_payment_method(customer_id, method_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ChargeOutcome;
    use crate::money::Currency;
    use crate::order::PaymentStatus;
    use crate::repository::{NewOrder, OrderRepository};
    use crate::testing::{order_fixture, Harness};
    use rust_decimal_macros::dec;

    fn service(h: &Harness) -> PaymentService {
        PaymentService::new(
            h.repo.clone(),
            h.gateway.clone(),
            h.notifier.clone(),
            h.config.clone(),
        )
    }

    async fn stored(h: &Harness, order: Order) -> Order {
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

    async fn saved_card(h: &Harness, customer_id: &str) -> CustomerPaymentMethod {
        service(h)
            .save_card(
                customer_id,
                "100",
                &CardDetails {
                    token: "flw-t1".into(),
                    brand: Some("VISA".into()),
                    last4: Some("4242".into()),
                    exp_month: Some(1),
                    exp_year: Some(2030),
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_initiate_payment_records_tx_ref() {
        let h = Harness::new();
        let order = stored(&h, order_fixture(dec!(25), dec!(5), Currency::USD)).await;

        let config = service(&h)
            .initiate_payment(&order.id, &Caller::customer("c1"))
            .await
            .unwrap();

        assert!(config.tx_ref.starts_with(&format!("{}_", order.id)));
        assert_eq!(config.amount, dec!(30));
        assert_eq!(config.meta.actor, "customer:c1");
        assert_eq!(config.meta.order_id, order.id);

        let updated = h.repo.get_order(&order.id).await.unwrap().unwrap();
        assert_eq!(updated.tx_ref.as_deref(), Some(config.tx_ref.as_str()));
        assert_eq!(updated.provider_status, "initiated");
    }

    #[tokio::test]
    async fn test_initiate_payment_rejects_strangers_and_paid_orders() {
        let h = Harness::new();
        let order = stored(&h, order_fixture(dec!(25), dec!(5), Currency::USD)).await;

        let result = service(&h)
            .initiate_payment(&order.id, &Caller::customer("c2"))
            .await;
        assert!(matches!(result, Err(ShopError::OwnershipMismatch(_))));

        let mut paid = order_fixture(dec!(25), dec!(5), Currency::USD);
        paid.payment_status = PaymentStatus::Paid;
        let paid = stored(&h, paid).await;
        let result = service(&h)
            .initiate_payment(&paid.id, &Caller::customer("c1"))
            .await;
        assert!(matches!(result, Err(ShopError::AlreadyPaid { .. })));
    }

    #[tokio::test]
    async fn test_pay_with_saved_card_verifies_then_commits() {
        let h = Harness::new();
        let order = stored(&h, order_fixture(dec!(25), dec!(5), Currency::USD)).await;
        let card = saved_card(&h, "c1").await;

        h.gateway.charges(ChargeOutcome {
            transaction_id: Some(777),
            status: "successful".into(),
            message: None,
            card: None,
        });
        h.gateway.verifies(777, dec!(30), Currency::USD);

        let paid = service(&h)
            .pay_with_saved(&order.id, "c1", &card.id)
            .await
            .unwrap();

        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.status, OrderStatus::Confirmed);
        assert_eq!(paid.provider_transaction_id.as_deref(), Some("777"));
        assert!(paid.tx_ref.as_deref().unwrap().contains("_token_"));
        assert_eq!(h.gateway.verify_calls(), 1);
        assert_eq!(h.notifier.kinds(), vec!["order_confirmed", "new_order"]);
    }

    #[tokio::test]
    async fn test_declined_charge_marks_failed() {
        let h = Harness::new();
        let order = stored(&h, order_fixture(dec!(25), dec!(5), Currency::USD)).await;
        let card = saved_card(&h, "c1").await;

        h.gateway.charges(ChargeOutcome {
            transaction_id: None,
            status: "failed".into(),
            message: Some("Insufficient funds".into()),
            card: None,
        });

        let result = service(&h).pay_with_saved(&order.id, "c1", &card.id).await;
        assert!(matches!(
            result,
            Err(ShopError::PaymentDeclined { ref reason }) if reason == "Insufficient funds"
        ));

        let stored = h.repo.get_order(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Failed);
        assert_eq!(stored.status, OrderStatus::PaymentFailed);
    }

    #[tokio::test]
    async fn test_verification_mismatch_declines() {
        let h = Harness::new();
        let order = stored(&h, order_fixture(dec!(25), dec!(5), Currency::USD)).await;
        let card = saved_card(&h, "c1").await;

        h.gateway.charges(ChargeOutcome {
            transaction_id: Some(778),
            status: "successful".into(),
            message: None,
            card: None,
        });
        h.gateway.verifies(778, dec!(3), Currency::USD);

        let result = service(&h).pay_with_saved(&order.id, "c1", &card.id).await;
        assert!(matches!(result, Err(ShopError::PaymentDeclined { .. })));
        assert_eq!(
            h.repo.get_order(&order.id).await.unwrap().unwrap().payment_status,
            PaymentStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_foreign_card_is_not_found() {
        let h = Harness::new();
        let order = stored(&h, order_fixture(dec!(25), dec!(5), Currency::USD)).await;
        let card = saved_card(&h, "someone-else").await;

        let result = service(&h).pay_with_saved(&order.id, "c1", &card.id).await;
        assert!(matches!(result, Err(ShopError::NotFound { .. })));
        assert!(h.gateway.charge_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_with_saved_card_requires_login() {
        let h = Harness::new();
        let mut guest_order = order_fixture(dec!(25), dec!(5), Currency::USD);
        guest_order.customer_id = None;
        guest_order.device_id = Some("d1".into());
        let order = stored(&h, guest_order).await;

        let result = service(&h)
            .retry_payment(&order.id, &Caller::guest("d1"), Some("pm"))
            .await;
        assert!(matches!(result, Err(ShopError::Unauthorized(_))));

        let outcome = service(&h)
            .retry_payment(&order.id, &Caller::guest("d1"), None)
            .await
            .unwrap();
        let RetryOutcome::Inline(config) = outcome else {
            panic!("expected inline config");
        };
        assert_eq!(config.meta.actor, "guest:d1");
    }

    #[tokio::test]
    async fn test_saved_methods_are_listed_per_customer() {
        let h = Harness::new();
        saved_card(&h, "c1").await;
        let svc = service(&h);
        assert_eq!(svc.list_methods("c1").await.unwrap().len(), 1);
        assert!(svc.list_methods("c2").await.unwrap().is_empty());
    }
}

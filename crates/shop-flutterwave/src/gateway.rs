//! # Flutterwave Gateway
//!
//! [`PaymentGateway`] over the Flutterwave v3 REST API: inline widget
//! config, transaction verification, tokenized charges and refunds.

use crate::config::FlutterwaveConfig;
use crate::webhook::{extract_card_details, verify_signature, FlwCard, WebhookEnvelope};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shop_core::gateway::{Customizations, PaymentMeta, PAYMENT_OPTIONS};
use shop_core::{
    ChargeOutcome, Currency, PaymentConfig, PaymentConfigRequest, PaymentEvent, PaymentGateway,
    RefundDisposition, RefundRequest, ShopError, ShopResult, TokenCharge,
    TransactionVerification,
};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

const PROVIDER: &str = "flutterwave";

/// Flutterwave v3 gateway
pub struct FlutterwaveGateway {
    config: FlutterwaveConfig,
    client: Client,
}

impl FlutterwaveGateway {
    /// Create a new gateway with a 30s request timeout
    pub fn new(config: FlutterwaveConfig) -> ShopResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ShopError::Configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> ShopResult<Self> {
        Self::new(FlutterwaveConfig::from_env()?)
    }

    pub fn config(&self) -> &FlutterwaveConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    /// Send a request and decode the `{status, message, data}` envelope.
    /// Returns the HTTP status alongside so callers can interpret 4xx.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> ShopResult<(reqwest::StatusCode, FlwEnvelope<T>)> {
        let response = request
            .header("Authorization", self.config.auth_header())
            .send()
            .await
            .map_err(|e| ShopError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ShopError::Network(e.to_string()))?;

        if status.is_server_error() {
            error!(status = %status, body = %body, "Flutterwave API error");
            return Err(provider_error(format!("HTTP {status}")));
        }

        let envelope = serde_json::from_str::<FlwEnvelope<T>>(&body).map_err(|e| {
            if status.is_success() {
                ShopError::Serialization(format!("failed to parse Flutterwave response: {e}"))
            } else {
                provider_error(format!("HTTP {status}: {body}"))
            }
        })?;

        Ok((status, envelope))
    }
}

fn provider_error(message: impl Into<String>) -> ShopError {
    ShopError::Provider {
        provider: PROVIDER.to_string(),
        message: message.into(),
    }
}

#[async_trait]
impl PaymentGateway for FlutterwaveGateway {
    fn build_payment_config(&self, request: &PaymentConfigRequest) -> PaymentConfig {
        PaymentConfig {
            public_key: self.config.public_key.clone(),
            tx_ref: request.tx_ref.clone(),
            amount: request.amount,
            currency: request.currency,
            payment_options: PAYMENT_OPTIONS.to_string(),
            customer: request.customer.clone(),
            meta: PaymentMeta {
                order_id: request.order_id.clone(),
                actor: request.actor.clone(),
            },
            customizations: Customizations {
                title: "Order Payment".to_string(),
                description: format!("Payment for order {}", request.order_number),
            },
        }
    }

    #[instrument(skip(self))]
    async fn verify_transaction(&self, transaction_id: u64) -> ShopResult<TransactionVerification> {
        let url = self.url(&format!("/v3/transactions/{transaction_id}/verify"));
        let (status, envelope) = self
            .send::<FlwTransaction>(self.client.get(&url))
            .await?;

        if !status.is_success() || !envelope.is_success() {
            warn!(status = %status, message = ?envelope.message, "Verification rejected");
            return Err(provider_error(
                envelope
                    .message
                    .unwrap_or_else(|| format!("verification failed with HTTP {status}")),
            ));
        }
        let data = envelope
            .data
            .ok_or_else(|| provider_error("verification response has no data"))?;

        debug!(tx_status = %data.status, amount = %data.amount, "Transaction verified");

        Ok(TransactionVerification {
            transaction_id: data.id,
            status: data.status,
            tx_ref: data.tx_ref,
            amount: data.amount,
            currency: data.currency,
            card: data.card.as_ref().and_then(extract_card_details),
        })
    }

    #[instrument(skip(self, charge), fields(tx_ref = %charge.tx_ref, order_id = %charge.order_id))]
    async fn charge_token(&self, charge: &TokenCharge) -> ShopResult<ChargeOutcome> {
        let body = FlwTokenChargeBody {
            token: &charge.token,
            currency: charge.currency,
            country: charge.currency.country_code(),
            amount: charge.amount,
            email: &charge.email,
            tx_ref: &charge.tx_ref,
            narration: &charge.narration,
            meta: FlwChargeMeta {
                order_id: &charge.order_id,
                actor: &charge.actor,
            },
        };

        let url = self.url("/v3/tokenized-charges");
        let (status, envelope) = self
            .send::<FlwTransaction>(self.client.post(&url).json(&body))
            .await?;

        // A 4xx with a decodable envelope is a decline, not an outage.
        if status.is_client_error() || !envelope.is_success() {
            warn!(status = %status, message = ?envelope.message, "Tokenized charge declined");
            return Ok(ChargeOutcome {
                transaction_id: envelope.data.as_ref().map(|d| d.id),
                status: "failed".to_string(),
                message: envelope.message,
                card: None,
            });
        }

        let data = envelope
            .data
            .ok_or_else(|| provider_error("charge response has no data"))?;

        info!(transaction_id = data.id, tx_status = %data.status, "Tokenized charge completed");

        Ok(ChargeOutcome {
            transaction_id: Some(data.id),
            status: data.status,
            message: data.processor_response.or(envelope.message),
            card: data.card.as_ref().and_then(extract_card_details),
        })
    }

    #[instrument(skip(self, request), fields(transaction_id = %request.transaction_id, amount = %request.amount))]
    async fn refund(&self, request: &RefundRequest) -> ShopResult<RefundDisposition> {
        let body = FlwRefundBody {
            amount: request.amount,
            comments: request.reason.as_deref().unwrap_or("Customer Refund"),
        };

        let url = self.url(&format!("/v3/transactions/{}/refund", request.transaction_id));
        let (status, envelope) = self
            .send::<FlwRefund>(
                self.client
                    .post(&url)
                    .header("X-Idempotency-Key", &request.idempotency_key)
                    .json(&body),
            )
            .await?;

        if !status.is_success() || !envelope.is_success() {
            return Err(provider_error(
                envelope
                    .message
                    .unwrap_or_else(|| format!("refund failed with HTTP {status}")),
            ));
        }

        let data = envelope.data.unwrap_or_default();
        info!(refund_id = ?data.id, refund_status = ?data.status, "Refund accepted");

        Ok(RefundDisposition {
            refund_id: data.id.map(|id| id.to_string()),
            status: data.status.unwrap_or_else(|| "pending".to_string()),
        })
    }

    fn parse_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> ShopResult<Option<PaymentEvent>> {
        verify_signature(&self.config.secret_hash, signature)?;
        Ok(WebhookEnvelope::parse(payload).map(WebhookEnvelope::into_event))
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

// =============================================================================
// Flutterwave API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct FlwEnvelope<T> {
    status: String,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

impl<T> FlwEnvelope<T> {
    fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}

#[derive(Debug, Deserialize)]
struct FlwTransaction {
    id: u64,
    #[serde(default)]
    tx_ref: Option<String>,
    status: String,
    amount: Decimal,
    currency: String,
    #[serde(default)]
    processor_response: Option<String>,
    #[serde(default)]
    card: Option<FlwCard>,
}

#[derive(Debug, Default, Deserialize)]
struct FlwRefund {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Serialize)]
struct FlwTokenChargeBody<'a> {
    token: &'a str,
    currency: Currency,
    country: &'static str,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    email: &'a str,
    tx_ref: &'a str,
    narration: &'a str,
    meta: FlwChargeMeta<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FlwChargeMeta<'a> {
    order_id: &'a str,
    actor: &'a str,
}

#[derive(Debug, Serialize)]
struct FlwRefundBody<'a> {
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    comments: &'a str,
}

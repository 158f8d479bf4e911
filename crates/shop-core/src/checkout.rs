//! # Checkout Orchestrator
//!
//! Turns an open cart into a pending order:
//!
//! ```text
//! load cart ─► validate ─► ownership ─► cart state ─► currency/rate
//!     ─► lock cart (CAS) ─► order number ─► create_order (atomic)
//!                  │
//!                  └── any failure after the lock releases the cart
//! ```

use crate::address::ShippingAddress;
use crate::caller::Caller;
use crate::cart::Cart;
use crate::config::ShopConfig;
use crate::error::{ShopError, ShopResult};
use crate::money::Currency;
use crate::order::{
    Actor, Fulfilment, Order, OrderItem, OrderStatus, PaymentStatus, Refund, StatusHistoryEntry,
    TimelineEntry, TimelineSource,
};
use crate::pricing::{quote, resolve_rate, RateLookup};
use crate::repository::{NewOrder, SharedRepository};
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

const ORDER_NUMBER_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ORDER_NUMBER_LEN: usize = 8;
const MAX_ORDER_NUMBER_ATTEMPTS: usize = 16;

/// `<prefix>-XXXXXXXX` with eight characters from `[A-Z0-9]`
pub fn generate_order_number(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let body: String = (0..ORDER_NUMBER_LEN)
        .map(|_| ORDER_NUMBER_CHARS[rng.gen_range(0..ORDER_NUMBER_CHARS.len())] as char)
        .collect();
    format!("{prefix}-{body}")
}

/// Checkout form submitted by the storefront
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub shipping_full_name: String,
    pub shipping_phone: String,
    pub shipping_street: String,
    pub shipping_city: String,
    #[serde(default)]
    pub shipping_state: Option<String>,
    #[serde(default)]
    pub shipping_postal: Option<String>,
    pub shipping_country: String,
    pub currency: String,
    #[serde(default)]
    pub save_address: bool,
    #[serde(default)]
    pub customer_note: Option<String>,
}

impl CheckoutRequest {
    /// Field-level checks, before any state is touched
    pub fn validate(&self) -> ShopResult<()> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ShopError::Validation("email must be a valid address".into()));
        }
        if let Some(phone) = &self.phone {
            if phone.trim().len() < 7 {
                return Err(ShopError::Validation(
                    "phone must be at least 7 characters".into(),
                ));
            }
        }
        if self.shipping_full_name.trim().len() < 2 {
            return Err(ShopError::Validation(
                "shippingFullName must be at least 2 characters".into(),
            ));
        }
        if self.shipping_phone.trim().len() < 7 {
            return Err(ShopError::Validation(
                "shippingPhone must be at least 7 characters".into(),
            ));
        }
        if self.shipping_street.trim().len() < 5 {
            return Err(ShopError::Validation(
                "shippingStreet must be at least 5 characters".into(),
            ));
        }
        if self.shipping_city.trim().is_empty() {
            return Err(ShopError::Validation("shippingCity is required".into()));
        }
        if self.shipping_country.trim().is_empty() {
            return Err(ShopError::Validation("shippingCountry is required".into()));
        }
        if self.currency.trim().is_empty() {
            return Err(ShopError::Validation("currency is required".into()));
        }
        Ok(())
    }

    pub fn shipping_address(&self) -> ShippingAddress {
        ShippingAddress {
            full_name: self.shipping_full_name.trim().to_string(),
            phone: self.shipping_phone.trim().to_string(),
            street: self.shipping_street.trim().to_string(),
            city: self.shipping_city.trim().to_string(),
            state: non_blank(&self.shipping_state),
            postal: non_blank(&self.shipping_postal),
            country: self.shipping_country.trim().to_string(),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Local-currency totals echoed back to the storefront
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingBreakdown {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub currency: Currency,
}

/// Result of a successful checkout
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub pricing: PricingBreakdown,
}

/// Caller may check out this cart: customers their own or an unowned cart,
/// guests only an unowned cart bound to the device they present.
pub fn check_cart_ownership(cart: &Cart, caller: &Caller) -> ShopResult<()> {
    match &caller.customer_id {
        Some(customer_id) => match &cart.customer_id {
            Some(owner) if owner != customer_id => Err(ShopError::OwnershipMismatch(
                "cart does not belong to this customer".into(),
            )),
            _ => Ok(()),
        },
        None => {
            if cart.customer_id.is_some() {
                return Err(ShopError::OwnershipMismatch(
                    "this cart requires authentication".into(),
                ));
            }
            let Some(device_id) = caller.device_id.as_deref() else {
                return Err(ShopError::OwnershipMismatch(
                    "device id is required for guest checkout".into(),
                ));
            };
            if cart.device_id.as_deref() != Some(device_id) {
                return Err(ShopError::OwnershipMismatch(
                    "cart does not belong to this device".into(),
                ));
            }
            Ok(())
        }
    }
}

/// Creates orders from carts
pub struct CheckoutService {
    repo: SharedRepository,
    rates: Arc<dyn RateLookup>,
    config: ShopConfig,
    provider: String,
    order_numbers: fn(&str) -> String,
}

impl CheckoutService {
    pub fn new(repo: SharedRepository, rates: Arc<dyn RateLookup>, config: ShopConfig) -> Self {
        Self {
            repo,
            rates,
            config,
            provider: "flutterwave".to_string(),
            order_numbers: generate_order_number,
        }
    }

    /// Builder: provider recorded on new orders
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Builder: replace the order number generator
    pub fn with_order_numbers(mut self, generator: fn(&str) -> String) -> Self {
        self.order_numbers = generator;
        self
    }

    /// Check out `cart_id` on behalf of `caller`
    #[instrument(skip(self, request, caller), fields(cart_id = %cart_id, actor = %caller.actor_tag()))]
    pub async fn checkout(
        &self,
        cart_id: &str,
        request: CheckoutRequest,
        caller: &Caller,
    ) -> ShopResult<CheckoutReceipt> {
        let cart = self
            .repo
            .get_cart(cart_id)
            .await?
            .ok_or_else(|| ShopError::not_found("Cart", cart_id))?;

        request.validate()?;

        if let Err(e) = check_cart_ownership(&cart, caller) {
            warn!(error = %e, "Checkout ownership mismatch");
            return Err(e);
        }

        if cart.is_empty() {
            return Err(ShopError::CartEmpty {
                cart_id: cart_id.to_string(),
            });
        }
        if !cart.is_open() {
            return Err(ShopError::CartLocked {
                cart_id: cart_id.to_string(),
            });
        }

        let currency = Currency::parse(&request.currency)?;
        let rate = resolve_rate(currency, self.rates.as_ref()).await?;

        let locked = self.repo.lock_cart(cart_id).await?;

        match self.create_from_locked(&locked, &request, caller, currency, rate).await {
            Ok(receipt) => {
                info!(
                    order_id = %receipt.order.id,
                    order_number = %receipt.order.order_number,
                    total = %receipt.order.amounts.total,
                    currency = %currency,
                    "Order created"
                );
                Ok(receipt)
            }
            Err(e) => {
                if let Err(release_err) = self.repo.release_cart(cart_id).await {
                    error!(error = %release_err, "Failed to release cart after checkout failure");
                }
                Err(e)
            }
        }
    }

    async fn create_from_locked(
        &self,
        cart: &Cart,
        request: &CheckoutRequest,
        caller: &Caller,
        currency: Currency,
        rate: Decimal,
    ) -> ShopResult<CheckoutReceipt> {
        let shipping = request.shipping_address();
        let pricing = quote(
            &cart.items,
            &shipping.country,
            currency,
            rate,
            &self.config.shipping,
        );
        let order_number = self.next_order_number().await?;

        let now = Utc::now();
        let order_id = Uuid::new_v4().to_string();

        let items: Vec<OrderItem> = cart
            .items
            .iter()
            .zip(pricing.unit_prices_local.iter())
            .map(|(line, unit_local)| OrderItem {
                order_id: order_id.clone(),
                product_id: line.product_id.clone(),
                variant_id: line.variant_id.clone(),
                title: line.title.clone(),
                quantity: line.quantity,
                unit_price_usd: line.unit_price_usd,
                unit_price_local: *unit_local,
                image_url: line.image_url.clone(),
            })
            .collect();

        let customer_note = non_blank(&request.customer_note);
        let mut timeline =
            vec![TimelineEntry::new(&order_id, OrderStatus::Pending).with_note("Order created")];
        if let Some(note) = &customer_note {
            timeline.push(
                TimelineEntry::new(&order_id, OrderStatus::Pending)
                    .with_note(format!("Customer note: {note}"))
                    .with_source(TimelineSource::Customer),
            );
        }
        let history = vec![StatusHistoryEntry::new(
            &order_id,
            OrderStatus::Pending,
            Actor::from_caller(caller),
            "Order created",
        )];

        let save_address = match (&caller.customer_id, request.save_address) {
            (Some(customer_id), true) => Some((customer_id.clone(), shipping.clone())),
            _ => None,
        };

        let order = Order {
            id: order_id,
            order_number,
            customer_id: caller.customer_id.clone(),
            cart_id: Some(cart.id.clone()),
            device_id: caller.device_id.clone(),
            email: request.email.trim().to_string(),
            phone: non_blank(&request.phone),
            customer_note,
            shipping,
            shipping_address_id: None,
            currency,
            amounts: pricing.local,
            amounts_base: pricing.base,
            exchange_rate: rate,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_provider: self.provider.clone(),
            provider_status: "pending".to_string(),
            tx_ref: None,
            provider_transaction_id: None,
            paid_at: None,
            receipt_url: None,
            cancellation: None,
            fulfilment: Fulfilment::default(),
            refund: Refund::default(),
            created_at: now,
            updated_at: now,
            version: 0,
        };

        let order = self
            .repo
            .create_order(NewOrder {
                order,
                items: items.clone(),
                timeline,
                history,
                save_address,
            })
            .await?;

        Ok(CheckoutReceipt {
            pricing: PricingBreakdown {
                subtotal: order.amounts.subtotal,
                shipping: order.amounts.shipping,
                total: order.amounts.total,
                currency,
            },
            order,
            items,
        })
    }

    async fn next_order_number(&self) -> ShopResult<String> {
        for _ in 0..MAX_ORDER_NUMBER_ATTEMPTS {
            let candidate = (self.order_numbers)(&self.config.order_number_prefix);
            if !self.repo.order_number_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(ShopError::Internal(format!(
            "no free order number after {MAX_ORDER_NUMBER_ATTEMPTS} attempts"
        )))
    }
}

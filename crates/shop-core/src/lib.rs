//! # shop-core
//!
//! Core types, ports and orchestrators for the orderflow order and payment
//! reconciliation engine.
//!
//! This crate provides:
//! - `Order`, `Cart`, `OrderItem` and the order/payment state machines
//! - `PaymentGateway`, `OrderRepository`, `RateLookup` and `Notifier` ports
//! - `CheckoutService` for turning a locked cart into an order
//! - `PaymentService` for inline, saved-card and retry payments
//! - `ReconciliationProcessor` for idempotent webhook handling
//! - `OrderLifecycle`, `RefundOrchestrator` and `RefundSweeper` for
//!   cancellations and refunds
//! - `ShopError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use shop_core::{Caller, CheckoutService, InMemoryRepository, ShopConfig, StaticRates};
//!
//! let repo = Arc::new(InMemoryRepository::new());
//! let checkout = CheckoutService::new(repo.clone(), Arc::new(StaticRates::new()), ShopConfig::default());
//!
//! // Lock the cart and create a pending order
//! let receipt = checkout.checkout(&cart_id, request, &Caller::customer("c1")).await?;
//!
//! // Hand the widget config to the storefront
//! let config = payments.initiate_payment(&receipt.order.id, &caller).await?;
//! ```

pub mod address;
pub mod caller;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod event;
pub mod gateway;
pub mod lifecycle;
pub mod memory;
pub mod money;
pub mod notify;
pub mod order;
pub mod payment_method;
pub mod payments;
pub mod pricing;
pub mod reconcile;
pub mod refund;
pub mod repository;
pub mod settlement;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use address::{CustomerAddress, ShippingAddress};
pub use caller::{constant_time_eq, Caller};
pub use cart::{Cart, CartItem, CartStatus};
pub use checkout::{CheckoutReceipt, CheckoutRequest, CheckoutService, PricingBreakdown};
pub use config::ShopConfig;
pub use error::{ShopError, ShopResult};
pub use event::{CardDetails, PaymentEvent, PaymentEventKind, TransactionPayload, WireShape};
pub use gateway::{
    BoxedPaymentGateway, ChargeOutcome, PaymentConfig, PaymentConfigRequest, PaymentGateway,
    RefundDisposition, RefundRequest, TokenCharge, TransactionVerification,
};
pub use lifecycle::{OrderDetails, OrderLifecycle, StatusUpdate};
pub use memory::InMemoryRepository;
pub use money::{Currency, OrderAmounts};
pub use notify::{LoggingNotifier, Notification, Notifier, OrderSummary, SharedNotifier};
pub use order::{
    Actor, CancellationSource, Order, OrderItem, OrderStatus, PaymentStatus, RefundStatus,
    StatusHistoryEntry, TimelineEntry,
};
pub use payment_method::CustomerPaymentMethod;
pub use payments::{PaymentService, RetryOutcome};
pub use pricing::{PricingConfig, RateLookup, ShippingTable, StaticRates};
pub use reconcile::{ReconciliationProcessor, WebhookOutcome};
pub use refund::{RefundAttempt, RefundOrchestrator, RefundSweeper};
pub use repository::{OrderRepository, SharedRepository};

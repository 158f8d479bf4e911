//! # Shop Error Types
//!
//! Typed error handling for the order and payment core.
//! All operations return `Result<T, ShopError>`.

use thiserror::Error;

/// Core error type for checkout, payment, reconciliation and refund operations
#[derive(Debug, Error)]
pub enum ShopError {
    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Request payload failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Caller does not own the cart or order it is acting on
    #[error("Ownership mismatch: {0}")]
    OwnershipMismatch(String),

    /// Caller is not authenticated for this operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Entity lookup failed
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Checkout of a cart with no lines
    #[error("Cart is empty: {cart_id}")]
    CartEmpty { cart_id: String },

    /// Cart is claimed by a checkout or already cleared
    #[error("Cart {cart_id} is not open for checkout")]
    CartLocked { cart_id: String },

    /// Currency unknown or without an exchange rate
    #[error("Unsupported currency: {currency}")]
    UnsupportedCurrency { currency: String },

    /// Shipping snapshot cannot change in the order's current status
    #[error("Shipping address cannot be modified while order is {status}")]
    ShippingLocked { status: String },

    /// Order status does not allow cancellation by this actor
    #[error("Order cannot be cancelled while {status}")]
    NotCancellable { status: String },

    /// Illegal order status transition
    #[error("Cannot transition order from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Payment already captured for this order
    #[error("Order {order_id} is already paid")]
    AlreadyPaid { order_id: String },

    /// Payment was declined or could not be verified
    #[error("Payment declined: {reason}")]
    PaymentDeclined { reason: String },

    /// Webhook shared secret missing or wrong
    #[error("Webhook verification failed: {0}")]
    WebhookVerificationFailed(String),

    /// Optimistic concurrency check lost against another writer
    #[error("Concurrent modification of {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    /// Payment provider API error
    #[error("Provider error [{provider}]: {message}")]
    Provider { provider: String, message: String },

    /// Network/HTTP error communicating with provider
    #[error("Network error: {0}")]
    Network(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShopError {
    /// Shorthand for [`ShopError::NotFound`]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        ShopError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Returns true if the failed operation may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ShopError::Network(_) | ShopError::Provider { .. } | ShopError::Conflict { .. }
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ShopError::Configuration(_) => 500,
            ShopError::Validation(_) => 400,
            ShopError::OwnershipMismatch(_) => 400,
            ShopError::Unauthorized(_) => 401,
            ShopError::NotFound { .. } => 404,
            ShopError::CartEmpty { .. } => 400,
            ShopError::CartLocked { .. } => 400,
            ShopError::UnsupportedCurrency { .. } => 400,
            ShopError::ShippingLocked { .. } => 400,
            ShopError::NotCancellable { .. } => 400,
            ShopError::InvalidTransition { .. } => 400,
            ShopError::AlreadyPaid { .. } => 400,
            ShopError::PaymentDeclined { .. } => 402,
            ShopError::WebhookVerificationFailed(_) => 401,
            ShopError::Conflict { .. } => 409,
            ShopError::Provider { .. } => 502,
            ShopError::Network(_) => 503,
            ShopError::Serialization(_) => 500,
            ShopError::Internal(_) => 500,
        }
    }
}

/// Result type alias for shop operations
pub type ShopResult<T> = Result<T, ShopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(ShopError::Network("timeout".into()).is_retryable());
        assert!(ShopError::Provider {
            provider: "flutterwave".into(),
            message: "upstream 500".into()
        }
        .is_retryable());
        assert!(!ShopError::Validation("bad email".into()).is_retryable());
        assert!(!ShopError::CartEmpty {
            cart_id: "c1".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ShopError::Validation("x".into()).status_code(), 400);
        assert_eq!(
            ShopError::OwnershipMismatch("device".into()).status_code(),
            400
        );
        assert_eq!(ShopError::not_found("Cart", "c1").status_code(), 404);
        assert_eq!(
            ShopError::WebhookVerificationFailed("bad hash".into()).status_code(),
            401
        );
        assert_eq!(
            ShopError::UnsupportedCurrency {
                currency: "XYZ".into()
            }
            .status_code(),
            400
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = ShopError::not_found("Order", "ord_1");
        assert_eq!(err.to_string(), "Order not found: ord_1");
    }
}

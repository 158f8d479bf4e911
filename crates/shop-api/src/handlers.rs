//! # Request Handlers
//!
//! Axum request handlers for checkout, order tracking, administration,
//! payments and provider webhooks.
//!
//! Caller identity arrives in headers set by the upstream auth layer.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use shop_core::{
    constant_time_eq, Caller, CheckoutReceipt, CheckoutRequest, CustomerPaymentMethod, Order,
    OrderDetails, OrderStatus, PaymentConfig, RetryOutcome, ShippingAddress, ShopError,
    StatusUpdate, WebhookOutcome,
};
use tracing::{error, info, instrument, warn};

/// Header carrying the authenticated customer id
pub const CUSTOMER_ID_HEADER: &str = "x-customer-id";
/// Header carrying the originating device id
pub const DEVICE_ID_HEADER: &str = "x-device-id";
/// Header carrying the operator id on admin routes
pub const ADMIN_ID_HEADER: &str = "x-admin-id";
/// Shared secret header sent by Flutterwave
pub const WEBHOOK_SIGNATURE_HEADER: &str = "verif-hash";

// =============================================================================
// Request/Response Types
// =============================================================================

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn shop_error_to_response(err: ShopError) -> ApiError {
    let code = err.status_code();
    let mut response = ErrorResponse::new(err.to_string(), code);
    if err.is_retryable() {
        response = response.with_details("temporary failure, retry later");
    }
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(response),
    )
}

fn unauthorized(message: &str) -> ApiError {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new(message, 401)),
    )
}

/// Order list wrapper
#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderDetails>,
    pub count: usize,
}

impl From<Vec<OrderDetails>> for OrderListResponse {
    fn from(orders: Vec<OrderDetails>) -> Self {
        Self {
            count: orders.len(),
            orders,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AdminOrdersQuery {
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

/// Admin shipping correction, in the same field names as the checkout form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateShippingRequest {
    pub shipping_full_name: String,
    pub shipping_phone: String,
    pub shipping_street: String,
    pub shipping_city: String,
    #[serde(default)]
    pub shipping_state: Option<String>,
    #[serde(default)]
    pub shipping_postal: Option<String>,
    pub shipping_country: String,
    #[serde(default)]
    pub note: Option<String>,
}

impl UpdateShippingRequest {
    fn into_parts(self) -> (ShippingAddress, Option<String>) {
        (
            ShippingAddress {
                full_name: self.shipping_full_name,
                phone: self.shipping_phone,
                street: self.shipping_street,
                city: self.shipping_city,
                state: self.shipping_state,
                postal: self.shipping_postal,
                country: self.shipping_country,
            },
            self.note,
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayWithSavedRequest {
    pub payment_method_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPaymentRequest {
    #[serde(default)]
    pub payment_method_id: Option<String>,
}

/// Either a fresh widget config or the order a saved card just paid for
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetryPaymentResponse {
    Inline {
        #[serde(rename = "paymentConfig")]
        payment_config: PaymentConfig,
    },
    Charged {
        order: Order,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodsResponse {
    pub payment_methods: Vec<CustomerPaymentMethod>,
    pub count: usize,
}

/// Acknowledgement returned for every authenticated webhook delivery
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub status: WebhookOutcome,
}

// =============================================================================
// Caller extraction
// =============================================================================

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolve the caller from upstream auth headers; both are optional
pub fn caller_from_headers(headers: &HeaderMap) -> Caller {
    Caller {
        customer_id: header_value(headers, CUSTOMER_ID_HEADER).map(str::to_string),
        device_id: header_value(headers, DEVICE_ID_HEADER).map(str::to_string),
    }
}

fn require_customer(headers: &HeaderMap) -> Result<String, ApiError> {
    header_value(headers, CUSTOMER_ID_HEADER)
        .map(str::to_string)
        .ok_or_else(|| unauthorized("authentication required"))
}

/// Admin id, after checking the bearer token against `ADMIN_API_KEY`
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    let Some(expected) = state.config.admin_api_key.as_deref() else {
        warn!("Admin request rejected: ADMIN_API_KEY not configured");
        return Err(unauthorized("admin access is not configured"));
    };

    let presented = header_value(headers, "authorization")
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or_default();

    if !constant_time_eq(presented, expected) {
        warn!("Admin request with invalid credentials");
        return Err(unauthorized("invalid admin credentials"));
    }

    header_value(headers, ADMIN_ID_HEADER)
        .map(str::to_string)
        .ok_or_else(|| unauthorized("x-admin-id header is required"))
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "orderflow",
        "provider": state.provider,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Turn a cart into a pending order
#[instrument(skip(state, headers, request), fields(cart_id = %cart_id))]
pub async fn checkout(
    State(state): State<AppState>,
    Path(cart_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<CheckoutReceipt> {
    let caller = caller_from_headers(&headers);

    let receipt = state
        .checkout
        .checkout(&cart_id, request, &caller)
        .await
        .map_err(|e| {
            warn!("Checkout rejected: {}", e);
            shop_error_to_response(e)
        })?;

    info!(
        order_number = %receipt.order.order_number,
        total = %receipt.pricing.total,
        currency = %receipt.pricing.currency,
        "Order created"
    );

    Ok(Json(receipt))
}

/// Public tracking by order number
pub async fn track_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> ApiResult<OrderDetails> {
    state
        .lifecycle
        .track(&order_number)
        .await
        .map(Json)
        .map_err(shop_error_to_response)
}

/// Orders of the authenticated customer
pub async fn my_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<OrderListResponse> {
    let customer_id = require_customer(&headers)?;
    let orders = state
        .lifecycle
        .list_for_customer(&customer_id)
        .await
        .map_err(shop_error_to_response)?;

    Ok(Json(orders.into()))
}

/// One order, for its customer or the guest device that placed it
pub async fn my_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<OrderDetails> {
    let caller = caller_from_headers(&headers);
    state
        .lifecycle
        .get_for_caller(&order_id, &caller)
        .await
        .map(Json)
        .map_err(shop_error_to_response)
}

/// Customer or guest cancellation
#[instrument(skip(state, headers), fields(order_id = %order_id))]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Order> {
    let caller = caller_from_headers(&headers);
    state
        .lifecycle
        .customer_cancel(&order_id, &caller)
        .await
        .map(Json)
        .map_err(shop_error_to_response)
}

pub async fn admin_list_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AdminOrdersQuery>,
) -> ApiResult<OrderListResponse> {
    require_admin(&state, &headers)?;
    let orders = state
        .lifecycle
        .admin_list(query.status)
        .await
        .map_err(shop_error_to_response)?;

    Ok(Json(orders.into()))
}

pub async fn admin_get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<OrderDetails> {
    require_admin(&state, &headers)?;
    state
        .lifecycle
        .admin_get(&order_id)
        .await
        .map(Json)
        .map_err(shop_error_to_response)
}

#[instrument(skip(state, headers, update), fields(order_id = %order_id))]
pub async fn admin_update_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<Order> {
    let admin_id = require_admin(&state, &headers)?;
    state
        .lifecycle
        .admin_update_status(&order_id, update, &admin_id)
        .await
        .map(Json)
        .map_err(shop_error_to_response)
}

#[instrument(skip(state, headers, request), fields(order_id = %order_id))]
pub async fn admin_update_shipping(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<UpdateShippingRequest>,
) -> ApiResult<Order> {
    let admin_id = require_admin(&state, &headers)?;
    let (shipping, note) = request.into_parts();
    state
        .lifecycle
        .update_shipping(&order_id, shipping, note, &admin_id)
        .await
        .map(Json)
        .map_err(shop_error_to_response)
}

/// Widget config for paying an order inline
pub async fn initiate_payment(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<PaymentConfig> {
    let caller = caller_from_headers(&headers);
    state
        .payments
        .initiate_payment(&order_id, &caller)
        .await
        .map(Json)
        .map_err(shop_error_to_response)
}

pub async fn pay_with_saved(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<PayWithSavedRequest>,
) -> ApiResult<Order> {
    let customer_id = require_customer(&headers)?;
    state
        .payments
        .pay_with_saved(&order_id, &customer_id, &request.payment_method_id)
        .await
        .map(Json)
        .map_err(shop_error_to_response)
}

/// Retry an unpaid order. The body is optional.
pub async fn retry_payment(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<RetryPaymentResponse> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        RetryPaymentRequest::default()
    } else {
        serde_json::from_slice::<RetryPaymentRequest>(&body).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("invalid request body", 400).with_details(e.to_string())),
            )
        })?
    };

    let caller = caller_from_headers(&headers);
    let outcome = state
        .payments
        .retry_payment(&order_id, &caller, request.payment_method_id.as_deref())
        .await
        .map_err(shop_error_to_response)?;

    Ok(Json(match outcome {
        RetryOutcome::Inline(payment_config) => RetryPaymentResponse::Inline { payment_config },
        RetryOutcome::Charged(order) => RetryPaymentResponse::Charged { order },
    }))
}

pub async fn list_payment_methods(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<PaymentMethodsResponse> {
    let customer_id = require_customer(&headers)?;
    let payment_methods = state
        .payments
        .list_methods(&customer_id)
        .await
        .map_err(shop_error_to_response)?;

    Ok(Json(PaymentMethodsResponse {
        count: payment_methods.len(),
        payment_methods,
    }))
}

pub async fn set_default_payment_method(
    State(state): State<AppState>,
    Path(method_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<CustomerPaymentMethod> {
    let customer_id = require_customer(&headers)?;
    state
        .payments
        .set_default_method(&customer_id, &method_id)
        .await
        .map(Json)
        .map_err(shop_error_to_response)
}

pub async fn delete_payment_method(
    State(state): State<AppState>,
    Path(method_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let customer_id = require_customer(&headers)?;
    state
        .payments
        .delete_method(&customer_id, &method_id)
        .await
        .map_err(shop_error_to_response)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Handle Flutterwave webhook.
///
/// Every authenticated delivery is acknowledged with 200 so the provider
/// stops redelivering; only a bad `verif-hash` is rejected.
#[instrument(skip(state, headers, body), fields(bytes = body.len()))]
pub async fn flutterwave_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.reconciler.handle(&body, signature).await {
        Ok(status) => {
            info!(outcome = %status, "Webhook processed");
            Ok(Json(WebhookAck {
                received: true,
                status,
            }))
        }
        Err(ShopError::WebhookVerificationFailed(_)) => Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Invalid signature", 401)),
        )),
        Err(e) => {
            error!("Webhook processing error: {}", e);
            Err(shop_error_to_response(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_error_response() {
        let err = ErrorResponse::new("Test error", 400);
        assert_eq!(err.error, "Test error");
        assert_eq!(err.code, 400);
    }

    #[test]
    fn test_shop_error_conversion() {
        let (status, Json(body)) =
            shop_error_to_response(ShopError::Validation("Bad data".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.details.is_none());

        let (status, Json(body)) = shop_error_to_response(ShopError::Provider {
            provider: "flutterwave".into(),
            message: "upstream down".into(),
        });
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.code, 502);

        let (status, _) = shop_error_to_response(ShopError::PaymentDeclined {
            reason: "insufficient funds".into(),
        });
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn test_caller_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(caller_from_headers(&headers), Caller::anonymous());

        headers.insert(DEVICE_ID_HEADER, HeaderValue::from_static(" dev-1 "));
        headers.insert(CUSTOMER_ID_HEADER, HeaderValue::from_static(""));
        assert_eq!(caller_from_headers(&headers), Caller::guest("dev-1"));

        headers.insert(CUSTOMER_ID_HEADER, HeaderValue::from_static("c1"));
        assert_eq!(
            caller_from_headers(&headers),
            Caller::customer("c1").with_device("dev-1")
        );
    }

    #[test]
    fn test_update_shipping_request_parts() {
        let request: UpdateShippingRequest = serde_json::from_value(serde_json::json!({
            "shippingFullName": "Ada Obi",
            "shippingPhone": "08012345678",
            "shippingStreet": "12 Marina Road",
            "shippingCity": "Lagos",
            "shippingCountry": "Nigeria",
            "note": "Customer moved"
        }))
        .unwrap();

        let (address, note) = request.into_parts();
        assert_eq!(address.full_name, "Ada Obi");
        assert_eq!(address.state, None);
        assert_eq!(note.as_deref(), Some("Customer moved"));
    }
}

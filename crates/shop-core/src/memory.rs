//! In-memory [`OrderRepository`].
//!
//! All tables live behind one `RwLock`, so every trait call is atomic with
//! respect to every other. Used by tests and single-node deployments.

use crate::address::{CustomerAddress, ShippingAddress};
use crate::cart::{Cart, CartItem, CartStatus};
use crate::error::{ShopError, ShopResult};
use crate::order::{
    Order, OrderItem, PaymentStatus, RefundStatus, StatusHistoryEntry, TimelineEntry,
};
use crate::payment_method::CustomerPaymentMethod;
use crate::repository::{CartEffect, NewOrder, OrderCommit, OrderFilter, OrderRepository};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    carts: HashMap<String, Cart>,
    orders: HashMap<String, Order>,
    order_numbers: HashMap<String, String>,
    items: HashMap<String, Vec<OrderItem>>,
    timeline: HashMap<String, Vec<TimelineEntry>>,
    history: HashMap<String, Vec<StatusHistoryEntry>>,
    addresses: HashMap<String, CustomerAddress>,
    payment_methods: HashMap<String, CustomerPaymentMethod>,
}

impl Tables {
    fn cart_mut(&mut self, cart_id: &str) -> ShopResult<&mut Cart> {
        self.carts
            .get_mut(cart_id)
            .ok_or_else(|| ShopError::not_found("Cart", cart_id))
    }

    fn order_mut(&mut self, order_id: &str) -> ShopResult<&mut Order> {
        self.orders
            .get_mut(order_id)
            .ok_or_else(|| ShopError::not_found("Order", order_id))
    }

    fn apply_cart_effect(&mut self, cart_id: &str, effect: CartEffect) {
        let Some(cart) = self.carts.get_mut(cart_id) else {
            return;
        };
        match effect {
            CartEffect::Clear => {
                cart.status = CartStatus::Cleared;
                cart.items.clear();
            }
            CartEffect::Release if cart.status == CartStatus::Locked => {
                cart.status = CartStatus::Open;
            }
            CartEffect::Release => return,
        }
        cart.updated_at = Utc::now();
    }

    fn upsert_address(&mut self, customer_id: &str, address: ShippingAddress) -> String {
        let hash = address.content_hash();
        if let Some(existing) = self
            .addresses
            .values()
            .find(|a| a.customer_id == customer_id && a.address_hash == hash)
        {
            return existing.id.clone();
        }

        let is_first = !self.addresses.values().any(|a| a.customer_id == customer_id);
        let entry = CustomerAddress {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.to_string(),
            address_hash: hash,
            address,
            is_default: is_first,
            created_at: Utc::now(),
        };
        let id = entry.id.clone();
        self.addresses.insert(id.clone(), entry);
        id
    }

    fn bump(order: &mut Order) {
        order.version += 1;
        order.updated_at = Utc::now();
    }
}

/// Thread-safe in-memory store for every table the core uses.
#[derive(Default, Clone)]
pub struct InMemoryRepository {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryRepository {
    async fn save_cart(&self, cart: Cart) -> ShopResult<()> {
        let mut tables = self.tables.write().await;
        tables.carts.insert(cart.id.clone(), cart);
        Ok(())
    }

    async fn get_cart(&self, cart_id: &str) -> ShopResult<Option<Cart>> {
        let tables = self.tables.read().await;
        Ok(tables.carts.get(cart_id).cloned())
    }

    async fn add_cart_item(&self, cart_id: &str, item: CartItem) -> ShopResult<Cart> {
        let mut tables = self.tables.write().await;
        let cart = tables.cart_mut(cart_id)?;
        if !cart.is_open() {
            return Err(ShopError::CartLocked {
                cart_id: cart_id.to_string(),
            });
        }
        cart.items.push(item);
        cart.updated_at = Utc::now();
        Ok(cart.clone())
    }

    async fn lock_cart(&self, cart_id: &str) -> ShopResult<Cart> {
        let mut tables = self.tables.write().await;
        let cart = tables.cart_mut(cart_id)?;
        if cart.status != CartStatus::Open {
            return Err(ShopError::CartLocked {
                cart_id: cart_id.to_string(),
            });
        }
        cart.status = CartStatus::Locked;
        cart.updated_at = Utc::now();
        Ok(cart.clone())
    }

    async fn release_cart(&self, cart_id: &str) -> ShopResult<()> {
        let mut tables = self.tables.write().await;
        tables.apply_cart_effect(cart_id, CartEffect::Release);
        Ok(())
    }

    async fn order_number_exists(&self, order_number: &str) -> ShopResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables.order_numbers.contains_key(order_number))
    }

    async fn create_order(&self, new_order: NewOrder) -> ShopResult<Order> {
        let NewOrder {
            mut order,
            items,
            timeline,
            history,
            save_address,
        } = new_order;

        let mut tables = self.tables.write().await;

        if tables.order_numbers.contains_key(&order.order_number) {
            return Err(ShopError::Conflict {
                entity: "OrderNumber",
                id: order.order_number.clone(),
            });
        }
        if tables.orders.contains_key(&order.id) {
            return Err(ShopError::Conflict {
                entity: "Order",
                id: order.id.clone(),
            });
        }

        if let Some((customer_id, address)) = save_address {
            order.shipping_address_id = Some(tables.upsert_address(&customer_id, address));
        }

        let order_id = order.id.clone();
        tables
            .order_numbers
            .insert(order.order_number.clone(), order_id.clone());
        tables.items.insert(order_id.clone(), items);
        tables.timeline.insert(order_id.clone(), timeline);
        tables.history.insert(order_id.clone(), history);
        tables.orders.insert(order_id, order.clone());

        Ok(order)
    }

    async fn get_order(&self, order_id: &str) -> ShopResult<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(order_id).cloned())
    }

    async fn find_by_number(&self, order_number: &str) -> ShopResult<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .order_numbers
            .get(order_number)
            .and_then(|id| tables.orders.get(id))
            .cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> ShopResult<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn items_for(&self, order_id: &str) -> ShopResult<Vec<OrderItem>> {
        let tables = self.tables.read().await;
        Ok(tables.items.get(order_id).cloned().unwrap_or_default())
    }

    async fn timeline_for(&self, order_id: &str) -> ShopResult<Vec<TimelineEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.timeline.get(order_id).cloned().unwrap_or_default())
    }

    async fn history_for(&self, order_id: &str) -> ShopResult<Vec<StatusHistoryEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.history.get(order_id).cloned().unwrap_or_default())
    }

    async fn commit(&self, commit: OrderCommit) -> ShopResult<Order> {
        let OrderCommit {
            order,
            timeline,
            history,
            cart,
        } = commit;

        let mut tables = self.tables.write().await;

        let stored = tables
            .orders
            .get(&order.id)
            .ok_or_else(|| ShopError::not_found("Order", &order.id))?;
        if order.version != stored.version + 1 {
            return Err(ShopError::Conflict {
                entity: "Order",
                id: order.id.clone(),
            });
        }

        let order_id = order.id.clone();
        if let (Some(effect), Some(cart_id)) = (cart, order.cart_id.as_deref()) {
            tables.apply_cart_effect(cart_id, effect);
        }
        tables
            .timeline
            .entry(order_id.clone())
            .or_default()
            .extend(timeline);
        tables
            .history
            .entry(order_id.clone())
            .or_default()
            .extend(history);
        tables.orders.insert(order_id, order.clone());

        Ok(order)
    }

    async fn persist_refund_key(&self, order_id: &str, key: &str) -> ShopResult<String> {
        let mut tables = self.tables.write().await;
        let order = tables.order_mut(order_id)?;

        if let Some(existing) = &order.refund.idempotency_key {
            return Ok(existing.clone());
        }

        order.refund.idempotency_key = Some(key.to_string());
        order.refund.status = RefundStatus::Initiated;
        order.refund.initiated_at.get_or_insert_with(Utc::now);
        Tables::bump(order);
        Ok(key.to_string())
    }

    async fn record_refund_attempt(
        &self,
        order_id: &str,
        error: Option<String>,
    ) -> ShopResult<Order> {
        let mut tables = self.tables.write().await;
        let order = tables.order_mut(order_id)?;
        order.refund.attempts += 1;
        order.refund.last_error = error;
        Tables::bump(order);
        Ok(order.clone())
    }

    async fn orders_awaiting_refund(&self, max_attempts: u32) -> ShopResult<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| {
                o.payment_status == PaymentStatus::RefundInitiated
                    && o.refund.initiated
                    && o.provider_transaction_id.is_some()
                    && o.refund.status != RefundStatus::Completed
                    && o.refund.attempts < max_attempts
            })
            .cloned()
            .collect())
    }

    async fn addresses_for(&self, customer_id: &str) -> ShopResult<Vec<CustomerAddress>> {
        let tables = self.tables.read().await;
        let mut addresses: Vec<CustomerAddress> = tables
            .addresses
            .values()
            .filter(|a| a.customer_id == customer_id)
            .cloned()
            .collect();
        addresses.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(addresses)
    }

    async fn upsert_payment_method(
        &self,
        method: CustomerPaymentMethod,
    ) -> ShopResult<CustomerPaymentMethod> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables.payment_methods.values_mut().find(|m| {
            m.customer_id == method.customer_id && m.provider_ref == method.provider_ref
        }) {
            existing.token = method.token;
            existing.brand = method.brand;
            existing.last4 = method.last4;
            existing.exp_month = method.exp_month;
            existing.exp_year = method.exp_year;
            existing.updated_at = Utc::now();
            return Ok(existing.clone());
        }

        let is_first = !tables
            .payment_methods
            .values()
            .any(|m| m.customer_id == method.customer_id);
        let mut method = method;
        method.is_default = is_first;
        tables
            .payment_methods
            .insert(method.id.clone(), method.clone());
        Ok(method)
    }

    async fn get_payment_method(
        &self,
        method_id: &str,
    ) -> ShopResult<Option<CustomerPaymentMethod>> {
        let tables = self.tables.read().await;
        Ok(tables.payment_methods.get(method_id).cloned())
    }

    async fn payment_methods_for(
        &self,
        customer_id: &str,
    ) -> ShopResult<Vec<CustomerPaymentMethod>> {
        let tables = self.tables.read().await;
        let mut methods: Vec<CustomerPaymentMethod> = tables
            .payment_methods
            .values()
            .filter(|m| m.customer_id == customer_id)
            .cloned()
            .collect();
        methods.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(methods)
    }

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        method_id: &str,
    ) -> ShopResult<CustomerPaymentMethod> {
        let mut tables = self.tables.write().await;

        let owned = tables
            .payment_methods
            .get(method_id)
            .is_some_and(|m| m.customer_id == customer_id);
        if !owned {
            return Err(ShopError::not_found("PaymentMethod", method_id));
        }

        let mut selected = None;
        for method in tables
            .payment_methods
            .values_mut()
            .filter(|m| m.customer_id == customer_id)
        {
            method.is_default = method.id == method_id;
            if method.is_default {
                method.updated_at = Utc::now();
                selected = Some(method.clone());
            }
        }
        selected.ok_or_else(|| ShopError::not_found("PaymentMethod", method_id))
    }

    async fn delete_payment_method(&self, customer_id: &str, method_id: &str) -> ShopResult<()> {
        let mut tables = self.tables.write().await;

        let owned = tables
            .payment_methods
            .get(method_id)
            .is_some_and(|m| m.customer_id == customer_id);
        let removed = owned
            .then(|| tables.payment_methods.remove(method_id))
            .flatten()
            .ok_or_else(|| ShopError::not_found("PaymentMethod", method_id))?;

        if removed.is_default {
            if let Some(next) = tables
                .payment_methods
                .values_mut()
                .filter(|m| m.customer_id == customer_id)
                .max_by_key(|m| m.created_at)
            {
                next.is_default = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CardDetails;
    use crate::money::Currency;
    use crate::testing::order_fixture;
    use rust_decimal_macros::dec;

    async fn seeded() -> (InMemoryRepository, Order) {
        let repo = InMemoryRepository::new();
        let cart = Cart::for_customer("c1").with_item(CartItem::new("p1", "Tee", dec!(10), 1));
        let mut order = order_fixture(dec!(10), dec!(5), Currency::USD);
        order.cart_id = Some(cart.id.clone());
        repo.save_cart(cart.clone()).await.unwrap();
        repo.lock_cart(&cart.id).await.unwrap();
        let order = repo
            .create_order(NewOrder {
                order,
                items: Vec::new(),
                timeline: Vec::new(),
                history: Vec::new(),
                save_address: None,
            })
            .await
            .unwrap();
        (repo, order)
    }

    #[tokio::test]
    async fn test_lock_cart_is_compare_and_set() {
        let repo = InMemoryRepository::new();
        let cart = Cart::for_device("d1");
        repo.save_cart(cart.clone()).await.unwrap();

        assert_eq!(
            repo.lock_cart(&cart.id).await.unwrap().status,
            CartStatus::Locked
        );
        assert!(matches!(
            repo.lock_cart(&cart.id).await,
            Err(ShopError::CartLocked { .. })
        ));
        assert!(matches!(
            repo.add_cart_item(&cart.id, CartItem::new("p", "x", dec!(1), 1))
                .await,
            Err(ShopError::CartLocked { .. })
        ));

        repo.release_cart(&cart.id).await.unwrap();
        assert!(repo.get_cart(&cart.id).await.unwrap().unwrap().is_open());
    }

    #[tokio::test]
    async fn test_commit_rejects_stale_version() {
        let (repo, order) = seeded().await;

        let first = order.next_version();
        let second = order.next_version();
        repo.commit(OrderCommit::new(first)).await.unwrap();

        assert!(matches!(
            repo.commit(OrderCommit::new(second)).await,
            Err(ShopError::Conflict { .. })
        ));
        assert_eq!(
            repo.get_order(&order.id).await.unwrap().unwrap().version,
            order.version + 1
        );
    }

    #[tokio::test]
    async fn test_commit_clears_cart_and_appends_logs() {
        let (repo, order) = seeded().await;
        let cart_id = order.cart_id.clone().unwrap();

        let commit = OrderCommit::new(order.next_version())
            .with_timeline(TimelineEntry::new(&order.id, order.status))
            .with_cart(CartEffect::Clear);
        repo.commit(commit).await.unwrap();

        let cart = repo.get_cart(&cart_id).await.unwrap().unwrap();
        assert_eq!(cart.status, CartStatus::Cleared);
        assert!(cart.is_empty());
        assert_eq!(repo.timeline_for(&order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_order_number_conflicts() {
        let (repo, order) = seeded().await;
        let mut dup = order_fixture(dec!(1), dec!(1), Currency::USD);
        dup.order_number = order.order_number.clone();

        let result = repo
            .create_order(NewOrder {
                order: dup,
                items: Vec::new(),
                timeline: Vec::new(),
                history: Vec::new(),
                save_address: None,
            })
            .await;
        assert!(matches!(result, Err(ShopError::Conflict { .. })));
        assert!(repo.order_number_exists(&order.order_number).await.unwrap());
    }

    #[tokio::test]
    async fn test_refund_key_first_write_wins() {
        let (repo, order) = seeded().await;

        let first = repo.persist_refund_key(&order.id, "refund_a").await.unwrap();
        let second = repo.persist_refund_key(&order.id, "refund_b").await.unwrap();
        assert_eq!(first, "refund_a");
        assert_eq!(second, "refund_a");

        let stored = repo.get_order(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.refund.status, RefundStatus::Initiated);
        assert!(stored.refund.initiated_at.is_some());
    }

    #[tokio::test]
    async fn test_saved_address_deduplicated() {
        let repo = InMemoryRepository::new();
        for _ in 0..2 {
            let order = order_fixture(dec!(1), dec!(1), Currency::USD);
            let shipping = order.shipping.clone();
            let created = repo
                .create_order(NewOrder {
                    order,
                    items: Vec::new(),
                    timeline: Vec::new(),
                    history: Vec::new(),
                    save_address: Some(("c1".into(), shipping)),
                })
                .await
                .unwrap();
            assert!(created.shipping_address_id.is_some());
        }

        let addresses = repo.addresses_for("c1").await.unwrap();
        assert_eq!(addresses.len(), 1);
        assert!(addresses[0].is_default);
    }

    #[tokio::test]
    async fn test_payment_method_upsert_and_default() {
        let repo = InMemoryRepository::new();
        let card = |token: &str| CardDetails {
            token: token.into(),
            brand: Some("VISA".into()),
            last4: Some("4242".into()),
            exp_month: Some(1),
            exp_year: Some(2030),
        };

        let first = repo
            .upsert_payment_method(CustomerPaymentMethod::from_card(
                "c1",
                "flutterwave",
                "100",
                &card("t1"),
            ))
            .await
            .unwrap();
        assert!(first.is_default);

        let updated = repo
            .upsert_payment_method(CustomerPaymentMethod::from_card(
                "c1",
                "flutterwave",
                "100",
                &card("t2"),
            ))
            .await
            .unwrap();
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.token, "t2");

        let second = repo
            .upsert_payment_method(CustomerPaymentMethod::from_card(
                "c1",
                "flutterwave",
                "200",
                &card("t3"),
            ))
            .await
            .unwrap();
        assert!(!second.is_default);

        repo.set_default_payment_method("c1", &second.id).await.unwrap();
        let methods = repo.payment_methods_for("c1").await.unwrap();
        assert_eq!(methods[0].id, second.id);
        assert_eq!(methods.iter().filter(|m| m.is_default).count(), 1);

        assert!(matches!(
            repo.set_default_payment_method("c2", &second.id).await,
            Err(ShopError::NotFound { .. })
        ));
        assert!(matches!(
            repo.delete_payment_method("c2", &second.id).await,
            Err(ShopError::NotFound { .. })
        ));

        repo.delete_payment_method("c1", &second.id).await.unwrap();
        let methods = repo.payment_methods_for("c1").await.unwrap();
        assert_eq!(methods.len(), 1);
        assert!(methods[0].is_default);
    }
}

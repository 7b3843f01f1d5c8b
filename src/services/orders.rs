//! Order and order-item operations
//!
//! Every order write goes through the derivation engine first and is
//! persisted together with its calculation-history row. A new order's items
//! are part of the same write.

use crate::clock::Clock;
use crate::error::BotError;
use crate::finance::FinancialEngine;
use crate::intent::{NewItem, OrderChange};
use crate::models::{ItemStatus, Order, OrderItem, OrderItemsSummary, User};
use crate::state::Store;
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct OrderService {
    store: Arc<dyn Store>,
    engine: Arc<FinancialEngine>,
    clock: Arc<dyn Clock>,
}

/// An order together with the items created alongside it
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>, engine: Arc<FinancialEngine>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            engine,
            clock,
        }
    }

    fn order_number(&self) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "ORD-{}-{}",
            self.clock.now().timestamp(),
            suffix[..6].to_uppercase()
        )
    }

    pub async fn create_order(
        &self,
        customer: &str,
        total: f64,
        items: &[NewItem],
        created_by: i64,
    ) -> Result<CreatedOrder> {
        if customer.trim().is_empty() {
            return Err(BotError::invalid("Customer name must not be empty"));
        }
        validate_amount(total, "total amount")?;
        for item in items {
            validate_item(item)?;
        }

        let order_number = self.order_number();
        let mut order = Order::new(order_number.clone(), customer.trim().to_string(), total, created_by);
        let now = self.clock.now();
        order.order_date = now;
        order.created_at = now;

        let history = self.engine.derive(&mut order).await?;
        let rows = items.iter().map(|item| self.item_row(0, item)).collect();
        let (order, history, items) = self
            .store
            .create_order_with_history(order, history, rows)
            .await
            .map_err(|e| {
                warn!(order = %order_number, "Order not created: {}", e);
                e
            })?;

        info!(
            order_id = order.id,
            order = %order.order_number,
            total = order.total_amount,
            net_profit = order.derived.net_profit,
            history_id = history.id,
            items = items.len(),
            "Order created"
        );

        Ok(CreatedOrder { order, items })
    }

    /// Applies the changes and re-derives; a new history row is appended
    pub async fn update_order(&self, order_id: i64, changes: &[OrderChange]) -> Result<Order> {
        let mut order = self.store.get_order(order_id).await?;

        for change in changes {
            match change {
                OrderChange::CustomerName(name) => order.customer_name = name.clone(),
                OrderChange::TotalAmount(total) => {
                    validate_amount(*total, "total amount")?;
                    order.total_amount = *total;
                }
                OrderChange::Status(status) => order.status = *status,
            }
        }

        let history = self.engine.derive(&mut order).await?;
        let history = self.store.update_order_with_history(&order, history).await?;

        info!(order_id, net_profit = order.derived.net_profit, history_id = history.id, "Order updated");
        Ok(order)
    }

    pub async fn delete_order(&self, order_id: i64) -> Result<()> {
        self.store.delete_order(order_id).await?;
        info!(order_id, "Order deleted");
        Ok(())
    }

    pub async fn get_order(&self, order_id: i64) -> Result<Order> {
        self.store.get_order(order_id).await
    }

    /// Everything for admins, own orders otherwise
    pub async fn visible_orders(&self, caller: &User) -> Result<Vec<Order>> {
        if caller.role.is_admin() {
            self.store.list_orders().await
        } else {
            self.store.orders_by_creator(caller.id).await
        }
    }

    /// Parent must exist; the line total is computed here
    pub async fn add_item(&self, order_id: i64, item: &NewItem) -> Result<OrderItem> {
        validate_item(item)?;
        // Surfaces NotFound before any write
        self.store.get_order(order_id).await?;

        let stored = self.store.create_item(self.item_row(order_id, item)).await?;
        info!(order_id, item_id = stored.id, total_price = stored.total_price, "Order item added");
        Ok(stored)
    }

    fn item_row(&self, order_id: i64, item: &NewItem) -> OrderItem {
        let mut row = OrderItem {
            id: 0,
            order_id,
            item_name: item.name.trim().to_string(),
            description: item.description.trim().to_string(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: 0.0,
            status: ItemStatus::Pending,
            created_at: self.clock.now(),
        };
        row.total_price = row.line_total();
        row
    }

    pub async fn items_for_order(&self, order_id: i64) -> Result<Vec<OrderItem>> {
        self.store.get_order(order_id).await?;
        self.store.items_for_order(order_id).await
    }

    /// Line total is recomputed on every item write
    pub async fn update_item(&self, item: &mut OrderItem) -> Result<()> {
        item.total_price = item.line_total();
        self.store.update_item(item).await
    }

    pub async fn update_item_status(&self, item_id: i64, status: ItemStatus) -> Result<OrderItem> {
        let mut item = self.store.get_item(item_id).await?;
        item.status = status;
        self.update_item(&mut item).await?;
        info!(item_id, status = status.as_str(), "Order item status updated");
        Ok(item)
    }

    pub async fn items_summary(&self, order_id: i64) -> Result<OrderItemsSummary> {
        let items = self.items_for_order(order_id).await?;
        Ok(summarize(order_id, &items))
    }
}

/// Completion rate is 0 for an order without items
pub fn summarize(order_id: i64, items: &[OrderItem]) -> OrderItemsSummary {
    let total_items = items.len();
    let completed_items = items
        .iter()
        .filter(|i| i.status == ItemStatus::Completed)
        .count();

    OrderItemsSummary {
        order_id,
        total_items,
        total_quantity: items.iter().map(|i| i.quantity).sum(),
        total_value: items.iter().map(|i| i.total_price).sum(),
        pending_items: items
            .iter()
            .filter(|i| i.status == ItemStatus::Pending)
            .count(),
        completed_items,
        completion_rate: if total_items == 0 {
            0.0
        } else {
            completed_items as f64 / total_items as f64 * 100.0
        },
    }
}

fn validate_amount(value: f64, what: &str) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(BotError::invalid(format!("Invalid {}", what)))
    }
}

fn validate_item(item: &NewItem) -> Result<()> {
    if item.name.trim().is_empty() {
        return Err(BotError::invalid("Item name must not be empty"));
    }
    if item.quantity <= 0 {
        return Err(BotError::invalid("Invalid quantity"));
    }
    validate_amount(item.unit_price, "price")
}

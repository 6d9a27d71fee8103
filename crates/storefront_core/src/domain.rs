//! crates/storefront_core/src/domain.rs
//!
//! Defines the pure, core data structures for the storefront cart.
//! Serialization attributes describe the stored record shape; nothing here
//! touches a store or a runtime.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_id)
    }
}

/// Why a line item cannot go into a cart.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItemError {
    #[error("product id must not be empty")]
    EmptyId,
    #[error("quantity must be at least 1")]
    ZeroQuantity,
    #[error("unit price must not be negative, got {0}")]
    NegativePrice(Decimal),
    #[error("cart total would exceed the largest representable amount")]
    TotalOverflow,
}

/// One distinct product in the cart.
///
/// `name` and `unit_price` are copied from the product when it is first added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: String,
    pub name: String,
    #[serde(alias = "price")]
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, unit_price: Decimal, quantity: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            unit_price,
            quantity,
        }
    }

    /// Checks the rules every line in a cart must satisfy.
    pub fn validate(&self) -> Result<(), ItemError> {
        if self.id.is_empty() {
            return Err(ItemError::EmptyId);
        }
        if self.quantity == 0 {
            return Err(ItemError::ZeroQuantity);
        }
        if self.unit_price < Decimal::ZERO {
            return Err(ItemError::NegativePrice(self.unit_price));
        }
        Ok(())
    }

    /// `unit_price * quantity`, or `None` if it does not fit in a `Decimal`.
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

/// The ordered set of line items for one identity.
///
/// Holds at most one `LineItem` per id; order is insertion order. Every line
/// total and the cart total fit in a `Decimal`: `add` refuses anything else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    items: Vec<LineItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a cart from stored items, folding any duplicate ids together.
    pub fn from_items(items: impl IntoIterator<Item = LineItem>) -> Result<Self, ItemError> {
        let mut cart = Self::new();
        for item in items {
            cart.add(item)?;
        }
        Ok(cart)
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<LineItem> {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of all quantities.
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// Sum of `unit_price * quantity` over all lines.
    pub fn total_price(&self) -> Decimal {
        // Unreachable for carts built through `add`.
        self.checked_total().unwrap_or(Decimal::MAX)
    }

    fn checked_total(&self) -> Option<Decimal> {
        self.items
            .iter()
            .try_fold(Decimal::ZERO, |sum, item| sum.checked_add(item.line_total()?))
    }

    pub fn quantity_of(&self, id: &str) -> Option<u32> {
        self.items.iter().find(|i| i.id == id).map(|i| i.quantity)
    }

    /// Adds `item`, merging its quantity into an existing line with the same id.
    ///
    /// The cart is left unchanged if the quantity or any total would overflow.
    pub fn add(&mut self, item: LineItem) -> Result<(), ItemError> {
        match self.items.iter().position(|i| i.id == item.id) {
            Some(pos) => {
                let previous = self.items[pos].quantity;
                self.items[pos].quantity = previous
                    .checked_add(item.quantity)
                    .ok_or(ItemError::TotalOverflow)?;
                if self.checked_total().is_none() {
                    self.items[pos].quantity = previous;
                    return Err(ItemError::TotalOverflow);
                }
            }
            None => {
                self.items.push(item);
                if self.checked_total().is_none() {
                    self.items.pop();
                    return Err(ItemError::TotalOverflow);
                }
            }
        }
        Ok(())
    }

    /// Removes the line with `id`. Returns whether anything was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.id != id);
        self.items.len() != before
    }

    /// Lowers the quantity of `id` by one, dropping the line instead of going below 1.
    /// Returns whether the cart changed.
    pub fn decrement(&mut self, id: &str) -> bool {
        let Some(pos) = self.items.iter().position(|i| i.id == id) else {
            return false;
        };
        if self.items[pos].quantity > 1 {
            self.items[pos].quantity -= 1;
        } else {
            self.items.remove(pos);
        }
        true
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Fulfilment status of an order. Orders are always created as `Pending`;
/// later transitions belong to fulfilment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

/// An immutable checkout snapshot.
///
/// `created_at` is `None` until the store has assigned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub user_id: String,
    pub items: Vec<LineItem>,
    pub total_price: Decimal,
    pub item_count: u64,
    pub status: OrderStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Snapshots `cart` as a new pending order for `identity`.
    pub fn pending(identity: &Identity, cart: &Cart) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            items: cart.items().to_vec(),
            total_price: cart.total_price(),
            item_count: cart.item_count(),
            status: OrderStatus::Pending,
            created_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn price(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn repeated_adds_merge_into_one_line() {
        let mut cart = Cart::new();
        cart.add(LineItem::new("p1", "Shirt", price("19.99"), 1)).unwrap();
        cart.add(LineItem::new("p1", "Shirt", price("19.99"), 2)).unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.quantity_of("p1"), Some(3));
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.total_price(), price("59.97"));
    }

    #[test]
    fn totals_follow_every_mutation() {
        let mut cart = Cart::new();
        cart.add(LineItem::new("a", "Mug", price("4.50"), 2)).unwrap();
        cart.add(LineItem::new("b", "Hat", price("12.00"), 1)).unwrap();
        cart.add(LineItem::new("c", "Pen", price("0.99"), 5)).unwrap();
        assert_eq!(cart.item_count(), 8);
        assert_eq!(cart.total_price(), price("25.95"));

        assert!(cart.remove("b"));
        assert_eq!(cart.item_count(), 7);
        assert_eq!(cart.total_price(), price("13.95"));

        assert!(cart.decrement("c"));
        assert_eq!(cart.quantity_of("c"), Some(4));
        assert_eq!(cart.total_price(), price("12.96"));
    }

    #[test]
    fn insertion_order_is_kept_across_merges() {
        let mut cart = Cart::new();
        cart.add(LineItem::new("a", "A", price("1"), 1)).unwrap();
        cart.add(LineItem::new("b", "B", price("1"), 1)).unwrap();
        cart.add(LineItem::new("a", "A", price("1"), 4)).unwrap();

        let ids: Vec<_> = cart.items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn decrement_at_one_drops_the_line() {
        let mut cart = Cart::new();
        cart.add(LineItem::new("a", "A", price("3"), 1)).unwrap();

        assert!(cart.decrement("a"));
        assert!(cart.is_empty());
        assert!(!cart.decrement("a"));
    }

    #[test]
    fn removing_unknown_id_leaves_cart_untouched() {
        let mut cart = Cart::new();
        cart.add(LineItem::new("a", "A", price("3"), 2)).unwrap();
        let before = cart.clone();

        assert!(!cart.remove("unknown"));
        assert_eq!(cart, before);
    }

    #[test]
    fn from_items_folds_duplicates() {
        let cart = Cart::from_items([
            LineItem::new("a", "A", price("2"), 1),
            LineItem::new("a", "A", price("2"), 1),
        ])
        .unwrap();
        assert_eq!(cart.quantity_of("a"), Some(2));
    }

    #[test]
    fn pending_order_snapshots_cart() {
        let mut cart = Cart::new();
        cart.add(LineItem::new("a", "A", price("2.25"), 2)).unwrap();
        let order = Order::pending(&Identity::new("u1"), &cart);

        assert_eq!(order.user_id, "u1");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.item_count, 2);
        assert_eq!(order.total_price, price("4.50"));
        assert_eq!(order.items, cart.items());
        assert!(order.created_at.is_none());
    }

    #[test]
    fn add_refuses_totals_that_do_not_fit() {
        let mut cart = Cart::new();
        cart.add(LineItem::new("a", "A", Decimal::MAX, 1)).unwrap();

        assert_eq!(
            cart.add(LineItem::new("a", "A", Decimal::MAX, 1)),
            Err(ItemError::TotalOverflow)
        );
        assert_eq!(
            cart.add(LineItem::new("b", "B", price("1"), 1)),
            Err(ItemError::TotalOverflow)
        );
        assert_eq!(cart.quantity_of("a"), Some(1));
        assert_eq!(cart.quantity_of("b"), None);
        assert_eq!(cart.total_price(), Decimal::MAX);

        let mut single = Cart::new();
        assert_eq!(
            single.add(LineItem::new("c", "C", Decimal::MAX, 2)),
            Err(ItemError::TotalOverflow)
        );
        assert!(single.is_empty());
    }

    #[test]
    fn validate_checks_line_rules() {
        assert_eq!(LineItem::new("", "A", price("1"), 1).validate(), Err(ItemError::EmptyId));
        assert_eq!(LineItem::new("a", "A", price("1"), 0).validate(), Err(ItemError::ZeroQuantity));
        assert_eq!(
            LineItem::new("a", "A", price("-5"), 1).validate(),
            Err(ItemError::NegativePrice(price("-5")))
        );
        assert_eq!(LineItem::new("a", "A", Decimal::ZERO, 1).validate(), Ok(()));
    }
}

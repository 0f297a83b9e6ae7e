//! Cart model: line items, quantity rules, and derived totals.
//!
//! Maintains the invariant: every line has `quantity >= 1`. A mutation that
//! would drop a line's quantity to zero or below removes the line instead.

use crate::catalog::Product;
use crate::money::Money;
use rust_decimal::Decimal;
use serde::Serialize;

/// Sales tax rate applied to the subtotal (8%).
fn tax_rate() -> Decimal {
    Decimal::new(8, 2)
}

/// A single cart line.
///
/// `price` is snapshotted when the product is first added and is not re-read
/// from the catalog on later increments.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    /// Id of the product this line holds.
    pub product_id: String,

    /// Product display name at add time.
    pub name: String,

    /// Product SKU at add time.
    pub sku: String,

    /// Unit price frozen at first add.
    pub price: Money,

    /// Units in this line. Always at least 1.
    pub quantity: u32,
}

impl CartLine {
    /// Line total: `price * quantity`.
    pub fn line_total(&self) -> Money {
        self.price.times(self.quantity)
    }
}

/// An ordered collection of cart lines keyed by product id.
///
/// Insertion order is presentation-only. Totals are derived on demand from
/// the current lines; nothing is cached.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// Creates an empty cart.
    pub fn new() -> Self {
        Cart { lines: Vec::new() }
    }

    /// Adds a product to the cart, or increments its quantity by 1 if a line
    /// for it already exists. The existing line's price stays frozen.
    pub fn add_or_increment(&mut self, product: &Product) {
        match self.lines.iter_mut().find(|l| l.product_id == product.id) {
            Some(line) => {
                line.quantity += 1;
            }
            None => {
                self.lines.push(CartLine {
                    product_id: product.id.clone(),
                    name: product.name.clone(),
                    sku: product.sku.clone(),
                    price: product.price,
                    quantity: 1,
                });
            }
        }
    }

    /// Overwrites a line's quantity. A quantity of zero or below removes the
    /// line, exactly as [`Cart::remove`] would.
    pub fn set_quantity(&mut self, product_id: &str, quantity: i64) {
        if quantity <= 0 {
            self.remove(product_id);
            return;
        }

        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product_id) {
            line.quantity = quantity;
        }
    }

    /// Removes the line for a product if present; no-op otherwise.
    pub fn remove(&mut self, product_id: &str) {
        self.lines.retain(|l| l.product_id != product_id);
    }

    /// Removes every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Sum of line totals.
    pub fn subtotal(&self) -> Money {
        self.lines
            .iter()
            .fold(Money::ZERO, |acc, line| acc + line.line_total())
    }

    /// Tax on the subtotal at the fixed 8% rate.
    pub fn tax(&self) -> Money {
        self.subtotal().apply_rate(tax_rate())
    }

    /// Subtotal plus tax.
    pub fn total(&self) -> Money {
        self.subtotal() + self.tax()
    }

    /// Returns `true` if the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of lines (distinct products, not units).
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Lines in insertion order.
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }
}

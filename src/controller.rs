//! Transaction state machine for one checkout session.
//!
//! Owns the cart and gates scanning, payment submission, the
//! inventory-decrement side effect, and reset. Pure state: all I/O and
//! timing live in the terminal event loop ([`crate::terminal`]).

use crate::cart::Cart;
use crate::catalog::Catalog;
use crate::gateway::InventoryGateway;
use crate::money::Money;
use log::{debug, info, warn};
use serde::Serialize;

/// Session state.
///
/// `Idle` and `Scanning` are distinguished only by whether the cart is
/// non-empty; both accept scans and cart edits. `Paying` has a settlement
/// in flight; `Success` is the post-payment display window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxState {
    Idle,
    Scanning,
    Paying,
    Success,
}

/// One terminal's checkout session: cart, state, and the payment snapshot.
///
/// The snapshot total is captured at the moment a payment succeeds and is
/// decoupled from the live cart, so clearing the cart afterwards does not
/// change the displayed receipt amount.
#[derive(Debug)]
pub struct TransactionController {
    state: TxState,
    cart: Cart,
    last_error: Option<String>,
    payment_snapshot_total: Option<Money>,
    customer_name: Option<String>,
}

impl TransactionController {
    /// Creates an idle session with an empty cart.
    pub fn new() -> Self {
        TransactionController {
            state: TxState::Idle,
            cart: Cart::new(),
            last_error: None,
            payment_snapshot_total: None,
            customer_name: None,
        }
    }

    /// Resolves a scanned or typed term and adds the product to the cart.
    ///
    /// Clears any previous error first. On a miss the cart is left unchanged
    /// and `last_error` names the failed term; repeated identical misses just
    /// repeat the error. Scans arriving while a payment is in flight or the
    /// success screen is showing are ignored.
    pub fn scan(&mut self, term: &str, catalog: &Catalog) {
        match self.state {
            TxState::Paying | TxState::Success => {
                debug!("Ignoring scan {:?} in state {:?}", term, self.state);
                return;
            }
            TxState::Idle | TxState::Scanning => {}
        }

        self.last_error = None;
        match catalog.resolve(term) {
            Some(product) => {
                debug!("Resolved {:?} to product {} ({})", term, product.id, product.sku);
                self.cart.add_or_increment(product);
                self.state = TxState::Scanning;
            }
            None => {
                warn!("Scan failed to resolve {:?}", term);
                self.last_error = Some(format!("Product not found: {term}"));
            }
        }
    }

    /// Overwrites a line's quantity (zero or below removes the line).
    /// No state-machine transition beyond the Idle/Scanning bookkeeping.
    pub fn set_quantity(&mut self, product_id: &str, quantity: i64) {
        self.cart.set_quantity(product_id, quantity);
        self.sync_browsing_state();
    }

    /// Removes a line from the cart.
    pub fn remove_item(&mut self, product_id: &str) {
        self.cart.remove(product_id);
        self.sync_browsing_state();
    }

    /// Sets or clears the optional customer name (staff terminals).
    pub fn set_customer_name(&mut self, name: Option<String>) {
        self.customer_name = name.filter(|n| !n.trim().is_empty());
    }

    /// The in-flight payment guard.
    ///
    /// Returns the settlement amount and transitions `Scanning -> Paying`.
    /// Returns `None` without side effects if a payment is already in flight,
    /// the success screen is showing, or the cart is empty; a rapid second
    /// submission is a no-op, never a second settlement.
    pub fn begin_payment(&mut self) -> Option<Money> {
        match self.state {
            TxState::Paying => {
                debug!("Payment already in flight, ignoring submission");
                None
            }
            TxState::Success => {
                debug!("Ignoring payment submission on success screen");
                None
            }
            TxState::Idle => {
                debug!("Ignoring payment submission for empty cart");
                None
            }
            TxState::Scanning => {
                self.state = TxState::Paying;
                let amount = self.cart.total();
                info!("Payment of {} in flight", amount);
                Some(amount)
            }
        }
    }

    /// Completes a successful settlement.
    ///
    /// For every cart line, decrements stock by the sold quantity (fired
    /// once per line, not retried or rolled back if a later line's adjustment
    /// fails). Snapshots the total and transitions `Paying -> Success`.
    pub fn complete_payment(&mut self, inventory: &mut dyn InventoryGateway) {
        if self.state != TxState::Paying {
            debug!("Ignoring settlement completion in state {:?}", self.state);
            return;
        }

        for line in self.cart.lines() {
            inventory.adjust_quantity(&line.product_id, -i64::from(line.quantity));
        }

        let total = self.cart.total();
        self.payment_snapshot_total = Some(total);
        self.state = TxState::Success;
        info!("Payment of {} succeeded", total);
    }

    /// Handles a declined settlement: back to `Scanning` with an error, cart
    /// untouched, and no inventory adjustment.
    pub fn payment_declined(&mut self, reason: &str) {
        if self.state != TxState::Paying {
            debug!("Ignoring settlement decline in state {:?}", self.state);
            return;
        }

        warn!("Payment declined: {}", reason);
        self.last_error = Some(reason.to_string());
        self.state = TxState::Scanning;
        self.sync_browsing_state();
    }

    /// Starts a new transaction: clears the cart, error, snapshot, and
    /// customer name, returning to `Idle`. Usable in any state.
    pub fn reset(&mut self) {
        debug!("Resetting session");
        self.cart.clear();
        self.last_error = None;
        self.payment_snapshot_total = None;
        self.customer_name = None;
        self.state = TxState::Idle;
    }

    /// Current session state.
    pub fn state(&self) -> TxState {
        self.state
    }

    /// The live cart.
    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    /// The most recent recoverable error, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The receipt amount captured when the last payment succeeded.
    pub fn payment_snapshot_total(&self) -> Option<Money> {
        self.payment_snapshot_total
    }

    /// Optional customer name for this session.
    pub fn customer_name(&self) -> Option<&str> {
        self.customer_name.as_deref()
    }

    // Idle and Scanning are defined by cart emptiness; keep the stored
    // state consistent after cart edits.
    fn sync_browsing_state(&mut self) {
        if let TxState::Idle | TxState::Scanning = self.state {
            self.state = if self.cart.is_empty() {
                TxState::Idle
            } else {
                TxState::Scanning
            };
        }
    }
}

impl Default for TransactionController {
    fn default() -> Self {
        Self::new()
    }
}

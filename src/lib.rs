//! # Checkout Terminal
//!
//! The session engine behind a point-of-sale checkout terminal: an external
//! barcode scanner streams codes over a persistent WebSocket link, scanned or
//! typed terms resolve against a product catalog, resolved products accumulate
//! in a cart, and a transaction state machine gates payment settlement,
//! inventory decrements, and auto-reset.
//!
//! ## Design Principles
//!
//! - **Fixed-point arithmetic**: Cent-precision money via `rust_decimal`
//! - **Generation-tagged connections**: Stale scanner events are dropped,
//!   never applied to a superseding handle
//! - **Explicit guards and timers**: The in-flight payment guard is state,
//!   and the reconnect/auto-reset timers are cancelable, single-shot tasks
//! - **Derived totals**: `subtotal`/`tax`/`total` are always computed from
//!   the current cart, never cached
//!
//! ## Example
//!
//! ```no_run
//! use checkout_terminal::{
//!     Catalog, Command, SimulatedPaymentGateway, Terminal, TerminalConfig,
//! };
//! use std::sync::{Arc, Mutex};
//!
//! # async fn demo() {
//! let catalog = Arc::new(Mutex::new(Catalog::new(Vec::new())));
//! let gateway = SimulatedPaymentGateway::default();
//! let (terminal, commands) = Terminal::new(catalog, gateway, TerminalConfig::default());
//!
//! tokio::spawn(terminal.run());
//! commands.send(Command::Scan("A1".to_string())).unwrap();
//! # }
//! ```

pub mod cart;
pub mod catalog;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod money;
pub mod scanner;
pub mod terminal;

pub use cart::{Cart, CartLine};
pub use catalog::{Catalog, Product};
pub use controller::{TransactionController, TxState};
pub use error::{CheckoutError, Result};
pub use gateway::{
    InventoryGateway, PaymentError, PaymentGateway, PaymentMethod, SimulatedPaymentGateway,
};
pub use money::Money;
pub use scanner::{LinkState, LinkStatus, ScannerConfig, ScannerLink};
pub use terminal::{Command, SessionSnapshot, Terminal, TerminalConfig, TerminalVariant};

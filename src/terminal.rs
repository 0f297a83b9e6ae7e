//! Terminal event loop: one checkout session driven by commands, scanner
//! codes, settlement completion, and the auto-reset timer.
//!
//! All session mutation happens on this single task. The only concurrency is
//! between the event sources the loop selects over; the in-flight payment
//! guard is explicit controller state, not a property of the scheduler.

use crate::cart::CartLine;
use crate::catalog::{Catalog, Product};
use crate::controller::{TransactionController, TxState};
use crate::gateway::{PaymentError, PaymentGateway, PaymentMethod};
use crate::money::Money;
use crate::scanner::{LinkStatus, ScannerConfig, ScannerLink};
use log::{debug, info, warn};
use serde::Serialize;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Sleep;

/// Which checkout screen this terminal drives. Variants differ only
/// cosmetically: the quick-add list size and whether a customer name
/// field is honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalVariant {
    /// Customer-facing self-checkout.
    Customer,
    /// Staff-assisted checkout.
    Staff,
}

impl TerminalVariant {
    /// Number of catalog products offered as quick-add shortcuts.
    pub fn quick_add_count(self) -> usize {
        match self {
            TerminalVariant::Customer => 3,
            TerminalVariant::Staff => 4,
        }
    }

    /// Whether this variant honors the optional customer name field.
    pub fn supports_customer_name(self) -> bool {
        matches!(self, TerminalVariant::Staff)
    }
}

/// Terminal settings.
#[derive(Debug, Clone)]
pub struct TerminalConfig {
    /// Which screen variant this terminal runs.
    pub variant: TerminalVariant,

    /// Scanner device endpoint; `None` runs the terminal on typed input only.
    pub scanner: Option<ScannerConfig>,

    /// How long the success screen shows before the session auto-resets.
    pub reset_delay: Duration,
}

impl TerminalConfig {
    /// Creates a config for the given variant with the default 5 second
    /// auto-reset delay and no scanner.
    pub fn new(variant: TerminalVariant) -> Self {
        TerminalConfig {
            variant,
            scanner: None,
            reset_delay: Duration::from_secs(5),
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        TerminalConfig::new(TerminalVariant::Customer)
    }
}

/// Operations a user or staff member can trigger on a running terminal.
#[derive(Debug)]
pub enum Command {
    /// Resolve a typed term and add the product to the cart.
    Scan(String),
    /// Overwrite a line's quantity; zero or below removes the line.
    SetQuantity { product_id: String, quantity: i64 },
    /// Remove a line from the cart.
    RemoveItem(String),
    /// Submit the cart for payment. Ignored while a payment is in flight.
    SubmitPayment(PaymentMethod),
    /// Clear the session immediately, canceling any pending auto-reset.
    StartNewTransaction,
    /// Set or clear the customer name (staff variant only).
    SetCustomerName(Option<String>),
    /// Manually reconnect the scanner link.
    ReconnectScanner,
    /// Request a point-in-time view of the session.
    Snapshot(oneshot::Sender<SessionSnapshot>),
    /// Stop the terminal, tearing down the scanner link and timers.
    Shutdown,
}

/// A point-in-time view of the session for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: TxState,
    pub lines: Vec<CartLine>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub last_error: Option<String>,
    pub last_scanned_code: Option<String>,
    pub scanner_status: Option<LinkStatus>,
    pub payment_snapshot_total: Option<Money>,
    pub customer_name: Option<String>,
    pub quick_add: Vec<Product>,
}

enum Event {
    Command(Option<Command>),
    Code(Option<String>),
    Settled(std::result::Result<std::result::Result<(), PaymentError>, JoinError>),
    ResetFired,
}

/// One checkout terminal.
///
/// Owns the session controller and the scanner link, and shares the catalog
/// (which doubles as the inventory collaborator) with any sibling terminals.
pub struct Terminal<P> {
    config: TerminalConfig,
    catalog: Arc<Mutex<Catalog>>,
    gateway: P,
    controller: TransactionController,
    commands: mpsc::UnboundedReceiver<Command>,
    scanner: Option<ScannerLink>,
    codes: mpsc::UnboundedReceiver<String>,
    codes_open: bool,
    settlement: Option<JoinHandle<std::result::Result<(), PaymentError>>>,
    reset_timer: Option<Pin<Box<Sleep>>>,
}

impl<P> Terminal<P>
where
    P: PaymentGateway + Clone + Send + 'static,
{
    /// Creates a terminal and the command channel that drives it. Starts the
    /// scanner link immediately if the config names an endpoint.
    pub fn new(
        catalog: Arc<Mutex<Catalog>>,
        gateway: P,
        config: TerminalConfig,
    ) -> (Self, mpsc::UnboundedSender<Command>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (code_tx, code_rx) = mpsc::unbounded_channel();

        let scanner = config
            .scanner
            .clone()
            .map(|scanner_config| ScannerLink::start(scanner_config, code_tx));
        let codes_open = scanner.is_some();

        let terminal = Terminal {
            config,
            catalog,
            gateway,
            controller: TransactionController::new(),
            commands: command_rx,
            scanner,
            codes: code_rx,
            codes_open,
            settlement: None,
            reset_timer: None,
        };

        (terminal, command_tx)
    }

    /// Runs the event loop until a `Shutdown` command arrives or the command
    /// channel closes, then tears down the scanner link and any pending
    /// scheduled work.
    pub async fn run(mut self) {
        info!("Terminal started ({:?} variant)", self.config.variant);

        loop {
            let event = {
                let settlement = &mut self.settlement;
                let reset_timer = &mut self.reset_timer;

                tokio::select! {
                    cmd = self.commands.recv() => Event::Command(cmd),
                    code = self.codes.recv(), if self.codes_open => Event::Code(code),
                    res = async {
                        settlement
                            .as_mut()
                            .expect("settlement branch gated on is_some")
                            .await
                    }, if settlement.is_some() => Event::Settled(res),
                    () = async {
                        reset_timer
                            .as_mut()
                            .expect("reset branch gated on is_some")
                            .as_mut()
                            .await
                    }, if reset_timer.is_some() => Event::ResetFired,
                }
            };

            match event {
                Event::Command(None) | Event::Command(Some(Command::Shutdown)) => break,
                Event::Command(Some(command)) => self.handle_command(command),
                Event::Code(Some(code)) => {
                    debug!("Device scan: {:?}", code);
                    self.scan(&code);
                }
                Event::Code(None) => {
                    // Scanner link task is gone; stop polling its channel.
                    self.codes_open = false;
                }
                Event::Settled(result) => {
                    self.settlement = None;
                    self.finish_settlement(result);
                }
                Event::ResetFired => {
                    self.reset_timer = None;
                    debug!("Auto-reset fired");
                    self.controller.reset();
                }
            }
        }

        self.shutdown().await;
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Scan(term) => self.scan(&term),
            Command::SetQuantity {
                product_id,
                quantity,
            } => self.controller.set_quantity(&product_id, quantity),
            Command::RemoveItem(product_id) => self.controller.remove_item(&product_id),
            Command::SubmitPayment(method) => self.submit_payment(method),
            Command::StartNewTransaction => {
                // Cancel a pending auto-reset so it cannot double-fire.
                self.reset_timer = None;
                self.controller.reset();
            }
            Command::SetCustomerName(name) => {
                if self.config.variant.supports_customer_name() {
                    self.controller.set_customer_name(name);
                } else {
                    debug!("Customer name not supported on this variant, ignoring");
                }
            }
            Command::ReconnectScanner => {
                if let Some(scanner) = &self.scanner {
                    scanner.reconnect();
                }
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => unreachable!("handled by the event loop"),
        }
    }

    fn scan(&mut self, term: &str) {
        let catalog = lock_catalog(&self.catalog);
        self.controller.scan(term, &catalog);
    }

    fn submit_payment(&mut self, method: PaymentMethod) {
        let Some(amount) = self.controller.begin_payment() else {
            return;
        };

        let gateway = self.gateway.clone();
        self.settlement = Some(tokio::spawn(async move {
            gateway.settle(amount, method).await
        }));
    }

    fn finish_settlement(
        &mut self,
        result: std::result::Result<std::result::Result<(), PaymentError>, JoinError>,
    ) {
        match result {
            Ok(Ok(())) => {
                {
                    let mut catalog = lock_catalog(&self.catalog);
                    self.controller.complete_payment(&mut *catalog);
                }
                self.reset_timer = Some(Box::pin(tokio::time::sleep(self.config.reset_delay)));
            }
            Ok(Err(error)) => {
                self.controller.payment_declined(&error.to_string());
            }
            Err(join_error) => {
                warn!("Settlement task failed: {}", join_error);
                self.controller
                    .payment_declined("Payment did not complete, please retry");
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let cart = self.controller.cart();
        let (quick_add, scanner_status, last_scanned_code) = {
            let catalog = lock_catalog(&self.catalog);
            (
                catalog
                    .products()
                    .iter()
                    .take(self.config.variant.quick_add_count())
                    .cloned()
                    .collect(),
                self.scanner.as_ref().map(ScannerLink::status),
                self.scanner.as_ref().and_then(ScannerLink::last_scanned_code),
            )
        };

        SessionSnapshot {
            state: self.controller.state(),
            lines: cart.lines().to_vec(),
            subtotal: cart.subtotal(),
            tax: cart.tax(),
            total: cart.total(),
            last_error: self.controller.last_error().map(str::to_string),
            last_scanned_code,
            scanner_status,
            payment_snapshot_total: self.controller.payment_snapshot_total(),
            customer_name: self.controller.customer_name().map(str::to_string),
            quick_add,
        }
    }

    async fn shutdown(mut self) {
        if let Some(settlement) = self.settlement.take() {
            settlement.abort();
        }
        self.reset_timer = None;

        if let Some(scanner) = self.scanner.take() {
            scanner.shutdown().await;
        }

        info!("Terminal stopped");
    }
}

fn lock_catalog(catalog: &Mutex<Catalog>) -> MutexGuard<'_, Catalog> {
    // Safety: only poisoned if a lock holder panicked, which is itself a bug
    catalog.lock().expect("catalog lock poisoned")
}

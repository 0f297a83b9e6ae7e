//! Edge case tests for the checkout session engine.
//!
//! Drives a full terminal event loop on a paused tokio clock so settlement
//! latency and the auto-reset window elapse deterministically.

use async_trait::async_trait;
use checkout_terminal::{
    Catalog, Command, Money, PaymentError, PaymentGateway, PaymentMethod, Product,
    SessionSnapshot, Terminal, TerminalConfig, TerminalVariant, TxState,
};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

fn product(id: &str, sku: &str, name: &str, price: &str, stock: i64) -> Product {
    Product {
        id: id.to_string(),
        sku: sku.to_string(),
        name: name.to_string(),
        price: Money::from_str(price).unwrap(),
        quantity_on_hand: stock,
    }
}

fn sample_catalog() -> Arc<Mutex<Catalog>> {
    Arc::new(Mutex::new(Catalog::new(vec![
        product("p1", "A1", "Apple", "1.50", 10),
        product("p2", "B2", "Banana", "0.75", 5),
        product("p3", "C3", "Cookie", "2.25", 7),
        product("p4", "D4", "Donut", "1.25", 3),
    ])))
}

/// Counts settlements; always succeeds after a fixed latency.
#[derive(Clone)]
struct CountingGateway {
    settlements: Arc<AtomicUsize>,
    latency: Duration,
}

impl CountingGateway {
    fn new(latency: Duration) -> Self {
        CountingGateway {
            settlements: Arc::new(AtomicUsize::new(0)),
            latency,
        }
    }

    fn count(&self) -> usize {
        self.settlements.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for CountingGateway {
    async fn settle(
        &self,
        _amount: Money,
        _method: PaymentMethod,
    ) -> Result<(), PaymentError> {
        tokio::time::sleep(self.latency).await;
        self.settlements.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Declines every settlement after a fixed latency.
#[derive(Clone)]
struct DecliningGateway {
    latency: Duration,
}

#[async_trait]
impl PaymentGateway for DecliningGateway {
    async fn settle(
        &self,
        _amount: Money,
        _method: PaymentMethod,
    ) -> Result<(), PaymentError> {
        tokio::time::sleep(self.latency).await;
        Err(PaymentError::Declined("card rejected".to_string()))
    }
}

fn start_terminal<P>(
    catalog: Arc<Mutex<Catalog>>,
    gateway: P,
    config: TerminalConfig,
) -> (mpsc::UnboundedSender<Command>, JoinHandle<()>)
where
    P: PaymentGateway + Clone + Send + 'static,
{
    let (terminal, commands) = Terminal::new(catalog, gateway, config);
    let worker = tokio::spawn(terminal.run());
    (commands, worker)
}

async fn snapshot(commands: &mpsc::UnboundedSender<Command>) -> SessionSnapshot {
    let (reply_tx, reply_rx) = oneshot::channel();
    commands.send(Command::Snapshot(reply_tx)).unwrap();
    reply_rx.await.unwrap()
}

fn stock(catalog: &Arc<Mutex<Catalog>>, product_id: &str) -> i64 {
    catalog
        .lock()
        .unwrap()
        .get(product_id)
        .unwrap()
        .quantity_on_hand
}

// ==================== SCANNING ====================

#[tokio::test(start_paused = true)]
async fn test_repeated_scans_accumulate_quantity() {
    let catalog = sample_catalog();
    let gateway = CountingGateway::new(Duration::from_secs(2));
    let (commands, _worker) = start_terminal(catalog, gateway, TerminalConfig::default());

    commands.send(Command::Scan("a1".to_string())).unwrap();
    let snap = snapshot(&commands).await;
    assert_eq!(snap.state, TxState::Scanning);
    assert_eq!(snap.lines.len(), 1);
    assert_eq!(snap.lines[0].sku, "A1");
    assert_eq!(snap.lines[0].quantity, 1);
    assert_eq!(snap.lines[0].price.to_string(), "1.50");

    commands.send(Command::Scan("A1".to_string())).unwrap();
    let snap = snapshot(&commands).await;
    assert_eq!(snap.lines[0].quantity, 2);
    assert_eq!(snap.total.to_string(), "3.24");
}

#[tokio::test(start_paused = true)]
async fn test_unresolved_scan_sets_error_and_leaves_cart() {
    let catalog = sample_catalog();
    let gateway = CountingGateway::new(Duration::from_secs(2));
    let (commands, _worker) = start_terminal(catalog, gateway, TerminalConfig::default());

    commands.send(Command::Scan("nonexistent".to_string())).unwrap();
    let snap = snapshot(&commands).await;
    assert!(snap.lines.is_empty());
    assert_eq!(snap.state, TxState::Idle);
    assert!(snap.last_error.as_ref().unwrap().contains("nonexistent"));

    // Repeated identical misses just repeat the error.
    commands.send(Command::Scan("nonexistent".to_string())).unwrap();
    let snap = snapshot(&commands).await;
    assert!(snap.lines.is_empty());
    assert!(snap.last_error.as_ref().unwrap().contains("nonexistent"));
}

#[tokio::test(start_paused = true)]
async fn test_mixed_scan_sequence_with_unknown_code() {
    // Resolver only knows A1; the device also sends B2.
    let catalog = Arc::new(Mutex::new(Catalog::new(vec![product(
        "p1", "A1", "Apple", "1.50", 10,
    )])));
    let gateway = CountingGateway::new(Duration::from_secs(2));
    let (commands, _worker) = start_terminal(catalog, gateway, TerminalConfig::default());

    for code in ["A1", "A1", "B2"] {
        commands.send(Command::Scan(code.to_string())).unwrap();
    }

    let snap = snapshot(&commands).await;
    assert_eq!(snap.lines.len(), 1);
    assert_eq!(snap.lines[0].sku, "A1");
    assert_eq!(snap.lines[0].quantity, 2);
    assert!(snap.last_error.as_ref().unwrap().contains("B2"));
}

// ==================== CART EDITS ====================

#[tokio::test(start_paused = true)]
async fn test_set_quantity_zero_and_negative_remove_line() {
    let catalog = sample_catalog();
    let gateway = CountingGateway::new(Duration::from_secs(2));
    let (commands, _worker) = start_terminal(catalog, gateway, TerminalConfig::default());

    commands.send(Command::Scan("A1".to_string())).unwrap();
    commands
        .send(Command::SetQuantity {
            product_id: "p1".to_string(),
            quantity: 0,
        })
        .unwrap();
    let snap = snapshot(&commands).await;
    assert!(snap.lines.is_empty());
    assert_eq!(snap.state, TxState::Idle);

    commands.send(Command::Scan("A1".to_string())).unwrap();
    commands
        .send(Command::SetQuantity {
            product_id: "p1".to_string(),
            quantity: -2,
        })
        .unwrap();
    let snap = snapshot(&commands).await;
    assert!(snap.lines.is_empty());
    assert_eq!(snap.state, TxState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_remove_item_matches_set_quantity_zero() {
    let catalog = sample_catalog();
    let gateway = CountingGateway::new(Duration::from_secs(2));
    let (commands, _worker) = start_terminal(catalog, gateway, TerminalConfig::default());

    commands.send(Command::Scan("A1".to_string())).unwrap();
    commands.send(Command::Scan("B2".to_string())).unwrap();
    commands
        .send(Command::RemoveItem("p1".to_string()))
        .unwrap();

    let snap = snapshot(&commands).await;
    assert_eq!(snap.lines.len(), 1);
    assert_eq!(snap.lines[0].sku, "B2");
}

// ==================== PAYMENT ====================

#[tokio::test(start_paused = true)]
async fn test_double_submission_settles_exactly_once() {
    let catalog = sample_catalog();
    let gateway = CountingGateway::new(Duration::from_secs(2));
    let (commands, _worker) =
        start_terminal(Arc::clone(&catalog), gateway.clone(), TerminalConfig::default());

    commands.send(Command::Scan("A1".to_string())).unwrap();
    commands.send(Command::Scan("A1".to_string())).unwrap();
    commands
        .send(Command::SubmitPayment(PaymentMethod::Card))
        .unwrap();
    commands
        .send(Command::SubmitPayment(PaymentMethod::Card))
        .unwrap();

    let snap = snapshot(&commands).await;
    assert_eq!(snap.state, TxState::Paying);

    tokio::time::sleep(Duration::from_secs(3)).await;

    let snap = snapshot(&commands).await;
    assert_eq!(snap.state, TxState::Success);
    assert_eq!(snap.payment_snapshot_total.unwrap().to_string(), "3.24");
    assert_eq!(gateway.count(), 1);
    // Exactly one inventory decrement for the two sold units.
    assert_eq!(stock(&catalog, "p1"), 8);
}

#[tokio::test(start_paused = true)]
async fn test_submission_with_empty_cart_is_ignored() {
    let catalog = sample_catalog();
    let gateway = CountingGateway::new(Duration::from_secs(2));
    let (commands, _worker) =
        start_terminal(catalog, gateway.clone(), TerminalConfig::default());

    commands
        .send(Command::SubmitPayment(PaymentMethod::Cash))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    let snap = snapshot(&commands).await;
    assert_eq!(snap.state, TxState::Idle);
    assert_eq!(gateway.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scans_ignored_while_payment_in_flight() {
    let catalog = sample_catalog();
    let gateway = CountingGateway::new(Duration::from_secs(2));
    let (commands, _worker) = start_terminal(catalog, gateway, TerminalConfig::default());

    commands.send(Command::Scan("A1".to_string())).unwrap();
    commands
        .send(Command::SubmitPayment(PaymentMethod::Card))
        .unwrap();
    commands.send(Command::Scan("B2".to_string())).unwrap();

    let snap = snapshot(&commands).await;
    assert_eq!(snap.state, TxState::Paying);
    assert_eq!(snap.lines.len(), 1);
    assert_eq!(snap.lines[0].sku, "A1");
}

#[tokio::test(start_paused = true)]
async fn test_declined_settlement_reverts_to_scanning() {
    let catalog = sample_catalog();
    let gateway = DecliningGateway {
        latency: Duration::from_secs(2),
    };
    let (commands, _worker) =
        start_terminal(Arc::clone(&catalog), gateway, TerminalConfig::default());

    commands.send(Command::Scan("A1".to_string())).unwrap();
    commands
        .send(Command::SubmitPayment(PaymentMethod::Card))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    let snap = snapshot(&commands).await;
    assert_eq!(snap.state, TxState::Scanning);
    assert!(snap.last_error.as_ref().unwrap().contains("declined"));
    assert_eq!(snap.lines.len(), 1);
    assert!(snap.payment_snapshot_total.is_none());
    // No inventory adjustment on failure.
    assert_eq!(stock(&catalog, "p1"), 10);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_total_survives_cart_mutation() {
    let catalog = sample_catalog();
    let gateway = CountingGateway::new(Duration::from_secs(2));
    let (commands, _worker) = start_terminal(catalog, gateway, TerminalConfig::default());

    commands.send(Command::Scan("A1".to_string())).unwrap();
    commands
        .send(Command::SubmitPayment(PaymentMethod::Card))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    commands
        .send(Command::RemoveItem("p1".to_string()))
        .unwrap();
    let snap = snapshot(&commands).await;
    assert_eq!(snap.payment_snapshot_total.unwrap().to_string(), "1.62");
}

// ==================== AUTO-RESET ====================

#[tokio::test(start_paused = true)]
async fn test_auto_reset_returns_session_to_idle() {
    let catalog = sample_catalog();
    let gateway = CountingGateway::new(Duration::from_secs(2));
    let (commands, _worker) = start_terminal(catalog, gateway, TerminalConfig::default());

    commands.send(Command::Scan("A1".to_string())).unwrap();
    commands
        .send(Command::SubmitPayment(PaymentMethod::Card))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    let snap = snapshot(&commands).await;
    assert_eq!(snap.state, TxState::Success);

    // Default reset delay is 5s from settlement at t=2s.
    tokio::time::sleep(Duration::from_secs(10)).await;

    let snap = snapshot(&commands).await;
    assert_eq!(snap.state, TxState::Idle);
    assert!(snap.lines.is_empty());
    assert!(snap.payment_snapshot_total.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_manual_reset_cancels_pending_auto_reset() {
    let catalog = sample_catalog();
    let gateway = CountingGateway::new(Duration::from_secs(2));
    let (commands, _worker) = start_terminal(catalog, gateway, TerminalConfig::default());

    commands.send(Command::Scan("A1".to_string())).unwrap();
    commands
        .send(Command::SubmitPayment(PaymentMethod::Card))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    commands.send(Command::StartNewTransaction).unwrap();
    let snap = snapshot(&commands).await;
    assert_eq!(snap.state, TxState::Idle);

    // The next transaction must not be wiped by a stale reset timer.
    commands.send(Command::Scan("B2".to_string())).unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let snap = snapshot(&commands).await;
    assert_eq!(snap.state, TxState::Scanning);
    assert_eq!(snap.lines.len(), 1);
    assert_eq!(snap.lines[0].sku, "B2");
}

// ==================== VARIANTS ====================

#[tokio::test(start_paused = true)]
async fn test_customer_name_honored_only_on_staff_variant() {
    let gateway = CountingGateway::new(Duration::from_secs(2));

    let (staff, _staff_worker) = start_terminal(
        sample_catalog(),
        gateway.clone(),
        TerminalConfig::new(TerminalVariant::Staff),
    );
    staff
        .send(Command::SetCustomerName(Some("Ada".to_string())))
        .unwrap();
    let snap = snapshot(&staff).await;
    assert_eq!(snap.customer_name.as_deref(), Some("Ada"));

    let (customer, _customer_worker) = start_terminal(
        sample_catalog(),
        gateway,
        TerminalConfig::new(TerminalVariant::Customer),
    );
    customer
        .send(Command::SetCustomerName(Some("Ada".to_string())))
        .unwrap();
    let snap = snapshot(&customer).await;
    assert!(snap.customer_name.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_quick_add_list_size_per_variant() {
    let gateway = CountingGateway::new(Duration::from_secs(2));

    let (customer, _customer_worker) = start_terminal(
        sample_catalog(),
        gateway.clone(),
        TerminalConfig::new(TerminalVariant::Customer),
    );
    assert_eq!(snapshot(&customer).await.quick_add.len(), 3);

    let (staff, _staff_worker) = start_terminal(
        sample_catalog(),
        gateway,
        TerminalConfig::new(TerminalVariant::Staff),
    );
    assert_eq!(snapshot(&staff).await.quick_add.len(), 4);
}

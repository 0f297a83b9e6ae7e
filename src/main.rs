//! Checkout Terminal CLI
//!
//! Runs one checkout terminal against a catalog CSV, optionally connected to
//! a network barcode scanner, driven by line-oriented commands on stdin.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- catalog.csv [ws://esp8266-scanner.local:81]
//! ```
//!
//! Commands: `scan <term>`, `qty <id> <n>`, `remove <id>`, `pay card|cash`,
//! `name <customer>`, `new`, `reconnect`, `show`, `quit`.
//!
//! On exit the catalog file is rewritten with adjusted stock levels.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity

use checkout_terminal::{
    Catalog, CheckoutError, Command, PaymentMethod, Result, ScannerConfig, SessionSnapshot,
    SimulatedPaymentGateway, Terminal, TerminalConfig, TerminalVariant,
};
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::process;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncBufReadExt;
use tokio::sync::{mpsc, oneshot};

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(CheckoutError::MissingArgument);
    }

    let catalog_path = &args[1];
    let file = File::open(catalog_path)?;
    let catalog = Catalog::from_csv(BufReader::new(file))?;
    let catalog = Arc::new(Mutex::new(catalog));

    let mut config = TerminalConfig::new(TerminalVariant::Staff);
    if let Some(url) = args.get(2) {
        config.scanner = Some(ScannerConfig::new(url.clone()));
    }

    let (terminal, commands) = Terminal::new(
        Arc::clone(&catalog),
        SimulatedPaymentGateway::default(),
        config,
    );
    let worker = tokio::spawn(terminal.run());

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }

        match parse_command(line) {
            Ok(Some(command)) => {
                let _ = commands.send(command);
            }
            Ok(None) => {}
            Err(message) => {
                eprintln!("{}", message);
                continue;
            }
        }

        if let Some(snapshot) = request_snapshot(&commands).await {
            print_snapshot(&snapshot);
        }
    }

    let _ = commands.send(Command::Shutdown);
    let _ = worker.await;

    // Persist adjusted stock levels back to the catalog file.
    let file = File::create(catalog_path)?;
    catalog
        .lock()
        .expect("catalog lock poisoned")
        .write_csv(file)?;

    Ok(())
}

/// Parses one input line. `Ok(None)` means display-only (`show`).
fn parse_command(line: &str) -> std::result::Result<Option<Command>, String> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    match verb {
        "scan" => {
            if rest.is_empty() {
                return Err("Usage: scan <term>".to_string());
            }
            Ok(Some(Command::Scan(rest.join(" "))))
        }
        "qty" => {
            let (id, qty) = match (rest.first(), rest.get(1)) {
                (Some(id), Some(qty)) => (id, qty),
                _ => return Err("Usage: qty <id> <n>".to_string()),
            };
            let quantity: i64 = qty
                .parse()
                .map_err(|_| format!("Not a quantity: {}", qty))?;
            Ok(Some(Command::SetQuantity {
                product_id: (*id).to_string(),
                quantity,
            }))
        }
        "remove" => match rest.first() {
            Some(id) => Ok(Some(Command::RemoveItem((*id).to_string()))),
            None => Err("Usage: remove <id>".to_string()),
        },
        "pay" => {
            let method = rest.first().copied().unwrap_or("card");
            let method = PaymentMethod::from_str(method).map_err(|e| e.to_string())?;
            Ok(Some(Command::SubmitPayment(method)))
        }
        "name" => {
            let name = rest.join(" ");
            let name = if name.is_empty() { None } else { Some(name) };
            Ok(Some(Command::SetCustomerName(name)))
        }
        "new" => Ok(Some(Command::StartNewTransaction)),
        "reconnect" => Ok(Some(Command::ReconnectScanner)),
        "show" => Ok(None),
        other => Err(format!(
            "Unrecognized command: {} (try scan/qty/remove/pay/name/new/reconnect/show/quit)",
            other
        )),
    }
}

async fn request_snapshot(commands: &mpsc::UnboundedSender<Command>) -> Option<SessionSnapshot> {
    let (reply_tx, reply_rx) = oneshot::channel();
    commands.send(Command::Snapshot(reply_tx)).ok()?;
    reply_rx.await.ok()
}

fn print_snapshot(snapshot: &SessionSnapshot) {
    if let Some(status) = snapshot.scanner_status {
        println!("scanner: {:?}", status);
    }
    if let Some(code) = &snapshot.last_scanned_code {
        println!("last scanned: {}", code);
    }
    if let Some(error) = &snapshot.last_error {
        println!("! {}", error);
    }

    println!("state: {:?}", snapshot.state);
    if let Some(name) = &snapshot.customer_name {
        println!("customer: {}", name);
    }

    for line in &snapshot.lines {
        println!(
            "  {} x{} {} ({}) = {}",
            line.name,
            line.quantity,
            line.sku,
            line.product_id,
            line.line_total()
        );
    }
    println!(
        "subtotal: {}  tax: {}  total: {}",
        snapshot.subtotal, snapshot.tax, snapshot.total
    );
    if let Some(paid) = snapshot.payment_snapshot_total {
        println!("paid: {}", paid);
    }
}

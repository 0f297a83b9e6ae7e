//! External collaborator seams: payment settlement and inventory adjustment.

use crate::money::Money;
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Cash,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::Cash => write!(f, "cash"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "card" => Ok(PaymentMethod::Card),
            "cash" => Ok(PaymentMethod::Cash),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

/// A settlement failure reported by the payment gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// The gateway declined the payment.
    #[error("Payment declined: {0}")]
    Declined(String),
}

/// Settles a payment with an external gateway.
///
/// The terminal treats settlement as an opaque asynchronous call that either
/// succeeds or declines. Implementations must be cheap to clone; the terminal
/// clones the gateway into each settlement task.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn settle(
        &self,
        amount: Money,
        method: PaymentMethod,
    ) -> std::result::Result<(), PaymentError>;
}

/// Adjusts stock levels after a sale.
///
/// Called with a negative delta per sold unit on payment success. Returns
/// `false` if the product is unknown; adjustments are fire-and-forget and are
/// neither retried nor rolled back.
pub trait InventoryGateway {
    fn adjust_quantity(&mut self, product_id: &str, delta: i64) -> bool;
}

/// Stand-in settlement: a fixed delay followed by unconditional success.
///
/// Production deployments must replace this with a real gateway integration;
/// the terminal already handles a `PaymentError` decline from the seam.
#[derive(Debug, Clone)]
pub struct SimulatedPaymentGateway {
    latency: Duration,
}

impl SimulatedPaymentGateway {
    /// Creates a gateway that settles after the given delay.
    pub fn new(latency: Duration) -> Self {
        SimulatedPaymentGateway { latency }
    }
}

impl Default for SimulatedPaymentGateway {
    fn default() -> Self {
        SimulatedPaymentGateway::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    async fn settle(
        &self,
        amount: Money,
        method: PaymentMethod,
    ) -> std::result::Result<(), PaymentError> {
        tokio::time::sleep(self.latency).await;
        info!("Settled {} via {}", amount, method);
        Ok(())
    }
}

//! Error types for the checkout terminal.

use thiserror::Error;

/// Result type alias for terminal operations
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Errors that can occur while setting up or running a terminal.
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Failed to open or read the catalog file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error while loading the catalog
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Missing catalog file argument
    #[error("Missing catalog file argument. Usage: checkout-terminal <catalog.csv> [scanner-url]")]
    MissingArgument,
}

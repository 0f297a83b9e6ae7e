//! Product catalog: CSV loading, term resolution, and stock adjustment.
//!
//! The catalog is the read-only source of product records for scanning, and
//! doubles as the inventory collaborator that absorbs stock decrements on
//! payment success. Terminals share one catalog behind a mutex.

use crate::error::Result;
use crate::gateway::InventoryGateway;
use crate::money::Money;
use csv::{ReaderBuilder, Trim};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// A catalog entry.
///
/// Unique by `id`; `sku` is expected to be unique but not enforced here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique product identifier.
    pub id: String,

    /// Stock-keeping unit code, the primary scan target.
    pub sku: String,

    /// Display name, also matchable by scan/typed terms.
    pub name: String,

    /// Current shelf price. Cart lines freeze the price at first add.
    pub price: Money,

    /// Units in stock. Decremented on payment success; may go negative
    /// if the catalog and the shelf disagree.
    pub quantity_on_hand: i64,
}

/// The product catalog.
///
/// Iteration order is the order products were loaded; resolution tie-breaks
/// follow that order, not alphabetical order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    /// Creates a catalog from an in-memory product list.
    pub fn new(products: Vec<Product>) -> Self {
        Catalog { products }
    }

    /// Loads products from a CSV reader in streaming fashion.
    ///
    /// Expects the header `id,sku,name,price,quantity_on_hand`.
    /// Invalid records are logged at warn level and skipped.
    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut products = Vec::new();
        for (row_idx, result) in csv_reader.deserialize::<Product>().enumerate() {
            let row_num = row_idx + 2; // 1-indexed, accounting for header row

            match result {
                Ok(product) => {
                    debug!(
                        "Row {}: Loaded product {} ({})",
                        row_num, product.id, product.sku
                    );
                    products.push(product);
                }
                Err(e) => {
                    warn!("Row {}: CSV parse error: {}", row_num, e);
                }
            }
        }

        Ok(Catalog { products })
    }

    /// Writes the current products (including adjusted stock) to CSV.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["id", "sku", "name", "price", "quantity_on_hand"])?;

        for product in &self.products {
            csv_writer.write_record([
                product.id.as_str(),
                product.sku.as_str(),
                product.name.as_str(),
                &product.price.to_string(),
                &product.quantity_on_hand.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Resolves a scanned or typed term to a product.
    ///
    /// Matching policy, in order, first match wins, case-insensitive:
    /// 1. exact match on `sku`,
    /// 2. exact match on `name`,
    /// 3. substring match of the term within `name`.
    ///
    /// Catalog order breaks ties within a tier. Returns `None` if no tier
    /// matches; the caller surfaces a recoverable error naming the term.
    pub fn resolve(&self, term: &str) -> Option<&Product> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }

        self.products
            .iter()
            .find(|p| p.sku.to_lowercase() == needle)
            .or_else(|| self.products.iter().find(|p| p.name.to_lowercase() == needle))
            .or_else(|| {
                self.products
                    .iter()
                    .find(|p| p.name.to_lowercase().contains(&needle))
            })
    }

    /// Looks up a product by its exact id.
    pub fn get(&self, product_id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == product_id)
    }

    /// All products in load order.
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Number of products in the catalog.
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Returns `true` if the catalog has no products.
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl InventoryGateway for Catalog {
    fn adjust_quantity(&mut self, product_id: &str, delta: i64) -> bool {
        match self.products.iter_mut().find(|p| p.id == product_id) {
            Some(product) => {
                product.quantity_on_hand += delta;
                if product.quantity_on_hand < 0 {
                    warn!(
                        "Stock for product {} went negative ({})",
                        product_id, product.quantity_on_hand
                    );
                } else {
                    debug!(
                        "Adjusted product {} stock by {} to {}",
                        product_id, delta, product.quantity_on_hand
                    );
                }
                true
            }
            None => {
                warn!("Inventory adjustment for unknown product {}", product_id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::str::FromStr;

    fn product(id: &str, sku: &str, name: &str, price: &str) -> Product {
        Product {
            id: id.to_string(),
            sku: sku.to_string(),
            name: name.to_string(),
            price: Money::from_str(price).unwrap(),
            quantity_on_hand: 10,
        }
    }

    fn sample_catalog() -> Catalog {
        Catalog::new(vec![
            product("p1", "A1", "Apple", "1.50"),
            product("p2", "B2", "Banana Bread", "3.25"),
            product("p3", "C3", "Banana", "0.75"),
        ])
    }

    #[test]
    fn test_from_csv_loads_products() {
        let csv = "id,sku,name,price,quantity_on_hand\n\
                   p1,A1,Apple,1.50,10\n\
                   p2,B2,Banana,0.75,4\n";

        let catalog = Catalog::from_csv(Cursor::new(csv)).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("p1").unwrap().price.to_string(), "1.50");
        assert_eq!(catalog.get("p2").unwrap().quantity_on_hand, 4);
    }

    #[test]
    fn test_from_csv_skips_invalid_rows() {
        let csv = "id,sku,name,price,quantity_on_hand\n\
                   p1,A1,Apple,1.50,10\n\
                   p2,B2,Banana,not-a-price,4\n\
                   p3,C3,Cookie,2.25,7\n";

        let catalog = Catalog::from_csv(Cursor::new(csv)).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("p2").is_none());
        assert!(catalog.get("p3").is_some());
    }

    #[test]
    fn test_from_csv_handles_whitespace() {
        let csv = "id, sku, name, price, quantity_on_hand\n\
                   p1, A1, Apple, 1.50, 10\n";

        let catalog = Catalog::from_csv(Cursor::new(csv)).unwrap();
        assert_eq!(catalog.get("p1").unwrap().sku, "A1");
    }

    #[test]
    fn test_resolve_exact_sku_case_insensitive() {
        let catalog = sample_catalog();
        assert_eq!(catalog.resolve("a1").unwrap().id, "p1");
        assert_eq!(catalog.resolve("A1").unwrap().id, "p1");
    }

    #[test]
    fn test_resolve_exact_name_beats_substring() {
        let catalog = sample_catalog();
        // "banana" is an exact name match for p3 even though it is a
        // substring of p2's name, which comes first in catalog order.
        assert_eq!(catalog.resolve("banana").unwrap().id, "p3");
    }

    #[test]
    fn test_resolve_substring_uses_catalog_order() {
        let catalog = sample_catalog();
        // Both p2 and p3 contain "anana"; p2 wins by catalog order.
        assert_eq!(catalog.resolve("anana").unwrap().id, "p2");
    }

    #[test]
    fn test_resolve_not_found() {
        let catalog = sample_catalog();
        assert!(catalog.resolve("nonexistent").is_none());
        assert!(catalog.resolve("").is_none());
        assert!(catalog.resolve("   ").is_none());
    }

    #[test]
    fn test_adjust_quantity_decrements_stock() {
        let mut catalog = sample_catalog();
        assert!(catalog.adjust_quantity("p1", -3));
        assert_eq!(catalog.get("p1").unwrap().quantity_on_hand, 7);
    }

    #[test]
    fn test_adjust_quantity_unknown_product() {
        let mut catalog = sample_catalog();
        assert!(!catalog.adjust_quantity("missing", -1));
    }

    #[test]
    fn test_adjust_quantity_may_go_negative() {
        let mut catalog = sample_catalog();
        assert!(catalog.adjust_quantity("p1", -12));
        assert_eq!(catalog.get("p1").unwrap().quantity_on_hand, -2);
    }

    #[test]
    fn test_write_csv_round_trip() {
        let mut catalog = sample_catalog();
        catalog.adjust_quantity("p1", -2);

        let mut output = Vec::new();
        catalog.write_csv(&mut output).unwrap();
        let written = String::from_utf8(output).unwrap();

        assert!(written.starts_with("id,sku,name,price,quantity_on_hand"));
        assert!(written.contains("p1,A1,Apple,1.50,8"));

        let reloaded = Catalog::from_csv(Cursor::new(written)).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.get("p1").unwrap().quantity_on_hand, 8);
    }
}

// Order and customer exports read from JSON files.
//
// Both accept either a bare array or the `{"orders": [...]}` /
// `{"customers": [...]}` envelope the shop's admin export produces.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use floorbook_recon::model::{Customer, RawOrder};
use floorbook_recon::store::{CustomerDirectory, OrderSource};
use floorbook_recon::SourceError;

#[derive(Deserialize)]
#[serde(untagged)]
enum Export<T> {
    Bare(Vec<T>),
    Orders { orders: Vec<T> },
    Customers { customers: Vec<T> },
}

impl<T> Export<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Export::Bare(v) | Export::Orders { orders: v } | Export::Customers { customers: v } => v,
        }
    }
}

fn read_export<T: DeserializeOwned>(source_name: &str, path: &Path) -> Result<Vec<T>, SourceError> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| SourceError::Io(format!("{}: {e}", path.display())))?;
    let export: Export<T> = serde_json::from_str(&data).map_err(|e| SourceError::Malformed {
        source_name: source_name.to_string(),
        message: format!("{}: {e}", path.display()),
    })?;
    Ok(export.into_vec())
}

/// Orders from a JSON export file.
#[derive(Debug, Clone)]
pub struct JsonOrderFile {
    path: PathBuf,
    label: String,
}

impl JsonOrderFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = format!("file:{}", path.display());
        Self { path, label }
    }

    /// Every order in the file, ignoring any window.
    pub fn load_all(&self) -> Result<Vec<RawOrder>, SourceError> {
        read_export(&self.label, &self.path)
    }
}

impl OrderSource for JsonOrderFile {
    fn name(&self) -> &str {
        &self.label
    }

    fn fetch_orders(&self, since: DateTime<Utc>) -> Result<Vec<RawOrder>, SourceError> {
        let all = self.load_all()?;
        let total = all.len();
        let orders: Vec<RawOrder> = all.into_iter().filter(|o| o.created_at >= since).collect();
        debug!(source = %self.label, total, in_window = orders.len(), "loaded order export");
        Ok(orders)
    }
}

/// Customer directory from a JSON export file.
#[derive(Debug, Clone)]
pub struct JsonCustomerFile {
    path: PathBuf,
}

impl JsonCustomerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CustomerDirectory for JsonCustomerFile {
    fn fetch_customers(&self) -> Result<Vec<Customer>, SourceError> {
        read_export(&format!("file:{}", self.path.display()), &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_json(content: &str) -> NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    const ORDERS: &str = r#"{"orders": [
        {"id": 1, "created_at": "2025-04-01T10:00:00+00:00", "financial_status": "paid", "total_price": "60.00",
         "line_items": [{"title": "Level 1", "variant_title": "Term 2 / Leader", "price": "60.00"}]},
        {"id": 2, "created_at": "2025-05-10T10:00:00+00:00", "financial_status": "paid", "total_price": "40.00",
         "line_items": [{"title": "Shines", "price": "40.00"}]}
    ]}"#;

    #[test]
    fn orders_envelope_and_window() {
        let f = write_json(ORDERS);
        let source = JsonOrderFile::new(f.path());
        assert_eq!(source.load_all().unwrap().len(), 2);
        let since: DateTime<Utc> = "2025-05-01T00:00:00Z".parse().unwrap();
        let orders = source.fetch_orders(since).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, 2);
    }

    #[test]
    fn bare_customer_array_with_shop_ids() {
        let f = write_json(r#"[{"id": 5, "first_name": "Ana", "last_name": "Díaz"}]"#);
        let customers = JsonCustomerFile::new(f.path()).fetch_customers().unwrap();
        assert_eq!(customers[0].customer_id, 5);
        assert_eq!(customers[0].display_name(), "Ana Díaz");
    }

    #[test]
    fn malformed_and_missing_files() {
        let f = write_json(r#"{"orders": [{"id": "x"}]}"#);
        let err = JsonOrderFile::new(f.path()).load_all().unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));

        let err = JsonOrderFile::new("/nonexistent/orders.json").load_all().unwrap_err();
        assert!(matches!(err, SourceError::Io(_)));
    }
}

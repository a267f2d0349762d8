//! Collaborator contracts (order source, customer directory, attendance
//! store) and the in-memory implementations used by tests and dry runs.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::dedup::IdentityKey;
use crate::error::{SourceError, StoreError};
use crate::model::{
    Customer, EnrollmentRecord, FreeAttendanceRow, FreeClassRecord, PaidAttendanceRow, RawOrder,
    SocialAttendanceRecord,
};

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    PaidOrders,
    FreeOrders,
    PaidAttendance,
    FreeAttendance,
    SocialAttendance,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::PaidOrders,
        Table::FreeOrders,
        Table::PaidAttendance,
        Table::FreeAttendance,
        Table::SocialAttendance,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::PaidOrders => "paid_orders",
            Self::FreeOrders => "free_orders",
            Self::PaidAttendance => "paid_attendance",
            Self::FreeAttendance => "free_attendance",
            Self::SocialAttendance => "social_attendance",
        }
    }

    /// Snapshot tables are rebuilt every run; the rest are append-only.
    pub fn is_snapshot(&self) -> bool {
        matches!(self, Self::PaidOrders | Self::FreeOrders)
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A row type bound to one table.
pub trait TableRecord: Serialize + DeserializeOwned {
    const TABLE: Table;
}

impl TableRecord for EnrollmentRecord {
    const TABLE: Table = Table::PaidOrders;
}

impl TableRecord for FreeClassRecord {
    const TABLE: Table = Table::FreeOrders;
}

impl TableRecord for PaidAttendanceRow {
    const TABLE: Table = Table::PaidAttendance;
}

impl TableRecord for FreeAttendanceRow {
    const TABLE: Table = Table::FreeAttendance;
}

impl TableRecord for SocialAttendanceRecord {
    const TABLE: Table = Table::SocialAttendance;
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

pub trait OrderSource {
    /// Short label used in logs and error messages.
    fn name(&self) -> &str;

    /// Every order created at or after `since`. Pagination is the
    /// implementation's business.
    fn fetch_orders(&self, since: DateTime<Utc>) -> Result<Vec<RawOrder>, SourceError>;
}

pub trait CustomerDirectory {
    fn fetch_customers(&self) -> Result<Vec<Customer>, SourceError>;
}

/// Typed table access plus the run lock.
pub trait AttendanceStore {
    fn read_rows<T: TableRecord>(&self) -> Result<Vec<T>, StoreError>;

    fn read_keys<T: TableRecord + IdentityKey>(&self) -> Result<HashSet<T::Key>, StoreError>;

    /// Append rows. Returns the number written.
    fn insert_rows<T: TableRecord + IdentityKey>(&mut self, rows: &[T]) -> Result<usize, StoreError>;

    /// Delete everything in the table, then insert `rows`.
    fn replace_all<T: TableRecord>(&mut self, rows: &[T]) -> Result<usize, StoreError>;

    /// Merge a JSON object patch into the row with `key`. Identity fields
    /// cannot change. Returns the updated row.
    fn update_row<T: TableRecord + IdentityKey>(
        &mut self,
        key: &T::Key,
        patch: &Value,
    ) -> Result<T, StoreError>;

    /// Take the sync lock for `holder`. A lock older than `ttl` is treated
    /// as abandoned. `Ok(false)` means someone else holds it.
    fn try_lock(&mut self, holder: &str, now: DateTime<Utc>, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Release the lock if `holder` owns it.
    fn unlock(&mut self, holder: &str) -> Result<(), StoreError>;
}

/// Shallow-merge `patch` (a JSON object) into `row`.
pub fn apply_patch(row: &mut Value, patch: &Value) -> Result<(), String> {
    let Some(fields) = patch.as_object() else {
        return Err("patch must be a JSON object".into());
    };
    let Some(target) = row.as_object_mut() else {
        return Err("stored row is not a JSON object".into());
    };
    for (field, value) in fields {
        if !target.contains_key(field) {
            return Err(format!("unknown field '{field}'"));
        }
        target.insert(field.clone(), value.clone());
    }
    Ok(())
}

/// Apply `patch` to `row` and check the result still parses as `T` with the
/// same identity.
pub fn patched_row<T: TableRecord + IdentityKey>(
    row: &Value,
    key: &T::Key,
    patch: &Value,
) -> Result<(Value, T), StoreError> {
    let fail = |message: String| StoreError::Write {
        table: T::TABLE,
        attempted: 1,
        written: 0,
        message,
    };
    let mut updated = row.clone();
    apply_patch(&mut updated, patch).map_err(fail)?;
    let typed: T = serde_json::from_value(updated.clone()).map_err(|e| fail(e.to_string()))?;
    if typed.identity_key() != *key {
        return Err(fail("patch would change the row's identity key".into()));
    }
    Ok((updated, typed))
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemoryOrderSource {
    orders: Vec<RawOrder>,
    fail_with: Option<String>,
}

impl MemoryOrderSource {
    pub fn new(orders: Vec<RawOrder>) -> Self {
        Self {
            orders,
            fail_with: None,
        }
    }

    /// Source that fails every fetch.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            orders: Vec::new(),
            fail_with: Some(message.into()),
        }
    }

    pub fn push(&mut self, order: RawOrder) {
        self.orders.push(order);
    }
}

impl OrderSource for MemoryOrderSource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch_orders(&self, since: DateTime<Utc>) -> Result<Vec<RawOrder>, SourceError> {
        if let Some(ref message) = self.fail_with {
            return Err(SourceError::Request {
                source_name: self.name().to_string(),
                message: message.clone(),
            });
        }
        Ok(self
            .orders
            .iter()
            .filter(|o| o.created_at >= since)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    pub customers: Vec<Customer>,
}

impl CustomerDirectory for MemoryDirectory {
    fn fetch_customers(&self) -> Result<Vec<Customer>, SourceError> {
        Ok(self.customers.clone())
    }
}

#[derive(Debug, Clone)]
struct LockState {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// Rows kept as JSON values, one vector per table.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<Table, Vec<Value>>,
    failing: HashSet<Table>,
    lock: Option<LockState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to `table` fail.
    pub fn fail_writes_to(&mut self, table: Table) {
        self.failing.insert(table);
    }

    pub fn heal(&mut self) {
        self.failing.clear();
    }

    pub fn row_count(&self, table: Table) -> usize {
        self.tables.get(&table).map_or(0, Vec::len)
    }

    pub fn lock_holder(&self) -> Option<&str> {
        self.lock.as_ref().map(|l| l.holder.as_str())
    }

    fn check_writable(&self, table: Table, attempted: usize) -> Result<(), StoreError> {
        if self.failing.contains(&table) {
            return Err(StoreError::Write {
                table,
                attempted,
                written: 0,
                message: "injected write failure".into(),
            });
        }
        Ok(())
    }

    fn encode<T: TableRecord>(rows: &[T]) -> Result<Vec<Value>, StoreError> {
        rows.iter()
            .map(|r| serde_json::to_value(r))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Write {
                table: T::TABLE,
                attempted: rows.len(),
                written: 0,
                message: e.to_string(),
            })
    }
}

impl AttendanceStore for MemoryStore {
    fn read_rows<T: TableRecord>(&self) -> Result<Vec<T>, StoreError> {
        self.tables
            .get(&T::TABLE)
            .map(|rows| rows.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|v| {
                serde_json::from_value(v.clone()).map_err(|e| StoreError::Read {
                    table: T::TABLE,
                    message: e.to_string(),
                })
            })
            .collect()
    }

    fn read_keys<T: TableRecord + IdentityKey>(&self) -> Result<HashSet<T::Key>, StoreError> {
        Ok(self
            .read_rows::<T>()?
            .iter()
            .map(IdentityKey::identity_key)
            .collect())
    }

    fn insert_rows<T: TableRecord + IdentityKey>(&mut self, rows: &[T]) -> Result<usize, StoreError> {
        self.check_writable(T::TABLE, rows.len())?;
        let existing = self.read_keys::<T>()?;
        if let Some(dup) = rows.iter().find(|r| existing.contains(&r.identity_key())) {
            return Err(StoreError::Write {
                table: T::TABLE,
                attempted: rows.len(),
                written: 0,
                message: format!("duplicate identity key {}", dup.identity_key()),
            });
        }
        let encoded = Self::encode(rows)?;
        self.tables.entry(T::TABLE).or_default().extend(encoded);
        Ok(rows.len())
    }

    fn replace_all<T: TableRecord>(&mut self, rows: &[T]) -> Result<usize, StoreError> {
        self.check_writable(T::TABLE, rows.len())?;
        let encoded = Self::encode(rows)?;
        self.tables.insert(T::TABLE, encoded);
        Ok(rows.len())
    }

    fn update_row<T: TableRecord + IdentityKey>(
        &mut self,
        key: &T::Key,
        patch: &Value,
    ) -> Result<T, StoreError> {
        self.check_writable(T::TABLE, 1)?;
        let rows = self.tables.entry(T::TABLE).or_default();
        for row in rows.iter_mut() {
            let current: T = serde_json::from_value(row.clone()).map_err(|e| StoreError::Read {
                table: T::TABLE,
                message: e.to_string(),
            })?;
            if current.identity_key() == *key {
                let (updated, typed) = patched_row::<T>(row, key, patch)?;
                *row = updated;
                return Ok(typed);
            }
        }
        Err(StoreError::NotFound {
            table: T::TABLE,
            key: key.to_string(),
        })
    }

    fn try_lock(
        &mut self,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        if let Some(ref current) = self.lock {
            if current.holder != holder && now - current.acquired_at < ttl {
                return Ok(false);
            }
        }
        self.lock = Some(LockState {
            holder: holder.to_string(),
            acquired_at: now,
        });
        Ok(true)
    }

    fn unlock(&mut self, holder: &str) -> Result<(), StoreError> {
        match self.lock {
            Some(ref current) if current.holder == holder => {
                self.lock = None;
                Ok(())
            }
            Some(ref current) => Err(StoreError::Lock(format!(
                "lock is held by '{}', not '{holder}'",
                current.holder
            ))),
            None => Ok(()),
        }
    }
}

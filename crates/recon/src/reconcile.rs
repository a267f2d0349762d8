//! The sync pipeline: fetch → project → snapshot-replace → attendance
//! append → social pass.
//!
//! Every step after the order fetch runs regardless of earlier failures;
//! failures are collected into the report rather than returned as errors.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::dedup::{filter_new, IdentityKey};
use crate::error::{StoreError, SyncError};
use crate::model::{FreeAttendanceRow, PaidAttendanceRow, RawOrder};
use crate::project::{OrderProjector, Projection, ProjectionStats};
use crate::social::SocialProjector;
use crate::store::{AttendanceStore, CustomerDirectory, OrderSource, TableRecord};

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    Lock,
    FetchOrders,
    FetchCustomers,
    Project,
    ReplacePaidOrders,
    ReplaceFreeOrders,
    PaidAttendance,
    FreeAttendance,
    Social,
}

impl SyncStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::FetchOrders => "fetch_orders",
            Self::FetchCustomers => "fetch_customers",
            Self::Project => "project",
            Self::ReplacePaidOrders => "replace_paid_orders",
            Self::ReplaceFreeOrders => "replace_free_orders",
            Self::PaidAttendance => "paid_attendance",
            Self::FreeAttendance => "free_attendance",
            Self::Social => "social",
        }
    }
}

impl std::fmt::Display for SyncStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub step: SyncStep,
    pub message: String,
    /// Rows the step tried to write (0 for non-write steps).
    pub attempted: usize,
    pub written: usize,
}

/// Outcome of one incremental append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AppendCounts {
    pub candidates: usize,
    pub inserted: usize,
    pub already_present: usize,
    pub duplicate_in_batch: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    pub orders_fetched: usize,
    pub customers_fetched: usize,
    pub projection: ProjectionStats,
    pub paid_orders_written: usize,
    pub free_orders_written: usize,
    pub paid_attendance: AppendCounts,
    pub free_attendance: AppendCounts,
    pub social_attendance: AppendCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub run_id: String,
    pub window_start: DateTime<Utc>,
    pub succeeded_steps: Vec<SyncStep>,
    /// First step that failed, if any.
    pub failed_step: Option<SyncStep>,
    pub failures: Vec<StepFailure>,
    pub message: String,
    pub counts: SyncCounts,
    /// Running status text, one line per step.
    pub status_lines: Vec<String>,
}

impl ReconciliationReport {
    fn new(run_id: &str, window_start: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.to_string(),
            window_start,
            succeeded_steps: Vec::new(),
            failed_step: None,
            failures: Vec::new(),
            message: String::new(),
            counts: SyncCounts::default(),
            status_lines: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn lock_held(&self) -> bool {
        self.failed_step == Some(SyncStep::Lock)
    }

    fn succeed(&mut self, step: SyncStep, status: String) {
        info!(step = %step, "{status}");
        self.succeeded_steps.push(step);
        self.status_lines.push(status);
    }

    fn fail(&mut self, step: SyncStep, message: String, attempted: usize, written: usize) {
        warn!(step = %step, attempted, written, "{message}");
        self.status_lines.push(format!("{step} failed: {message}"));
        self.failed_step.get_or_insert(step);
        self.failures.push(StepFailure {
            step,
            message,
            attempted,
            written,
        });
    }

    fn fail_store(&mut self, step: SyncStep, err: &StoreError, attempted: usize) {
        self.fail(step, err.to_string(), attempted, err.written());
    }

    fn finish(&mut self) {
        self.message = match self.failures.first() {
            None => format!(
                "Sync complete: {} paid, {} free, {} social attendance rows added",
                self.counts.paid_attendance.inserted,
                self.counts.free_attendance.inserted,
                self.counts.social_attendance.inserted,
            ),
            Some(first) if first.step == SyncStep::Lock => {
                format!("Sync not started: {}", first.message)
            }
            Some(first) => format!(
                "Sync finished with {} failed step(s); first: {} ({})",
                self.failures.len(),
                first.step,
                first.message
            ),
        };
        self.status_lines.push(self.message.clone());
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ReconciliationEngine<'a, S: AttendanceStore> {
    config: &'a SyncConfig,
    source: &'a dyn OrderSource,
    directory: Option<&'a dyn CustomerDirectory>,
    store: &'a mut S,
    run_id: String,
    projector: OrderProjector,
    social: SocialProjector,
}

impl<'a, S: AttendanceStore> ReconciliationEngine<'a, S> {
    pub fn new(config: &'a SyncConfig, source: &'a dyn OrderSource, store: &'a mut S) -> Self {
        Self {
            config,
            source,
            directory: None,
            store,
            run_id: format!("{}-{}", config.name, Utc::now().format("%Y%m%dT%H%M%S%.3f")),
            projector: OrderProjector::new(config),
            social: SocialProjector::new(&config.social),
        }
    }

    pub fn with_directory(mut self, directory: &'a dyn CustomerDirectory) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Run one sync. `Err` only when the lock itself cannot be managed;
    /// every other failure lands in the report.
    pub fn reconcile(
        &mut self,
        window_start: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<ReconciliationReport, SyncError> {
        let mut report = ReconciliationReport::new(&self.run_id, window_start);
        info!(run_id = %self.run_id, %window_start, %today, "sync started");

        let acquired = self
            .store
            .try_lock(&self.run_id, Utc::now(), self.config.lock_ttl())
            .map_err(SyncError::LockAcquire)?;
        if !acquired {
            report.fail(
                SyncStep::Lock,
                "another sync is already running".into(),
                0,
                0,
            );
            report.finish();
            return Ok(report);
        }
        report.succeed(SyncStep::Lock, "Sync lock acquired".into());

        self.run_steps(&mut report, window_start, today);

        self.store
            .unlock(&self.run_id)
            .map_err(SyncError::LockRelease)?;
        report.finish();
        info!(
            run_id = %self.run_id,
            failed = report.failures.len(),
            "sync finished"
        );
        Ok(report)
    }

    fn run_steps(
        &mut self,
        report: &mut ReconciliationReport,
        window_start: DateTime<Utc>,
        today: NaiveDate,
    ) {
        let orders = match self.source.fetch_orders(window_start) {
            Ok(orders) => orders,
            Err(e) => {
                report.fail(SyncStep::FetchOrders, e.to_string(), 0, 0);
                return;
            }
        };
        report.counts.orders_fetched = orders.len();
        report.succeed(
            SyncStep::FetchOrders,
            format!("Fetched {} orders from {}", orders.len(), self.source.name()),
        );

        let names = self.fetch_names(report);

        let mut projection = self.projector.project(&orders, today);
        projection.attach_names(&names);
        report.counts.projection = projection.stats.clone();
        report.succeed(
            SyncStep::Project,
            format!(
                "Projected {} paid and {} free records",
                projection.paid.len(),
                projection.free.len()
            ),
        );

        self.replace_snapshots(report, &projection);
        self.append_attendance(report, &projection);
        self.append_social(report, &orders, &names);
    }

    fn fetch_names(&self, report: &mut ReconciliationReport) -> HashMap<i64, String> {
        let Some(directory) = self.directory else {
            return HashMap::new();
        };
        match directory.fetch_customers() {
            Ok(customers) => {
                report.counts.customers_fetched = customers.len();
                report.succeed(
                    SyncStep::FetchCustomers,
                    format!("Fetched {} customers", customers.len()),
                );
                customers
                    .iter()
                    .map(|c| (c.customer_id, c.display_name()))
                    .filter(|(_, name)| !name.is_empty())
                    .collect()
            }
            Err(e) => {
                report.fail(SyncStep::FetchCustomers, e.to_string(), 0, 0);
                HashMap::new()
            }
        }
    }

    fn replace_snapshots(&mut self, report: &mut ReconciliationReport, projection: &Projection) {
        match self.store.replace_all(&projection.paid) {
            Ok(n) => {
                report.counts.paid_orders_written = n;
                report.succeed(SyncStep::ReplacePaidOrders, format!("Paid orders snapshot: {n} rows"));
            }
            Err(e) => report.fail_store(SyncStep::ReplacePaidOrders, &e, projection.paid.len()),
        }

        match self.store.replace_all(&projection.free) {
            Ok(n) => {
                report.counts.free_orders_written = n;
                report.succeed(SyncStep::ReplaceFreeOrders, format!("Free orders snapshot: {n} rows"));
            }
            Err(e) => report.fail_store(SyncStep::ReplaceFreeOrders, &e, projection.free.len()),
        }
    }

    fn append_attendance(&mut self, report: &mut ReconciliationReport, projection: &Projection) {
        let paid: Vec<PaidAttendanceRow> = projection
            .paid
            .iter()
            .flat_map(|r| r.attendance_rows())
            .collect();
        if let Some(counts) = self.append(report, SyncStep::PaidAttendance, paid) {
            report.counts.paid_attendance = counts;
        }

        let free: Vec<FreeAttendanceRow> = projection
            .free
            .iter()
            .filter_map(|r| r.attendance_row())
            .collect();
        if let Some(counts) = self.append(report, SyncStep::FreeAttendance, free) {
            report.counts.free_attendance = counts;
        }
    }

    fn append_social(
        &mut self,
        report: &mut ReconciliationReport,
        orders: &[RawOrder],
        names: &HashMap<i64, String>,
    ) {
        let records = self.social.project(orders, names);
        if let Some(counts) = self.append(report, SyncStep::Social, records) {
            report.counts.social_attendance = counts;
        }
    }

    /// Read existing keys, drop known rows, insert the rest.
    fn append<T: TableRecord + IdentityKey>(
        &mut self,
        report: &mut ReconciliationReport,
        step: SyncStep,
        candidates: Vec<T>,
    ) -> Option<AppendCounts> {
        let total = candidates.len();
        let existing = match self.store.read_keys::<T>() {
            Ok(keys) => keys,
            Err(e) => {
                report.fail_store(step, &e, total);
                return None;
            }
        };

        let outcome = filter_new(candidates, &existing);
        let mut counts = AppendCounts {
            candidates: total,
            inserted: 0,
            already_present: outcome.already_present,
            duplicate_in_batch: outcome.duplicate_in_batch,
        };

        if !outcome.fresh.is_empty() {
            match self.store.insert_rows(&outcome.fresh) {
                Ok(n) => counts.inserted = n,
                Err(e) => {
                    report.fail_store(step, &e, outcome.fresh.len());
                    return None;
                }
            }
        }

        report.succeed(
            step,
            format!(
                "{}: {} new, {} already present",
                T::TABLE,
                counts.inserted,
                counts.already_present
            ),
        );
        Some(counts)
    }
}

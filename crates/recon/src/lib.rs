//! `floorbook-recon`: order classification and attendance reconciliation.
//!
//! Pure engine crate: receives orders from an [`store::OrderSource`], writes
//! through an [`store::AttendanceStore`]. No network or disk IO of its own.

pub mod bundle;
pub mod classify;
pub mod config;
pub mod dates;
pub mod dedup;
pub mod error;
pub mod model;
pub mod money;
pub mod project;
pub mod reconcile;
pub mod revenue;
pub mod social;
pub mod store;

pub use classify::TextClassifier;
pub use config::SyncConfig;
pub use dedup::{filter_new, DedupOutcome, IdentityKey};
pub use error::{ConfigError, SourceError, StoreError, SyncError};
pub use model::{
    Block, ClassName, ClassificationResult, Customer, EnrollmentRecord, FreeAttendanceRow,
    FreeClassRecord, PaidAttendanceRow, Placement, RawLineItem, RawOrder, Role,
    SocialAttendanceRecord,
};
pub use project::{OrderProjector, Projection, ProjectionStats};
pub use reconcile::{ReconciliationEngine, ReconciliationReport, SyncStep};
pub use store::{AttendanceStore, CustomerDirectory, MemoryStore, OrderSource, Table};

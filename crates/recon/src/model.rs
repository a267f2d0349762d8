use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

use crate::money::{deserialize_cents, serialize_cents};

// ---------------------------------------------------------------------------
// Input: orders as the feed delivers them
// ---------------------------------------------------------------------------

/// One purchased product line inside an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLineItem {
    pub title: String,
    #[serde(default)]
    pub variant_title: Option<String>,
    /// Unit price in cents.
    #[serde(deserialize_with = "deserialize_cents", serialize_with = "serialize_cents")]
    pub price: i64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl RawLineItem {
    pub fn variant(&self) -> &str {
        self.variant_title.as_deref().unwrap_or("")
    }

    /// `price * quantity` in cents.
    pub fn value_cents(&self) -> i64 {
        self.price.saturating_mul(i64::from(self.quantity))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancialStatus {
    Paid,
    Pending,
    Authorized,
    PartiallyPaid,
    Refunded,
    PartiallyRefunded,
    Voided,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for FinancialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paid => write!(f, "paid"),
            Self::Pending => write!(f, "pending"),
            Self::Authorized => write!(f, "authorized"),
            Self::PartiallyPaid => write!(f, "partially_paid"),
            Self::Refunded => write!(f, "refunded"),
            Self::PartiallyRefunded => write!(f, "partially_refunded"),
            Self::Voided => write!(f, "voided"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// An order from the e-commerce feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOrder {
    pub id: i64,
    /// Human order number, e.g. `#1042`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub customer_id: Option<i64>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub created_at: DateTime<FixedOffset>,
    pub financial_status: FinancialStatus,
    #[serde(default, deserialize_with = "empty_if_null")]
    pub note: String,
    #[serde(deserialize_with = "deserialize_cents", serialize_with = "serialize_cents")]
    pub total_price: i64,
    #[serde(
        default,
        deserialize_with = "deserialize_cents",
        serialize_with = "serialize_cents"
    )]
    pub total_discounts: i64,
    #[serde(default)]
    pub line_items: Vec<RawLineItem>,
}

fn empty_if_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl RawOrder {
    /// Calendar date of the order in the order's own UTC offset.
    pub fn order_date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }

    pub fn is_paid(&self) -> bool {
        self.financial_status == FinancialStatus::Paid
    }
}

/// Entry from the customer directory; used only for display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(alias = "id")]
    pub customer_id: i64,
    #[serde(default, deserialize_with = "empty_if_null")]
    pub first_name: String,
    #[serde(default, deserialize_with = "empty_if_null")]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl Customer {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClassName {
    #[serde(rename = "Level 1", alias = "level_1")]
    Level1,
    #[serde(rename = "Level 2", alias = "level_2")]
    Level2,
    #[serde(rename = "Level 3", alias = "level_3")]
    Level3,
    #[serde(rename = "Body Movement", alias = "body_movement")]
    BodyMovement,
    #[serde(rename = "Shines", alias = "shines")]
    Shines,
    #[serde(rename = "Bundle", alias = "bundle")]
    Bundle,
    #[serde(rename = "Free Class", alias = "free_class")]
    FreeClass,
    #[serde(rename = "Unknown", alias = "unknown")]
    Unknown,
}

impl ClassName {
    /// Classes a bundle grants, in emission order.
    pub const BUNDLE_CONTENTS: [ClassName; 5] = [
        ClassName::Level1,
        ClassName::Level2,
        ClassName::Level3,
        ClassName::BodyMovement,
        ClassName::Shines,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Level1 => "Level 1",
            Self::Level2 => "Level 2",
            Self::Level3 => "Level 3",
            Self::BodyMovement => "Body Movement",
            Self::Shines => "Shines",
            Self::Bundle => "Bundle",
            Self::FreeClass => "Free Class",
            Self::Unknown => "Unknown",
        }
    }

    pub fn is_level(&self) -> bool {
        matches!(self, Self::Level1 | Self::Level2 | Self::Level3)
    }

    /// Body Movement and Shines: partner-less, never carry a role.
    pub fn is_solo(&self) -> bool {
        matches!(self, Self::BodyMovement | Self::Shines)
    }
}

impl std::fmt::Display for ClassName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Block {
    A,
    B,
    Both,
    #[default]
    None,
}

impl Block {
    /// Combine the blocks of two items that land in the same record.
    pub fn merge(self, other: Block) -> Block {
        match (self, other) {
            (Block::None, b) | (b, Block::None) => b,
            (a, b) if a == b => a,
            _ => Block::Both,
        }
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::Both => write!(f, "Both"),
            Self::None => write!(f, "None"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Leader,
    Follower,
    #[serde(rename = "None")]
    NoRole,
    Unspecified,
}

impl Role {
    /// Leader or Follower.
    pub fn is_partnered(&self) -> bool {
        matches!(self, Self::Leader | Self::Follower)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leader => write!(f, "Leader"),
            Self::Follower => write!(f, "Follower"),
            Self::NoRole => write!(f, "None"),
            Self::Unspecified => write!(f, "Unspecified"),
        }
    }
}

/// Structured reading of one line item. Recomputed every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub class_name: ClassName,
    pub term: Option<String>,
    pub block: Block,
    pub role: Role,
    pub is_free: bool,
    pub is_bundle: bool,
}

impl ClassificationResult {
    pub fn is_unknown(&self) -> bool {
        self.class_name == ClassName::Unknown
    }
}

// ---------------------------------------------------------------------------
// Projected order snapshot rows
// ---------------------------------------------------------------------------

/// Paid enrollment: one per (order, role group).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub order_id: i64,
    pub customer_id: i64,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub order_date: NaiveDate,
    pub classes: BTreeSet<ClassName>,
    pub role: Role,
    /// First term seen in the group.
    pub term: Option<String>,
    /// All of the group's blocks merged.
    pub block: Block,
    /// Term and block each class was bought for.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub placements: BTreeMap<ClassName, Placement>,
    pub paid: bool,
    #[serde(default)]
    pub notes: String,
}

/// Where one class of an enrollment sits in the timetable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub term: Option<String>,
    pub block: Block,
}

impl EnrollmentRecord {
    /// Fan out into one attendance row per class, each with its own term
    /// and block. Records without placements use the group's.
    pub fn attendance_rows(&self) -> Vec<PaidAttendanceRow> {
        self.classes
            .iter()
            .map(|class_name| {
                let (term, block) = match self.placements.get(class_name) {
                    Some(p) => (p.term.clone(), p.block),
                    None => (self.term.clone(), self.block),
                };
                PaidAttendanceRow {
                    customer_id: self.customer_id,
                    customer_name: self.customer_name.clone(),
                    class_name: *class_name,
                    role: self.role,
                    term,
                    block,
                    week_1: false,
                    week_2: false,
                    week_3: false,
                    week_4: false,
                    week_5: false,
                    notes: self.notes.clone(),
                }
            })
            .collect()
    }
}

/// Free trial class booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeClassRecord {
    pub order_id: i64,
    pub customer_id: Option<i64>,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub class_date: NaiveDate,
    pub class: String,
    pub role: Role,
    pub paid: bool,
    #[serde(default)]
    pub notes: String,
}

impl FreeClassRecord {
    /// Attendance row for this booking; `None` for anonymous bookings.
    pub fn attendance_row(&self) -> Option<FreeAttendanceRow> {
        self.customer_id.map(|customer_id| FreeAttendanceRow {
            customer_id,
            customer_name: self.customer_name.clone(),
            class_date: self.class_date,
            role: self.role,
            attended: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Attendance rows (persist across runs)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaidAttendanceRow {
    pub customer_id: i64,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub class_name: ClassName,
    pub role: Role,
    pub term: Option<String>,
    pub block: Block,
    pub week_1: bool,
    pub week_2: bool,
    pub week_3: bool,
    pub week_4: bool,
    pub week_5: bool,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeAttendanceRow {
    pub customer_id: i64,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub class_date: NaiveDate,
    pub role: Role,
    pub attended: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialAttendanceRecord {
    pub order_id: i64,
    pub customer_id: Option<i64>,
    pub customer_name: String,
    pub social_date: NaiveDate,
    pub total_tickets: u32,
    pub tickets_used: u32,
    pub special_guest: bool,
}

// ---------------------------------------------------------------------------
// Identity keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaidKey {
    pub customer_id: i64,
    pub class_name: ClassName,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FreeKey {
    pub customer_id: i64,
    pub class_date: NaiveDate,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SocialKey {
    pub order_id: i64,
    pub social_date: NaiveDate,
}

impl std::fmt::Display for PaidKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.customer_id, self.class_name, self.role)
    }
}

impl std::fmt::Display for FreeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.customer_id, self.class_date, self.role)
    }
}

impl std::fmt::Display for SocialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.order_id, self.social_date)
    }
}

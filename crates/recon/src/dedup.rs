use std::collections::HashSet;
use std::fmt::Display;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::model::{
    FreeAttendanceRow, FreeKey, PaidAttendanceRow, PaidKey, SocialAttendanceRecord, SocialKey,
};

/// A row with a natural identity. Two rows with equal keys are the same
/// attendance entry, whatever their flags say.
pub trait IdentityKey {
    type Key: Eq + Hash + Clone + Ord + Display + Serialize + DeserializeOwned;

    fn identity_key(&self) -> Self::Key;
}

impl IdentityKey for PaidAttendanceRow {
    type Key = PaidKey;

    fn identity_key(&self) -> PaidKey {
        PaidKey {
            customer_id: self.customer_id,
            class_name: self.class_name,
            role: self.role,
        }
    }
}

impl IdentityKey for FreeAttendanceRow {
    type Key = FreeKey;

    fn identity_key(&self) -> FreeKey {
        FreeKey {
            customer_id: self.customer_id,
            class_date: self.class_date,
            role: self.role,
        }
    }
}

impl IdentityKey for SocialAttendanceRecord {
    type Key = SocialKey;

    fn identity_key(&self) -> SocialKey {
        SocialKey {
            order_id: self.order_id,
            social_date: self.social_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupOutcome<T> {
    /// Rows to insert, in candidate order.
    pub fresh: Vec<T>,
    pub already_present: usize,
    pub duplicate_in_batch: usize,
}

/// Keep candidates whose key is neither in `existing` nor seen earlier in
/// the same batch. First occurrence wins.
pub fn filter_new<T: IdentityKey>(
    candidates: Vec<T>,
    existing: &HashSet<T::Key>,
) -> DedupOutcome<T> {
    let mut seen: HashSet<T::Key> = HashSet::new();
    let mut fresh = Vec::new();
    let mut already_present = 0;
    let mut duplicate_in_batch = 0;

    for candidate in candidates {
        let key = candidate.identity_key();
        if existing.contains(&key) {
            already_present += 1;
        } else if !seen.insert(key) {
            duplicate_in_batch += 1;
        } else {
            fresh.push(candidate);
        }
    }

    DedupOutcome {
        fresh,
        already_present,
        duplicate_in_batch,
    }
}

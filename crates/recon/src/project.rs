//! Orders → enrollment and free-class snapshot rows.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bundle;
use crate::classify::TextClassifier;
use crate::config::SyncConfig;
use crate::dates::{assumed_year, days_before, parse_day_month};
use crate::model::{
    Block, ClassName, ClassificationResult, EnrollmentRecord, FreeClassRecord, Placement,
    RawLineItem, RawOrder, Role,
};

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Counters for everything the projector looked at or dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectionStats {
    pub orders_seen: usize,
    pub orders_skipped_no_customer: usize,
    pub line_items: usize,
    pub classification_misses: usize,
    pub levels_without_role: usize,
    pub out_of_scope_items: usize,
    pub unparseable_free_dates: usize,
    pub stale_free_classes: usize,
    pub paid_records: usize,
    pub free_records: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Projection {
    pub paid: Vec<EnrollmentRecord>,
    pub free: Vec<FreeClassRecord>,
    pub stats: ProjectionStats,
}

impl Projection {
    /// Overwrite customer names with directory display names where known.
    pub fn attach_names(&mut self, names: &HashMap<i64, String>) {
        for record in &mut self.paid {
            if let Some(name) = names.get(&record.customer_id) {
                record.customer_name = Some(name.clone());
            }
        }
        for record in &mut self.free {
            if let Some(name) = record.customer_id.and_then(|id| names.get(&id)) {
                record.customer_name = Some(name.clone());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Projector
// ---------------------------------------------------------------------------

/// Classes sharing a role within one order. Each class keeps the term and
/// block it was bought for; `term`/`block` summarise the whole group.
#[derive(Debug, Default)]
struct Group {
    placements: BTreeMap<ClassName, Placement>,
    term: Option<String>,
    block: Block,
}

impl Group {
    fn add(&mut self, result: &ClassificationResult) {
        if self.term.is_none() {
            self.term = result.term.clone();
        }
        self.block = self.block.merge(result.block);

        let placement = self
            .placements
            .entry(result.class_name)
            .or_insert_with(|| Placement {
                term: result.term.clone(),
                block: Block::None,
            });
        // Buying the same class for A and B of one term means Both.
        if placement.term == result.term {
            placement.block = placement.block.merge(result.block);
        }
    }

    fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

pub struct OrderProjector {
    classifier: TextClassifier,
    term_scope: Option<String>,
    recency_days: u32,
    free_class_label: String,
}

impl OrderProjector {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            classifier: TextClassifier::new(&config.classification),
            term_scope: config.term.current.clone(),
            recency_days: config.recency_days,
            free_class_label: config.classification.free_class_label.clone(),
        }
    }

    pub fn project(&self, orders: &[RawOrder], today: NaiveDate) -> Projection {
        let mut projection = Projection::default();
        for order in orders {
            self.project_order(order, today, &mut projection);
        }
        projection.stats.paid_records = projection.paid.len();
        projection.stats.free_records = projection.free.len();

        let s = &projection.stats;
        info!(
            orders = s.orders_seen,
            paid_records = s.paid_records,
            free_records = s.free_records,
            misses = s.classification_misses,
            out_of_scope = s.out_of_scope_items,
            "projection complete"
        );
        projection
    }

    fn project_order(&self, order: &RawOrder, today: NaiveDate, out: &mut Projection) {
        let stats = &mut out.stats;
        stats.orders_seen += 1;

        let mut partnered: BTreeMap<Role, Group> = BTreeMap::new();
        let mut solo = Group::default();

        for item in &order.line_items {
            stats.line_items += 1;
            let result = self.classifier.classify(&item.title, item.variant());

            if result.is_unknown() {
                stats.classification_misses += 1;
                debug!(order_id = order.id, title = %item.title, "no classification rule matched");
                continue;
            }

            if result.is_free {
                if let Some(record) = self.free_record(order, item, &result, today, stats) {
                    out.free.push(record);
                }
                continue;
            }

            for expanded in bundle::expand(&result, order.id) {
                if let Some(ref scope) = self.term_scope {
                    if expanded.term.as_deref() != Some(scope.as_str()) {
                        stats.out_of_scope_items += 1;
                        debug!(
                            order_id = order.id,
                            class = %expanded.class_name,
                            term = ?expanded.term,
                            "outside current term"
                        );
                        continue;
                    }
                }

                if expanded.class_name.is_solo() {
                    solo.add(&expanded);
                } else if expanded.role.is_partnered() {
                    partnered.entry(expanded.role).or_default().add(&expanded);
                } else {
                    stats.levels_without_role += 1;
                    debug!(order_id = order.id, class = %expanded.class_name, "level without role");
                }
            }
        }

        let has_paid = !solo.is_empty() || !partnered.is_empty();
        let Some(customer_id) = order.customer_id else {
            if has_paid {
                stats.orders_skipped_no_customer += 1;
                debug!(order_id = order.id, "order has no customer; enrollments skipped");
            }
            return;
        };

        let groups = partnered
            .into_iter()
            .chain((!solo.is_empty()).then_some((Role::NoRole, solo)));
        for (role, group) in groups {
            out.paid.push(EnrollmentRecord {
                order_id: order.id,
                customer_id,
                customer_name: order.customer_name.clone(),
                order_date: order.order_date(),
                classes: group.placements.keys().copied().collect(),
                role,
                term: group.term,
                block: group.block,
                placements: group.placements,
                paid: order.is_paid(),
                notes: order.note.clone(),
            });
        }
    }

    fn free_record(
        &self,
        order: &RawOrder,
        item: &RawLineItem,
        result: &ClassificationResult,
        today: NaiveDate,
        stats: &mut ProjectionStats,
    ) -> Option<FreeClassRecord> {
        let year = assumed_year(today);
        let Some(class_date) = parse_day_month(item.variant(), year)
            .or_else(|| parse_day_month(&item.title, year))
        else {
            stats.unparseable_free_dates += 1;
            warn!(
                order_id = order.id,
                variant = item.variant(),
                "free class date not recognised; booking dropped"
            );
            return None;
        };

        if days_before(class_date, today) > i64::from(self.recency_days) {
            stats.stale_free_classes += 1;
            debug!(order_id = order.id, %class_date, "free class too old");
            return None;
        }

        Some(FreeClassRecord {
            order_id: order.id,
            customer_id: order.customer_id,
            customer_name: order.customer_name.clone(),
            class_date,
            class: self.free_class_label.clone(),
            role: result.role,
            paid: false,
            notes: order.note.clone(),
        })
    }
}

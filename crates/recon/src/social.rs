//! Social-event ticket orders → social attendance records.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use tracing::debug;

use crate::config::SocialConfig;
use crate::dates::parse_day_month;
use crate::model::{RawOrder, SocialAttendanceRecord};

pub struct SocialProjector {
    keywords: Vec<String>,
    guest_keywords: Vec<String>,
}

impl SocialProjector {
    pub fn new(config: &SocialConfig) -> Self {
        let lower = |v: &[String]| -> Vec<String> {
            v.iter().map(|k| k.trim().to_lowercase()).collect()
        };
        Self {
            keywords: lower(&config.keywords),
            guest_keywords: lower(&config.guest_keywords),
        }
    }

    fn is_social(&self, title_lower: &str) -> bool {
        self.keywords.iter().any(|k| title_lower.contains(k.as_str()))
    }

    fn is_guest(&self, text_lower: &str) -> bool {
        self.guest_keywords.iter().any(|k| text_lower.contains(k.as_str()))
    }

    /// One record per (paid order, social date). Quantities of tickets for
    /// the same date add up. A date missing from the item falls back to the
    /// order date.
    pub fn project(
        &self,
        orders: &[RawOrder],
        names: &HashMap<i64, String>,
    ) -> Vec<SocialAttendanceRecord> {
        let mut out = Vec::new();

        for order in orders.iter().filter(|o| o.is_paid()) {
            let year = order.created_at.year();
            let mut per_date: BTreeMap<NaiveDate, (u32, bool)> = BTreeMap::new();

            for item in &order.line_items {
                let title_lower = item.title.to_lowercase();
                if !self.is_social(&title_lower) {
                    continue;
                }
                let social_date = parse_day_month(item.variant(), year)
                    .or_else(|| parse_day_month(&item.title, year))
                    .unwrap_or_else(|| {
                        debug!(order_id = order.id, "social date not in item; using order date");
                        order.order_date()
                    });
                let guest = self.is_guest(&title_lower)
                    || self.is_guest(&item.variant().to_lowercase());

                let entry = per_date.entry(social_date).or_insert((0, false));
                entry.0 = entry.0.saturating_add(item.quantity);
                entry.1 |= guest;
            }

            for (social_date, (total_tickets, special_guest)) in per_date {
                out.push(SocialAttendanceRecord {
                    order_id: order.id,
                    customer_id: order.customer_id,
                    customer_name: display_name(order, names),
                    social_date,
                    total_tickets,
                    tickets_used: 0,
                    special_guest,
                });
            }
        }
        out
    }
}

fn display_name(order: &RawOrder, names: &HashMap<i64, String>) -> String {
    order
        .customer_id
        .and_then(|id| names.get(&id).cloned())
        .or_else(|| order.customer_name.clone())
        .or_else(|| order.email.clone())
        .or_else(|| order.name.clone())
        .unwrap_or_else(|| format!("Order {}", order.id))
}

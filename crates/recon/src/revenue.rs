//! Revenue attribution for reporting. Order-level discounts are spread
//! over line items in proportion to their value.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::classify::TextClassifier;
use crate::model::{ClassName, RawLineItem, RawOrder};

/// One order filtered down to a subset of its line items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RevenueShare {
    pub items_value: i64,
    pub filtered_value: i64,
    pub proportional_discount: i64,
    pub filtered_total: i64,
}

/// `proportional_discount = total_discounts * filtered_value / items_value`,
/// rounded half away from zero. Zero items value ⇒ zero discount.
pub fn allocate<F>(order: &RawOrder, predicate: F) -> RevenueShare
where
    F: Fn(&RawLineItem) -> bool,
{
    let mut items_value = 0i64;
    let mut filtered_value = 0i64;
    for item in &order.line_items {
        let value = item.value_cents();
        items_value = items_value.saturating_add(value);
        if predicate(item) {
            filtered_value = filtered_value.saturating_add(value);
        }
    }

    let proportional_discount = if items_value == 0 {
        0
    } else {
        let scaled = i128::from(order.total_discounts) * i128::from(filtered_value);
        let rounded = div_round_half_away(scaled, i128::from(items_value));
        i64::try_from(rounded).unwrap_or(if rounded < 0 { i64::MIN } else { i64::MAX })
    };

    RevenueShare {
        items_value,
        filtered_value,
        proportional_discount,
        filtered_total: filtered_value.saturating_sub(proportional_discount),
    }
}

fn div_round_half_away(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder.abs() * 2 >= denominator.abs() {
        if (numerator < 0) != (denominator < 0) {
            quotient - 1
        } else {
            quotient + 1
        }
    } else {
        quotient
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassRevenue {
    pub class_name: ClassName,
    pub orders: usize,
    pub revenue_cents: i64,
}

/// Net revenue per class over paid orders. Bundles count as `Bundle`; free
/// classes and unclassified items are left out.
pub fn revenue_by_class(orders: &[RawOrder], classifier: &TextClassifier) -> Vec<ClassRevenue> {
    let mut totals: BTreeMap<ClassName, (usize, i64)> = BTreeMap::new();

    for order in orders.iter().filter(|o| o.is_paid()) {
        let classes: Vec<ClassName> = order
            .line_items
            .iter()
            .map(|item| classifier.classify(&item.title, item.variant()))
            .filter(|r| !r.is_free && !r.is_unknown())
            .map(|r| r.class_name)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        for class_name in classes {
            let share = allocate(order, |item| {
                classifier.classify(&item.title, item.variant()).class_name == class_name
            });
            let entry = totals.entry(class_name).or_insert((0, 0));
            entry.0 += 1;
            entry.1 = entry.1.saturating_add(share.filtered_total);
        }
    }

    totals
        .into_iter()
        .map(|(class_name, (orders, revenue_cents))| ClassRevenue {
            class_name,
            orders,
            revenue_cents,
        })
        .collect()
}

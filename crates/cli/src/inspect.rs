//! Read-only commands: `classify`, `project`, `revenue`. None of them touch
//! the attendance database.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use serde::Serialize;

use floorbook_config::Settings;
use floorbook_recon::bundle;
use floorbook_recon::money::format_cents;
use floorbook_recon::revenue::revenue_by_class;
use floorbook_recon::{
    ClassificationResult, EnrollmentRecord, FreeClassRecord, OrderProjector, Projection,
    TextClassifier,
};

use crate::sources::{load_sync_config, RunInputs, SourceArgs};
use crate::CliError;

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let json_str = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
    println!("{json_str}");
    Ok(())
}

// ── classify ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ClassifyOutput<'a> {
    title: &'a str,
    variant: &'a str,
    result: &'a ClassificationResult,
    /// Per-class results when the item is a bundle.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    grants: Vec<ClassificationResult>,
}

pub fn cmd_classify(
    title: String,
    variant: Option<String>,
    config: Option<PathBuf>,
    json: bool,
) -> Result<(), CliError> {
    let config = load_sync_config(config.as_deref(), &Settings::load())?;
    let classifier = TextClassifier::new(&config.classification);
    let variant = variant.unwrap_or_default();

    let result = classifier.classify(&title, &variant);
    let grants = if result.is_bundle {
        bundle::expand(&result, 0)
    } else {
        Vec::new()
    };

    if json {
        return print_json(&ClassifyOutput {
            title: &title,
            variant: &variant,
            result: &result,
            grants,
        });
    }

    println!("{}", describe(&result));
    for granted in &grants {
        println!("  grants {}", describe(granted));
    }
    if result.is_unknown() {
        eprintln!("note: no classification rule matched; this item is ignored by sync");
    }
    Ok(())
}

fn describe(r: &ClassificationResult) -> String {
    let mut parts = vec![r.class_name.to_string()];
    if let Some(term) = &r.term {
        parts.push(format!("term {term}"));
    }
    parts.push(format!("block {}", r.block));
    parts.push(format!("role {}", r.role));
    if r.is_free {
        parts.push("free".into());
    }
    parts.join(", ")
}

// ── project ─────────────────────────────────────────────────────────

/// One CSV row per projected record. Paid enrollments leave `class_date`
/// empty; free classes leave `order_date` empty.
#[derive(Debug, Serialize)]
struct ProjectRow {
    kind: &'static str,
    order_id: i64,
    customer_id: String,
    customer_name: String,
    order_date: String,
    class_date: String,
    classes: String,
    role: String,
    term: String,
    block: String,
    paid: bool,
    notes: String,
}

impl From<&EnrollmentRecord> for ProjectRow {
    fn from(r: &EnrollmentRecord) -> Self {
        Self {
            kind: "paid",
            order_id: r.order_id,
            customer_id: r.customer_id.to_string(),
            customer_name: r.customer_name.clone().unwrap_or_default(),
            order_date: r.order_date.to_string(),
            class_date: String::new(),
            classes: r
                .classes
                .iter()
                .map(|c| c.label())
                .collect::<Vec<_>>()
                .join("; "),
            role: r.role.to_string(),
            term: r.term.clone().unwrap_or_default(),
            block: r.block.to_string(),
            paid: r.paid,
            notes: r.notes.clone(),
        }
    }
}

impl From<&FreeClassRecord> for ProjectRow {
    fn from(r: &FreeClassRecord) -> Self {
        Self {
            kind: "free",
            order_id: r.order_id,
            customer_id: r.customer_id.map(|id| id.to_string()).unwrap_or_default(),
            customer_name: r.customer_name.clone().unwrap_or_default(),
            order_date: String::new(),
            class_date: r.class_date.to_string(),
            classes: r.class.clone(),
            role: r.role.to_string(),
            term: String::new(),
            block: String::new(),
            paid: r.paid,
            notes: r.notes.clone(),
        }
    }
}

fn write_csv<W: io::Write>(projection: &Projection, out: W) -> Result<(), CliError> {
    let mut wtr = csv::Writer::from_writer(out);
    let rows = projection
        .paid
        .iter()
        .map(ProjectRow::from)
        .chain(projection.free.iter().map(ProjectRow::from));
    for row in rows {
        wtr.serialize(row)
            .map_err(|e| CliError::io(format!("CSV write error: {e}")))?;
    }
    wtr.flush()
        .map_err(|e| CliError::io(format!("CSV flush error: {e}")))?;
    Ok(())
}

pub fn cmd_project(source: SourceArgs, csv_output: bool, json: bool) -> Result<(), CliError> {
    let inputs = RunInputs::resolve(&source)?;
    let orders = inputs.orders.fetch(inputs.window_start)?;

    let mut projection = OrderProjector::new(&inputs.config).project(&orders, inputs.today);
    if let Some(directory) = inputs.orders.directory() {
        let customers = directory
            .fetch_customers()
            .map_err(|e| CliError::io(e.to_string()))?;
        let names: HashMap<i64, String> = customers
            .iter()
            .map(|c| (c.customer_id, c.display_name()))
            .filter(|(_, name)| !name.is_empty())
            .collect();
        projection.attach_names(&names);
    }

    if json {
        return print_json(&projection);
    }
    if csv_output {
        return write_csv(&projection, io::stdout().lock());
    }

    for r in &projection.paid {
        let classes: Vec<&str> = r.classes.iter().map(|c| c.label()).collect();
        println!(
            "paid  #{:<8} {:<24} {:<10} term {:<3} block {:<4} {}",
            r.order_id,
            r.customer_name.as_deref().unwrap_or("-"),
            r.role.to_string(),
            r.term.as_deref().unwrap_or("-"),
            r.block.to_string(),
            classes.join(", "),
        );
    }
    for r in &projection.free {
        println!(
            "free  #{:<8} {:<24} {:<10} {}",
            r.order_id,
            r.customer_name.as_deref().unwrap_or("-"),
            r.role.to_string(),
            r.class_date,
        );
    }

    let s = &projection.stats;
    eprintln!(
        "{} orders, {} line items: {} paid record(s), {} free record(s); \
         {} unclassified, {} out of scope, {} stale free class(es), {} unparseable date(s)",
        s.orders_seen,
        s.line_items,
        s.paid_records,
        s.free_records,
        s.classification_misses,
        s.out_of_scope_items,
        s.stale_free_classes,
        s.unparseable_free_dates,
    );
    Ok(())
}

// ── revenue ─────────────────────────────────────────────────────────

pub fn cmd_revenue(source: SourceArgs, json: bool) -> Result<(), CliError> {
    let inputs = RunInputs::resolve(&source)?;
    let orders = inputs.orders.fetch(inputs.window_start)?;
    let classifier = TextClassifier::new(&inputs.config.classification);
    let revenue = revenue_by_class(&orders, &classifier);

    if json {
        return print_json(&revenue);
    }

    let mut total = 0i64;
    for line in &revenue {
        println!(
            "{:<14} {:>4} order(s) {:>12}",
            line.class_name.label(),
            line.orders,
            format_cents(line.revenue_cents),
        );
        total = total.saturating_add(line.revenue_cents);
    }
    println!("{:<14} {:>14} {:>12}", "Total", "", format_cents(total));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use floorbook_recon::model::{Block, ClassName, Role};
    use std::collections::BTreeSet;

    fn enrollment() -> EnrollmentRecord {
        EnrollmentRecord {
            order_id: 1001,
            customer_id: 5,
            customer_name: Some("Ana Díaz".into()),
            order_date: "2025-05-02".parse().unwrap(),
            classes: BTreeSet::from([ClassName::Level1, ClassName::Level2]),
            role: Role::Leader,
            term: Some("2".into()),
            block: Block::B,
            placements: Default::default(),
            paid: true,
            notes: String::new(),
        }
    }

    #[test]
    fn test_csv_has_header_and_one_row_per_record() {
        let projection = Projection {
            paid: vec![enrollment()],
            free: vec![FreeClassRecord {
                order_id: 1004,
                customer_id: None,
                customer_name: None,
                class_date: "2025-05-27".parse().unwrap(),
                class: "Free Class - New York Salsa".into(),
                role: Role::Follower,
                paid: false,
                notes: "first time".into(),
            }],
            stats: Default::default(),
        };

        let mut out = Vec::new();
        write_csv(&projection, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "kind,order_id,customer_id,customer_name,order_date,class_date,classes,role,term,block,paid,notes"
        );
        assert_eq!(lines[1], "paid,1001,5,Ana Díaz,2025-05-02,,Level 1; Level 2,Leader,2,B,true,");
        assert_eq!(
            lines[2],
            "free,1004,,,,2025-05-27,Free Class - New York Salsa,Follower,,,false,first time"
        );
    }

    #[test]
    fn test_describe_bundle_grant() {
        let r = TextClassifier::default().classify("Unlimited Bundle", "Term 2B / Leader");
        assert_eq!(describe(&r), "Bundle, term 2, block B, role Leader");
        let grants = bundle::expand(&r, 0);
        assert_eq!(describe(&grants[3]), "Body Movement, term 2, block B, role None");
    }
}

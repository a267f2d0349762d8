//! `fbook sync` and `fbook validate`.

use std::path::PathBuf;

use tracing::info;
use uuid::Uuid;

use floorbook_recon::{CustomerDirectory, ReconciliationEngine, ReconciliationReport};
use floorbook_store::{JsonCustomerFile, SqliteStore};

use crate::exit_codes::{EXIT_SYNC_LOCKED, EXIT_SYNC_STEP_FAILED, EXIT_SYNC_STORE};
use crate::sources::{read_sync_config, RunInputs, SourceArgs};
use crate::CliError;

pub struct SyncOptions {
    pub source: SourceArgs,
    pub customers: Option<PathBuf>,
    pub db: Option<PathBuf>,
    pub run_id: Option<String>,
    pub json: bool,
    pub output: Option<PathBuf>,
}

fn sync_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

pub fn cmd_sync(opts: SyncOptions) -> Result<(), CliError> {
    let inputs = RunInputs::resolve(&opts.source)?;

    let customer_file = opts.customers.as_ref().map(JsonCustomerFile::new);
    let directory: Option<&dyn CustomerDirectory> = match &customer_file {
        Some(file) => Some(file),
        None => inputs.orders.directory(),
    };

    let db_path = opts
        .db
        .clone()
        .unwrap_or_else(|| inputs.settings.database_path());
    let mut store = SqliteStore::open(&db_path).map_err(|e| {
        sync_err(
            EXIT_SYNC_STORE,
            format!("cannot open database {}: {e}", db_path.display()),
        )
    })?;

    let run_id = opts
        .run_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    info!(
        %run_id,
        config = %inputs.config.name,
        db = %db_path.display(),
        source = inputs.orders.as_source().name(),
        "starting sync"
    );

    let mut engine = ReconciliationEngine::new(&inputs.config, inputs.orders.as_source(), &mut store)
        .with_run_id(run_id);
    if let Some(directory) = directory {
        engine = engine.with_directory(directory);
    }

    let report = engine
        .reconcile(inputs.window_start, inputs.today)
        .map_err(|e| {
            sync_err(EXIT_SYNC_STORE, e.to_string())
                .with_hint(format!("check that {} is writable", db_path.display()))
        })?;

    emit_report(&report, opts.json, opts.output.as_ref())?;

    if report.lock_held() {
        return Err(sync_err(EXIT_SYNC_LOCKED, report.message.clone()).with_hint(format!(
            "wait for the other run to finish; an abandoned lock expires after {} minutes",
            inputs.config.lock.ttl_minutes
        )));
    }
    if !report.is_success() {
        return Err(sync_err(EXIT_SYNC_STEP_FAILED, report.message.clone()));
    }
    Ok(())
}

fn emit_report(
    report: &ReconciliationReport,
    json_output: bool,
    output_file: Option<&PathBuf>,
) -> Result<(), CliError> {
    if json_output || output_file.is_some() {
        let json_str = serde_json::to_string_pretty(report)
            .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;

        if let Some(path) = output_file {
            std::fs::write(path, &json_str)
                .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))?;
            eprintln!("wrote {}", path.display());
        }
        if json_output {
            println!("{json_str}");
        }
    }

    if !json_output {
        // The last status line repeats the summary message.
        for line in &report.status_lines {
            println!("{line}");
        }
        let stats = &report.counts.projection;
        if stats.classification_misses > 0 || stats.levels_without_role > 0 {
            eprintln!(
                "note: {} line item(s) unclassified, {} level(s) without a role",
                stats.classification_misses, stats.levels_without_role,
            );
        }
    }
    Ok(())
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_sync_config(&config_path)?;
    eprintln!(
        "valid: '{}' term {} ({} rule(s), {} social keyword(s), recency {} days, lookback {} weeks)",
        config.name,
        config.term.current.as_deref().unwrap_or("any"),
        config.classification.rules.len(),
        config.social.keywords.len(),
        config.recency_days,
        config.lookback_weeks,
    );
    Ok(())
}

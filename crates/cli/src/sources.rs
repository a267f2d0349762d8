//! Resolving command-line inputs: sync config, dates, and where orders
//! come from.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use clap::Args;
use tracing::debug;

use floorbook_config::{get_feed_token, Settings};
use floorbook_recon::{CustomerDirectory, OrderSource, RawOrder, SourceError, SyncConfig};
use floorbook_store::JsonOrderFile;

use crate::exit_codes;
use crate::feed::FeedClient;
use crate::CliError;

/// Flags shared by every command that reads orders.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Order export file (a JSON array or {"orders": [...]})
    #[arg(long, conflicts_with = "feed_url")]
    pub orders: Option<PathBuf>,

    /// Shop feed base URL (default: settings.toml [feed] base_url)
    #[arg(long)]
    pub feed_url: Option<String>,

    /// Sync config (*.sync.toml); default: settings.toml [sync] config_path, else built-in defaults
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Treat this date as today (YYYY-MM-DD)
    #[arg(long)]
    pub today: Option<String>,

    /// Only orders created on or after this date (YYYY-MM-DD);
    /// default: term start (or today) minus lookback_weeks
    #[arg(long)]
    pub window_start: Option<String>,

    /// Suppress feed progress on stderr
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

// ── Config ──────────────────────────────────────────────────────────

/// Read and validate a `*.sync.toml`.
pub fn read_sync_config(path: &Path) -> Result<SyncConfig, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::args(format!("cannot read config {}: {e}", path.display())))?;
    SyncConfig::from_toml(&text)
        .map_err(|e| CliError::config(format!("{}: {e}", path.display())))
}

/// `--config`, else the settings default, else built-in defaults.
pub fn load_sync_config(arg: Option<&Path>, settings: &Settings) -> Result<SyncConfig, CliError> {
    if let Some(path) = arg {
        return read_sync_config(path);
    }
    match &settings.sync.config_path {
        Some(path) => {
            let path = if path.is_relative() {
                Settings::config_dir().join(path)
            } else {
                path.clone()
            };
            debug!(path = %path.display(), "using sync config from settings");
            read_sync_config(&path)
        }
        None => {
            debug!("no sync config given; using defaults");
            Ok(SyncConfig::default())
        }
    }
}

// ── Dates ───────────────────────────────────────────────────────────

pub fn parse_date(flag: &str, value: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        CliError::args(format!("invalid {flag} date '{value}' (expected YYYY-MM-DD)"))
    })
}

pub fn resolve_today(arg: Option<&str>) -> Result<NaiveDate, CliError> {
    match arg {
        Some(value) => parse_date("--today", value),
        None => Ok(Local::now().date_naive()),
    }
}

pub fn resolve_window_start(
    arg: Option<&str>,
    config: &SyncConfig,
    today: NaiveDate,
) -> Result<DateTime<Utc>, CliError> {
    match arg {
        Some(value) => {
            let date = parse_date("--window-start", value)?;
            if date > today {
                return Err(CliError::args(format!(
                    "--window-start {date} is after today ({today})"
                )));
            }
            Ok(date.and_time(NaiveTime::MIN).and_utc())
        }
        None => Ok(config.window_start(today)),
    }
}

/// Everything a command needs before it touches orders.
pub struct RunInputs {
    pub settings: Settings,
    pub config: SyncConfig,
    pub today: NaiveDate,
    pub window_start: DateTime<Utc>,
    pub orders: Orders,
}

impl RunInputs {
    pub fn resolve(args: &SourceArgs) -> Result<Self, CliError> {
        let settings = Settings::load();
        let config = load_sync_config(args.config.as_deref(), &settings)?;
        let today = resolve_today(args.today.as_deref())?;
        let window_start = resolve_window_start(args.window_start.as_deref(), &config, today)?;
        let orders = Orders::open(args, &settings)?;
        Ok(Self {
            settings,
            config,
            today,
            window_start,
            orders,
        })
    }
}

// ── Orders ──────────────────────────────────────────────────────────

/// Where orders come from for this invocation.
pub enum Orders {
    File(JsonOrderFile),
    Feed(FeedClient),
}

impl Orders {
    pub fn open(args: &SourceArgs, settings: &Settings) -> Result<Self, CliError> {
        if let Some(path) = &args.orders {
            return Ok(Orders::File(JsonOrderFile::new(path)));
        }

        let base_url = args
            .feed_url
            .clone()
            .or_else(|| settings.feed.base_url.clone())
            .ok_or_else(|| {
                CliError::args("no order source: pass --orders FILE or --feed-url URL").with_hint(
                    format!(
                        "or set [feed] base_url in {}",
                        Settings::config_path().display()
                    ),
                )
            })?;

        let lookup = get_feed_token();
        let token = lookup.key.ok_or_else(|| CliError {
            code: exit_codes::EXIT_FEED_NOT_AUTH,
            message: "no feed token available".into(),
            hint: Some("set FLOORBOOK_FEED_TOKEN or store the token in the system keychain".into()),
        })?;
        debug!(source = lookup.source.as_str(), "feed token found");

        let feed = FeedClient::new(&base_url, token, &settings.feed)?.quiet(args.quiet);
        Ok(Orders::Feed(feed))
    }

    pub fn as_source(&self) -> &dyn OrderSource {
        match self {
            Orders::File(file) => file,
            Orders::Feed(feed) => feed,
        }
    }

    /// The feed doubles as the customer directory; a file does not.
    pub fn directory(&self) -> Option<&dyn CustomerDirectory> {
        match self {
            Orders::File(_) => None,
            Orders::Feed(feed) => Some(feed),
        }
    }

    /// Fetch outside a sync run, keeping the feed's own exit codes.
    pub fn fetch(&self, since: DateTime<Utc>) -> Result<Vec<RawOrder>, CliError> {
        match self {
            Orders::File(file) => file.fetch_orders(since).map_err(source_error),
            Orders::Feed(feed) => feed.fetch_orders_since(since),
        }
    }
}

fn source_error(e: SourceError) -> CliError {
    match e {
        SourceError::Io(_) => CliError::args(e.to_string()),
        other => CliError::io(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 5).unwrap()
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("--today", "2025-06-05").unwrap(), today());
        let err = parse_date("--today", "05/06/2025").unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_USAGE);
        assert!(err.message.contains("--today"));
    }

    #[test]
    fn test_window_start_default_and_explicit() {
        let config = SyncConfig::default();
        let default = resolve_window_start(None, &config, today()).unwrap();
        assert_eq!(default, config.window_start(today()));

        let explicit = resolve_window_start(Some("2025-05-01"), &config, today()).unwrap();
        assert_eq!(explicit.to_rfc3339(), "2025-05-01T00:00:00+00:00");

        let err = resolve_window_start(Some("2025-07-01"), &config, today()).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_USAGE);
    }

    #[test]
    fn test_invalid_config_exit_code() {
        let mut f = tempfile::Builder::new()
            .suffix(".sync.toml")
            .tempfile()
            .unwrap();
        f.write_all(b"lookback_weeks = 0\n").unwrap();
        let err = read_sync_config(f.path()).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_SYNC_INVALID_CONFIG);

        let err = read_sync_config(Path::new("/nonexistent/x.sync.toml")).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_USAGE);
    }

    #[test]
    fn test_no_source_is_usage_error() {
        let settings = Settings::default();
        let err = Orders::open(&SourceArgs::default(), &settings).err().unwrap();
        assert_eq!(err.code, exit_codes::EXIT_USAGE);
        assert!(err.hint.is_some());
    }

    #[test]
    fn test_missing_order_file_keeps_usage_code() {
        let args = SourceArgs {
            orders: Some(PathBuf::from("/nonexistent/orders.json")),
            ..SourceArgs::default()
        };
        let orders = Orders::open(&args, &Settings::default()).unwrap();
        assert!(orders.directory().is_none());
        let since = SyncConfig::default().window_start(today());
        let err = orders.fetch(since).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_USAGE);
    }
}

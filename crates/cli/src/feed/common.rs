//! Shared HTTP plumbing for the order feed and the customer directory.
//!
//! `FetchClient` owns retry, backoff, and the mapping from HTTP status to
//! the `50-59` exit codes. Callers pass a request-building closure that is
//! invoked once per attempt.

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::exit_codes;
use crate::CliError;

// ── Constants ───────────────────────────────────────────────────────

pub(super) const USER_AGENT: &str = concat!("fbook/", env!("CARGO_PKG_VERSION"));

// ── FetchClient ─────────────────────────────────────────────────────

/// HTTP client that handles retry, backoff, and error classification.
pub(super) struct FetchClient {
    pub(super) http: reqwest::blocking::Client,
    source_name: String,
    max_retries: u32,
    error_extractor: fn(&serde_json::Value, u16) -> String,
}

impl FetchClient {
    pub(super) fn new(
        source_name: &str,
        timeout_secs: u64,
        max_retries: u32,
        error_extractor: fn(&serde_json::Value, u16) -> String,
    ) -> Result<Self, CliError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CliError {
                code: exit_codes::EXIT_ERROR,
                message: format!("cannot build HTTP client: {e}"),
                hint: None,
            })?;

        Ok(Self {
            http,
            source_name: source_name.to_string(),
            max_retries,
            error_extractor,
        })
    }

    pub(super) fn source_name(&self) -> &str {
        &self.source_name
    }

    fn fail(&self, code: u8, message: String) -> CliError {
        CliError { code, message, hint: None }
    }

    /// Make a GET request with retry + exponential backoff.
    ///
    /// 401/403, 400 and other 4xx fail immediately. 429 and 5xx retry,
    /// honouring `Retry-After` on 429. Network errors retry.
    pub(super) fn request_with_retry(
        &self,
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<serde_json::Value, CliError> {
        let mut backoff_secs = 1u64;
        let mut attempt = 0u32;

        loop {
            let result = build_request(&self.http).send();

            match result {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    if (400..500).contains(&status) && status != 429 {
                        let body: serde_json::Value =
                            resp.json().unwrap_or(serde_json::Value::Null);
                        let msg = (self.error_extractor)(&body, status);
                        let (code, what) = match status {
                            401 | 403 => (exit_codes::EXIT_FEED_AUTH, "auth failed"),
                            400 => (exit_codes::EXIT_FEED_VALIDATION, "request rejected"),
                            _ => (exit_codes::EXIT_FEED_UPSTREAM, "error"),
                        };
                        return Err(self.fail(
                            code,
                            format!("{} {} ({}): {}", self.source_name, what, status, msg),
                        ));
                    }

                    if status == 429 || status >= 500 {
                        if attempt >= self.max_retries {
                            let (code, what) = if status == 429 {
                                (exit_codes::EXIT_FEED_RATE_LIMIT, "rate limited")
                            } else {
                                (exit_codes::EXIT_FEED_UPSTREAM, "upstream error")
                            };
                            return Err(self.fail(
                                code,
                                format!(
                                    "{} {} after {} attempts ({})",
                                    self.source_name,
                                    what,
                                    attempt + 1,
                                    status,
                                ),
                            ));
                        }

                        let wait = if status == 429 {
                            resp.headers()
                                .get("retry-after")
                                .and_then(|v| v.to_str().ok())
                                .and_then(|v| v.trim().parse::<u64>().ok())
                                .unwrap_or(backoff_secs)
                        } else {
                            backoff_secs
                        };

                        warn!(
                            source = %self.source_name,
                            attempt = attempt + 1,
                            max = self.max_retries,
                            wait_secs = wait,
                            status,
                            "retrying feed request"
                        );
                        thread::sleep(Duration::from_secs(wait));
                        backoff_secs *= 2;
                        attempt += 1;
                        continue;
                    }

                    // Read as text first; some proxies prepend a BOM.
                    let text = resp.text().map_err(|e| {
                        self.fail(
                            exit_codes::EXIT_FEED_UPSTREAM,
                            format!("failed to read {} response body: {}", self.source_name, e),
                        )
                    })?;
                    let trimmed = text.trim_start_matches('\u{feff}');
                    return serde_json::from_str(trimmed).map_err(|e| {
                        let preview: String = trimmed.chars().take(200).collect();
                        self.fail(
                            exit_codes::EXIT_FEED_UPSTREAM,
                            format!(
                                "failed to parse {} JSON response: {} (body: {})",
                                self.source_name, e, preview,
                            ),
                        )
                    });
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(self.fail(
                            exit_codes::EXIT_FEED_UPSTREAM,
                            format!(
                                "{} unreachable after {} attempts: {}",
                                self.source_name,
                                attempt + 1,
                                e,
                            ),
                        ));
                    }

                    warn!(
                        source = %self.source_name,
                        attempt = attempt + 1,
                        max = self.max_retries,
                        wait_secs = backoff_secs,
                        error = %e,
                        "retrying feed request"
                    );
                    thread::sleep(Duration::from_secs(backoff_secs));
                    backoff_secs *= 2;
                    attempt += 1;
                }
            }
        }
    }
}

/// Pull a readable message out of a feed error body.
///
/// The feed answers either `{"errors": "text"}` or
/// `{"errors": {"field": ["text", ...]}}`.
pub(super) fn extract_feed_error(body: &serde_json::Value, status: u16) -> String {
    match &body["errors"] {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(fields) => {
            let mut parts: Vec<String> = fields
                .iter()
                .map(|(field, v)| {
                    let detail = match v {
                        serde_json::Value::Array(items) => items
                            .iter()
                            .filter_map(|i| i.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                        other => other.to_string(),
                    };
                    format!("{field}: {detail}")
                })
                .collect();
            parts.sort();
            parts.join("; ")
        }
        _ => format!("HTTP {status}"),
    }
}

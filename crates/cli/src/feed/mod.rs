//! HTTP order feed and customer directory.
//!
//! The shop's admin API lists orders and customers as JSON pages ordered by
//! ascending id. Pages are walked with a `since_id` cursor until a short
//! page comes back.

mod common;
mod customers;
mod orders;

use floorbook_config::settings::FeedSettings;
use url::Url;

use crate::exit_codes;
use crate::CliError;

use common::{extract_feed_error, FetchClient};

/// Client for the shop's order feed. Implements both
/// [`floorbook_recon::OrderSource`] and [`floorbook_recon::CustomerDirectory`].
pub struct FeedClient {
    client: FetchClient,
    token: String,
    base_url: Url,
    page_size: u32,
    quiet: bool,
    label: String,
}

impl FeedClient {
    pub fn new(base_url: &str, token: String, settings: &FeedSettings) -> Result<Self, CliError> {
        // Url::join replaces the last path segment unless the base ends in '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized).map_err(|e| {
            CliError::args(format!("invalid feed URL '{base_url}': {e}"))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(CliError::args(format!(
                "feed URL must be http or https, got '{}'",
                base_url.scheme()
            )));
        }

        let label = format!("feed:{}", base_url.host_str().unwrap_or("localhost"));
        let client = FetchClient::new(
            &label,
            settings.timeout_secs,
            settings.max_retries,
            extract_feed_error,
        )?;

        Ok(Self {
            client,
            token,
            base_url,
            page_size: settings.page_size.clamp(1, 250),
            quiet: false,
            label,
        })
    }

    /// Suppress per-page progress on stderr.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    fn endpoint(&self, resource: &str) -> Result<Url, CliError> {
        self.base_url.join(resource).map_err(|e| CliError {
            code: exit_codes::EXIT_USAGE,
            message: format!("cannot build feed URL for {resource}: {e}"),
            hint: None,
        })
    }

    /// Walk every page of `resource`, returning the items under `key`.
    ///
    /// Guards against a feed that keeps returning the same cursor.
    fn fetch_all_pages(
        &self,
        resource: &str,
        key: &str,
        filters: &[(String, String)],
    ) -> Result<Vec<serde_json::Value>, CliError> {
        let url = self.endpoint(resource)?;
        let show_progress = !self.quiet && atty::is(atty::Stream::Stderr);

        let mut items = Vec::new();
        let mut since_id: Option<i64> = None;
        let mut page = 0u32;

        loop {
            page += 1;
            let mut params = filters.to_vec();
            params.push(("limit".to_string(), self.page_size.to_string()));
            if let Some(after) = since_id {
                params.push(("since_id".to_string(), after.to_string()));
            }

            let token = self.token.as_str();
            let body = self.client.request_with_retry(|http| {
                http.get(url.clone())
                    .bearer_auth(token)
                    .header("accept", "application/json")
                    .query(&params)
            })?;

            let data = body[key].as_array().ok_or_else(|| CliError {
                code: exit_codes::EXIT_FEED_UPSTREAM,
                message: format!("{} response missing '{}' array", self.client.source_name(), key),
                hint: None,
            })?;

            if show_progress {
                eprintln!("  page {}: {} {}", page, data.len(), key);
            }

            let full_page = is_full_page(data.len(), self.page_size);
            let last_id = data.last().and_then(|item| item["id"].as_i64());
            items.extend(data.iter().cloned());

            if !full_page {
                break;
            }

            let last_id = last_id.ok_or_else(|| CliError {
                code: exit_codes::EXIT_FEED_UPSTREAM,
                message: format!(
                    "{} item missing numeric 'id' field for pagination",
                    self.client.source_name()
                ),
                hint: None,
            })?;

            if since_id.is_some_and(|prev| last_id <= prev) {
                return Err(CliError {
                    code: exit_codes::EXIT_FEED_UPSTREAM,
                    message: format!(
                        "{} pagination stuck: since_id={} did not advance",
                        self.client.source_name(),
                        last_id
                    ),
                    hint: None,
                });
            }

            since_id = Some(last_id);
        }

        Ok(items)
    }
}

/// A page as long as the requested limit means there may be more.
fn is_full_page(len: usize, page_size: u32) -> bool {
    len >= page_size as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let feed = FeedClient::new(
            "https://shop.example.com/admin/api",
            "tok".into(),
            &FeedSettings::default(),
        )
        .unwrap();
        assert_eq!(
            feed.endpoint("orders.json").unwrap().as_str(),
            "https://shop.example.com/admin/api/orders.json"
        );
        assert_eq!(feed.label, "feed:shop.example.com");
    }

    #[test]
    fn test_rejects_non_http_url() {
        let err = FeedClient::new("ftp://shop.example.com", "tok".into(), &FeedSettings::default())
            .err()
            .unwrap();
        assert_eq!(err.code, exit_codes::EXIT_USAGE);

        let err = FeedClient::new("not a url", "tok".into(), &FeedSettings::default())
            .err()
            .unwrap();
        assert!(err.message.contains("invalid feed URL"));
    }

    #[test]
    fn test_page_size_is_clamped() {
        let settings = FeedSettings {
            page_size: 10_000,
            ..FeedSettings::default()
        };
        let feed = FeedClient::new("https://shop.example.com", "tok".into(), &settings).unwrap();
        assert_eq!(feed.page_size, 250);
    }

    #[test]
    fn test_full_page_compares_without_truncation() {
        assert!(is_full_page(250, 250));
        assert!(!is_full_page(249, 250));
        assert!(is_full_page(u32::MAX as usize + 2, 250));
    }
}

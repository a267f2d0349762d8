//! `GET customers.json` for display names.

use floorbook_recon::{Customer, CustomerDirectory, SourceError};

use crate::exit_codes;
use crate::CliError;

use super::FeedClient;

impl FeedClient {
    pub fn fetch_all_customers(&self) -> Result<Vec<Customer>, CliError> {
        let items = self.fetch_all_pages("customers.json", "customers", &[])?;
        items
            .into_iter()
            .map(|item| {
                let id = item["id"].clone();
                serde_json::from_value(item).map_err(|e| CliError {
                    code: exit_codes::EXIT_FEED_UPSTREAM,
                    message: format!("malformed customer {id} from feed: {e}"),
                    hint: None,
                })
            })
            .collect()
    }
}

impl CustomerDirectory for FeedClient {
    fn fetch_customers(&self) -> Result<Vec<Customer>, SourceError> {
        self.fetch_all_customers().map_err(|e| SourceError::Request {
            source_name: self.label.clone(),
            message: e.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floorbook_config::settings::FeedSettings;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_customers_single_page() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/customers.json")
                .query_param("limit", "250")
                .header("authorization", "Bearer tok_test");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"customers": [
                    {"id": 5, "first_name": "Ana", "last_name": "Díaz", "email": "ana@example.com", "orders_count": 3},
                    {"id": 6, "first_name": "Ben", "last_name": null}
                ]}));
        });

        let settings = FeedSettings {
            max_retries: 0,
            ..FeedSettings::default()
        };
        let feed = FeedClient::new(&server.base_url(), "tok_test".into(), &settings)
            .unwrap()
            .quiet(true);
        let customers = feed.fetch_customers().unwrap();

        mock.assert();
        assert_eq!(customers.len(), 2);
        assert_eq!(customers[0].display_name(), "Ana Díaz");
        assert_eq!(customers[1].customer_id, 6);
    }
}

//! `GET orders.json` into [`RawOrder`]s.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::debug;

use floorbook_recon::{OrderSource, RawOrder, SourceError};

use crate::exit_codes;
use crate::CliError;

use super::FeedClient;

impl FeedClient {
    /// Every order created at or after `since`, any financial status.
    pub fn fetch_orders_since(&self, since: DateTime<Utc>) -> Result<Vec<RawOrder>, CliError> {
        let filters = vec![
            ("status".to_string(), "any".to_string()),
            (
                "created_at_min".to_string(),
                since.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        ];
        let items = self.fetch_all_pages("orders.json", "orders", &filters)?;
        let orders = items
            .into_iter()
            .map(parse_order)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(source = %self.label, count = orders.len(), "fetched orders");
        Ok(orders)
    }
}

impl OrderSource for FeedClient {
    fn name(&self) -> &str {
        &self.label
    }

    fn fetch_orders(&self, since: DateTime<Utc>) -> Result<Vec<RawOrder>, SourceError> {
        self.fetch_orders_since(since).map_err(|e| SourceError::Request {
            source_name: self.label.clone(),
            message: e.message,
        })
    }
}

/// Flatten the nested `customer` object the feed sends into the order's
/// own customer fields, then deserialize.
fn parse_order(mut item: Value) -> Result<RawOrder, CliError> {
    let id = item["id"].clone();

    if let Some(customer) = item.get("customer").filter(|c| c.is_object()).cloned() {
        if let Some(obj) = item.as_object_mut() {
            if obj.get("customer_id").map_or(true, Value::is_null) {
                obj.insert("customer_id".into(), customer["id"].clone());
            }
            if obj.get("customer_name").map_or(true, Value::is_null) {
                let first = customer["first_name"].as_str().unwrap_or("").trim();
                let last = customer["last_name"].as_str().unwrap_or("").trim();
                let full = format!("{first} {last}").trim().to_string();
                if !full.is_empty() {
                    obj.insert("customer_name".into(), Value::String(full));
                }
            }
            if obj.get("email").map_or(true, Value::is_null) {
                if let Some(email) = customer["email"].as_str() {
                    obj.insert("email".into(), Value::String(email.to_string()));
                }
            }
            obj.remove("customer");
        }
    }

    serde_json::from_value(item).map_err(|e| CliError {
        code: exit_codes::EXIT_FEED_UPSTREAM,
        message: format!("malformed order {id} from feed: {e}"),
        hint: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use floorbook_config::settings::FeedSettings;
    use floorbook_recon::model::FinancialStatus;
    use httpmock::prelude::*;
    use serde_json::json;

    fn mock_order(id: i64, title: &str, variant: &str) -> Value {
        json!({
            "id": id,
            "name": format!("#{id}"),
            "created_at": "2025-05-12T09:30:00-04:00",
            "financial_status": "paid",
            "note": null,
            "total_price": "60.00",
            "total_discounts": "0.00",
            "customer": {"id": 500 + id, "first_name": "Ana", "last_name": "Díaz", "email": "ana@example.com"},
            "line_items": [{"title": title, "variant_title": variant, "price": "60.00", "quantity": 1}]
        })
    }

    fn feed(server: &MockServer, page_size: u32) -> FeedClient {
        let settings = FeedSettings {
            page_size,
            max_retries: 0,
            ..FeedSettings::default()
        };
        FeedClient::new(&server.base_url(), "tok_test".into(), &settings)
            .unwrap()
            .quiet(true)
    }

    fn since() -> DateTime<Utc> {
        "2025-04-28T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_parse_order_flattens_customer() {
        let order = parse_order(mock_order(7, "Level 1", "Term 2 / Leader")).unwrap();
        assert_eq!(order.customer_id, Some(507));
        assert_eq!(order.customer_name.as_deref(), Some("Ana Díaz"));
        assert_eq!(order.email.as_deref(), Some("ana@example.com"));
        assert_eq!(order.total_price, 6000);
        assert_eq!(order.financial_status, FinancialStatus::Paid);
        assert_eq!(order.note, "");
    }

    #[test]
    fn test_parse_order_without_customer() {
        let mut item = mock_order(8, "Shines", "");
        item["customer"] = Value::Null;
        let order = parse_order(item).unwrap();
        assert_eq!(order.customer_id, None);
    }

    #[test]
    fn test_parse_order_malformed() {
        let err = parse_order(json!({"id": 9, "created_at": "yesterday"})).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_FEED_UPSTREAM);
        assert!(err.message.contains("malformed order 9"));
    }

    // ── Pagination across 2 pages ───────────────────────────────────

    #[test]
    fn test_pagination_two_pages() {
        let server = MockServer::start();

        let page1 = server.mock(|when, then| {
            when.method(GET)
                .path("/orders.json")
                .query_param("status", "any")
                .query_param("created_at_min", "2025-04-28T00:00:00Z")
                .query_param("limit", "2")
                .query_param_missing("since_id")
                .header("authorization", "Bearer tok_test");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"orders": [
                    mock_order(101, "Level 1", "Term 2 / Leader"),
                    mock_order(102, "Shines", "Term 2"),
                ]}));
        });

        let page2 = server.mock(|when, then| {
            when.method(GET)
                .path("/orders.json")
                .query_param("since_id", "102");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"orders": [mock_order(103, "Body Movement", "Term 2")]}));
        });

        let orders = feed(&server, 2).fetch_orders_since(since()).unwrap();

        page1.assert();
        page2.assert();
        let ids: Vec<i64> = orders.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![101, 102, 103]);
    }

    #[test]
    fn test_exact_multiple_needs_empty_last_page() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/orders.json").query_param_missing("since_id");
            then.status(200)
                .json_body(json!({"orders": [mock_order(1, "Level 2", "Term 2 / Follower")]}));
        });
        let tail = server.mock(|when, then| {
            when.method(GET).path("/orders.json").query_param("since_id", "1");
            then.status(200).json_body(json!({"orders": []}));
        });

        let orders = feed(&server, 1).fetch_orders_since(since()).unwrap();
        tail.assert();
        assert_eq!(orders.len(), 1);
    }

    #[test]
    fn test_stuck_cursor_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/orders.json");
            then.status(200)
                .json_body(json!({"orders": [mock_order(5, "Level 1", "Term 2 / Leader")]}));
        });

        let err = feed(&server, 1).fetch_orders_since(since()).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_FEED_UPSTREAM);
        assert!(err.message.contains("pagination stuck"), "{}", err.message);
    }

    #[test]
    fn test_missing_orders_array() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/orders.json");
            then.status(200).json_body(json!({"data": []}));
        });

        let err = feed(&server, 50).fetch_orders_since(since()).unwrap_err();
        assert!(err.message.contains("missing 'orders' array"));
    }

    #[test]
    fn test_order_source_maps_errors() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/orders.json");
            then.status(403).json_body(json!({"errors": "forbidden"}));
        });

        let source = feed(&server, 50);
        let err = source.fetch_orders(since()).unwrap_err();
        match err {
            SourceError::Request { source_name, message } => {
                assert_eq!(source_name, source.name());
                assert!(message.contains("forbidden"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

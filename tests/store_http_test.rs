use httpmock::prelude::*;
use kiosk_reconcile::domain::model::ListQuery;
use kiosk_reconcile::utils::error::ReconcileError;
use kiosk_reconcile::{AppConfig, ReconcileService};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

const DOC: &str = "/v4/spreadsheets/doc-1";

fn config(server: &MockServer) -> AppConfig {
    let content = format!(
        r#"
[orders]
endpoint = "{orders}"
api_key = "k"
username = "u"

[sheets]
endpoint = "{sheets}"
spreadsheet_id = "doc-1"
access_token = "sheet-token"
cache_ttl_seconds = 300

[tables.returns]
sheet = "Returns"
last_column = "H"
key_column = "D"
key_match = "digits-only"
timestamp_column = "A"
status_column = "G"
columns = ["Timestamp", "Name", "Type", "Order", "Reason", "Notes", "Status", "Staff"]
"#,
        orders = server.url("/do/WS/NetoAPI"),
        sheets = server.base_url(),
    );
    AppConfig::from_toml_str(&content).unwrap()
}

fn values_path(range: &str) -> String {
    format!("{}/values/{}", DOC, range)
}

#[tokio::test]
async fn test_update_by_key_scans_then_writes_one_cell() {
    let server = MockServer::start();

    let scan = server.mock(|when, then| {
        when.method(GET)
            .path(values_path("'Returns'!D2:D"))
            .header("authorization", "Bearer sheet-token");
        then.status(200).json_body(json!({
            "range": "Returns!D2:D1000",
            "majorDimension": "ROWS",
            "values": [["456"], ["000123"], ["123"]]
        }));
    });
    let write = server.mock(|when, then| {
        when.method(PUT)
            .path(values_path("'Returns'!G3"))
            .query_param("valueInputOption", "USER_ENTERED")
            .json_body_partial(r#"{"values":[["Refunded"]]}"#);
        then.status(200).json_body(json!({"updatedCells": 1}));
    });

    let service = ReconcileService::from_config(&config(&server)).unwrap();
    let outcome = service
        .update_by_key("returns", "123", "Status", "Refunded")
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.row_number, 3);
    scan.assert_hits(1);
    write.assert_hits(1);
}

#[tokio::test]
async fn test_update_unknown_key_is_not_found() {
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(GET).path(values_path("'Returns'!D2:D"));
        then.status(200).json_body(json!({"values": [["456"]]}));
    });
    let write = server.mock(|when, then| {
        when.method(PUT);
        then.status(200).json_body(json!({}));
    });

    let service = ReconcileService::from_config(&config(&server)).unwrap();
    let err = service
        .update_by_key("returns", "999", "Status", "Refunded")
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    write.assert_hits(0);
}

#[tokio::test]
async fn test_listing_reads_the_table_once_within_ttl() {
    let server = MockServer::start();

    let read = server.mock(|when, then| {
        when.method(GET).path(values_path("'Returns'!A1:H"));
        then.status(200).json_body(json!({
            "values": [
                ["Timestamp", "Name", "Type", "Order", "Reason", "Notes", "Status", "Staff"],
                ["3/1/2024 09:00:00", "Ann", "Return Product", "N1", "", "", "Open"],
                ["3/2/2024 09:00:00", "Ben", "Return Product", "N2", "", "", "Refunded", "jo"]
            ]
        }));
    });

    let service = ReconcileService::from_config(&config(&server)).unwrap();
    let first = service.list("returns", &ListQuery::default()).await.unwrap();
    let filtered = service
        .list(
            "returns",
            &ListQuery {
                status: Some("open".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(first.total, 2);
    assert_eq!(first.items[0].fields["Name"], "Ben");
    assert_eq!(first.items[1].fields["Staff"], "");
    assert_eq!(first.distinct_statuses, vec!["Open", "Refunded"]);
    assert_eq!(filtered.total, 1);
    assert_eq!(filtered.items[0].row_number, 2);
    read.assert_hits(1);
}

#[tokio::test]
async fn test_append_inserts_rows() {
    let server = MockServer::start();

    let append = server.mock(|when, then| {
        when.method(POST)
            .path(values_path("'Returns'!A1:H:append"))
            .query_param("insertDataOption", "INSERT_ROWS")
            .json_body_partial(r#"{"values":[["", "Cy", "Return Product", "N3"]]}"#);
        then.status(200).json_body(json!({
            "updates": {"updatedRange": "Returns!A4:D4", "updatedRows": 1}
        }));
    });

    let service = ReconcileService::from_config(&config(&server)).unwrap();
    let mut fields = BTreeMap::new();
    fields.insert("Name".to_string(), "Cy".to_string());
    fields.insert("Type".to_string(), "Return Product".to_string());
    fields.insert("Order".to_string(), "N3".to_string());

    let outcome = service.append_fields("returns", &fields).await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.updated_range.as_deref(), Some("Returns!A4:D4"));
    append.assert_hits(1);
}

#[tokio::test]
async fn test_resort_clears_then_writes_sorted_image() {
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(GET).path(values_path("'Returns'!A1:H"));
        then.status(200).json_body(json!({
            "values": [
                ["Timestamp", "Name"],
                ["3/5/2024 09:00:00", "Late"],
                ["not a date", "Unknown"],
                ["3/1/2024 09:00:00", "Early"]
            ]
        }));
    });
    let clear = server.mock(|when, then| {
        when.method(POST).path(values_path("'Returns'!A1:H:clear"));
        then.status(200).json_body(json!({"clearedRange": "Returns!A1:H4"}));
    });
    let write = server.mock(|when, then| {
        when.method(PUT)
            .path(values_path("'Returns'!A1:H"))
            .json_body_partial(
                r#"{"values":[
                    ["Timestamp","Name"],
                    ["3/1/2024 09:00:00","Early"],
                    ["3/5/2024 09:00:00","Late"],
                    ["not a date","Unknown"]
                ]}"#,
            );
        then.status(200).json_body(json!({"updatedRows": 4}));
    });

    let service = ReconcileService::from_config(&config(&server)).unwrap();
    let outcome = service.resort("returns").await.unwrap();

    assert_eq!(outcome.rows_sorted, 3);
    clear.assert_hits(1);
    write.assert_hits(1);
}

#[tokio::test]
async fn test_capacity_and_expand_use_sheet_metadata() {
    let server = MockServer::start();

    let meta = server.mock(|when, then| {
        when.method(GET)
            .path(DOC)
            .query_param("fields", "sheets.properties");
        then.status(200).json_body(json!({
            "sheets": [
                {"properties": {"sheetId": 3, "title": "Pickups", "gridProperties": {"rowCount": 500}}},
                {"properties": {"sheetId": 7, "title": "Returns", "gridProperties": {"rowCount": 200, "columnCount": 8}}}
            ]
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path(values_path("'Returns'!D1:D"));
        then.status(200).json_body(json!({
            "values": [["Order"], ["N1"], [""], ["N3"]]
        }));
    });
    let batch = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{}:batchUpdate", DOC))
            .json_body_partial(
                r#"{"requests":[{"updateSheetProperties":{
                    "properties":{"sheetId":7,"gridProperties":{"rowCount":300}},
                    "fields":"gridProperties.rowCount"
                }}]}"#,
            );
        then.status(200).json_body(json!({"replies": [{}]}));
    });

    let service = ReconcileService::from_config(&config(&server)).unwrap();

    let report = service.capacity("returns").await.unwrap();
    assert_eq!(report.used_rows, 4);
    assert_eq!(report.total_rows, 200);
    assert_eq!(report.available_rows, 196);
    assert_eq!(report.available_pct, 98.0);

    service.expand("returns", 100).await.unwrap();
    batch.assert_hits(1);
    // capacity + expand(讀取、設定) + expand 後的報告
    meta.assert_hits(4);

    service.expand("returns", 0).await.unwrap();
    batch.assert_hits(1);
}

#[tokio::test]
async fn test_backend_error_message_is_reported() {
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(GET);
        then.status(400).json_body(json!({
            "error": {"code": 400, "message": "Unable to parse range: 'Returns'!A1:H", "status": "INVALID_ARGUMENT"}
        }));
    });

    let service = ReconcileService::from_config(&config(&server)).unwrap();
    let err = service.list("returns", &ListQuery::default()).await.unwrap_err();

    match err {
        ReconcileError::ProtocolError { message } => {
            assert!(message.contains("Unable to parse range"));
        }
        other => panic!("expected ProtocolError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_sheet_read_times_out_as_transport_error() {
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(GET).path(values_path("'Returns'!A1:H"));
        then.status(200)
            .delay(Duration::from_secs(3))
            .json_body(json!({"values": []}));
    });

    let mut config = config(&server);
    config.sheets.timeout_seconds = Some(1);
    let service = ReconcileService::from_config(&config).unwrap();

    let started = Instant::now();
    let err = service.list("returns", &ListQuery::default()).await.unwrap_err();
    let elapsed = started.elapsed();

    match &err {
        ReconcileError::TransportError { message } => assert!(message.contains("timed out")),
        other => panic!("expected TransportError, got {:?}", other),
    }
    assert!(err.is_retryable());
    assert!(elapsed >= Duration::from_millis(900), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2500), "returned after {:?}", elapsed);
}

#[tokio::test]
async fn test_malformed_append_response_is_a_protocol_error() {
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(POST).path(values_path("'Returns'!A1:H:append"));
        then.status(200)
            .json_body(json!({"updates": {"updatedRange": 42}}));
    });

    let service = ReconcileService::from_config(&config(&server)).unwrap();
    let mut fields = BTreeMap::new();
    fields.insert("Name".to_string(), "Cy".to_string());

    let err = service.append_fields("returns", &fields).await.unwrap_err();

    assert!(matches!(err, ReconcileError::ProtocolError { .. }));
}

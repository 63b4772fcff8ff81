use super::*;
use crate::{
    domain::{CryptoMessage, Holding, InvestmentReport, ResourceKind, Sentiment},
    error::{check_envelope, unwrap_data, ErrorCode},
};
use serde_json::json;

#[test]
fn bare_array_counts_its_own_rows() {
    let normalized = normalize_list_response(json!([{ "id": 1, "coin": "BTC" }]));
    assert_eq!(normalized.shape, ResponseShape::Sequence);
    assert_eq!(normalized.rows.len(), 1);
    assert_eq!(normalized.total, 1);
}

#[test]
fn paged_object_uses_backend_total() {
    let normalized = normalize_list_response(json!({
        "code": 200,
        "rows": [{ "id": 1 }, { "id": 2 }],
        "total": 57
    }));
    assert_eq!(normalized.shape, ResponseShape::Paged);
    assert_eq!(normalized.rows.len(), 2);
    assert_eq!(normalized.total, 57);
}

#[test]
fn paged_object_accepts_float_totals() {
    let integral = normalize_list_response(json!({ "rows": [{ "id": 1 }], "total": 5.0 }));
    assert_eq!(integral.total, 5);
    assert_eq!(integral.shape, ResponseShape::Paged);

    let fractional = normalize_list_response(json!({ "rows": [{ "id": 1 }], "total": 7.9 }));
    assert_eq!(fractional.total, 7);
}

#[test]
fn paged_object_falls_back_to_row_count_when_total_is_not_a_number() {
    for total in [json!("57"), json!(null), json!(-3), json!(-0.5), json!([5])] {
        let normalized = normalize_list_response(json!({
            "rows": [{ "id": 1 }, { "id": 2 }, { "id": 3 }],
            "total": total
        }));
        assert_eq!(normalized.total, 3, "total payload {total}");
    }

    let without_total = normalize_list_response(json!({ "rows": [{ "id": 1 }] }));
    assert_eq!(without_total.total, 1);
}

#[test]
fn payloads_without_rows_are_empty_pages() {
    for raw in [
        json!({ "total": 9 }),
        json!({ "rows": "nope", "total": 9 }),
        json!(null),
        json!("rows"),
        json!(42),
    ] {
        let normalized = normalize_list_response(raw.clone());
        assert_eq!(normalized.shape, ResponseShape::Malformed, "payload {raw}");
        assert!(normalized.rows.is_empty());
        assert_eq!(normalized.total, 0);
    }
}

#[test]
fn query_pairs_follow_backend_paging_names() {
    let params = QueryParams::new(3, 50)
        .with_filter("coin", "BTC")
        .with_filter("pageNum", "99")
        .with_filter("source", "")
        .with_sorter(Sort::descending("usdtValue"));

    assert_eq!(
        params.to_query_pairs(),
        vec![
            ("pageNum".to_string(), "3".to_string()),
            ("pageSize".to_string(), "50".to_string()),
            ("coin".to_string(), "BTC".to_string()),
            ("orderByColumn".to_string(), "usdtValue".to_string()),
            ("isAsc".to_string(), "descending".to_string()),
        ]
    );
}

#[test]
fn default_params_are_first_page_of_twenty() {
    let params = QueryParams::default();
    assert_eq!(params.page, 1);
    assert_eq!(params.page_size, 20);
    assert!(params.validate().is_ok());
    assert!(QueryParams::new(0, 20).validate().is_err());
    assert!(QueryParams::new(1, 0).validate().is_err());
}

#[test]
fn parses_sort_strings() {
    assert_eq!("coin".parse::<Sort>().expect("sort"), Sort::ascending("coin"));
    assert_eq!(
        "priceUsd:DESC".parse::<Sort>().expect("sort"),
        Sort::descending("priceUsd")
    );
    assert!(":asc".parse::<Sort>().is_err());
    assert!("coin:sideways".parse::<Sort>().is_err());
}

#[test]
fn envelope_with_failure_code_is_an_error() {
    let err = check_envelope(&json!({ "code": 500, "msg": "collect failed" })).expect_err("fail");
    assert_eq!(err.code, ErrorCode::Internal);
    assert_eq!(err.message, "collect failed");

    assert!(check_envelope(&json!({ "code": 200, "msg": "ok" })).is_ok());
    assert!(check_envelope(&json!([{ "code": 500 }])).is_ok());
    assert!(check_envelope(&json!({ "rows": [] })).is_ok());
}

#[test]
fn unwraps_single_row_lookup_envelopes() {
    let row = unwrap_data(json!({ "code": 200, "msg": "ok", "data": { "id": 4 } }));
    assert_eq!(row, json!({ "id": 4 }));

    let bare = unwrap_data(json!({ "id": 4, "data": "x" }));
    assert_eq!(bare, json!({ "id": 4, "data": "x" }));
}

#[test]
fn decodes_backend_rows() {
    let holding: Holding = serde_json::from_value(json!({
        "id": 1,
        "coin": "BTC",
        "amount": 0.5,
        "usdtValue": 100,
        "costPrice": null,
        "change24h": -1.25,
        "updateTime": "2024-05-01 08:30:00"
    }))
    .expect("holding");
    assert_eq!(holding.id, RowId::Number(1));
    assert_eq!(holding.usdt_value, Some(100.0));
    assert_eq!(holding.cost_price, None);
    assert_eq!(holding.change_24h, Some(-1.25));
    assert_eq!(
        holding.update_time.map(|ts| ts.to_string()),
        Some("2024-05-01 08:30:00".to_string())
    );

    let message: CryptoMessage = serde_json::from_value(json!({
        "id": "m-7",
        "coin": "ETH",
        "content": "ETF inflows",
        "sentiment": "BULLISH",
        "publishTime": "not a time"
    }))
    .expect("message");
    assert_eq!(message.id, RowId::Text("m-7".to_string()));
    assert_eq!(message.sentiment, Some(Sentiment::Unknown));
    assert_eq!(message.publish_time, None);

    let report: InvestmentReport = serde_json::from_value(json!({
        "id": 3,
        "messageId": 7,
        "status": "2",
        "auditTime": "2024-05-01T08:30:00Z"
    }))
    .expect("report");
    assert_eq!(report.status, Some(ReportStatus::Rejected));
    assert!(report.audit_time.is_some());
}

#[test]
fn audit_request_serializes_wire_names() {
    let body = serde_json::to_value(ReportAuditRequest {
        id: RowId::Number(5),
        status: ReportStatus::Approved,
        audit_by: "Admin".to_string(),
        reject_reason: String::new(),
    })
    .expect("serialize");
    assert_eq!(
        body,
        json!({ "id": 5, "status": "1", "auditBy": "Admin", "rejectReason": "" })
    );
}

#[test]
fn row_ids_parse_numbers_before_text() {
    assert_eq!("42".parse::<RowId>().expect("id"), RowId::Number(42));
    assert_eq!("abc".parse::<RowId>().expect("id"), RowId::Text("abc".to_string()));
    assert_eq!(RowId::Number(9).to_string(), "9");
}

#[test]
fn resource_paths_sit_under_crypto_prefix() {
    let mut names: Vec<&str> = ResourceKind::ALL.iter().map(|kind| kind.name()).collect();
    names.dedup();
    assert_eq!(names.len(), 4);
    for kind in ResourceKind::ALL {
        assert!(kind.path().starts_with("crypto/"), "{kind}");
    }
    assert_eq!(ResourceKind::Messages.path(), "crypto/message");
}

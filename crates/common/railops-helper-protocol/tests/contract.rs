//! Pin tests for the frozen helper contract.
//!
//! A failing test here means a published wire shape changed. Fields may be
//! added (optional, defaulted); the asserted sets below may only ever grow.

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use railops_helper_protocol::*;
use serde_json::{json, Value};

fn field_names(value: &Value) -> Vec<String> {
    value
        .as_object()
        .expect("contract bodies are JSON objects")
        .keys()
        .cloned()
        .collect()
}

fn assert_has_fields(value: &Value, frozen: &[&str]) {
    let present = field_names(value);
    for field in frozen {
        assert!(
            present.iter().any(|p| p == field),
            "frozen field {field:?} missing from {present:?}"
        );
    }
}

#[test]
fn setting_value_response_shape() {
    let body = serde_json::to_value(SettingValueResponse {
        key: "scan_directory".into(),
        department: "tanhai".into(),
        value: "C:/scans".into(),
    })
    .unwrap();
    assert_has_fields(&body, &["key", "department", "value"]);
    assert_eq!(body["department"], "tanhai");
}

#[test]
fn helper_health_response_shape() {
    let mut services = BTreeMap::new();
    services.insert("drive".to_string(), "ok".to_string());
    services.insert("scanner".to_string(), "ok".to_string());
    let body = serde_json::to_value(HelperHealthResponse {
        status: "healthy".into(),
        timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap(),
        version: "1.4.2".into(),
        services,
    })
    .unwrap();
    assert_has_fields(&body, &["status", "timestamp", "version", "services"]);
}

#[test]
fn pdf_scan_response_shape() {
    let body = serde_json::to_value(PdfScanResponse {
        success: true,
        file_name: "batch-2026-03.pdf".into(),
        total_pages: 12,
        barcodes: vec![BarcodeHit {
            page: 1,
            data: "67e55044-10b1-426f-9247-bb680e5fe0c8|EI|2026|03".into(),
            format: "code128".into(),
        }],
        error_message: None,
    })
    .unwrap();
    assert_has_fields(
        &body,
        &["success", "file_name", "total_pages", "barcodes", "error_message"],
    );
    assert_has_fields(&body["barcodes"][0], &["page", "data", "format"]);
}

#[test]
fn pdf_process_response_shape() {
    let body = serde_json::to_value(PdfProcessResponse {
        success: true,
        task_id: "f8a2b0ce".into(),
        file_name: "batch.pdf".into(),
        total_pages: 8,
        barcodes_found: 4,
        files_created: 4,
        files_uploaded: 4,
        split_files: vec![SplitFileEntry {
            file_name: "EI-2026-03-0001.pdf".into(),
            page_start: 1,
            page_end: 2,
            barcode: "67e55044-10b1-426f-9247-bb680e5fe0c8|EI|2026|03".into(),
            uploaded: true,
            drive_link: Some("https://drive.example/abc".into()),
        }],
        error_message: None,
        processing_time_ms: 5_312,
    })
    .unwrap();
    assert_has_fields(
        &body,
        &[
            "success",
            "task_id",
            "file_name",
            "total_pages",
            "barcodes_found",
            "files_created",
            "files_uploaded",
            "split_files",
            "error_message",
            "processing_time_ms",
        ],
    );
}

#[test]
fn pdf_split_response_is_process_subset() {
    let split = serde_json::to_value(PdfSplitResponse {
        success: true,
        file_name: "batch.pdf".into(),
        total_pages: 8,
        barcodes_found: 4,
        files_created: 4,
        split_files: vec![],
        error_message: None,
    })
    .unwrap();
    let process_fields = [
        "success",
        "task_id",
        "file_name",
        "total_pages",
        "barcodes_found",
        "files_created",
        "files_uploaded",
        "split_files",
        "error_message",
        "processing_time_ms",
    ];
    for field in field_names(&split) {
        assert!(
            process_fields.contains(&field.as_str()),
            "split field {field:?} is not part of the process contract"
        );
    }
}

#[test]
fn barcode_generate_response_shape() {
    let body = serde_json::to_value(BarcodeGenerateResponse {
        success: true,
        data: "payload".into(),
        format: "code128".into(),
        image_format: "png".into(),
        base64_image: "iVBORw0KGgo=".into(),
        data_uri: "data:image/png;base64,iVBORw0KGgo=".into(),
        error_message: None,
    })
    .unwrap();
    assert_has_fields(
        &body,
        &[
            "success",
            "data",
            "format",
            "image_format",
            "base64_image",
            "data_uri",
            "error_message",
        ],
    );
}

#[test]
fn responses_tolerate_unknown_fields() {
    let with_extra = json!({
        "success": true,
        "file_name": "batch.pdf",
        "total_pages": 3,
        "barcodes": [],
        "error_message": null,
        "added_in_a_future_version": {"nested": true}
    });
    let parsed: PdfScanResponse = serde_json::from_value(with_extra).unwrap();
    assert!(parsed.success);
    assert_eq!(parsed.total_pages, 3);
}

#[test]
fn barcode_request_defaults() {
    let parsed: BarcodeGenerateRequest =
        serde_json::from_value(json!({"data": "x"})).unwrap();
    assert_eq!(parsed.format, "code128");
    assert_eq!(parsed.image_format, "png");
}

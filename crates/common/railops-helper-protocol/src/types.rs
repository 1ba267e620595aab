use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// CRITICAL `GET /api/settings/value/{key}` response on the cloud service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingValueResponse {
    pub key: String,
    pub department: String,
    pub value: String,
}

/// CRITICAL `GET /health` response on the helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelperHealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    /// Per-subservice status, keyed by service name.
    pub services: BTreeMap<String, String>,
}

/// One barcode located inside a scanned PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarcodeHit {
    pub page: u32,
    pub data: String,
    pub format: String,
}

/// One output file produced by a split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitFileEntry {
    pub file_name: String,
    pub page_start: u32,
    pub page_end: u32,
    pub barcode: String,
    pub uploaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_link: Option<String>,
}

/// `POST /api/pdf/scan` request on the helper. The helper reads the file
/// from its local scan directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfScanRequest {
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

/// CRITICAL `POST /api/pdf/scan` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfScanResponse {
    pub success: bool,
    pub file_name: String,
    pub total_pages: u32,
    pub barcodes: Vec<BarcodeHit>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// `POST /api/pdf/split` request on the helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfSplitRequest {
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

/// CRITICAL `POST /api/pdf/split` response: the `/process` field set minus
/// the upload bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfSplitResponse {
    pub success: bool,
    pub file_name: String,
    pub total_pages: u32,
    pub barcodes_found: u32,
    pub files_created: u32,
    pub split_files: Vec<SplitFileEntry>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// `POST /api/pdf/process` request on the helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfProcessRequest {
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

/// CRITICAL `POST /api/pdf/process` response (scan + split + upload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfProcessResponse {
    pub success: bool,
    pub task_id: String,
    pub file_name: String,
    pub total_pages: u32,
    pub barcodes_found: u32,
    pub files_created: u32,
    pub files_uploaded: u32,
    pub split_files: Vec<SplitFileEntry>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub processing_time_ms: u64,
}

/// `POST /api/barcode/generate` request on the helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarcodeGenerateRequest {
    pub data: String,
    #[serde(default = "default_barcode_format")]
    pub format: String,
    #[serde(default = "default_image_format")]
    pub image_format: String,
}

fn default_barcode_format() -> String {
    "code128".to_string()
}

fn default_image_format() -> String {
    "png".to_string()
}

/// CRITICAL `POST /api/barcode/generate` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarcodeGenerateResponse {
    pub success: bool,
    pub data: String,
    pub format: String,
    pub image_format: String,
    pub base64_image: String,
    pub data_uri: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

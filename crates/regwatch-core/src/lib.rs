use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("oracle failed: {0}")]
    Oracle(String),
    #[error("resolve failed: {0}")]
    Resolve(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("storage failed: {0}")]
    Storage(String),
    #[error("processing failed: {0}")]
    Processing(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Structured outcome of update detection for one framework check.
///
/// Serde defaults are deliberate: oracle responses frequently omit fields,
/// and a partial object must still parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(default)]
    pub framework_name: String,
    #[serde(default)]
    pub has_update: bool,
    /// Canonical `YYYY-MM-DD` when present and normalizable.
    #[serde(default)]
    pub latest_update_date: Option<String>,
    /// Candidate amendment document URL. When `has_update` is false the
    /// caller must treat this as not-to-be-fetched regardless of its value.
    #[serde(default)]
    pub document_url: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Verdict {
    /// Terminal neutral verdict: no update, date pinned to the baseline.
    pub fn neutral(framework_name: &str, baseline_date: &str) -> Self {
        Self {
            framework_name: framework_name.to_string(),
            has_update: false,
            latest_update_date: Some(baseline_date.to_string()),
            document_url: None,
            version: None,
            notes: None,
        }
    }
}

/// Why a download was rejected without being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// No direct document URL could be resolved.
    NoDirectUrl,
    /// Access denied after exhausting the attempt budget; manual or
    /// authenticated retrieval may be required.
    AccessDenied,
    /// Transport-level failures exhausted the attempt budget.
    TransportExhausted,
    /// Non-retryable HTTP status exhausted the attempt budget.
    HttpStatus,
    /// Body did not start with the PDF signature.
    NotAPdf,
    /// File exceeded the amendment size ceiling (assumed full framework
    /// document rather than an amendment).
    Oversized,
}

/// Result of an acquisition run. `Unavailable` is an expected, named
/// outcome; `Err` is reserved for environment problems.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadStatus {
    Downloaded(DownloadOutcome),
    Unavailable {
        reason: UnavailableReason,
        warnings: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadOutcome {
    /// Verified local path: starts with the PDF magic signature and is
    /// within the accepted size envelope.
    pub local_path: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    /// URL the bytes actually came from (may differ from the candidate
    /// after re-resolution).
    pub final_url: String,
    pub warnings: Vec<String>,
    pub timings_ms: BTreeMap<String, u128>,
}

/// Caller-supplied configuration for one framework check.
#[derive(Debug, Clone)]
pub struct CheckConfig {
    pub framework_name: String,
    /// Last known update date, canonical `YYYY-MM-DD`.
    pub baseline_date: String,
    pub framework_id: Option<i64>,
    pub download_dir: PathBuf,
    /// Run the downstream amendment processor after a successful download.
    pub process_amendment: bool,
    pub max_attempts: u32,
    pub max_amendment_bytes: u64,
    pub request_timeout: Duration,
    pub oracle_timeout: Duration,
}

impl CheckConfig {
    pub fn new(framework_name: &str, baseline_date: &str) -> Self {
        Self {
            framework_name: framework_name.to_string(),
            baseline_date: baseline_date.to_string(),
            framework_id: None,
            download_dir: std::env::temp_dir().join("regwatch-downloads"),
            process_amendment: false,
            max_attempts: 3,
            // Amendments are small; anything bigger is assumed to be the
            // full framework document.
            max_amendment_bytes: 15 * 1024 * 1024,
            request_timeout: Duration::from_secs(60),
            oracle_timeout: Duration::from_secs(45),
        }
    }
}

/// Final record produced by the pipeline. Verdict fields are frozen at
/// reconciliation time and never altered by acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub framework_name: String,
    pub has_update: bool,
    pub latest_update_date: Option<String>,
    pub document_url: Option<String>,
    pub version: Option<String>,
    pub notes: Option<String>,
    pub downloaded_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StoredBlob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing: Option<ProcessingOutcome>,
    pub warnings: Vec<String>,
    pub timings_ms: BTreeMap<String, u128>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    pub system: Option<String>,
    pub user: String,
    pub max_tokens: Option<u64>,
    pub temperature: Option<f64>,
}

/// Prompt-answering service. Returns free-form text with no guarantee of
/// valid JSON, requested fields, or factual accuracy.
#[async_trait::async_trait]
pub trait PromptBackend: Send + Sync {
    async fn complete(&self, req: &PromptRequest) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobUploadRequest {
    pub local_path: String,
    pub owner: String,
    pub file_name: String,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredBlob {
    pub url: String,
    pub key: String,
    pub stored_name: String,
}

/// Blob-storage collaborator. Upload failure is never fatal to a check;
/// the pipeline degrades to returning the local path only.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, req: &BlobUploadRequest) -> Result<StoredBlob>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub pdf_path: String,
    pub framework_name: String,
    pub framework_id: i64,
    pub effective_date: String,
    pub output_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOutcome {
    pub success: bool,
    #[serde(default)]
    pub output_file: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Downstream amendment-processing collaborator. Its failure is recorded
/// in the result but does not invalidate the downloaded document.
#[async_trait::async_trait]
pub trait AmendmentProcessor: Send + Sync {
    async fn process(&self, req: &ProcessRequest) -> Result<ProcessingOutcome>;
}

//! One full framework check: ask the oracle, extract and reconcile a
//! verdict, then (only when the verdict says so) acquire the amendment
//! document and hand it to the optional storage and processing
//! collaborators.
//!
//! Verdict fields are frozen once reconciliation has run. A download
//! failure, upload failure, or processing failure changes warnings and
//! the optional fields, never the verdict itself. `Err` escapes only for
//! an unreachable oracle or an unusable download directory.

use crate::acquire::{AcquireConfig, Acquirer};
use crate::{prompts, verdict};
use regwatch_core::{
    AmendmentProcessor, BlobStore, BlobUploadRequest, CheckConfig, CheckResult, DownloadStatus,
    Error, ProcessRequest, ProcessingOutcome, PromptBackend, PromptRequest, Result,
    UnavailableReason,
};
use std::collections::BTreeMap;
use std::time::Instant;

/// Optional downstream collaborators. Either may be absent; the pipeline
/// simply skips the corresponding stage.
#[derive(Default)]
pub struct PipelineDeps<'a> {
    pub blob_store: Option<&'a dyn BlobStore>,
    pub processor: Option<&'a dyn AmendmentProcessor>,
}

pub async fn run_update_check(
    cfg: &CheckConfig,
    oracle: &dyn PromptBackend,
    deps: PipelineDeps<'_>,
) -> Result<CheckResult> {
    let mut warnings: Vec<String> = Vec::new();
    let mut timings_ms: BTreeMap<String, u128> = BTreeMap::new();
    let total = Instant::now();

    let req = PromptRequest {
        system: Some(prompts::update_check_system_prompt(
            &cfg.framework_name,
            &cfg.baseline_date,
        )),
        user: prompts::update_check_user_prompt(&cfg.framework_name, &cfg.baseline_date),
        max_tokens: Some(1000),
        temperature: Some(0.2),
    };

    let t0 = Instant::now();
    let raw = tokio::time::timeout(cfg.oracle_timeout, oracle.complete(&req))
        .await
        .map_err(|_| Error::Oracle("update check query timed out".to_string()))??;
    timings_ms.insert("oracle".to_string(), t0.elapsed().as_millis());

    let t0 = Instant::now();
    let extraction = verdict::extract_verdict(&raw, &cfg.framework_name, &cfg.baseline_date);
    warnings.extend(extraction.warnings.iter().map(|w| w.to_string()));
    let (v, reconcile_warnings) = verdict::reconcile(extraction.verdict, &cfg.baseline_date);
    warnings.extend(reconcile_warnings.iter().map(|w| w.to_string()));
    timings_ms.insert("extract".to_string(), t0.elapsed().as_millis());

    // Verdict fields are final from here on.
    let mut result = CheckResult {
        framework_name: v.framework_name.clone(),
        has_update: v.has_update,
        latest_update_date: v.latest_update_date.clone(),
        document_url: v.document_url.clone(),
        version: v.version.clone(),
        notes: v.notes.clone(),
        downloaded_path: None,
        storage: None,
        processing: None,
        warnings,
        timings_ms,
    };

    if result.has_update {
        if let Some(url) = result.document_url.clone() {
            let t0 = Instant::now();
            let acquirer = Acquirer::new(AcquireConfig {
                download_dir: cfg.download_dir.clone(),
                max_attempts: cfg.max_attempts,
                max_amendment_bytes: cfg.max_amendment_bytes,
                request_timeout: cfg.request_timeout,
                backoff_base: std::time::Duration::from_secs(2),
            })?;
            let status = acquirer
                .acquire(&cfg.framework_name, &url, Some(oracle))
                .await?;
            result
                .timings_ms
                .insert("acquire".to_string(), t0.elapsed().as_millis());

            match status {
                DownloadStatus::Downloaded(out) => {
                    result.warnings.extend(out.warnings.clone());
                    for (k, v) in &out.timings_ms {
                        result.timings_ms.insert(format!("acquire_{k}"), *v);
                    }
                    result.downloaded_path = Some(out.local_path.clone());
                    upload_stage(cfg, deps.blob_store, &out.local_path, &mut result).await;
                    process_stage(cfg, deps.processor, &out.local_path, &mut result).await;
                }
                DownloadStatus::Unavailable { reason, warnings } => {
                    result.warnings.extend(warnings);
                    result.warnings.push(unavailable_code(reason).to_string());
                }
            }
        } else {
            result.warnings.push("update_without_document_url".to_string());
        }
    }

    result
        .timings_ms
        .insert("total".to_string(), total.elapsed().as_millis());
    Ok(result)
}

fn unavailable_code(reason: UnavailableReason) -> &'static str {
    match reason {
        UnavailableReason::NoDirectUrl => "download_unavailable_no_direct_url",
        UnavailableReason::AccessDenied => "download_unavailable_access_denied",
        UnavailableReason::TransportExhausted => "download_unavailable_transport",
        UnavailableReason::HttpStatus => "download_unavailable_http_status",
        UnavailableReason::NotAPdf => "download_unavailable_not_a_pdf",
        UnavailableReason::Oversized => "download_unavailable_oversized",
    }
}

/// Upload the verified document if a blob store is configured. Failure
/// degrades to keeping only the local path.
async fn upload_stage(
    cfg: &CheckConfig,
    store: Option<&dyn BlobStore>,
    local_path: &str,
    result: &mut CheckResult,
) {
    let Some(store) = store else { return };
    let file_name = std::path::Path::new(local_path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("amendment.pdf")
        .to_string();
    let req = BlobUploadRequest {
        local_path: local_path.to_string(),
        owner: cfg.framework_name.clone(),
        file_name,
        category: "framework_amendments".to_string(),
    };
    let t0 = Instant::now();
    match store.upload(&req).await {
        Ok(blob) => {
            result.storage = Some(blob);
        }
        Err(_) => {
            result.warnings.push("blob_upload_failed".to_string());
        }
    }
    result
        .timings_ms
        .insert("upload".to_string(), t0.elapsed().as_millis());
}

/// Hand the document to the amendment processor when enabled. A
/// processor error is recorded on the outcome, not propagated.
async fn process_stage(
    cfg: &CheckConfig,
    processor: Option<&dyn AmendmentProcessor>,
    local_path: &str,
    result: &mut CheckResult,
) {
    if !cfg.process_amendment {
        return;
    }
    let Some(processor) = processor else { return };
    let Some(framework_id) = cfg.framework_id else {
        result.warnings.push("processing_skipped_no_framework_id".to_string());
        return;
    };
    let effective_date = result
        .latest_update_date
        .clone()
        .unwrap_or_else(|| cfg.baseline_date.clone());
    let req = ProcessRequest {
        pdf_path: local_path.to_string(),
        framework_name: cfg.framework_name.clone(),
        framework_id,
        effective_date,
        output_dir: cfg.download_dir.to_string_lossy().to_string(),
    };
    let t0 = Instant::now();
    result.processing = Some(match processor.process(&req).await {
        Ok(outcome) => outcome,
        Err(e) => {
            result.warnings.push("amendment_processing_failed".to_string());
            ProcessingOutcome {
                success: false,
                output_file: None,
                error: Some(e.to_string()),
            }
        }
    });
    result
        .timings_ms
        .insert("process".to_string(), t0.elapsed().as_millis());
}

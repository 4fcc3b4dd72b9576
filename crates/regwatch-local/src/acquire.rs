//! Amendment document acquisition: download a resolved URL with browser-like
//! headers and cookie continuity, retry with backoff and 403-triggered
//! re-resolution, stream to a temp file, and validate before accepting.
//!
//! Validation failures ("not a PDF", "too large to be an amendment") are
//! expected, named outcomes (`DownloadStatus::Unavailable`), not errors.
//! `Err` is reserved for environment problems such as an uncreatable
//! download directory.

use crate::resolve;
use chrono::Utc;
use futures_util::StreamExt;
use regwatch_core::{
    DownloadOutcome, DownloadStatus, Error, PromptBackend, Result, UnavailableReason,
};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Clone)]
pub struct AcquireConfig {
    pub download_dir: PathBuf,
    pub max_attempts: u32,
    pub max_amendment_bytes: u64,
    pub request_timeout: Duration,
    /// Base delay for exponential backoff between transient failures.
    pub backoff_base: Duration,
}

impl AcquireConfig {
    pub fn new(download_dir: PathBuf) -> Self {
        Self {
            download_dir,
            max_attempts: 3,
            max_amendment_bytes: 15 * 1024 * 1024,
            request_timeout: Duration::from_secs(60),
            backoff_base: Duration::from_secs(2),
        }
    }
}

/// Build the HTTP client used for acquisition: cookie continuity across
/// attempts, bounded redirects, and hang-proof default timeouts.
pub fn build_client(request_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::limited(10))
        .connect_timeout(Duration::from_secs(10))
        .timeout(request_timeout)
        .build()
        .map_err(|e| Error::Fetch(e.to_string()))
}

/// Realistic browser header set. Some document hosts reject obvious
/// programmatic clients outright.
fn browser_headers() -> Vec<(&'static str, String)> {
    vec![
        (
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        ),
        ("Accept", "application/pdf,application/octet-stream,*/*".to_string()),
        ("Accept-Language", "en-US,en;q=0.9".to_string()),
        ("Upgrade-Insecure-Requests", "1".to_string()),
        ("Sec-Fetch-Dest", "document".to_string()),
        ("Sec-Fetch-Mode", "navigate".to_string()),
        ("Sec-Fetch-Site", "none".to_string()),
        ("Cache-Control", "max-age=0".to_string()),
    ]
}

/// Alternate identity used after an access-denied response: different
/// client string, referer set to the URL's origin.
fn alternate_headers(target: &url::Url) -> Vec<(&'static str, String)> {
    let referer = format!(
        "{}://{}/",
        target.scheme(),
        target.host_str().unwrap_or_default()
    );
    vec![
        (
            "User-Agent",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        ),
        ("Accept", "application/pdf,application/octet-stream,*/*".to_string()),
        ("Accept-Language", "en-US,en;q=0.9".to_string()),
        ("Referer", referer),
    ]
}

enum TryError {
    /// HTTP 403 even after the alternate header set.
    Denied,
    /// Connection/timeout/body-stream failure; worth backing off and retrying.
    Transport(String),
    /// Any other non-2xx status; consumes attempts without re-resolution.
    Http(u16),
}

/// Per-try state for the retry loop. `AcquisitionAttempt` context lives
/// only here; it escapes only as warning codes on the outcome.
enum Step {
    Trying { url: String, attempt: u32 },
    Resolving { failed_url: String, attempt: u32 },
}

pub struct Acquirer {
    client: reqwest::Client,
    cfg: AcquireConfig,
}

impl Acquirer {
    pub fn new(cfg: AcquireConfig) -> Result<Self> {
        let client = build_client(cfg.request_timeout)?;
        Ok(Self { client, cfg })
    }

    pub fn with_client(client: reqwest::Client, cfg: AcquireConfig) -> Self {
        Self { client, cfg }
    }

    /// Acquire the amendment document behind `candidate_url`.
    ///
    /// When the candidate is not a direct PDF link, the oracle (if any) is
    /// asked once up front for a direct URL; it is asked again after each
    /// access-denied response, so the URL may change across retries.
    pub async fn acquire(
        &self,
        framework_name: &str,
        candidate_url: &str,
        oracle: Option<&dyn PromptBackend>,
    ) -> Result<DownloadStatus> {
        let mut warnings: Vec<String> = Vec::new();
        let mut timings_ms: BTreeMap<String, u128> = BTreeMap::new();

        std::fs::create_dir_all(&self.cfg.download_dir)
            .map_err(|e| Error::Io(format!("create download dir: {e}")))?;

        let mut url = candidate_url.to_string();
        if !resolve::looks_like_pdf_url(&url) {
            let t0 = Instant::now();
            let resolved = match oracle {
                Some(o) => resolve::resolve_pdf_url(o, &url, framework_name).await?,
                None => None,
            };
            timings_ms.insert("resolve".to_string(), t0.elapsed().as_millis());
            match resolved {
                Some(u) => {
                    warnings.push("url_resolved_to_pdf".to_string());
                    url = u;
                }
                None => {
                    warnings.push("no_direct_pdf_url".to_string());
                    return Ok(DownloadStatus::Unavailable {
                        reason: UnavailableReason::NoDirectUrl,
                        warnings,
                    });
                }
            }
        }

        let candidate = candidate_url.to_string();
        let mut step = Step::Trying { url, attempt: 0 };
        let mut last_denied = false;

        loop {
            match step {
                Step::Trying { url, attempt } => {
                    if attempt >= self.cfg.max_attempts {
                        let reason = if last_denied {
                            warnings.push("manual_or_authenticated_retrieval_required".to_string());
                            UnavailableReason::AccessDenied
                        } else {
                            UnavailableReason::TransportExhausted
                        };
                        return Ok(DownloadStatus::Unavailable { reason, warnings });
                    }

                    let t0 = Instant::now();
                    match self.try_once(&url, &mut warnings).await {
                        Ok(resp) => {
                            timings_ms
                                .insert("download".to_string(), t0.elapsed().as_millis());
                            return self
                                .finish_download(framework_name, resp, warnings, timings_ms)
                                .await;
                        }
                        Err(TryError::Denied) => {
                            last_denied = true;
                            warnings.push("access_denied".to_string());
                            step = Step::Resolving {
                                failed_url: url,
                                attempt,
                            };
                        }
                        Err(TryError::Transport(msg)) => {
                            last_denied = false;
                            warnings.push("transport_retry".to_string());
                            let _ = msg;
                            self.backoff(attempt).await;
                            step = Step::Trying {
                                url,
                                attempt: attempt + 1,
                            };
                        }
                        Err(TryError::Http(status)) => {
                            last_denied = false;
                            warnings.push("http_error_retry".to_string());
                            if attempt + 1 >= self.cfg.max_attempts {
                                let _ = status;
                                return Ok(DownloadStatus::Unavailable {
                                    reason: UnavailableReason::HttpStatus,
                                    warnings,
                                });
                            }
                            step = Step::Trying {
                                url,
                                attempt: attempt + 1,
                            };
                        }
                    }
                }
                Step::Resolving { failed_url, attempt } => {
                    // Ask for an alternate URL against the original candidate
                    // page; a resolved URL may change across retries.
                    let alternate = match oracle {
                        Some(o) => resolve::resolve_pdf_url(o, &candidate, framework_name).await?,
                        None => None,
                    };
                    match alternate {
                        Some(u) if u != failed_url => {
                            warnings.push("url_reresolved".to_string());
                            step = Step::Trying {
                                url: u,
                                attempt: attempt + 1,
                            };
                        }
                        _ => {
                            self.backoff(attempt).await;
                            step = Step::Trying {
                                url: failed_url,
                                attempt: attempt + 1,
                            };
                        }
                    }
                }
            }
        }
    }

    async fn backoff(&self, attempt: u32) {
        let factor = 2u32.saturating_pow(attempt);
        let delay = self.cfg.backoff_base.saturating_mul(factor);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// One GET with the browser header set; a 403 gets one immediate retry
    /// with the alternate identity before counting as denied.
    async fn try_once(
        &self,
        url: &str,
        warnings: &mut Vec<String>,
    ) -> std::result::Result<reqwest::Response, TryError> {
        let parsed =
            url::Url::parse(url).map_err(|e| TryError::Transport(format!("invalid url: {e}")))?;

        let resp = self
            .get_with_headers(url, browser_headers())
            .await
            .map_err(|e| TryError::Transport(e.to_string()))?;

        if resp.status().as_u16() == 403 {
            warnings.push("alternate_headers_used".to_string());
            let retry = self
                .get_with_headers(url, alternate_headers(&parsed))
                .await
                .map_err(|e| TryError::Transport(e.to_string()))?;
            if retry.status().is_success() {
                return Ok(retry);
            }
            if retry.status().as_u16() == 403 {
                return Err(TryError::Denied);
            }
            return Err(TryError::Http(retry.status().as_u16()));
        }

        if resp.status().is_success() {
            return Ok(resp);
        }
        Err(TryError::Http(resp.status().as_u16()))
    }

    async fn get_with_headers(
        &self,
        url: &str,
        headers: Vec<(&'static str, String)>,
    ) -> reqwest::Result<reqwest::Response> {
        let mut rb = self.client.get(url).timeout(self.cfg.request_timeout);
        for (k, v) in headers {
            rb = rb.header(k, v);
        }
        rb.send().await
    }

    /// Stream the body to a temp file, then validate (magic number first,
    /// size envelope second) before the rename to a permanent name. The
    /// temp file is deleted on drop, so every non-success path, including
    /// caller cancellation mid-stream, leaves no partial download behind.
    async fn finish_download(
        &self,
        framework_name: &str,
        resp: reqwest::Response,
        mut warnings: Vec<String>,
        mut timings_ms: BTreeMap<String, u128>,
    ) -> Result<DownloadStatus> {
        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut tmp = tempfile::Builder::new()
            .prefix("regwatch-")
            .suffix(".tmp")
            .tempfile_in(&self.cfg.download_dir)
            .map_err(|e| Error::Io(format!("create temp file: {e}")))?;

        let t0 = Instant::now();
        let mut head: Vec<u8> = Vec::with_capacity(PDF_MAGIC.len());
        let mut size_bytes: u64 = 0;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    warnings.push("body_stream_failed".to_string());
                    let _ = e;
                    return Ok(DownloadStatus::Unavailable {
                        reason: UnavailableReason::TransportExhausted,
                        warnings,
                    });
                }
            };
            if head.len() < PDF_MAGIC.len() {
                let want = PDF_MAGIC.len() - head.len();
                head.extend_from_slice(&chunk[..want.min(chunk.len())]);
            }
            size_bytes += chunk.len() as u64;
            tmp.write_all(&chunk)
                .map_err(|e| Error::Io(format!("write temp file: {e}")))?;
        }
        tmp.flush()
            .map_err(|e| Error::Io(format!("flush temp file: {e}")))?;
        timings_ms.insert("stream_body".to_string(), t0.elapsed().as_millis());

        // Magic number is authoritative; the declared content-type is kept
        // for diagnostics only.
        if !head.starts_with(PDF_MAGIC) {
            warnings.push("not_a_pdf".to_string());
            return Ok(DownloadStatus::Unavailable {
                reason: UnavailableReason::NotAPdf,
                warnings,
            });
        }

        // Amendments are small; an oversized result is assumed to be the
        // full framework document, not an amendment.
        if size_bytes > self.cfg.max_amendment_bytes {
            warnings.push("oversized_amendment".to_string());
            return Ok(DownloadStatus::Unavailable {
                reason: UnavailableReason::Oversized,
                warnings,
            });
        }

        let file_name = format!(
            "{}_{}.pdf",
            sanitize_name(framework_name),
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let dest = self.cfg.download_dir.join(&file_name);
        tmp.persist(&dest)
            .map_err(|e| Error::Io(format!("persist download: {e}")))?;

        Ok(DownloadStatus::Downloaded(DownloadOutcome {
            local_path: dest.to_string_lossy().to_string(),
            size_bytes,
            content_type,
            final_url,
            warnings,
            timings_ms,
        }))
    }
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            c if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' => c,
            _ => '_',
        })
        .collect();
    if cleaned.is_empty() {
        "framework".to_string()
    } else {
        cleaned
    }
}

/// Quick sniff used by callers/tests to double-check accepted files.
pub fn bytes_look_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

//! Coerce a webpage reference into a direct PDF URL via a second, narrow
//! oracle query.
//!
//! Resolution failure is never an error: the caller degrades to "no
//! document available". Only the happy path produces a URL.

use crate::prompts;
use crate::verdict::scan_pdf_url;
use regwatch_core::{PromptBackend, PromptRequest, Result};

/// True when a URL already points at a PDF file (query strings tolerated).
pub fn looks_like_pdf_url(u: &str) -> bool {
    let lower = u.trim().to_ascii_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or("");
    path.ends_with(".pdf")
}

/// Ask the oracle for a direct amendment PDF link on `page_url`.
///
/// Accepts only an answer containing a bare `.pdf` URL; the `NOT_FOUND`
/// sentinel or any malformed answer yields `Ok(None)`. Transport failures
/// also degrade to `Ok(None)`: a resolver outage must not fail the check.
pub async fn resolve_pdf_url(
    oracle: &dyn PromptBackend,
    page_url: &str,
    framework_name: &str,
) -> Result<Option<String>> {
    let req = PromptRequest {
        system: None,
        user: prompts::pdf_locator_prompt(page_url, framework_name),
        max_tokens: Some(300),
        temperature: Some(0.1),
    };

    let answer = match oracle.complete(&req).await {
        Ok(a) => a,
        Err(_) => return Ok(None),
    };

    Ok(accept_locator_answer(&answer))
}

fn accept_locator_answer(answer: &str) -> Option<String> {
    let trimmed = answer.trim();
    if trimmed.is_empty() || trimmed.contains(prompts::NOT_FOUND_SENTINEL) {
        return None;
    }
    let url = scan_pdf_url(trimmed)?;
    looks_like_pdf_url(&url).then_some(url)
}

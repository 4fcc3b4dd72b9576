//! Prompt templates for the update-check oracle.
//!
//! These are data, not logic: the pipeline treats the oracle's answer as
//! untrusted free text regardless of how firmly the prompt asks for JSON.

/// Sentinel the PDF locator prompt asks for when no direct link exists.
pub const NOT_FOUND_SENTINEL: &str = "NOT_FOUND";

pub fn update_check_system_prompt(framework_name: &str, baseline_date: &str) -> String {
    format!(
        r#"You are a GRC (Governance, Risk, and Compliance) framework update tracker and PDF finder.

Your task:
1. Check if {framework_name} has been updated after {baseline_date}.
2. Thoroughly search official sources for the DIRECT PDF download link for the LATEST AMENDMENT document.
3. Return the PDF URL if available, even if it may require authentication.

CRITICAL: has_update must be true ONLY if the latest official update date is AFTER {baseline_date}. If the latest update is on or before {baseline_date}, set has_update to false.

You are looking for AMENDMENT documents, NOT the full framework document:
- Amendments are small PDFs (typically 10-100 pages) describing changes.
- Full framework documents are large (hundreds of pages) - do NOT use these.
- Search for terms like: "amendment", "update", "summary of changes", "revision", "supplement".

document_url requirements:
- MUST be a direct link to a PDF file (ending in .pdf), never an HTML page.
- MUST point at the amendment, not the full framework.
- If no direct amendment PDF link exists after thorough searching, set it to null.

Respond with ONLY this JSON object, no explanations, no markdown, no code blocks:

{{
    "framework_name": "{framework_name}",
    "has_update": true or false,
    "latest_update_date": "YYYY-MM-DD",
    "document_url": "direct amendment PDF URL" or null,
    "version": "version number if available",
    "notes": "brief description of changes if updated"
}}"#
    )
}

pub fn update_check_user_prompt(framework_name: &str, baseline_date: &str) -> String {
    format!(
        "TASK: Check if {framework_name} has been updated after {baseline_date} and find the \
         direct PDF download link for the latest AMENDMENT document (not the full framework). \
         Search official websites, document libraries, publication portals, and archives. \
         Respond with ONLY the JSON object, nothing else."
    )
}

pub fn pdf_locator_prompt(page_url: &str, framework_name: &str) -> String {
    format!(
        r#"Find the DIRECT PDF download link for the LATEST AMENDMENT of {framework_name} from this page: {page_url}

Requirements:
1. The URL must be a direct link to a PDF file ending in .pdf, not a webpage.
2. You are looking for the AMENDMENT document (small PDF describing changes), NOT the full framework document.
3. If multiple PDFs exist, return the one for the latest amendment only.
4. Do not return page URLs or URLs to the complete framework document.

Respond with ONLY the PDF URL, or "{NOT_FOUND_SENTINEL}" if no direct amendment PDF download link exists."#
    )
}

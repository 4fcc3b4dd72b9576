//! Verdict extraction from unreliable oracle text, plus reconciliation.
//!
//! Extraction is an ordered chain of total tiers, composed left-to-right
//! with short-circuit on first success:
//! 1. strict parse of the normalized JSON candidate;
//! 2. permissive regex recovery over the raw text with light repair;
//! 3. heuristic text scan (keywords, file URLs, dates).
//!
//! Every tier returns a structured result or nothing; nothing here throws.
//! The worst case is the terminal neutral verdict.

use crate::dates;
use crate::normalize;
use regex::Regex;
use regwatch_core::Verdict;

/// Extraction output: the verdict plus which tier produced it and any
/// diagnostic codes collected along the way.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub verdict: Verdict,
    pub tier: &'static str,
    pub warnings: Vec<&'static str>,
}

/// Phrases that weakly indicate an update in free text. Used only by the
/// tier-3 fallback, and only when no URL or parseable date decides first.
const UPDATE_PHRASES: &[&str] = &[
    "has been updated",
    "was updated",
    "latest update",
    "recent update",
    "new version",
    "new amendment",
    "latest amendment",
    "recent amendment",
    "updated on",
    "published on",
    "released on",
    "issued on",
    "amendment",
    "revision",
    "supplement",
];

pub fn extract_verdict(raw: &str, framework_name: &str, baseline_date: &str) -> Extraction {
    let mut warnings: Vec<&'static str> = Vec::new();

    let candidate = normalize::extract_json_candidate(raw);
    if let Some(v) = strict_parse(&candidate) {
        return Extraction {
            verdict: finish(v, framework_name),
            tier: "strict",
            warnings,
        };
    }
    warnings.push("strict_parse_failed");

    if let Some(v) = recover_with_patterns(raw) {
        warnings.push("pattern_recovery_used");
        return Extraction {
            verdict: finish(v, framework_name),
            tier: "pattern",
            warnings,
        };
    }

    if let Some(v) = heuristic_scan(raw, baseline_date) {
        warnings.push("heuristic_fallback_used");
        return Extraction {
            verdict: finish(v, framework_name),
            tier: "heuristic",
            warnings,
        };
    }

    warnings.push("extraction_exhausted");
    let mut v = Verdict::neutral(framework_name, baseline_date);
    v.notes = Some("failed to interpret oracle response".to_string());
    Extraction {
        verdict: v,
        tier: "neutral",
        warnings,
    }
}

fn strict_parse(candidate: &str) -> Option<Verdict> {
    let value: serde_json::Value = serde_json::from_str(candidate).ok()?;
    // Reject non-objects early: "null"/"42" parse as JSON but carry nothing.
    value.as_object()?;
    serde_json::from_value(value).ok()
}

fn finish(mut v: Verdict, framework_name: &str) -> Verdict {
    if v.framework_name.trim().is_empty() {
        v.framework_name = framework_name.to_string();
    }
    // Canonicalise the stated date when it parses; leave the original text
    // in place when it does not (the reconciler treats it as unknown).
    if let Some(d) = v
        .latest_update_date
        .as_deref()
        .and_then(dates::parse_flexible_date)
    {
        v.latest_update_date = Some(dates::canonical(&d));
    }
    // Empty-string URLs are no URL.
    if v.document_url.as_deref().is_some_and(|u| u.trim().is_empty()) {
        v.document_url = None;
    }
    v
}

/// Tier 2: ordered recovery patterns over the raw text, each match given a
/// light repair (quote normalization, bareword keys) before a re-parse.
fn recover_with_patterns(raw: &str) -> Option<Verdict> {
    const PATTERNS: &[&str] = &[
        // Nested-brace object (one level of nesting).
        r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}",
        // Objects anchored on the fields we care about.
        r#"(?is)\{.*?"?has_update"?.*?\}"#,
        r#"(?is)\{.*?"?document_url"?.*?\}"#,
        // Full expected shape.
        r#"(?is)\{[^}]*framework_name[^}]*has_update[^}]*latest_update_date[^}]*document_url[^}]*\}"#,
    ];

    for pat in PATTERNS {
        let re = Regex::new(pat).ok()?;
        let Some(m) = re.find(raw) else { continue };
        let repaired = repair_jsonish(m.as_str());
        if let Some(v) = strict_parse(&repaired) {
            return Some(v);
        }
    }
    None
}

/// Light repair of almost-JSON: normalize single quotes and add quotes
/// around bareword keys. Deliberately conservative; anything deeper is the
/// heuristic tier's job.
fn repair_jsonish(s: &str) -> String {
    let s = s.replace('\'', "\"");
    match Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"#) {
        Ok(re) => re.replace_all(&s, "$1\"$2\":").into_owned(),
        Err(_) => s,
    }
}

/// Tier 3: no JSON is recoverable at all. Synthesize a verdict from
/// keywords, file URLs, and dates found in the raw text.
///
/// Decision order: a found PDF URL outweighs vague language (still subject
/// to the reconciler); otherwise a parseable date decides strictly by
/// baseline comparison; otherwise the weak keyword signal stands.
fn heuristic_scan(raw: &str, baseline_date: &str) -> Option<Verdict> {
    if raw.trim().is_empty() {
        return None;
    }
    let lower = raw.to_lowercase();
    let keyword_signal = UPDATE_PHRASES.iter().any(|p| lower.contains(p));

    let document_url = scan_pdf_url(raw);
    let found_date = scan_date(raw);

    let has_update = if document_url.is_some() {
        true
    } else if let Some(d) = &found_date {
        dates::is_after_baseline(d, baseline_date).unwrap_or(keyword_signal)
    } else {
        keyword_signal
    };

    Some(Verdict {
        framework_name: String::new(),
        has_update,
        latest_update_date: Some(found_date.unwrap_or_else(|| baseline_date.to_string())),
        document_url,
        version: None,
        notes: Some(truncate_chars(raw.trim(), 300)),
    })
}

/// Scan for a direct PDF URL, preferring download-style links, then any
/// `.pdf`-suffixed URL, then URLs merely containing "pdf".
pub(crate) fn scan_pdf_url(text: &str) -> Option<String> {
    const URL_PATTERNS: &[&str] = &[
        r#"https?://[^\s<>"{}|\\^`\[\]]+download[^\s<>"{}|\\^`\[\]]*\.pdf"#,
        r#"https?://[^\s<>"{}|\\^`\[\]]+\.pdf[^\s<>"{}|\\^`\[\]]*"#,
        r#"https?://[^\s<>"{}|\\^`\[\]]+pdf[^\s<>"{}|\\^`\[\]]*"#,
    ];
    for pat in URL_PATTERNS {
        let re = Regex::new(pat).ok()?;
        if let Some(m) = re.find(text) {
            return Some(trim_url(m.as_str()));
        }
    }
    None
}

fn trim_url(u: &str) -> String {
    u.trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']'])
        .to_string()
}

/// Scan for a date, in ISO → slash-separated → month-name → bare-year
/// order, normalized to canonical form.
fn scan_date(text: &str) -> Option<String> {
    const DATE_PATTERNS: &[&str] = &[
        r"\b20\d{2}[-/]\d{1,2}[-/]\d{1,2}\b",
        r"\b\d{1,2}[-/]\d{1,2}[-/]20\d{2}\b",
        r"(?i)\b(?:january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2},?\s+20\d{2}\b",
        r"(?i)\b(?:january|february|march|april|may|june|july|august|september|october|november|december)\s+20\d{2}\b",
        r"\b20\d{2}\b",
    ];
    for pat in DATE_PATTERNS {
        let re = Regex::new(pat).ok()?;
        if let Some(m) = re.find(text) {
            if let Some(d) = dates::parse_flexible_date(m.as_str()) {
                return Some(dates::canonical(&d));
            }
        }
    }
    None
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Post-extraction reconciliation against the baseline date.
///
/// A stated update claim contradicted by the date comparison is dropped
/// only when no document URL backs it up; a concrete artifact reference is
/// trusted over a possibly-wrong textual date claim. The same rule decides
/// when the date is present but unparseable.
pub fn reconcile(mut v: Verdict, baseline_date: &str) -> (Verdict, Vec<&'static str>) {
    let mut warnings: Vec<&'static str> = Vec::new();

    if !v.has_update {
        return (v, warnings);
    }
    let Some(stated) = v.latest_update_date.clone() else {
        return (v, warnings);
    };

    match dates::is_after_baseline(&stated, baseline_date) {
        Some(true) => {}
        Some(false) => {
            if v.document_url.is_some() {
                warnings.push("url_trusted_over_date");
            } else {
                warnings.push("date_contradicts_update");
                v.has_update = false;
            }
        }
        None => {
            if v.document_url.is_some() {
                warnings.push("url_trusted_over_unparseable_date");
            } else {
                warnings.push("unparseable_date_no_url");
                v.has_update = false;
            }
        }
    }

    (v, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BASELINE: &str = "2025-09-13";

    #[test]
    fn strict_tier_parses_bare_json() {
        // Scenario: exact JSON answer, date after baseline.
        let raw = r#"{"framework_name":"X","has_update":true,"latest_update_date":"2025-10-01","document_url":"https://x.org/upd.pdf"}"#;
        let ex = extract_verdict(raw, "X", BASELINE);
        assert_eq!(ex.tier, "strict");
        assert!(ex.verdict.has_update);
        assert_eq!(ex.verdict.latest_update_date.as_deref(), Some("2025-10-01"));

        let (v, w) = reconcile(ex.verdict, BASELINE);
        assert!(v.has_update);
        assert!(w.is_empty());
    }

    #[test]
    fn fenced_json_round_trips_to_same_verdict_as_direct_parse() {
        let obj = r#"{"framework_name":"PCI DSS","has_update":true,"latest_update_date":"2025-10-01","document_url":"https://pci.example/amendment.pdf","version":"4.0.1","notes":"minor"}"#;
        let wrapped = format!("Sure! Here is the result:\n```json\n{obj}\n```\nLet me know.");

        let direct = extract_verdict(obj, "PCI DSS", BASELINE).verdict;
        let recovered = extract_verdict(&wrapped, "PCI DSS", BASELINE).verdict;
        assert_eq!(direct, recovered);
    }

    #[test]
    fn extraction_is_idempotent() {
        let raw = "The framework has been updated, see https://x.org/files/a.pdf (2025-10-02)";
        let a = extract_verdict(raw, "X", BASELINE).verdict;
        let b = extract_verdict(raw, "X", BASELINE).verdict;
        assert_eq!(a, b);
    }

    #[test]
    fn pattern_tier_repairs_single_quotes_and_bareword_keys() {
        let raw = "Model said: {has_update: true, 'latest_update_date': '2025-10-01', document_url: null}";
        let ex = extract_verdict(raw, "X", BASELINE);
        assert_eq!(ex.tier, "pattern");
        assert!(ex.verdict.has_update);
        assert_eq!(ex.verdict.latest_update_date.as_deref(), Some("2025-10-01"));
        assert!(ex.verdict.document_url.is_none());
    }

    #[test]
    fn heuristic_tier_url_beats_weak_language_and_survives_reconcile() {
        // Scenario: prose only, URL present, stated date before baseline.
        let raw = "has been updated... see https://x.org/files/amendment-2025.pdf ... published 2025-08-01";
        let ex = extract_verdict(raw, "X", BASELINE);
        assert_eq!(ex.tier, "heuristic");
        assert_eq!(
            ex.verdict.document_url.as_deref(),
            Some("https://x.org/files/amendment-2025.pdf")
        );
        assert_eq!(ex.verdict.latest_update_date.as_deref(), Some("2025-08-01"));
        assert!(ex.verdict.has_update);

        let (v, w) = reconcile(ex.verdict, BASELINE);
        assert!(v.has_update, "URL presence must override the date claim");
        assert!(w.contains(&"url_trusted_over_date"));
    }

    #[test]
    fn heuristic_tier_date_decides_when_no_url() {
        let raw = "An update was published on 2025-10-02 but no download is offered yet.";
        let ex = extract_verdict(raw, "X", BASELINE);
        assert_eq!(ex.tier, "heuristic");
        assert!(ex.verdict.document_url.is_none());
        assert!(ex.verdict.has_update);

        let raw_old = "The last revision was published on 2025-08-01.";
        let ex_old = extract_verdict(raw_old, "X", BASELINE);
        assert!(!ex_old.verdict.has_update);
    }

    #[test]
    fn heuristic_url_trailing_punctuation_is_trimmed() {
        let raw = "no structure here, just (https://x.org/a.pdf).";
        let v = extract_verdict(raw, "X", BASELINE).verdict;
        assert_eq!(v.document_url.as_deref(), Some("https://x.org/a.pdf"));
    }

    #[test]
    fn empty_text_yields_terminal_neutral_verdict() {
        let ex = extract_verdict("", "X", BASELINE);
        assert_eq!(ex.tier, "neutral");
        assert!(!ex.verdict.has_update);
        assert_eq!(ex.verdict.latest_update_date.as_deref(), Some(BASELINE));
        assert!(ex.verdict.document_url.is_none());
        assert!(ex.warnings.contains(&"extraction_exhausted"));
    }

    #[test]
    fn reconcile_drops_claim_when_date_stale_and_no_url() {
        let v = Verdict {
            framework_name: "X".to_string(),
            has_update: true,
            latest_update_date: Some("2025-08-01".to_string()),
            document_url: None,
            version: None,
            notes: None,
        };
        let (v, w) = reconcile(v, BASELINE);
        assert!(!v.has_update);
        assert!(w.contains(&"date_contradicts_update"));
    }

    #[test]
    fn reconcile_unparseable_date_decided_by_url_presence() {
        let base = Verdict {
            framework_name: "X".to_string(),
            has_update: true,
            latest_update_date: Some("sometime soon".to_string()),
            document_url: None,
            version: None,
            notes: None,
        };
        let (no_url, _) = reconcile(base.clone(), BASELINE);
        assert!(!no_url.has_update);

        let mut with_url = base;
        with_url.document_url = Some("https://x.org/a.pdf".to_string());
        let (with_url, w) = reconcile(with_url, BASELINE);
        assert!(with_url.has_update);
        assert!(w.contains(&"url_trusted_over_unparseable_date"));
    }

    #[test]
    fn reconcile_leaves_false_verdicts_alone() {
        let v = Verdict::neutral("X", BASELINE);
        let (out, w) = reconcile(v.clone(), BASELINE);
        assert_eq!(out, v);
        assert!(w.is_empty());
    }

    proptest! {
        // Core property: has_update iff date strictly after baseline,
        // unless a document URL is present, in which case has_update holds
        // whenever the URL does.
        #[test]
        fn reconcile_property(
            y in 2020i32..2030, m in 1u32..=12, d in 1u32..=28,
            with_url in any::<bool>(),
        ) {
            let stated = format!("{y:04}-{m:02}-{d:02}");
            let v = Verdict {
                framework_name: "X".to_string(),
                has_update: true,
                latest_update_date: Some(stated.clone()),
                document_url: with_url.then(|| "https://x.org/a.pdf".to_string()),
                version: None,
                notes: None,
            };
            let (out, _) = reconcile(v, BASELINE);
            let after = crate::dates::is_after_baseline(&stated, BASELINE).unwrap();
            if with_url {
                prop_assert!(out.has_update);
            } else {
                prop_assert_eq!(out.has_update, after);
            }
        }

        #[test]
        fn extract_verdict_never_panics(raw in any::<String>()) {
            let _ = extract_verdict(&raw, "X", BASELINE);
        }
    }
}

//! Flexible calendar-date parsing and baseline comparison.
//!
//! Oracle responses state dates in whatever shape the source page used:
//! ISO, slash-separated, US month-day-year, English month names, or a bare
//! year. Everything is normalized to a `NaiveDate` before comparison; a
//! date that cannot be normalized is *unknown*, never "equal to baseline".

use chrono::NaiveDate;

const STRPTIME_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
];

const MONTHS: &[(&str, u32)] = &[
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
];

/// Parse a textual date in any of the accepted shapes.
///
/// A bare `20xx` year canonicalises to January 1 of that year so that
/// downstream comparison stays total.
pub fn parse_flexible_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim().trim_end_matches(['.', ',', ';']);
    if s.is_empty() {
        return None;
    }

    for fmt in STRPTIME_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    // "September 2025" (month-name + year, no day).
    let lower = s.to_ascii_lowercase();
    for (name, month) in MONTHS {
        if let Some(rest) = lower.strip_prefix(name) {
            let rest = rest.trim().trim_start_matches(',').trim();
            if let Ok(year) = rest.parse::<i32>() {
                if (2000..2100).contains(&year) {
                    return NaiveDate::from_ymd_opt(year, *month, 1);
                }
            }
        }
    }

    // Bare year.
    if s.len() == 4 {
        if let Ok(year) = s.parse::<i32>() {
            if (2000..2100).contains(&year) {
                return NaiveDate::from_ymd_opt(year, 1, 1);
            }
        }
    }

    None
}

/// Canonical `YYYY-MM-DD` text form.
pub fn canonical(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// `Some(true)` iff `candidate` parses and is strictly after `baseline`.
/// `None` when either side fails to normalize.
pub fn is_after_baseline(candidate: &str, baseline: &str) -> Option<bool> {
    let c = parse_flexible_date(candidate)?;
    let b = parse_flexible_date(baseline)?;
    Some(c > b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_iso_and_slash_forms() {
        assert_eq!(
            parse_flexible_date("2025-09-13"),
            NaiveDate::from_ymd_opt(2025, 9, 13)
        );
        assert_eq!(
            parse_flexible_date("2025/09/13"),
            NaiveDate::from_ymd_opt(2025, 9, 13)
        );
        assert_eq!(
            parse_flexible_date("09/13/2025"),
            NaiveDate::from_ymd_opt(2025, 9, 13)
        );
    }

    #[test]
    fn parses_month_name_forms() {
        assert_eq!(
            parse_flexible_date("September 13, 2025"),
            NaiveDate::from_ymd_opt(2025, 9, 13)
        );
        assert_eq!(
            parse_flexible_date("september 2025"),
            NaiveDate::from_ymd_opt(2025, 9, 1)
        );
        assert_eq!(
            parse_flexible_date("13 September 2025"),
            NaiveDate::from_ymd_opt(2025, 9, 13)
        );
    }

    #[test]
    fn bare_year_canonicalises_to_january_first() {
        assert_eq!(
            parse_flexible_date("2025"),
            NaiveDate::from_ymd_opt(2025, 1, 1)
        );
        // Years outside the accepted window are unknown, not dates.
        assert_eq!(parse_flexible_date("1999"), None);
    }

    #[test]
    fn garbage_is_unknown_not_baseline() {
        assert_eq!(parse_flexible_date("soon"), None);
        assert_eq!(parse_flexible_date(""), None);
        assert_eq!(is_after_baseline("soon", "2025-09-13"), None);
    }

    #[test]
    fn baseline_comparison_is_strict() {
        assert_eq!(is_after_baseline("2025-10-01", "2025-09-13"), Some(true));
        assert_eq!(is_after_baseline("2025-09-13", "2025-09-13"), Some(false));
        assert_eq!(is_after_baseline("2025-08-01", "2025-09-13"), Some(false));
    }

    #[test]
    fn trailing_punctuation_is_tolerated() {
        assert_eq!(
            parse_flexible_date("2025-09-13."),
            NaiveDate::from_ymd_opt(2025, 9, 13)
        );
    }

    proptest! {
        #[test]
        fn parse_flexible_date_never_panics(s in any::<String>()) {
            let _ = parse_flexible_date(&s);
        }

        #[test]
        fn canonical_round_trips(y in 2000i32..2100, m in 1u32..=12, d in 1u32..=28) {
            let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
            let text = canonical(&date);
            prop_assert_eq!(parse_flexible_date(&text), Some(date));
        }
    }
}

// src/ingest/extract.rs
//! Field extraction shared by the built-in connectors.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

pub const TECH_KEYWORDS: &[&str] = &[
    "Java", "Python", "JavaScript", "TypeScript", "C++", "C#", ".NET", "PHP", "Ruby", "Go",
    "Rust", "Swift", "Kotlin", "React", "Angular", "Vue", "Node.js", "Spring", "Django",
    "Flask", "Express", "Laravel", "Docker", "Kubernetes", "AWS", "Azure", "GCP", "CI/CD",
    "Jenkins", "Git", "Linux", "SQL", "PostgreSQL", "MySQL", "MongoDB", "Redis",
    "Elasticsearch", "API", "REST", "GraphQL", "Microservices", "Agile", "Scrum",
];

/// Extra terms worth surfacing for Swedish-market listings.
pub const MARKET_KEYWORDS: &[&str] = &["Swedish", "English", "B2B", "B2C", "SaaS"];

const REMOTE_KEYWORDS: &[&str] = &[
    "remote",
    "distans",
    "hemarbete",
    "hemifrån",
    "fjärr",
    "work from home",
    "wfh",
    "anywhere",
    "var som helst",
];

const BY_AGREEMENT: &[&str] = &["överenskommelse", "agreement", "enligt ök", "negotiable"];

/// Source tags first (in order, deduplicated), then every keyword found in
/// `text`. Keyword matching is case-insensitive on word boundaries, so "Go"
/// does not match "good".
pub fn extract_requirements(tags: &[String], text: &str, keywords: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let t = tag.trim();
        if !t.is_empty() && !out.iter().any(|s| s.eq_ignore_ascii_case(t)) {
            out.push(t.to_string());
        }
    }

    let haystack = text.to_lowercase();
    for kw in keywords {
        if out.iter().any(|s| s.eq_ignore_ascii_case(kw)) {
            continue;
        }
        if contains_term(&haystack, &kw.to_lowercase()) {
            out.push((*kw).to_string());
        }
    }
    out
}

fn contains_term(haystack: &str, needle: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric();
    let starts_word = needle.chars().next().is_some_and(is_word);
    let ends_word = needle.chars().last().is_some_and(is_word);

    haystack.match_indices(needle).any(|(i, m)| {
        let before_ok = !starts_word || !haystack[..i].chars().next_back().is_some_and(is_word);
        let after_ok = !ends_word || !haystack[i + m.len()..].chars().next().is_some_and(is_word);
        before_ok && after_ok
    })
}

/// True when any of `texts` mentions remote work (English or Swedish).
pub fn detect_remote(texts: &[&str]) -> bool {
    texts.iter().any(|t| {
        let lower = t.to_lowercase();
        REMOTE_KEYWORDS.iter().any(|kw| lower.contains(kw))
    })
}

/// Maps free-form employment types (English and Swedish) to a small fixed set.
pub fn map_employment_type(raw: &str) -> &'static str {
    let t = raw.to_lowercase();
    if t.contains("part") || t.contains("deltid") {
        "Part-time"
    } else if t.contains("contract")
        || t.contains("freelance")
        || t.contains("kontrakt")
        || t.contains("vikariat")
        || t.contains("projekt")
    {
        "Contract"
    } else if t.contains("temporary") || t.contains("tillfällig") {
        "Temporary"
    } else {
        "Full-time"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalaryRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub currency: String,
}

/// Best-effort parse of a printed salary such as `"$50k - $80k"`,
/// `"45 000 - 65 000 kr/mån"` or `"€60,000"`. A single figure yields
/// `min == max`. "By agreement" and unparseable strings yield no bounds.
pub fn parse_salary_range(raw: &str, default_currency: &str) -> SalaryRange {
    let currency = detect_currency(raw).unwrap_or(default_currency).to_string();
    let none = SalaryRange {
        min: None,
        max: None,
        currency: currency.clone(),
    };

    let lower = raw.to_lowercase();
    if raw.trim().is_empty() || BY_AGREEMENT.iter().any(|p| lower.contains(p)) {
        return none;
    }

    static RE_THOUSANDS: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(\d)[ ,\u{00A0}](\d{3})\b").unwrap());
    static RE_AMOUNT: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*([kK]\b)?").unwrap());

    // "1 000 000" needs more than one pass.
    let mut joined = raw.to_string();
    loop {
        let next = RE_THOUSANDS.replace_all(&joined, "${1}${2}").to_string();
        if next == joined {
            break;
        }
        joined = next;
    }

    let amounts: Vec<(f64, bool)> = RE_AMOUNT
        .captures_iter(&joined)
        .filter_map(|c| {
            let n: f64 = c.get(1)?.as_str().parse().ok()?;
            Some((n, c.get(2).is_some()))
        })
        .take(2)
        .collect();

    let scale = |(n, k): (f64, bool), shared_k: bool| -> i64 {
        let v = if k || (shared_k && n < 1000.0) { n * 1000.0 } else { n };
        v.round() as i64
    };

    match amounts.as_slice() {
        [one] => {
            let v = scale(*one, false);
            if v > 0 {
                SalaryRange {
                    min: Some(v),
                    max: Some(v),
                    currency,
                }
            } else {
                none
            }
        }
        [lo, hi] => {
            // "50-80k": the suffix on the upper bound applies to both.
            let min = scale(*lo, hi.1);
            let max = scale(*hi, false);
            match (min > 0, max > 0) {
                (true, true) => SalaryRange {
                    min: Some(min.min(max)),
                    max: Some(min.max(max)),
                    currency,
                },
                (true, false) => SalaryRange {
                    min: Some(min),
                    max: None,
                    currency,
                },
                _ => none,
            }
        }
        _ => none,
    }
}

fn detect_currency(raw: &str) -> Option<&'static str> {
    let upper = raw.to_uppercase();
    if raw.contains('€') || upper.contains("EUR") {
        Some("EUR")
    } else if raw.contains('£') || upper.contains("GBP") {
        Some("GBP")
    } else if raw.contains('$') || upper.contains("USD") {
        Some("USD")
    } else if upper.contains("SEK") || upper.contains("KR") {
        Some("SEK")
    } else {
        None
    }
}

/// Lenient timestamp parse: RFC 3339, naive `YYYY-MM-DDTHH:MM:SS` (taken as
/// UTC), `YYYY-MM-DD`, or unix seconds. `None` when nothing matches.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(n) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&n));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }
    if let Ok(secs) = s.parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requirements_keep_tags_then_keywords() {
        let tags = vec!["rust".to_string(), "".to_string(), "Rust".to_string()];
        let reqs = extract_requirements(
            &tags,
            "Senior engineer, Kubernetes and PostgreSQL. Good pay.",
            TECH_KEYWORDS,
        );
        // "SQL" inside "PostgreSQL" is not a separate term
        assert_eq!(reqs, vec!["rust", "Kubernetes", "PostgreSQL"]);
    }

    #[test]
    fn short_keywords_need_word_boundaries() {
        let reqs = extract_requirements(&[], "a good ago category", TECH_KEYWORDS);
        assert!(reqs.is_empty());
        let reqs = extract_requirements(&[], "we write Go and C++", TECH_KEYWORDS);
        assert_eq!(reqs, vec!["C++", "Go"]);
    }

    #[test]
    fn remote_detection_covers_swedish() {
        assert!(detect_remote(&["Utvecklare", "Arbete på distans möjligt"]));
        assert!(detect_remote(&["Engineer (Remote)"]));
        assert!(!detect_remote(&["Lagerarbetare", "Göteborg"]));
    }

    #[test]
    fn employment_types_are_mapped() {
        assert_eq!(map_employment_type("full_time"), "Full-time");
        assert_eq!(map_employment_type("Deltid"), "Part-time");
        assert_eq!(map_employment_type("freelance"), "Contract");
        assert_eq!(map_employment_type("Vikariat"), "Contract");
        assert_eq!(map_employment_type(""), "Full-time");
    }

    #[test]
    fn salary_ranges() {
        let r = parse_salary_range("$50k - $80k", "USD");
        assert_eq!((r.min, r.max, r.currency.as_str()), (Some(50_000), Some(80_000), "USD"));

        let r = parse_salary_range("50-80k EUR", "USD");
        assert_eq!((r.min, r.max, r.currency.as_str()), (Some(50_000), Some(80_000), "EUR"));

        let r = parse_salary_range("45 000 - 65 000 kr/mån", "SEK");
        assert_eq!((r.min, r.max, r.currency.as_str()), (Some(45_000), Some(65_000), "SEK"));

        let r = parse_salary_range("£60,000", "USD");
        assert_eq!((r.min, r.max, r.currency.as_str()), (Some(60_000), Some(60_000), "GBP"));
    }

    #[test]
    fn salary_by_agreement_has_no_bounds() {
        let r = parse_salary_range("Enligt överenskommelse", "SEK");
        assert_eq!((r.min, r.max), (None, None));
        assert_eq!(r.currency, "SEK");
        assert_eq!(parse_salary_range("", "USD").min, None);
        assert_eq!(parse_salary_range("competitive", "USD").max, None);
    }

    #[test]
    fn dates_parse_leniently() {
        let want = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_date("2025-09-01"), Some(want));
        assert_eq!(parse_date("2025-09-01T00:00:00"), Some(want));
        assert_eq!(parse_date("2025-09-01T02:00:00+02:00"), Some(want));
        assert_eq!(parse_date(&want.timestamp().to_string()), Some(want));
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(parse_date(""), None);
    }
}

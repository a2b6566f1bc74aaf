//! Pass/fail extraction from raw CI log text.
//!
//! The dashboard tracks Selenium (TestNG/Surefire), Playwright and Maestro
//! runs, each with its own log format. Extraction walks an ordered list of
//! pattern families and the first family that matches wins. A miss yields an
//! empty [`TestSummary`], never an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSummary {
    pub passed_count: u32,
    pub failed_count: u32,
    pub skipped_count: u32,
    pub total_count: u32,
    pub failed_test_names: BTreeSet<String>,
    pub passed_test_names: BTreeSet<String>,
}

impl TestSummary {
    fn from_counts(passed: u32, failed: u32, skipped: u32, total: u32) -> Self {
        Self {
            passed_count: passed,
            failed_count: failed,
            skipped_count: skipped,
            total_count: total,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0 && self.passed_count == 0 && self.failed_count == 0
    }
}

type Extractor = fn(&str) -> Option<TestSummary>;

/// Priority order; first `Some` wins.
const EXTRACTORS: &[(&str, Extractor)] = &[
    ("sharded", try_sharded),
    ("structured", try_structured),
    ("json-summary", try_json_summary),
    ("counters", try_counters),
    ("flows", try_flows),
];

static TIMESTAMP_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z ?").unwrap()
});
static WORKER_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bworker\s*#?\d+\b").unwrap());
static STRUCTURED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Tests run:\s*(\d+),\s*Failures:\s*(\d+),\s*Errors:\s*(\d+),\s*Skipped:\s*(\d+)")
        .unwrap()
});
static JSON_SUMMARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""summary"\s*:\s*\{([^{}]*)\}"#).unwrap());
static PASSED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\d+)\s+passed\b").unwrap());
static FAILED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\d+)\s+failed\b").unwrap());
static SKIPPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\d+)\s+skipped\b").unwrap());
static FLOW_RESULT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^\s*\[(passed|failed|skipped)\]\s+([^\s(]+)").unwrap()
});
static FLOW_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^\s*(?:running|starting)\s+flow:?\s+([^\s(]+)").unwrap());
static ERROR_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)=+\s*AI ERROR SUMMARY\s*=+\s*\n(.*?)\n\s*=+\s*END AI ERROR SUMMARY\s*=+")
        .unwrap()
});
static ERROR_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^\s*AI Error Summary:\s*(.+)$").unwrap());

/// Extract a test summary from the concatenated log text of one run.
pub fn extract_summary(log_text: &str) -> TestSummary {
    let text = strip_timestamps(log_text);

    for (family, extractor) in EXTRACTORS {
        if let Some(summary) = extractor(&text) {
            tracing::trace!("Test summary matched {} patterns", family);
            return summary;
        }
    }

    TestSummary::default()
}

/// Extract the error summary an AI step may print into the job log.
pub fn extract_error_summary(log_text: &str) -> Option<String> {
    let text = strip_timestamps(log_text);

    let block = ERROR_BLOCK
        .captures_iter(&text)
        .last()
        .map(|c| c[1].trim().to_string());

    block
        .or_else(|| {
            ERROR_LINE
                .captures_iter(&text)
                .last()
                .map(|c| c[1].trim().to_string())
        })
        .filter(|s| !s.is_empty())
}

/// GitHub prefixes every log line with an RFC 3339 timestamp.
pub fn strip_timestamps(log_text: &str) -> String {
    TIMESTAMP_PREFIX.replace_all(log_text, "").into_owned()
}

/// Counts come from untrusted log text; oversized values saturate.
fn number(caps: &regex::Captures<'_>, index: usize) -> u32 {
    caps.get(index)
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

fn sum3(a: u32, b: u32, c: u32) -> u32 {
    a.saturating_add(b).saturating_add(c)
}

fn structured_counts(caps: &regex::Captures<'_>) -> (u32, u32, u32, u32) {
    (number(caps, 1), number(caps, 2), number(caps, 3), number(caps, 4))
}

fn from_structured(total: u32, failures: u32, errors: u32, skipped: u32) -> TestSummary {
    let failed = failures.saturating_add(errors);
    let passed = total.saturating_sub(failed.saturating_add(skipped));
    TestSummary::from_counts(passed, failed, skipped, total)
}

fn last_number(re: &Regex, text: &str) -> Option<u32> {
    re.captures_iter(text).last().map(|c| number(&c, 1))
}

fn sum_numbers(re: &Regex, text: &str) -> Option<u32> {
    re.captures_iter(text)
        .map(|c| number(&c, 1))
        .fold(None, |acc, n| Some(acc.unwrap_or(0u32).saturating_add(n)))
}

/// Shards each print their own totals; only the last one is authoritative.
fn try_sharded(text: &str) -> Option<TestSummary> {
    if !WORKER_MARKER.is_match(text) {
        return None;
    }

    if let Some(caps) = STRUCTURED.captures_iter(text).last() {
        let (total, failures, errors, skipped) = structured_counts(&caps);
        return Some(from_structured(total, failures, errors, skipped));
    }

    let passed = last_number(&PASSED, text);
    let failed = last_number(&FAILED, text);
    let skipped = last_number(&SKIPPED, text);
    if passed.is_none() && failed.is_none() && skipped.is_none() {
        return None;
    }

    let (passed, failed, skipped) = (
        passed.unwrap_or(0),
        failed.unwrap_or(0),
        skipped.unwrap_or(0),
    );
    Some(TestSummary::from_counts(
        passed,
        failed,
        skipped,
        sum3(passed, failed, skipped),
    ))
}

/// Each "Tests run" line is a distinct report, so they add up.
fn try_structured(text: &str) -> Option<TestSummary> {
    let mut matched = false;
    let (mut total, mut failures, mut errors, mut skipped) = (0u32, 0u32, 0u32, 0u32);

    for caps in STRUCTURED.captures_iter(text) {
        matched = true;
        let (t, f, e, s) = structured_counts(&caps);
        total = total.saturating_add(t);
        failures = failures.saturating_add(f);
        errors = errors.saturating_add(e);
        skipped = skipped.saturating_add(s);
    }

    matched.then(|| from_structured(total, failures, errors, skipped))
}

fn try_json_summary(text: &str) -> Option<TestSummary> {
    let caps = JSON_SUMMARY.captures_iter(text).last()?;
    let body = &caps[1];

    let field = |name: &str| -> Option<u32> {
        let re = Regex::new(&format!(r#""{}"\s*:\s*(\d+)"#, name)).ok()?;
        re.captures(body).map(|c| number(&c, 1))
    };

    let passed = field("passed");
    let failed = field("failed");
    let skipped = field("skipped");
    let total = field("total");
    if passed.is_none() && failed.is_none() && total.is_none() {
        return None;
    }

    let (passed, failed, skipped) = (
        passed.unwrap_or(0),
        failed.unwrap_or(0),
        skipped.unwrap_or(0),
    );
    let total = total.unwrap_or_else(|| sum3(passed, failed, skipped));
    Some(TestSummary::from_counts(passed, failed, skipped, total))
}

fn try_counters(text: &str) -> Option<TestSummary> {
    let passed = sum_numbers(&PASSED, text);
    let failed = sum_numbers(&FAILED, text);
    let skipped = sum_numbers(&SKIPPED, text);
    if passed.is_none() && failed.is_none() && skipped.is_none() {
        return None;
    }

    let (passed, failed, skipped) = (
        passed.unwrap_or(0),
        failed.unwrap_or(0),
        skipped.unwrap_or(0),
    );
    Some(TestSummary::from_counts(
        passed,
        failed,
        skipped,
        sum3(passed, failed, skipped),
    ))
}

fn try_flows(text: &str) -> Option<TestSummary> {
    let mut observed = BTreeSet::new();
    let mut passed_names = BTreeSet::new();
    let mut failed_names = BTreeSet::new();

    for caps in FLOW_START.captures_iter(text) {
        observed.insert(caps[1].to_string());
    }

    for caps in FLOW_RESULT.captures_iter(text) {
        let name = caps[2].to_string();
        match caps[1].to_lowercase().as_str() {
            "passed" => {
                passed_names.insert(name.clone());
            }
            "failed" => {
                failed_names.insert(name.clone());
            }
            _ => {}
        }
        observed.insert(name);
    }

    let passed = passed_names.len() as u32;
    let failed = failed_names.len() as u32;
    let total = match observed.len() as u32 {
        0 => passed.saturating_add(failed),
        n => n,
    };
    if total == 0 {
        return None;
    }

    let skipped = i64::from(total) - i64::from(passed) - i64::from(failed);
    if skipped < 0 {
        tracing::warn!(
            "Inconsistent flow counts (total {}, passed {}, failed {}); clamping skipped to 0",
            total,
            passed,
            failed
        );
    }

    Some(TestSummary {
        passed_count: passed,
        failed_count: failed,
        skipped_count: skipped.max(0) as u32,
        total_count: total,
        failed_test_names: failed_names,
        passed_test_names: passed_names,
    })
}

//! Deterministic pattern detection for column samples.
//!
//! A fixed library of regexes is matched against each column's sample set:
//! UUIDs, prefixed external-service ids, ISO-4217 currency codes, unix epochs
//! at four digit scales, emails, URLs and generic external ids. A strict
//! boolean-set check recognizes the five canonical value pairs. The
//! classification path falls out of these signals by fixed precedence.

use once_cell::sync::Lazy;
use regex::Regex;

use super::thresholds;
use super::ClassificationPath;
use crate::profile::ColumnProfile;

/// A sample-set pattern from the fixed library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    Uuid,
    /// Service-prefixed ids like `cus_9f3k2`, `inv_000123`.
    PrefixedServiceId,
    /// ISO-4217 currency codes.
    CurrencyCode,
    EpochSeconds,
    EpochMillis,
    EpochMicros,
    EpochNanos,
    Email,
    Url,
    /// Uppercase alphanumeric external ids (`ORD-2024-0001`).
    GenericExternalId,
}

impl PatternKind {
    /// Epoch patterns at any scale.
    pub fn is_epoch(&self) -> bool {
        matches!(
            self,
            Self::EpochSeconds | Self::EpochMillis | Self::EpochMicros | Self::EpochNanos
        )
    }

    /// Patterns that mark a column as an external identifier.
    pub fn is_external_id(&self) -> bool {
        matches!(self, Self::PrefixedServiceId | Self::GenericExternalId)
    }
}

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid regex")
});

static PREFIXED_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]{2,8}_[A-Za-z0-9]{6,}$").expect("prefixed id regex"));

static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(USD|EUR|GBP|JPY|CHF|CAD|AUD|NZD|SEK|NOK|DKK|PLN|CZK|HUF|RON|BGN|TRY|RUB|UAH|ILS|AED|SAR|INR|CNY|HKD|TWD|KRW|SGD|THB|MYR|IDR|PHP|VND|BRL|MXN|ARS|CLP|COP|PEN|ZAR|NGN|KES|EGP)$",
    )
    .expect("currency regex")
});

static EPOCH_SECONDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^1[0-9]{9}$").expect("epoch seconds regex"));
static EPOCH_MILLIS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^1[0-9]{12}$").expect("epoch millis regex"));
static EPOCH_MICROS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^1[0-9]{15}$").expect("epoch micros regex"));
static EPOCH_NANOS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^1[0-9]{18}$").expect("epoch nanos regex"));

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s]+$").expect("url regex"));

static GENERIC_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9\-]{5,}$").expect("generic id regex"));

/// All (pattern, regex) pairs, in detection order.
fn library() -> [(PatternKind, &'static Regex); 10] {
    [
        (PatternKind::Uuid, &UUID_RE),
        (PatternKind::PrefixedServiceId, &PREFIXED_ID_RE),
        (PatternKind::CurrencyCode, &CURRENCY_RE),
        (PatternKind::EpochSeconds, &EPOCH_SECONDS_RE),
        (PatternKind::EpochMillis, &EPOCH_MILLIS_RE),
        (PatternKind::EpochMicros, &EPOCH_MICROS_RE),
        (PatternKind::EpochNanos, &EPOCH_NANOS_RE),
        (PatternKind::Email, &EMAIL_RE),
        (PatternKind::Url, &URL_RE),
        (PatternKind::GenericExternalId, &GENERIC_ID_RE),
    ]
}

/// Match the sample set against the pattern library.
///
/// A pattern counts when at least 95% of non-empty samples match it.
pub fn detect_patterns(samples: &[String]) -> Vec<PatternKind> {
    let trimmed: Vec<&str> = samples
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let needed =
        (trimmed.len() as f64 * thresholds::patterns::MIN_MATCH_FRACTION).ceil() as usize;

    library()
        .into_iter()
        .filter(|(_, re)| trimmed.iter().filter(|s| re.is_match(s)).count() >= needed)
        .map(|(kind, _)| kind)
        .collect()
}

/// The five canonical boolean value pairs, (true, false).
const BOOLEAN_PAIRS: [(&str, &str); 5] = [
    ("1", "0"),
    ("true", "false"),
    ("yes", "no"),
    ("y", "n"),
    ("t", "f"),
];

/// Strict boolean-set check.
///
/// A sample set with at most two distinct values is boolean when, after
/// trimming and lowercasing, it is a subset of one canonical pair. Returns
/// the (true, false) values as stored; a missing side falls back to the
/// canonical spelling.
pub fn detect_boolean_set(samples: &[String]) -> Option<(String, String)> {
    let mut distinct: Vec<(String, &String)> = Vec::new();
    for sample in samples {
        let normalized = sample.trim().to_lowercase();
        if normalized.is_empty() {
            continue;
        }
        if !distinct.iter().any(|(n, _)| *n == normalized) {
            distinct.push((normalized, sample));
        }
    }

    if distinct.is_empty() || distinct.len() > 2 {
        return None;
    }

    for (true_canon, false_canon) in BOOLEAN_PAIRS {
        let in_pair = distinct
            .iter()
            .all(|(n, _)| n == true_canon || n == false_canon);
        if !in_pair {
            continue;
        }

        let stored = |canon: &str| -> String {
            distinct
                .iter()
                .find(|(n, _)| n == canon)
                .map(|(_, raw)| raw.trim().to_string())
                .unwrap_or_else(|| canon.to_string())
        };
        return Some((stored(true_canon), stored(false_canon)));
    }

    None
}

/// Assign the classification path from type, patterns and cardinality.
///
/// Deterministic precedence: explicit boolean/uuid/external-id/timestamp
/// signals first, then the enum cardinality check, then json/numeric/text
/// fallbacks.
pub fn assign_path(
    data_type: &str,
    profile: &ColumnProfile,
    patterns: &[PatternKind],
    boolean_set: bool,
) -> ClassificationPath {
    let dt = data_type.to_lowercase();

    if is_boolean_type(&dt) || boolean_set {
        return ClassificationPath::Boolean;
    }
    if dt.contains("uuid") || patterns.contains(&PatternKind::Uuid) {
        return ClassificationPath::Uuid;
    }
    if patterns.iter().any(PatternKind::is_external_id) {
        return ClassificationPath::ExternalId;
    }
    if is_temporal_type(&dt) || patterns.iter().any(PatternKind::is_epoch) {
        return ClassificationPath::Timestamp;
    }

    // Enum: low cardinality relative to a meaningful row count
    if profile.row_count >= thresholds::enums::MIN_ROWS && profile.distinct_count > 0 {
        let textual_enum = is_textual_type(&dt)
            && profile.distinct_count <= thresholds::enums::MAX_TEXT_DISTINCT;
        let numeric_enum = is_numeric_type(&dt)
            && profile.distinct_count <= thresholds::enums::MAX_NUMERIC_DISTINCT
            && !profile.is_unique();
        if textual_enum || numeric_enum {
            return ClassificationPath::Enum;
        }
    }

    if is_json_type(&dt) || looks_like_json(&profile.sample_values) {
        return ClassificationPath::Json;
    }
    if is_numeric_type(&dt) {
        return ClassificationPath::Numeric;
    }
    if is_textual_type(&dt) {
        return ClassificationPath::Text;
    }

    ClassificationPath::Unknown
}

pub(crate) fn is_numeric_type(dt: &str) -> bool {
    dt.contains("int")
        || dt.contains("numeric")
        || dt.contains("decimal")
        || dt.contains("float")
        || dt.contains("double")
        || dt.contains("real")
        || dt.contains("money")
}

pub(crate) fn is_textual_type(dt: &str) -> bool {
    dt.contains("char") || dt.contains("text") || dt.contains("string") || dt.contains("clob")
}

pub(crate) fn is_temporal_type(dt: &str) -> bool {
    dt.contains("timestamp") || dt.contains("date") || dt.contains("time")
}

pub(crate) fn is_boolean_type(dt: &str) -> bool {
    dt.contains("bool") || dt == "bit"
}

pub(crate) fn is_json_type(dt: &str) -> bool {
    dt.contains("json")
}

fn looks_like_json(samples: &[String]) -> bool {
    let candidates: Vec<&str> = samples
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if candidates.is_empty() {
        return false;
    }
    let needed =
        (candidates.len() as f64 * thresholds::patterns::MIN_MATCH_FRACTION).ceil() as usize;
    candidates
        .iter()
        .filter(|s| {
            (s.starts_with('{') || s.starts_with('['))
                && serde_json::from_str::<serde_json::Value>(s).is_ok()
        })
        .count()
        >= needed
}

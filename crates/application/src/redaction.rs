//! PII redaction applied to every event before it reaches the store.
//!
//! Redaction is a pure function of the input and the [`RedactionPolicy`]: the
//! same payload and identifier always produce the same output, and redaction
//! never fails. Values the redactor cannot inspect pass through unchanged and
//! are reported as coverage gaps instead.

mod detectors;
mod digest;

use std::borrow::Cow;
use std::collections::BTreeSet;

use gpuaudit_core::AppResult;
use gpuaudit_domain::UserIdHash;
use serde_json::{Map, Value};
use tracing::warn;

use self::detectors::CompiledDetector;

pub use detectors::PiiDetectorKind;
pub use digest::content_digest;

/// Fixed-width token written in place of every detected value.
pub const REDACTION_PLACEHOLDER: &str = "[REDACTED]";

/// Keys whose values are always replaced wholesale.
const SENSITIVE_KEYS: &[&str] = &[
    "address",
    "credit_card",
    "email",
    "ip_address",
    "name",
    "password",
    "phone",
    "ssn",
    "username",
];

/// Key fragments that mark a key as sensitive wherever they appear.
const SENSITIVE_KEY_FRAGMENTS: &[&str] = &["email", "password", "phone", "ssn", "credit_card"];

/// Redaction settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionPolicy {
    /// Detectors applied to string values, in order.
    pub detectors: Vec<PiiDetectorKind>,
    /// Additional exact keys (case-insensitive) redacted wholesale.
    pub extra_sensitive_keys: Vec<String>,
    /// Deepest object/array nesting that is inspected.
    pub max_depth: usize,
    /// Longest string, in bytes, that detectors scan.
    pub max_scan_bytes: usize,
    /// Static secret mixed into identifier hashes.
    pub user_id_pepper: Option<String>,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            detectors: PiiDetectorKind::all().to_vec(),
            extra_sensitive_keys: Vec::new(),
            max_depth: 16,
            max_scan_bytes: 64 * 1024,
            user_id_pepper: None,
        }
    }
}

/// Why part of a payload was not inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageGapReason {
    /// Nesting exceeded `max_depth`.
    DepthLimit,
    /// String exceeded `max_scan_bytes`.
    ScanLimit,
}

impl CoverageGapReason {
    /// Returns a stable label for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DepthLimit => "depth_limit",
            Self::ScanLimit => "scan_limit",
        }
    }
}

/// A payload location that passed through unredacted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageGap {
    /// JSON pointer of the skipped value.
    pub path: String,
    /// Why it was skipped.
    pub reason: CoverageGapReason,
}

/// Result of one redaction pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RedactionOutcome {
    /// Post-redaction payload.
    pub payload: Value,
    /// Hashed identifier.
    pub user_id: Option<UserIdHash>,
    /// True iff the payload or identifier changed.
    pub was_redacted: bool,
    /// JSON pointers of values that were altered.
    pub redacted_paths: Vec<String>,
    /// Values that were not inspected.
    pub coverage_gaps: Vec<CoverageGap>,
}

/// Stateless PII redactor built from a [`RedactionPolicy`].
#[derive(Debug, Clone)]
pub struct Redactor {
    detectors: Vec<CompiledDetector>,
    extra_sensitive_keys: BTreeSet<String>,
    max_depth: usize,
    max_scan_bytes: usize,
    user_id_pepper: Option<String>,
}

impl Redactor {
    /// Compiles the policy detectors.
    pub fn new(policy: RedactionPolicy) -> AppResult<Self> {
        let mut seen = BTreeSet::new();
        let detectors = policy
            .detectors
            .into_iter()
            .filter(|kind| seen.insert(kind.as_str()))
            .map(CompiledDetector::compile)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self {
            detectors,
            extra_sensitive_keys: policy
                .extra_sensitive_keys
                .into_iter()
                .map(|key| key.trim().to_ascii_lowercase())
                .filter(|key| !key.is_empty())
                .collect(),
            max_depth: policy.max_depth,
            max_scan_bytes: policy.max_scan_bytes,
            user_id_pepper: policy.user_id_pepper.filter(|pepper| !pepper.is_empty()),
        })
    }

    /// Redacts a payload and hashes the identifier.
    #[must_use]
    pub fn redact(&self, payload: Value, user_id: Option<&str>) -> RedactionOutcome {
        let mut walk = RedactionWalk::default();
        let payload = self.redact_value(payload, "", 0, &mut walk);

        let user_id = user_id
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|raw| {
                let hashed = self.hash_user_id(raw);
                if hashed.as_str() != raw {
                    walk.identifier_changed = true;
                }
                hashed
            });

        for gap in &walk.coverage_gaps {
            warn!(
                path = %gap.path,
                reason = gap.reason.as_str(),
                "redaction coverage gap, value passed through unscanned"
            );
        }

        RedactionOutcome {
            payload,
            user_id,
            was_redacted: walk.identifier_changed || !walk.redacted_paths.is_empty(),
            redacted_paths: walk.redacted_paths,
            coverage_gaps: walk.coverage_gaps,
        }
    }

    /// Hashes a principal identifier. Already-hashed values are returned as is.
    #[must_use]
    pub fn hash_user_id(&self, raw: &str) -> UserIdHash {
        if let Ok(hashed) = raw.parse::<UserIdHash>() {
            return hashed;
        }

        let material = match &self.user_id_pepper {
            Some(pepper) => format!("{pepper}:{raw}"),
            None => raw.to_owned(),
        };
        UserIdHash::from_digest(digest::sha256(material.as_bytes()))
    }

    fn redact_value(
        &self,
        value: Value,
        path: &str,
        depth: usize,
        walk: &mut RedactionWalk,
    ) -> Value {
        match value {
            Value::Object(object) => {
                if depth > self.max_depth {
                    walk.gap(path, CoverageGapReason::DepthLimit);
                    return Value::Object(object);
                }

                let mut redacted = Map::with_capacity(object.len());
                for (key, sensitive, nested) in self.redact_keys(object, path, walk) {
                    let nested_path = format!("{path}/{}", escape_pointer(&key));
                    let nested = if sensitive {
                        redact_wholesale(nested, &nested_path, walk)
                    } else {
                        self.redact_value(nested, &nested_path, depth + 1, walk)
                    };
                    redacted.insert(key, nested);
                }
                Value::Object(redacted)
            }
            Value::Array(items) => {
                if depth > self.max_depth {
                    walk.gap(path, CoverageGapReason::DepthLimit);
                    return Value::Array(items);
                }

                Value::Array(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(index, nested)| {
                            self.redact_value(nested, &format!("{path}/{index}"), depth + 1, walk)
                        })
                        .collect(),
                )
            }
            Value::String(text) => {
                if text.len() > self.max_scan_bytes {
                    walk.gap(path, CoverageGapReason::ScanLimit);
                    return Value::String(text);
                }

                match self.scrub(&text) {
                    Some(scrubbed) => {
                        walk.redacted_paths.push(path.to_owned());
                        Value::String(scrubbed)
                    }
                    None => Value::String(text),
                }
            }
            other => other,
        }
    }

    /// Scrubs object keys with the detectors.
    ///
    /// Returns `(stored key, key was sensitive, value)` triples. Scrubbed keys
    /// that collide with a kept key or with each other get a `#n` suffix in
    /// key order.
    fn redact_keys(
        &self,
        object: Map<String, Value>,
        path: &str,
        walk: &mut RedactionWalk,
    ) -> Vec<(String, bool, Value)> {
        let mut entries = Vec::with_capacity(object.len());
        let mut renamed = Vec::new();
        let mut taken = BTreeSet::new();

        for (key, nested) in object {
            let sensitive = self.is_sensitive_key(&key);
            if key.len() > self.max_scan_bytes {
                walk.gap(path, CoverageGapReason::ScanLimit);
            } else if let Some(scrubbed) = self.scrub(&key) {
                renamed.push((scrubbed, sensitive, nested));
                continue;
            }
            taken.insert(key.clone());
            entries.push((key, sensitive, nested));
        }

        for (scrubbed, sensitive, nested) in renamed {
            let key = unique_key(scrubbed, &taken);
            walk.redacted_paths.push(format!("{path}/{}", escape_pointer(&key)));
            taken.insert(key.clone());
            entries.push((key, sensitive, nested));
        }

        entries
    }

    /// Runs every detector in order. Returns `None` when nothing matched.
    fn scrub(&self, text: &str) -> Option<String> {
        let mut scrubbed: Option<String> = None;
        for detector in &self.detectors {
            let current = scrubbed.as_deref().unwrap_or(text);
            let replaced = match detector.apply(current) {
                Cow::Borrowed(_) => None,
                Cow::Owned(replaced) => Some(replaced),
            };
            if replaced.is_some() {
                scrubbed = replaced;
            }
        }
        scrubbed
    }

    fn is_sensitive_key(&self, key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        SENSITIVE_KEYS.contains(&key.as_str())
            || SENSITIVE_KEY_FRAGMENTS
                .iter()
                .any(|fragment| key.contains(fragment))
            || self.extra_sensitive_keys.contains(&key)
    }
}

#[derive(Default)]
struct RedactionWalk {
    redacted_paths: Vec<String>,
    coverage_gaps: Vec<CoverageGap>,
    identifier_changed: bool,
}

impl RedactionWalk {
    fn gap(&mut self, path: &str, reason: CoverageGapReason) {
        self.coverage_gaps.push(CoverageGap {
            path: path.to_owned(),
            reason,
        });
    }
}

fn redact_wholesale(value: Value, path: &str, walk: &mut RedactionWalk) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(text) if text == REDACTION_PLACEHOLDER => Value::String(text),
        _ => {
            walk.redacted_paths.push(path.to_owned());
            Value::String(REDACTION_PLACEHOLDER.to_owned())
        }
    }
}

fn unique_key(base: String, taken: &BTreeSet<String>) -> String {
    if !taken.contains(&base) {
        return base;
    }

    let mut suffix = 1_usize;
    loop {
        let candidate = format!("{base}#{suffix}");
        if !taken.contains(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

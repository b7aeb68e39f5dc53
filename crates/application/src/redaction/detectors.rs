use std::borrow::Cow;
use std::str::FromStr;

use gpuaudit_core::{AppError, AppResult};
use regex::{Captures, Regex};

use super::REDACTION_PLACEHOLDER;

/// Built-in PII detectors applied to string values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PiiDetectorKind {
    /// Email addresses.
    Email,
    /// Payment card numbers passing the Luhn checksum.
    CreditCard,
    /// US social security numbers (`123-45-6789`).
    NationalId,
    /// North American style phone numbers with optional country code.
    Phone,
    /// Dotted IPv4 addresses.
    IpAddress,
}

impl PiiDetectorKind {
    /// Returns a stable configuration value for this detector.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::CreditCard => "credit_card",
            Self::NationalId => "national_id",
            Self::Phone => "phone",
            Self::IpAddress => "ip_address",
        }
    }

    /// Returns every detector in application order.
    ///
    /// Longer digit patterns run first so a card number is never half consumed
    /// by the phone pattern.
    #[must_use]
    pub fn all() -> &'static [Self] {
        &[
            Self::Email,
            Self::CreditCard,
            Self::NationalId,
            Self::Phone,
            Self::IpAddress,
        ]
    }

    fn pattern(&self) -> &'static str {
        match self {
            Self::Email => r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b",
            Self::CreditCard => r"\b(?:\d[ -]?){12,18}\d\b",
            Self::NationalId => r"\b\d{3}-\d{2}-\d{4}\b",
            Self::Phone => r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{3}\)|\b\d{3})[\s.-]?\d{3}[\s.-]?\d{4}\b",
            Self::IpAddress => {
                r"\b(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)(?:\.(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)){3}\b"
            }
        }
    }
}

impl FromStr for PiiDetectorKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == value.trim())
            .ok_or_else(|| {
                AppError::validation("detectors", format!("unknown PII detector '{value}'"))
            })
    }
}

/// Detector with its compiled pattern.
#[derive(Debug, Clone)]
pub(super) struct CompiledDetector {
    kind: PiiDetectorKind,
    regex: Regex,
}

impl CompiledDetector {
    pub(super) fn compile(kind: PiiDetectorKind) -> AppResult<Self> {
        let regex = Regex::new(kind.pattern()).map_err(|error| {
            AppError::Internal(format!(
                "failed to compile '{}' detector: {error}",
                kind.as_str()
            ))
        })?;

        Ok(Self { kind, regex })
    }

    /// Replaces every match with the placeholder. Borrows when nothing matched.
    pub(super) fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match self.kind {
            PiiDetectorKind::CreditCard => {
                self.regex.replace_all(text, |captures: &Captures<'_>| {
                    let candidate = captures.get(0).map_or("", |found| found.as_str());
                    if passes_luhn(candidate) {
                        REDACTION_PLACEHOLDER.to_owned()
                    } else {
                        candidate.to_owned()
                    }
                })
            }
            _ => self.regex.replace_all(text, REDACTION_PLACEHOLDER),
        }
    }
}

fn passes_luhn(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate
        .chars()
        .filter_map(|character| character.to_digit(10))
        .collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }

    let checksum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(position, digit)| {
            if position % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                *digit
            }
        })
        .sum();

    checksum % 10 == 0
}

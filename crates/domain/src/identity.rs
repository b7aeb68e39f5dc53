use std::str::FromStr;

use gpuaudit_core::AppError;
use serde::{Deserialize, Serialize};

use crate::audit::is_sha256_hex;

const USER_ID_HASH_PREFIX: &str = "sha256:";

/// One-way hashed principal identifier as stored on audit records.
///
/// Always rendered as `sha256:<64 lowercase hex>` so a hashed value can be told
/// apart from a raw identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserIdHash(String);

impl UserIdHash {
    /// Wraps a raw 32-byte SHA-256 digest.
    #[must_use]
    pub fn from_digest(digest: [u8; 32]) -> Self {
        use std::fmt::Write;

        let hex = digest
            .iter()
            .fold(String::with_capacity(64), |mut acc, byte| {
                let _ = write!(acc, "{byte:02x}");
                acc
            });

        Self(format!("{USER_ID_HASH_PREFIX}{hex}"))
    }

    /// Wraps a hex-encoded SHA-256 digest.
    pub fn from_digest_hex(digest: &str) -> Result<Self, AppError> {
        if !is_sha256_hex(digest) {
            return Err(AppError::validation(
                "user_id",
                "digest must be 64 lowercase hex characters",
            ));
        }

        Ok(Self(format!("{USER_ID_HASH_PREFIX}{digest}")))
    }

    /// Returns whether a value is already in hashed form.
    #[must_use]
    pub fn is_hashed(value: &str) -> bool {
        value
            .strip_prefix(USER_ID_HASH_PREFIX)
            .is_some_and(is_sha256_hex)
    }

    /// Returns the prefixed storage value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for UserIdHash {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let Some(digest) = value.strip_prefix(USER_ID_HASH_PREFIX) else {
            return Err(AppError::validation(
                "user_id",
                format!("hashed identifier must start with '{USER_ID_HASH_PREFIX}'"),
            ));
        };

        Self::from_digest_hex(digest)
    }
}

impl TryFrom<String> for UserIdHash {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(value.as_str())
    }
}

impl From<UserIdHash> for String {
    fn from(value: UserIdHash) -> Self {
        value.0
    }
}

impl std::fmt::Display for UserIdHash {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

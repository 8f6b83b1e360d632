//! Shape fingerprints: SHA-256 of the canonical form, tagged with `s_`.

use crate::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Prefix tagging a shape fingerprint.
pub const SHAPE_ID_PREFIX: &str = "s_";

/// Hex characters in a SHA-256 digest.
pub const SHAPE_ID_HEX_LENGTH: usize = 64;

/// Total length of a shape id on the wire.
pub const SHAPE_ID_LENGTH: usize = SHAPE_ID_PREFIX.len() + SHAPE_ID_HEX_LENGTH;

static SHAPE_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^s_[0-9a-f]{64}$").expect("Invalid shape id regex"));

/// Fingerprint of a statement's canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShapeId(String);

impl ShapeId {
    /// Accept an id from an external source, checking prefix and length.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.len() == SHAPE_ID_LENGTH && SHAPE_ID_PATTERN.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(ValidationError::MalformedShapeId {
                path: "shape_id".to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase hex digest without the prefix.
    pub fn digest_hex(&self) -> &str {
        &self.0[SHAPE_ID_PREFIX.len()..]
    }
}

impl TryFrom<String> for ShapeId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ShapeId::parse(&value)
    }
}

impl From<ShapeId> for String {
    fn from(id: ShapeId) -> Self {
        id.0
    }
}

impl AsRef<str> for ShapeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the shape id of a canonical string.
pub fn compute_shape_id(canonical: &str) -> ShapeId {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    ShapeId(format!("{}{}", SHAPE_ID_PREFIX, hex::encode(digest)))
}

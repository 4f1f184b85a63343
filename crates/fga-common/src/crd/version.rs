//! Semantic model version triple
//!
//! Versions are serialized as an object (`{"major":1,"minor":2,"patch":3}`)
//! in CRDs and as the canonical `"1.2.3"` string in deployment labels and
//! annotations.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing a `"major.minor.patch"` string
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseVersionError {
    /// Input did not have exactly three dot-separated components
    #[error("invalid version format: {0}")]
    Format(String),

    /// Major component was not a non-negative integer
    #[error("invalid major version: {0}")]
    Major(String),

    /// Minor component was not a non-negative integer
    #[error("invalid minor version: {0}")]
    Minor(String),

    /// Patch component was not a non-negative integer
    #[error("invalid patch version: {0}")]
    Patch(String),
}

/// A `(major, minor, patch)` version of an authorization model.
///
/// The derived `Ord` is lexicographic on the field order, which is exactly
/// the semantic-version total order used for latest-wins selection.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Serialize,
    JsonSchema,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
)]
pub struct ModelVersion {
    /// Major version component
    pub major: u32,
    /// Minor version component
    pub minor: u32,
    /// Patch version component
    pub patch: u32,
}

impl ModelVersion {
    /// Create a version from its three components
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ModelVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(ParseVersionError::Format(s.to_string()));
        }

        let major = parts[0]
            .parse::<u32>()
            .map_err(|_| ParseVersionError::Major(parts[0].to_string()))?;
        let minor = parts[1]
            .parse::<u32>()
            .map_err(|_| ParseVersionError::Minor(parts[1].to_string()))?;
        let patch = parts[2]
            .parse::<u32>()
            .map_err(|_| ParseVersionError::Patch(parts[2].to_string()))?;

        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

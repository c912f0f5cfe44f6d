//! Creator and run identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix of run ids minted by the dispatch watchdog when it takes over a
/// run whose start message never arrived.
pub const FALLBACK_RUN_PREFIX: &str = "fallback-";

/// Identifier of a creator whose content the pipeline ingests.
///
/// Creator ids are opaque strings owned by the hosting application; the
/// pipeline never parses them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreatorId(String);

impl CreatorId {
    /// Creates a creator id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CreatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CreatorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CreatorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a single pipeline run.
///
/// Run ids are unique per launch attempt. A watchdog takeover derives its id
/// from the original via [`RunId::to_fallback`], which keeps the lineage
/// visible in logs and run records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Creates a run id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random run id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives the fallback run id the watchdog executes under.
    #[must_use]
    pub fn to_fallback(&self) -> Self {
        Self(format!("{FALLBACK_RUN_PREFIX}{}", self.0))
    }

    /// Returns true if this id was minted by a watchdog takeover.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.0.starts_with(FALLBACK_RUN_PREFIX)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RunId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

//! Normalized finding model
//!
//! Raw findings arrive from any phase in source-specific shapes; the
//! aggregator normalizes them into [`Finding`], the one schema the rest of
//! the system (dedup, verification, reporting) operates on.

use serde::{Deserialize, Serialize};

/// Severity ladder, P0 most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    P0,
    P1,
    P2,
    P3,
    P4,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::P0 => "P0",
            Severity::P1 => "P1",
            Severity::P2 => "P2",
            Severity::P3 => "P3",
            Severity::P4 => "P4",
        }
    }

    /// One-step downgrade; P3 and P4 are already floor-adjacent and stay put.
    pub fn downgraded(&self) -> Severity {
        match self {
            Severity::P0 => Severity::P1,
            Severity::P1 => Severity::P2,
            Severity::P2 => Severity::P3,
            Severity::P3 => Severity::P3,
            Severity::P4 => Severity::P4,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a finding was observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingLocation {
    Code { file: String, line: u32 },
    Page { url: String, selector: Option<String> },
}

impl FindingLocation {
    /// Stable textual key used in the content signature.
    pub fn key(&self) -> String {
        match self {
            FindingLocation::Code { file, line } => format!("{file}:{line}"),
            FindingLocation::Page { url, selector } => match selector {
                Some(selector) => format!("{url}@{selector}"),
                None => url.clone(),
            },
        }
    }
}

/// Supporting evidence attached to a finding
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub screenshots: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub console_logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// How a finding can be checked for reproducibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    /// Re-drive the flow in a browser session
    Browser,
    /// Re-check statically, e.g. re-read the code location
    Static,
    /// Needs a human
    Manual,
    /// Not verifiable
    None,
}

/// A finding as produced by a phase, before normalization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFinding {
    pub source: String,
    pub finding_type: String,
    pub severity: Severity,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub location: FindingLocation,
    #[serde(default)]
    pub evidence: Evidence,
    pub verification: VerificationMethod,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

/// The normalized schema every finding is reduced to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub source: String,
    pub finding_type: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub location: FindingLocation,
    pub evidence: Evidence,
    pub verification: VerificationMethod,
    pub signature: String,
    pub duplicate_of: Option<String>,
    pub confidence: f64,
}

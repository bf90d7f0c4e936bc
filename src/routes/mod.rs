//! Route canonicalization and coverage tracking

pub mod canonical;
pub mod coverage;

pub use canonical::{CanonicalUrl, CanonicalizeOptions, UrlCanonicalizer};
pub use coverage::{CoverageReport, CoverageTracker, RegisterOutcome, RoutePattern};

use serde::{Deserialize, Serialize};

/// Where a URL or route was first discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    CodeAnalysis,
    LinkDiscovery,
    UserSpecified,
    Sitemap,
    Retry,
}

impl DiscoverySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoverySource::CodeAnalysis => "code_analysis",
            DiscoverySource::LinkDiscovery => "link_discovery",
            DiscoverySource::UserSpecified => "user_specified",
            DiscoverySource::Sitemap => "sitemap",
            DiscoverySource::Retry => "retry",
        }
    }
}

//! Finding normalization and content-based deduplication
//!
//! The signature hashes type + location + normalized title, deliberately not
//! the free-text description, so near-identical findings from different
//! phases collapse onto one canonical entry.

use super::types::{Finding, RawFinding};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// Counts over the unique set only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingSummary {
    pub total_raw: usize,
    pub unique: usize,
    pub duplicates: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
}

/// Result of one aggregation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Canonical findings, first occurrence per signature
    pub unique: Vec<Finding>,
    /// Later occurrences, each pointing at its canonical finding
    pub duplicates: Vec<Finding>,
    pub summary: FindingSummary,
}

#[derive(Debug, Default)]
pub struct FindingAggregator;

impl FindingAggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn aggregate(&self, raw_findings: Vec<RawFinding>) -> AggregateResult {
        let total_raw = raw_findings.len();
        let mut unique: Vec<Finding> = Vec::new();
        let mut duplicates: Vec<Finding> = Vec::new();
        let mut canonical_by_signature: HashMap<String, String> = HashMap::new();

        for (index, raw) in raw_findings.into_iter().enumerate() {
            let signature = signature(&raw);
            let id = format!("F-{:04}", index + 1);
            let duplicate_of = canonical_by_signature.get(&signature).cloned();
            let finding = Finding {
                id: id.clone(),
                source: raw.source,
                finding_type: raw.finding_type,
                severity: raw.severity,
                title: raw.title,
                description: raw.description,
                location: raw.location,
                evidence: raw.evidence,
                verification: raw.verification,
                signature: signature.clone(),
                duplicate_of,
                confidence: raw.confidence,
            };
            if finding.duplicate_of.is_some() {
                duplicates.push(finding);
            } else {
                canonical_by_signature.insert(signature, id);
                unique.push(finding);
            }
        }

        let summary = summarize(total_raw, &unique, duplicates.len());
        AggregateResult {
            unique,
            duplicates,
            summary,
        }
    }
}

/// Content signature: stable hash over type, location and normalized title.
pub fn signature(raw: &RawFinding) -> String {
    let input = format!(
        "{}\n{}\n{}",
        raw.finding_type,
        raw.location.key(),
        normalize_message(&raw.title)
    );
    hex::encode(Sha256::digest(input.as_bytes()))[..16].to_string()
}

fn normalize_message(message: &str) -> String {
    message
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn summarize(total_raw: usize, unique: &[Finding], duplicate_count: usize) -> FindingSummary {
    let mut by_severity = BTreeMap::new();
    let mut by_source = BTreeMap::new();
    let mut by_type = BTreeMap::new();
    for finding in unique {
        *by_severity
            .entry(finding.severity.as_str().to_string())
            .or_insert(0) += 1;
        *by_source.entry(finding.source.clone()).or_insert(0) += 1;
        *by_type.entry(finding.finding_type.clone()).or_insert(0) += 1;
    }
    FindingSummary {
        total_raw,
        unique: unique.len(),
        duplicates: duplicate_count,
        by_severity,
        by_source,
        by_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::types::{FindingLocation, Severity, VerificationMethod};

    fn raw(
        source: &str,
        finding_type: &str,
        title: &str,
        url: &str,
        severity: Severity,
    ) -> RawFinding {
        RawFinding {
            source: source.to_string(),
            finding_type: finding_type.to_string(),
            severity,
            title: title.to_string(),
            description: String::new(),
            location: FindingLocation::Page {
                url: url.to_string(),
                selector: None,
            },
            evidence: Default::default(),
            verification: VerificationMethod::Browser,
            confidence: 0.8,
        }
    }

    #[test]
    fn identical_findings_collapse() {
        let aggregator = FindingAggregator::new();
        let result = aggregator.aggregate(vec![
            raw(
                "exploration",
                "console_error",
                "TypeError in checkout",
                "https://example.com/checkout",
                Severity::P1,
            ),
            raw(
                "form-testing",
                "console_error",
                "  TypeError   in CHECKOUT ",
                "https://example.com/checkout",
                Severity::P1,
            ),
        ]);

        assert_eq!(result.unique.len(), 1);
        assert_eq!(result.duplicates.len(), 1);
        assert_eq!(
            result.duplicates[0].duplicate_of.as_deref(),
            Some(result.unique[0].id.as_str())
        );
        assert_eq!(result.summary.unique, 1);
        assert_eq!(result.summary.total_raw, 2);
    }

    #[test]
    fn differing_fields_do_not_collide() {
        let aggregator = FindingAggregator::new();
        let base = raw(
            "exploration",
            "console_error",
            "TypeError in checkout",
            "https://example.com/checkout",
            Severity::P1,
        );
        let mut other_type = base.clone();
        other_type.finding_type = "network_error".to_string();
        let mut other_location = base.clone();
        other_location.location = FindingLocation::Page {
            url: "https://example.com/cart".to_string(),
            selector: None,
        };
        let mut other_message = base.clone();
        other_message.title = "ReferenceError in checkout".to_string();

        let result =
            aggregator.aggregate(vec![base, other_type, other_location, other_message]);
        assert_eq!(result.unique.len(), 4);
        assert!(result.duplicates.is_empty());
    }

    #[test]
    fn description_does_not_affect_signature() {
        let mut a = raw(
            "exploration",
            "broken_link",
            "404 on pricing link",
            "https://example.com/",
            Severity::P2,
        );
        let mut b = a.clone();
        a.description = "observed during crawl".to_string();
        b.description = "completely different prose".to_string();
        assert_eq!(signature(&a), signature(&b));
    }

    #[test]
    fn ids_are_sequential() {
        let aggregator = FindingAggregator::new();
        let result = aggregator.aggregate(vec![
            raw(
                "exploration",
                "broken_link",
                "404 on a",
                "https://example.com/a",
                Severity::P2,
            ),
            raw(
                "exploration",
                "broken_link",
                "404 on b",
                "https://example.com/b",
                Severity::P2,
            ),
        ]);
        assert_eq!(result.unique[0].id, "F-0001");
        assert_eq!(result.unique[1].id, "F-0002");
    }

    #[test]
    fn summary_counts_unique_only() {
        let aggregator = FindingAggregator::new();
        let duplicate = raw(
            "exploration",
            "console_error",
            "TypeError",
            "https://example.com/",
            Severity::P0,
        );
        let result = aggregator.aggregate(vec![duplicate.clone(), duplicate]);
        assert_eq!(result.summary.by_severity.get("P0"), Some(&1));
        assert_eq!(result.summary.duplicates, 1);
    }
}

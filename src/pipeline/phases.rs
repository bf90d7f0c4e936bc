//! Pure phase implementations
//!
//! The pipeline's in-process phases. Each returns the artifacts it declares
//! in the registry as `(name, value)` pairs; delegated phases live behind the
//! [`PhaseExecutor`](super::executor::PhaseExecutor) instead.

use super::context::AuditContext;
use crate::crawl::{CrawlQueue, RouteCrawler};
use crate::findings::{
    Evidence, FindingAggregator, FindingLocation, FindingVerifier, RawFinding, Severity,
    VerificationMethod,
};
use crate::persist::atomic_write_json;
use crate::routes::{CoverageTracker, DiscoverySource};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type PhaseArtifacts = Vec<(String, Value)>;

/// Validate the target and make the state directory usable.
pub fn run_preflight(ctx: &AuditContext) -> Result<PhaseArtifacts> {
    let parsed = url::Url::parse(&ctx.target_url)
        .with_context(|| format!("invalid target URL: {}", ctx.target_url))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("target URL must be http(s), got {}", parsed.scheme());
    }
    if parsed.host_str().is_none() {
        bail!("target URL has no host: {}", ctx.target_url);
    }
    std::fs::create_dir_all(&ctx.state_dir).with_context(|| {
        format!("cannot create state directory {}", ctx.state_dir.display())
    })?;

    Ok(vec![(
        "preflight".to_string(),
        json!({
            "target_url": ctx.target_url,
            "audit_id": ctx.audit_id,
            "state_dir": ctx.state_dir.display().to_string(),
            "checked_at": Utc::now(),
        }),
    )])
}

/// Seed the known-route list from the code-analysis artifact, when present.
pub fn run_progress_init(ctx: &AuditContext) -> Result<PhaseArtifacts> {
    let mut known_routes = Vec::new();
    if let Some(analysis) = ctx.artifact("code_analysis") {
        if let Some(routes) = analysis.get("routes").and_then(Value::as_array) {
            for route in routes {
                let Some(pattern) = route.get("pattern").and_then(Value::as_str) else {
                    continue;
                };
                known_routes.push(json!({
                    "pattern": pattern,
                    "method": route.get("method").and_then(Value::as_str).unwrap_or("GET"),
                    "auth_required": route
                        .get("auth_required")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                }));
            }
        }
    }
    info!(known_routes = known_routes.len(), "Initialized route baseline");
    Ok(vec![("known_routes".to_string(), Value::Array(known_routes))])
}

/// Drive the BFS crawler against the target.
pub async fn run_exploration(
    ctx: &AuditContext,
    cancel: Arc<AtomicBool>,
) -> Result<PhaseArtifacts> {
    {
        let mut tracker = CoverageTracker::new(
            ctx.canonical_options.clone(),
            ctx.crawl_options.max_per_pattern,
        );
        if let Some(Value::Array(routes)) = ctx.artifact("known_routes") {
            for route in routes {
                let (Some(pattern), Some(method)) = (
                    route.get("pattern").and_then(Value::as_str),
                    route.get("method").and_then(Value::as_str),
                ) else {
                    continue;
                };
                let auth_required = route
                    .get("auth_required")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                tracker.add_known_route(
                    pattern,
                    method,
                    DiscoverySource::CodeAnalysis,
                    auth_required,
                );
            }
        }

        let queue = CrawlQueue::new(
            ctx.audit_id.clone(),
            ctx.crawl_options.max_depth,
            ctx.crawl_options.max_queue_size,
        )
        .with_persist_path(ctx.state_dir.join("queue.json"));

        let mut crawler = RouteCrawler::new(
            Arc::clone(&ctx.visitor),
            tracker,
            queue,
            ctx.crawl_options.clone(),
        )?
        .with_abort_flag(cancel)
        .with_progress(Arc::clone(&ctx.progress));

        let summary = crawler.crawl(&ctx.target_url).await?;

        let findings: Vec<RawFinding> = crawler
            .queue()
            .snapshot()
            .failed
            .iter()
            .map(|url| RawFinding {
                source: "exploration".to_string(),
                finding_type: "page_load_error".to_string(),
                severity: Severity::P2,
                title: format!("Page failed to load: {url}"),
                description: "The page could not be retrieved during exploration.".to_string(),
                location: FindingLocation::Page {
                    url: url.clone(),
                    selector: None,
                },
                evidence: Evidence::default(),
                verification: VerificationMethod::Browser,
                confidence: 0.7,
            })
            .collect();

        let coverage = json!({
            "report": crawler.tracker().coverage(),
            "state": crawler.tracker().snapshot(),
        });

        Ok(vec![
            ("crawl_summary".to_string(), serde_json::to_value(&summary)?),
            ("coverage".to_string(), coverage),
            (
                "exploration_findings".to_string(),
                serde_json::to_value(&findings)?,
            ),
        ])
    }
}

/// Normalize and deduplicate findings from every producing phase, then write
/// one file per canonical finding.
pub fn run_aggregation(ctx: &AuditContext) -> Result<PhaseArtifacts> {
    let mut raw_findings = Vec::new();
    for artifact_name in [
        "exploration_findings",
        "code_analysis",
        "form_findings",
        "responsive_findings",
    ] {
        if let Some(value) = ctx.artifact(artifact_name) {
            raw_findings.extend(parse_raw_findings(artifact_name, value));
        }
    }

    let result = FindingAggregator::new().aggregate(raw_findings);
    info!(
        unique = result.summary.unique,
        duplicates = result.summary.duplicates,
        "Aggregated findings"
    );

    let findings_dir = ctx.state_dir.join("findings");
    for finding in &result.unique {
        let path = findings_dir.join(format!("{}.json", finding.id));
        if let Err(error) = atomic_write_json(&path, finding) {
            warn!(finding = %finding.id, error = %error, "Failed to write finding file");
        }
    }

    Ok(vec![
        ("findings".to_string(), serde_json::to_value(&result)?),
        (
            "finding_summary".to_string(),
            serde_json::to_value(&result.summary)?,
        ),
    ])
}

/// Re-attempt browser-verifiable findings through the reproducer.
pub async fn run_verification(ctx: &AuditContext) -> Result<PhaseArtifacts> {
    {
        let unique: Vec<crate::findings::Finding> = ctx
            .artifact("findings")
            .and_then(|v| v.get("unique"))
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .context("findings artifact is malformed")?
            .unwrap_or_default();

        let (to_verify, rest): (Vec<_>, Vec<_>) = unique
            .into_iter()
            .partition(|f| f.verification == VerificationMethod::Browser);

        let verifier = FindingVerifier::new(
            Arc::clone(&ctx.reproducer),
            ctx.verify_options.clone(),
        )
        .with_progress(Arc::clone(&ctx.progress));
        let verified = verifier.verify_all(to_verify).await;
        let issue_worthy = verified.iter().filter(|v| v.issue_worthy).count();
        info!(
            verified = verified.len(),
            issue_worthy, "Verification complete"
        );

        Ok(vec![(
            "verified_findings".to_string(),
            json!({
                "verified": verified,
                "unverified": rest,
            }),
        )])
    }
}

/// Final roll-up of the whole audit.
pub fn run_summary(ctx: &AuditContext) -> Result<PhaseArtifacts> {
    let pages_visited = ctx
        .artifact("crawl_summary")
        .and_then(|v| v.get("pages_visited"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let coverage_percent = ctx
        .artifact("coverage")
        .and_then(|v| v.get("report"))
        .and_then(|v| v.get("percent"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let unique_findings = ctx
        .artifact("finding_summary")
        .and_then(|v| v.get("unique"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let issue_worthy = ctx
        .artifact("verified_findings")
        .and_then(|v| v.get("verified"))
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter(|v| {
                    v.get("issue_worthy").and_then(Value::as_bool).unwrap_or(false)
                })
                .count()
        })
        .unwrap_or(0);

    Ok(vec![(
        "audit_summary".to_string(),
        json!({
            "audit_id": ctx.audit_id,
            "target_url": ctx.target_url,
            "pages_visited": pages_visited,
            "coverage_percent": coverage_percent,
            "unique_findings": unique_findings,
            "issue_worthy_findings": issue_worthy,
            "completed_at": Utc::now(),
        }),
    )])
}

/// Accept either a bare array of raw findings or an object with a `findings`
/// array; anything else contributes nothing.
fn parse_raw_findings(artifact_name: &str, value: &Value) -> Vec<RawFinding> {
    let array = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("findings").and_then(Value::as_array) {
            Some(items) => items.as_slice(),
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    array
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(raw) => Some(raw),
            Err(error) => {
                debug!(artifact = artifact_name, error = %error, "Skipping unparsable finding");
                None
            }
        })
        .collect()
}

/// Write a phase's artifacts to disk so a crash between phases loses nothing
/// beyond the checkpoint replay window.
pub fn persist_artifacts(state_dir: &Path, artifacts: &[(String, Value)]) {
    for (name, value) in artifacts {
        let path = state_dir.join("artifacts").join(format!("{name}.json"));
        if let Err(error) = atomic_write_json(&path, value) {
            warn!(artifact = %name, error = %error, "Failed to persist artifact");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::MockVisitor;
    use crate::findings::NullReproducer;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> AuditContext {
        AuditContext::new(
            "https://example.com/",
            dir.path(),
            Arc::new(MockVisitor::new()),
            Arc::new(NullReproducer),
        )
    }

    #[test]
    fn preflight_rejects_non_http_targets() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir);
        ctx.target_url = "ftp://example.com".to_string();
        assert!(run_preflight(&ctx).is_err());
    }

    #[test]
    fn preflight_creates_state_dir() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir);
        ctx.state_dir = dir.path().join("nested/state");
        let artifacts = run_preflight(&ctx).unwrap();
        assert!(ctx.state_dir.exists());
        assert_eq!(artifacts[0].0, "preflight");
    }

    #[test]
    fn progress_init_reads_code_analysis_routes() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir);
        ctx.set_artifact(
            "code_analysis",
            json!({"routes": [
                {"pattern": "/users/{userId}", "method": "GET", "auth_required": true},
                {"pattern": "/health"},
                {"not_a_route": true},
            ]}),
        );
        let artifacts = run_progress_init(&ctx).unwrap();
        let routes = artifacts[0].1.as_array().unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[1]["method"], "GET");
    }

    #[tokio::test]
    async fn exploration_produces_summary_coverage_and_findings() {
        let dir = TempDir::new().unwrap();
        let visitor = MockVisitor::new()
            .with_page(
                "https://example.com/",
                vec![
                    "https://example.com/about".into(),
                    "https://example.com/broken".into(),
                ],
            )
            .with_failure("https://example.com/broken", "HTTP 500");
        let mut ctx = context(&dir);
        ctx.visitor = Arc::new(visitor);
        ctx.crawl_options = ctx.crawl_options.with_rate_limit(std::time::Duration::ZERO);

        let artifacts = run_exploration(&ctx, Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();
        let names: Vec<&str> = artifacts.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["crawl_summary", "coverage", "exploration_findings"]
        );

        let findings = artifacts[2].1.as_array().unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0]["finding_type"], "page_load_error");
        assert!(dir.path().join("queue.json").exists());
    }

    #[test]
    fn aggregation_merges_findings_from_all_sources() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir);
        let finding = json!({
            "source": "form-testing",
            "finding_type": "form_validation",
            "severity": "P1",
            "title": "Broken submit",
            "location": {"kind": "page", "url": "https://example.com/signup", "selector": null},
            "verification": "browser"
        });
        ctx.set_artifact("form_findings", json!({"findings": [finding.clone()]}));
        ctx.set_artifact("responsive_findings", json!([finding]));

        let artifacts = run_aggregation(&ctx).unwrap();
        let result = &artifacts[0].1;
        assert_eq!(result["unique"].as_array().unwrap().len(), 1);
        assert_eq!(result["duplicates"].as_array().unwrap().len(), 1);
        assert!(dir.path().join("findings/F-0001.json").exists());
    }

    #[tokio::test]
    async fn verification_splits_browser_findings() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir);
        ctx.verify_options = ctx
            .verify_options
            .with_attempt_delay(std::time::Duration::ZERO);

        let raw = vec![
            RawFinding {
                source: "exploration".to_string(),
                finding_type: "page_load_error".to_string(),
                severity: Severity::P2,
                title: "broken page".to_string(),
                description: String::new(),
                location: FindingLocation::Page {
                    url: "https://example.com/x".to_string(),
                    selector: None,
                },
                evidence: Evidence::default(),
                verification: VerificationMethod::Browser,
                confidence: 0.7,
            },
            RawFinding {
                source: "code-analysis".to_string(),
                finding_type: "dead_route".to_string(),
                severity: Severity::P3,
                title: "unused route".to_string(),
                description: String::new(),
                location: FindingLocation::Code {
                    file: "routes.js".to_string(),
                    line: 12,
                },
                evidence: Evidence::default(),
                verification: VerificationMethod::Static,
                confidence: 0.9,
            },
        ];
        let aggregated = FindingAggregator::new().aggregate(raw);
        ctx.set_artifact("findings", serde_json::to_value(&aggregated).unwrap());

        let artifacts = run_verification(&ctx).await.unwrap();
        let value = &artifacts[0].1;
        assert_eq!(value["verified"].as_array().unwrap().len(), 1);
        assert_eq!(value["unverified"].as_array().unwrap().len(), 1);
        // NullReproducer always errors
        assert_eq!(value["verified"][0]["status"], "verification_error");
    }

    #[test]
    fn summary_rolls_up_prior_artifacts() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir);
        ctx.set_artifact("crawl_summary", json!({"pages_visited": 9}));
        ctx.set_artifact("coverage", json!({"report": {"percent": 75.0}}));
        ctx.set_artifact("finding_summary", json!({"unique": 4}));
        ctx.set_artifact(
            "verified_findings",
            json!({"verified": [{"issue_worthy": true}, {"issue_worthy": false}]}),
        );

        let artifacts = run_summary(&ctx).unwrap();
        let summary = &artifacts[0].1;
        assert_eq!(summary["pages_visited"], 9);
        assert_eq!(summary["coverage_percent"], 75.0);
        assert_eq!(summary["unique_findings"], 4);
        assert_eq!(summary["issue_worthy_findings"], 1);
    }
}

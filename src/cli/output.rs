//! Output formatting for CLI results

use super::commands::OutputFormatArg;
use crate::crawl::CrawlSummary;
use crate::pipeline::{AuditReport, PhaseRunStatus};
use anyhow::Result;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_report(&self, report: &AuditReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
            OutputFormat::Human => Ok(render_report(report)),
        }
    }

    pub fn format_crawl(&self, summary: &CrawlSummary, coverage: &Value) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&serde_json::json!({
                "summary": summary,
                "coverage": coverage,
            }))?),
            OutputFormat::Human => Ok(render_crawl(summary, coverage)),
        }
    }

    /// Print to stdout, or write to the given file.
    pub fn emit(&self, content: &str, output: Option<&Path>) -> Result<()> {
        match output {
            Some(path) => {
                std::fs::write(path, content)?;
                Ok(())
            }
            None => {
                println!("{content}");
                Ok(())
            }
        }
    }
}

fn render_report(report: &AuditReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("Audit {}\n", report.audit_id));
    if report.resumed {
        out.push_str("(resumed from checkpoint)\n");
    }
    out.push('\n');
    for record in &report.phases {
        let status = match record.status {
            PhaseRunStatus::Completed => "ok",
            PhaseRunStatus::Failed => "FAILED",
            PhaseRunStatus::Skipped => "skipped",
        };
        out.push_str(&format!(
            "  {:<20} {:<8} {:>7.2} units  {:>6}ms\n",
            record.phase.as_str(),
            status,
            record.cost,
            record.duration_ms
        ));
        if let Some(error) = &record.error {
            out.push_str(&format!("    reason: {error}\n"));
        }
    }
    out.push('\n');
    if let Some(summary) = &report.summary {
        if let Some(pages) = summary.get("pages_visited") {
            out.push_str(&format!("Pages visited:        {pages}\n"));
        }
        if let Some(percent) = summary.get("coverage_percent").and_then(Value::as_f64) {
            out.push_str(&format!("Route coverage:       {percent:.1}%\n"));
        }
        if let Some(findings) = summary.get("unique_findings") {
            out.push_str(&format!("Unique findings:      {findings}\n"));
        }
        if let Some(issues) = summary.get("issue_worthy_findings") {
            out.push_str(&format!("Issue-worthy:         {issues}\n"));
        }
    }
    out.push_str(&format!(
        "Total cost: {:.2} units in {}ms\n",
        report.total_cost, report.duration_ms
    ));
    out
}

fn render_crawl(summary: &CrawlSummary, coverage: &Value) -> String {
    let mut out = String::new();
    out.push_str(&format!("Pages visited:       {}\n", summary.pages_visited));
    out.push_str(&format!(
        "Route patterns:      {}\n",
        summary.route_patterns_found
    ));
    out.push_str(&format!(
        "Links discovered:    {}\n",
        summary.links_discovered
    ));
    out.push_str(&format!("Errors:              {}\n", summary.errors));
    out.push_str(&format!(
        "Stopped because:     {}\n",
        summary.stop_reason.as_str()
    ));
    if let Some(percent) = coverage
        .get("report")
        .and_then(|r| r.get("percent"))
        .and_then(Value::as_f64)
    {
        out.push_str(&format!("Coverage:            {percent:.1}%\n"));
    }
    out.push_str(&format!("Duration:            {}ms\n", summary.duration_ms));
    out
}

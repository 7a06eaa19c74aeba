//! Report assembly, validation, and persistence.
//!
//! Turns the conflicts found in a run into the final JSON report. The
//! regulation id is content-addressed — a pure function of the regulation
//! text and the law date — so resubmitting the same regulation always
//! yields the same id even though `date_processed` moves.
//!
//! Validation happens on the serialized JSON rather than the Rust structs,
//! so a refactor that breaks the output schema is caught at assembly time
//! instead of by a downstream consumer.

use anyhow::{Context, Result};
use chrono::Local;
use md5::{Digest, Md5};
use std::path::{Path, PathBuf};

use crate::classify::truncate_chars;
use crate::error::PipelineError;
use crate::models::{Report, ReportMetadata, Verdict};

/// Excerpt fields in the final report are capped at this many chars.
const REPORT_EXCERPT_CHARS: usize = 500;

const REQUIRED_REPORT_KEYS: [&str; 4] = [
    "regulation_id",
    "date_processed",
    "total_risks_flagged",
    "risks",
];

const REQUIRED_RISK_KEYS: [&str; 6] = [
    "policy_id",
    "severity",
    "divergence_summary",
    "conflicting_policy_excerpt",
    "new_rule_excerpt",
    "recommendation",
];

/// Compute the content-addressed regulation id.
///
/// `REG_` plus the first 12 hex characters, uppercased, of the MD5 of
/// `date_of_law` (empty string when absent) concatenated with the
/// regulation text. MD5 is used for identity only, not security.
pub fn regulation_id(regulation_text: &str, date_of_law: Option<&str>) -> String {
    let mut hasher = Md5::new();
    hasher.update(date_of_law.unwrap_or("").as_bytes());
    hasher.update(regulation_text.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("REG_{}", digest[..12].to_uppercase())
}

/// Assemble the final report from the conflicts of one run.
///
/// Caps excerpt fields at 500 characters, stamps `date_processed` with the
/// current local date, and validates the serialized output before
/// returning. Fails with [`PipelineError::SchemaViolation`] naming the
/// offending key or risk index if the result does not match the schema.
pub fn assemble(
    regulation_text: &str,
    conflicts: Vec<Verdict>,
    date_of_law: Option<&str>,
    regulation_title: Option<&str>,
    metadata: ReportMetadata,
) -> Result<Report, PipelineError> {
    let risks: Vec<Verdict> = conflicts
        .into_iter()
        .map(|mut v| {
            v.conflicting_policy_excerpt =
                truncate_chars(&v.conflicting_policy_excerpt, REPORT_EXCERPT_CHARS);
            v.new_rule_excerpt = truncate_chars(&v.new_rule_excerpt, REPORT_EXCERPT_CHARS);
            v
        })
        .collect();

    let report = Report {
        regulation_id: regulation_id(regulation_text, date_of_law),
        regulation_title: regulation_title.unwrap_or("Untitled Regulation").to_string(),
        date_of_law: date_of_law.unwrap_or("N/A").to_string(),
        date_processed: Local::now().format("%Y-%m-%d").to_string(),
        total_risks_flagged: risks.len(),
        risks,
        metadata,
    };

    validate_report(&report)?;
    Ok(report)
}

/// Validate the report against the output schema at the JSON level.
pub fn validate_report(report: &Report) -> Result<(), PipelineError> {
    let value = serde_json::to_value(report)
        .map_err(|e| PipelineError::SchemaViolation(format!("report not serializable: {e}")))?;

    let obj = value
        .as_object()
        .ok_or_else(|| PipelineError::SchemaViolation("report is not a JSON object".to_string()))?;

    for key in REQUIRED_REPORT_KEYS {
        if !obj.contains_key(key) {
            return Err(PipelineError::SchemaViolation(format!(
                "missing required key: {key}"
            )));
        }
    }

    let risks = obj
        .get("risks")
        .and_then(|r| r.as_array())
        .ok_or_else(|| PipelineError::SchemaViolation("risks is not an array".to_string()))?;

    for (i, risk) in risks.iter().enumerate() {
        let risk_obj = risk.as_object().ok_or_else(|| {
            PipelineError::SchemaViolation(format!("risk {i} is not a JSON object"))
        })?;

        for key in REQUIRED_RISK_KEYS {
            if !risk_obj.contains_key(key) {
                return Err(PipelineError::SchemaViolation(format!(
                    "risk {i} missing required key: {key}"
                )));
            }
        }

        let severity = risk_obj.get("severity").and_then(|s| s.as_str());
        if !matches!(severity, Some("HIGH" | "MEDIUM" | "LOW")) {
            return Err(PipelineError::SchemaViolation(format!(
                "risk {i} has invalid severity: {severity:?}"
            )));
        }
    }

    let flagged = obj
        .get("total_risks_flagged")
        .and_then(|t| t.as_u64())
        .unwrap_or(u64::MAX);
    if flagged != risks.len() as u64 {
        return Err(PipelineError::SchemaViolation(format!(
            "total_risks_flagged ({flagged}) does not match risks length ({})",
            risks.len()
        )));
    }

    Ok(())
}

/// Write the report to the reports directory as pretty-printed JSON.
///
/// Filename is `reglens_report_<YYYYmmdd_HHMMSS>.json`. Creates the
/// directory if needed. Callers treat a write failure as non-fatal: the
/// in-memory report already returned stays valid.
pub fn save_report(report: &Report, reports_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(reports_dir)
        .with_context(|| format!("Failed to create reports dir: {}", reports_dir.display()))?;

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = reports_dir.join(format!("reglens_report_{stamp}.json"));

    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;

    Ok(path)
}

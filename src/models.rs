//! Core data models used throughout reglens.
//!
//! These types represent the policy documents, chunks, retrieval results,
//! conflict verdicts, and reports that flow through the ingestion and
//! analysis pipeline.

use serde::{Deserialize, Serialize};

/// A raw policy document loaded from the corpus directory.
///
/// `source_id` is the file stem (name sans extension) and is stable across
/// re-ingestion runs. Documents are immutable once ingested.
#[derive(Debug, Clone)]
pub struct PolicyDocument {
    pub source_id: String,
    /// Original file name, extension included.
    pub file_name: String,
    pub body: String,
}

/// A bounded contiguous span of a policy document, the unit of retrieval.
///
/// `sequence_index` records chunk order within its source document.
/// `hash` is a SHA-256 of the text, used for staleness detection.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub source_id: String,
    pub sequence_index: i64,
    pub text: String,
    pub hash: String,
}

/// One retrieved policy excerpt with its similarity score.
///
/// `score` is cosine similarity against the query embedding (higher is
/// closer). `policy_id` is the source id with any file extension stripped,
/// or a synthetic `policy_chunk_<n>` when the source tag is missing.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalItem {
    pub policy_id: String,
    pub excerpt: String,
    pub score: f64,
    pub source: String,
}

/// Conflict severity assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

/// A structured conflict assessment for one (regulation, policy excerpt)
/// pair.
///
/// Invariant: `has_conflict == false` implies `severity == Low`. Excerpt
/// fields are truncated to 200 characters at creation and capped at 500 at
/// report assembly. Verdicts are never mutated after creation except for
/// that assembly-time truncation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub policy_id: String,
    pub severity: Severity,
    pub has_conflict: bool,
    pub divergence_summary: String,
    pub conflicting_policy_excerpt: String,
    pub new_rule_excerpt: String,
    pub recommendation: String,
}

/// Run-level telemetry carried in the report's `metadata` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub total_policies_analyzed: usize,
    pub total_conflicts_found: usize,
    /// Classifications that fell back to the degraded verdict because the
    /// oracle's output could not be used.
    pub degraded_classifications: usize,
    pub analysis_engine: String,
}

/// The final analysis report.
///
/// `regulation_id` is content-addressed: a pure function of
/// `(date_of_law, regulation_text)`, so identical inputs always produce
/// the identical id. `date_processed` is the only non-pure field.
/// Invariant: `total_risks_flagged == risks.len()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub regulation_id: String,
    pub regulation_title: String,
    pub date_of_law: String,
    pub date_processed: String,
    pub total_risks_flagged: usize,
    pub risks: Vec<Verdict>,
    pub metadata: ReportMetadata,
}

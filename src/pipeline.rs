//! Analysis run orchestration.
//!
//! One run walks three stages in strict sequence: RETRIEVE (semantic
//! search for the regulation text), CLASSIFY (per-excerpt verdict,
//! fallback on failure), ASSEMBLE (validated report). Stage outputs are
//! value types passed forward, so each stage is testable on its own
//! without constructing a whole analyzer.
//!
//! Failure discipline: RETRIEVE and ASSEMBLE errors abort the run;
//! CLASSIFY failures degrade the affected item only. The caller always
//! receives either a fully valid report or an explicit error, never a
//! half-built report.

use anyhow::Result;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;

use crate::classify::{classify, Classification};
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::PipelineError;
use crate::index::PolicyIndex;
use crate::models::{Report, ReportMetadata, RetrievalItem};
use crate::oracle::ReasoningOracle;
use crate::report::{assemble, save_report};
use crate::retrieve::Retriever;

pub const MIN_REGULATION_CHARS: usize = 10;
pub const MAX_REGULATION_CHARS: usize = 20_000;
pub const MAX_REGULATION_WORDS: usize = 2_000;

/// One regulation submitted for analysis.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub regulation_text: String,
    /// Optional `YYYY-MM-DD` date the regulation takes effect.
    pub date_of_law: Option<String>,
    pub regulation_title: Option<String>,
}

impl AnalysisRequest {
    /// Validate the inbound contract shared by the HTTP API and the CLI.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let chars = self.regulation_text.chars().count();
        if chars < MIN_REGULATION_CHARS {
            return Err(PipelineError::InvalidQuery(format!(
                "regulation text too short: {chars} chars (minimum {MIN_REGULATION_CHARS})"
            )));
        }
        if chars > MAX_REGULATION_CHARS {
            return Err(PipelineError::InvalidQuery(format!(
                "regulation text too long: {chars} chars (maximum {MAX_REGULATION_CHARS})"
            )));
        }
        let words = self.regulation_text.split_whitespace().count();
        if words > MAX_REGULATION_WORDS {
            return Err(PipelineError::InvalidQuery(format!(
                "regulation text too long: {words} words (maximum {MAX_REGULATION_WORDS})"
            )));
        }
        if let Some(date) = &self.date_of_law {
            if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                return Err(PipelineError::InvalidQuery(format!(
                    "date_of_law must be YYYY-MM-DD, got '{date}'"
                )));
            }
        }
        Ok(())
    }
}

/// Output of the RETRIEVE stage.
#[derive(Debug)]
pub struct RetrievalStage {
    pub items: Vec<RetrievalItem>,
}

/// Output of the CLASSIFY stage: one classification per retrieved item,
/// in retrieval order.
#[derive(Debug)]
pub struct AuditStage {
    pub classifications: Vec<Classification>,
}

impl AuditStage {
    pub fn degraded_count(&self) -> usize {
        self.classifications
            .iter()
            .filter(|c| c.is_degraded())
            .count()
    }
}

/// Result of a complete run.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub report: Report,
    /// Where the report was persisted, when saving was requested and
    /// succeeded.
    pub report_path: Option<PathBuf>,
}

/// Process-wide analysis engine: shared index, embedder, and oracle with
/// explicit construction instead of implicit global state.
pub struct Analyzer {
    config: Config,
    index: Arc<PolicyIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    oracle: Arc<dyn ReasoningOracle>,
}

impl Analyzer {
    pub fn new(
        config: Config,
        index: Arc<PolicyIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        oracle: Arc<dyn ReasoningOracle>,
    ) -> Self {
        Self {
            config,
            index,
            embedder,
            oracle,
        }
    }

    /// Readiness: the index is reachable and has at least one entry.
    pub async fn is_ready(&self) -> bool {
        matches!(self.index.is_empty().await, Ok(false))
    }

    /// Run the full pipeline for one request.
    ///
    /// `save` controls report persistence; a persistence failure is
    /// reported as a warning and does not invalidate the returned report.
    pub async fn analyze(
        &self,
        request: &AnalysisRequest,
        top_k: Option<usize>,
        save: bool,
    ) -> Result<AnalysisOutcome, PipelineError> {
        request.validate()?;

        let k = top_k.unwrap_or(self.config.retrieval.top_k);
        let retrieval = self.retrieve(&request.regulation_text, k).await?;
        let audit = self.audit(&request.regulation_text, &retrieval).await;

        let degraded = audit.degraded_count();
        let conflicts: Vec<_> = audit
            .classifications
            .into_iter()
            .map(Classification::into_verdict)
            .filter(|v| v.has_conflict)
            .collect();

        let metadata = ReportMetadata {
            total_policies_analyzed: retrieval.items.len(),
            total_conflicts_found: conflicts.len(),
            degraded_classifications: degraded,
            analysis_engine: format!("reglens {}", env!("CARGO_PKG_VERSION")),
        };

        let report = assemble(
            &request.regulation_text,
            conflicts,
            request.date_of_law.as_deref(),
            request.regulation_title.as_deref(),
            metadata,
        )?;

        let report_path = if save {
            match save_report(&report, &self.config.reports.dir) {
                Ok(path) => Some(path),
                Err(e) => {
                    eprintln!("Warning: failed to persist report: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(AnalysisOutcome {
            report,
            report_path,
        })
    }

    async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalStage, PipelineError> {
        let retriever = Retriever::new(self.index.clone(), self.embedder.clone());
        let items = retriever.search(query, k).await?;
        Ok(RetrievalStage { items })
    }

    /// CLASSIFY never fails: every item yields a classification, in
    /// retrieval order.
    async fn audit(&self, regulation_text: &str, retrieval: &RetrievalStage) -> AuditStage {
        let mut classifications = Vec::with_capacity(retrieval.items.len());
        for item in &retrieval.items {
            classifications.push(
                classify(
                    self.oracle.as_ref(),
                    regulation_text,
                    &item.excerpt,
                    &item.policy_id,
                )
                .await,
            );
        }
        AuditStage { classifications }
    }
}

//! Conflict classification for a (regulation, policy excerpt) pair.
//!
//! Builds a structured comparison prompt, asks the reasoning oracle for a
//! JSON verdict, and parses the response. The contract is that
//! [`classify`] never fails outward: any oracle or parse failure collapses
//! into a degraded LOW-severity verdict that flags the excerpt for manual
//! review. The pipeline therefore always completes with one verdict per
//! retrieved item, even when the completion backend misbehaves.

use crate::models::{Severity, Verdict};
use crate::oracle::ReasoningOracle;

/// Excerpt fields are truncated to this many chars when a verdict is
/// created (both the parsed and the fallback path).
const VERDICT_EXCERPT_CHARS: usize = 200;

/// The outcome of classifying one retrieval item.
///
/// Both arms carry a well-formed [`Verdict`]; `Degraded` additionally
/// records why the oracle's answer could not be used, so run summaries can
/// report how many verdicts came from the fallback path.
#[derive(Debug, Clone)]
pub enum Classification {
    Sound(Verdict),
    Degraded { verdict: Verdict, reason: String },
}

impl Classification {
    pub fn verdict(&self) -> &Verdict {
        match self {
            Classification::Sound(v) => v,
            Classification::Degraded { verdict, .. } => verdict,
        }
    }

    pub fn into_verdict(self) -> Verdict {
        match self {
            Classification::Sound(v) => v,
            Classification::Degraded { verdict, .. } => verdict,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Classification::Degraded { .. })
    }
}

/// Classify one policy excerpt against the regulation text.
///
/// Never returns an error. Oracle failures, unparseable responses, and
/// schema-invalid JSON all produce a `Degraded` classification with
/// `severity=LOW`, `has_conflict=false`, and a manual-review
/// recommendation.
pub async fn classify(
    oracle: &dyn ReasoningOracle,
    regulation_text: &str,
    excerpt: &str,
    policy_id: &str,
) -> Classification {
    let prompt = build_prompt(regulation_text, excerpt);

    let response = match oracle.complete(&prompt).await {
        Ok(text) => text,
        Err(e) => {
            return fallback(
                regulation_text,
                excerpt,
                policy_id,
                format!("oracle call failed: {e}"),
            );
        }
    };

    match parse_verdict(&response, policy_id) {
        Ok(verdict) => Classification::Sound(verdict),
        Err(reason) => fallback(regulation_text, excerpt, policy_id, reason),
    }
}

/// The comparison prompt sent to the oracle.
///
/// Severity definitions are spelled out inline so the rubric travels with
/// every request rather than living in a system message the backend might
/// drop.
fn build_prompt(regulation_text: &str, excerpt: &str) -> String {
    format!(
        r#"You are a senior legal compliance analyst specialized in regulatory gap analysis.

Your task: Compare the internal company policy excerpt below with a new regulation and determine if there is a conflict.

NEW REGULATION:
{regulation_text}

INTERNAL POLICY EXCERPT:
{excerpt}

ANALYSIS INSTRUCTIONS:
1. Identify if there is ANY conflict, divergence, or gap between the policy and the regulation
2. Classify the severity as:
   - HIGH: Direct contradiction, legal risk, immediate action required
   - MEDIUM: Partial conflict, ambiguity, or missing requirement
   - LOW: Minor gap, best practice improvement, or no real conflict

3. Return your analysis in this EXACT JSON format (no other text):
{{
  "severity": "HIGH" | "MEDIUM" | "LOW",
  "has_conflict": true | false,
  "divergence_summary": "One sentence explaining the conflict",
  "conflicting_policy_excerpt": "Quote the specific problematic part from the policy (max 200 chars)",
  "new_rule_excerpt": "Quote the specific conflicting part from the regulation (max 200 chars)",
  "recommendation": "One clear action item for legal team"
}}

If there is NO conflict, set has_conflict to false and use severity "LOW".
"#
    )
}

/// Parse the oracle's response into a [`Verdict`].
///
/// Locates the first balanced JSON object in the text (oracles routinely
/// wrap JSON in prose or markdown fences), deserializes it, and applies
/// the normalization rule: `has_conflict=false` forces `severity=LOW`.
fn parse_verdict(response: &str, policy_id: &str) -> Result<Verdict, String> {
    let json_text =
        extract_json_object(response).ok_or_else(|| "no JSON object in response".to_string())?;

    let mut value: serde_json::Value = serde_json::from_str(json_text)
        .map_err(|e| format!("response JSON did not parse: {e}"))?;

    // policy_id comes from the retrieval item, never from the oracle.
    if let Some(obj) = value.as_object_mut() {
        obj.insert(
            "policy_id".to_string(),
            serde_json::Value::String(policy_id.to_string()),
        );
    }

    let mut verdict: Verdict = serde_json::from_value(value)
        .map_err(|e| format!("response missing required field: {e}"))?;

    if !verdict.has_conflict {
        verdict.severity = Severity::Low;
    }

    // The prompt asks for 200-char excerpts; enforce it rather than trust.
    verdict.conflicting_policy_excerpt =
        truncate_chars(&verdict.conflicting_policy_excerpt, VERDICT_EXCERPT_CHARS);
    verdict.new_rule_excerpt = truncate_chars(&verdict.new_rule_excerpt, VERDICT_EXCERPT_CHARS);

    Ok(verdict)
}

/// Find the first balanced `{...}` span in `text`.
///
/// Brace counting is string- and escape-aware so braces inside JSON string
/// values do not break the balance.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

fn fallback(
    regulation_text: &str,
    excerpt: &str,
    policy_id: &str,
    reason: String,
) -> Classification {
    let verdict = Verdict {
        policy_id: policy_id.to_string(),
        severity: Severity::Low,
        has_conflict: false,
        divergence_summary: format!("Analysis failed: {reason}"),
        conflicting_policy_excerpt: truncate_chars(excerpt, VERDICT_EXCERPT_CHARS),
        new_rule_excerpt: truncate_chars(regulation_text, VERDICT_EXCERPT_CHARS),
        recommendation: "Manual review required due to analysis error".to_string(),
    };
    Classification::Degraded { verdict, reason }
}

/// Truncate to at most `max` characters, respecting UTF-8 boundaries.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

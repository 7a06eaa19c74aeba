//! Top-k semantic retrieval over the persistent index.
//!
//! Embeds the query with the same provider used at ingestion, computes
//! cosine similarity against every stored vector, and returns the k
//! closest excerpts sorted by similarity descending. Equal scores order by
//! index insertion order, which is stable for a given ingestion run.

use std::sync::Arc;

use crate::embedding::{cosine_similarity, embed_query, EmbeddingProvider};
use crate::error::PipelineError;
use crate::index::PolicyIndex;
use crate::models::RetrievalItem;

pub struct Retriever {
    index: Arc<PolicyIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(index: Arc<PolicyIndex>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { index, embedder }
    }

    /// Return at most `k` excerpts, closest first.
    ///
    /// Empty on an empty index. Fails with [`PipelineError::InvalidQuery`]
    /// for a blank query or `k == 0`, and with
    /// [`PipelineError::UpstreamUnavailable`] when the query cannot be
    /// embedded.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalItem>, PipelineError> {
        if query.trim().is_empty() {
            return Err(PipelineError::InvalidQuery(
                "query must be a non-empty string".to_string(),
            ));
        }
        if k == 0 {
            return Err(PipelineError::InvalidQuery("k must be >= 1".to_string()));
        }

        let entries = self.index.entries().await?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = embed_query(self.embedder.as_ref(), query)
            .await
            .map_err(|e| PipelineError::UpstreamUnavailable(format!("query embedding: {e}")))?;

        let mut scored: Vec<(f64, &crate::index::IndexEntry)> = entries
            .iter()
            .map(|entry| {
                let score = cosine_similarity(&query_vec, &entry.embedding) as f64;
                (score, entry)
            })
            .collect();

        // Similarity descending; ties break on rowid (insertion order).
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.rowid.cmp(&b.1.rowid))
        });
        scored.truncate(k);

        Ok(scored
            .iter()
            .enumerate()
            .map(|(rank, (score, entry))| RetrievalItem {
                policy_id: derive_policy_id(&entry.source_id, rank),
                excerpt: entry.text.clone(),
                score: *score,
                source: entry.source_id.clone(),
            })
            .collect())
    }
}

/// Derive the policy identifier for a retrieval result.
///
/// The source id (already extension-free for filesystem corpora) is used
/// directly, with any lingering extension stripped. Entries with no source
/// tag get a synthetic `policy_chunk_<n>` id from their 1-based rank.
fn derive_policy_id(source_id: &str, rank: usize) -> String {
    if source_id.is_empty() {
        return format!("policy_chunk_{}", rank + 1);
    }
    for ext in [".md", ".txt"] {
        if let Some(stripped) = source_id.strip_suffix(ext) {
            return stripped.to_string();
        }
    }
    source_id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, Config};
    use crate::embedding::HashProvider;
    use crate::models::Chunk;
    use sha2::Digest;
    use std::io::Write;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"
[index]
path = "{}/index.sqlite"

[policies]
dir = "{}"
"#,
            dir.display(),
            dir.display()
        )
        .unwrap();
        load_config(f.path()).unwrap()
    }

    fn make_chunk(source_id: &str, seq: i64, text: &str) -> Chunk {
        Chunk {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: source_id.to_string(),
            sequence_index: seq,
            text: text.to_string(),
            hash: format!("{:x}", sha2::Sha256::digest(text.as_bytes())),
        }
    }

    async fn seeded_retriever(
        dir: &std::path::Path,
        texts: &[(&str, &str)],
    ) -> (Retriever, Arc<dyn EmbeddingProvider>) {
        let cfg = test_config(dir);
        PolicyIndex::init(&cfg).await.unwrap();
        let index = Arc::new(PolicyIndex::open(&cfg).await.unwrap());
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashProvider::new(128));

        let mut entries = Vec::new();
        for (i, (source_id, text)) in texts.iter().enumerate() {
            let chunk = make_chunk(source_id, i as i64, text);
            let vec = embedder
                .embed_batch(&[text.to_string()])
                .await
                .unwrap()
                .remove(0);
            entries.push((chunk, vec));
        }
        index
            .rebuild(&entries, embedder.model_name(), embedder.dims())
            .await
            .unwrap();

        (Retriever::new(index, embedder.clone()), embedder)
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (retriever, _) = seeded_retriever(tmp.path(), &[("p", "text")]).await;
        let err = retriever.search("   ", 5).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_zero_k_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (retriever, _) = seeded_retriever(tmp.path(), &[("p", "text")]).await;
        let err = retriever.search("query", 0).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let (retriever, _) = seeded_retriever(tmp.path(), &[]).await;
        let items = retriever.search("anything at all", 5).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_top_k_bound() {
        let tmp = tempfile::tempdir().unwrap();
        let corpus: Vec<(&str, &str)> = vec![
            ("p1", "data retention for ninety days"),
            ("p2", "badge access to the office"),
            ("p3", "deletion of customer records"),
        ];
        let (retriever, _) = seeded_retriever(tmp.path(), &corpus).await;

        for k in 1..=5 {
            let items = retriever.search("data retention", k).await.unwrap();
            assert!(items.len() <= k);
            assert!(items.len() <= corpus.len());
        }
    }

    #[tokio::test]
    async fn test_most_relevant_first_and_scores_monotone() {
        let tmp = tempfile::tempdir().unwrap();
        let (retriever, _) = seeded_retriever(
            tmp.path(),
            &[
                ("office_policy", "employees must wear identification badges"),
                ("retention_policy", "customer data retained for ninety days"),
            ],
        )
        .await;

        let items = retriever
            .search("how long is customer data retained", 2)
            .await
            .unwrap();
        assert_eq!(items[0].policy_id, "retention_policy");
        for pair in items.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_tie_break_by_insertion_order() {
        let tmp = tempfile::tempdir().unwrap();
        // Identical texts embed identically, forcing equal scores.
        let (retriever, _) = seeded_retriever(
            tmp.path(),
            &[
                ("first_policy", "identical clause text"),
                ("second_policy", "identical clause text"),
            ],
        )
        .await;

        let items = retriever.search("identical clause text", 2).await.unwrap();
        assert_eq!(items[0].policy_id, "first_policy");
        assert_eq!(items[1].policy_id, "second_policy");
        assert_eq!(items[0].score, items[1].score);
    }

    #[tokio::test]
    async fn test_deterministic_results() {
        let tmp = tempfile::tempdir().unwrap();
        let (retriever, _) = seeded_retriever(
            tmp.path(),
            &[
                ("a", "first policy about travel expenses"),
                ("b", "second policy about remote work"),
                ("c", "third policy about data handling"),
            ],
        )
        .await;

        let first = retriever.search("policy about data", 3).await.unwrap();
        let second = retriever.search("policy about data", 3).await.unwrap();
        let ids1: Vec<_> = first.iter().map(|i| &i.policy_id).collect();
        let ids2: Vec<_> = second.iter().map(|i| &i.policy_id).collect();
        assert_eq!(ids1, ids2);
    }

    #[test]
    fn test_policy_id_derivation() {
        assert_eq!(derive_policy_id("retention_policy", 0), "retention_policy");
        assert_eq!(derive_policy_id("retention_policy.md", 0), "retention_policy");
        assert_eq!(derive_policy_id("notes.txt", 4), "notes");
        assert_eq!(derive_policy_id("", 0), "policy_chunk_1");
        assert_eq!(derive_policy_id("", 4), "policy_chunk_5");
    }
}

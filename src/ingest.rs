//! Corpus ingestion: scan, chunk, embed, and rebuild the index.
//!
//! Ingestion is all-or-nothing. Embedding failure for any batch aborts the
//! run before the index is touched, and the rebuild itself happens inside
//! a single transaction, so queries never observe a partially built index.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::index::PolicyIndex;
use crate::models::Chunk;
use crate::policies::load_policies;

/// Summary of one ingestion run.
#[derive(Debug)]
pub struct IngestSummary {
    pub documents: usize,
    pub chunks: usize,
    pub skipped_empty: usize,
}

/// Scan the policies directory, chunk every document, embed the chunks,
/// and atomically replace the index contents.
///
/// With `dry_run` set, stops after chunking and reports what would have
/// been ingested without touching the index or the embedding backend.
pub async fn ingest(
    config: &Config,
    index: &PolicyIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    dry_run: bool,
) -> Result<IngestSummary> {
    let docs = load_policies(config)?;

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut skipped_empty = 0usize;

    for doc in &docs {
        let doc_chunks = chunk_document(
            &doc.source_id,
            &doc.body,
            config.chunking.chunk_size,
            config.chunking.overlap,
        );
        if doc_chunks.is_empty() {
            skipped_empty += 1;
            println!("  Skipping {} (empty)", doc.file_name);
            continue;
        }
        println!("  {} -> {} chunks", doc.file_name, doc_chunks.len());
        chunks.extend(doc_chunks);
    }

    let summary = IngestSummary {
        documents: docs.len() - skipped_empty,
        chunks: chunks.len(),
        skipped_empty,
    };

    if dry_run {
        println!(
            "Dry run: {} documents, {} chunks (index not modified)",
            summary.documents, summary.chunks
        );
        return Ok(summary);
    }

    let embeddings = embed_chunks(&chunks, embedder.as_ref(), config.embedding.batch_size)
        .await
        .context("Embedding failed; index left unchanged")?;

    let entries: Vec<(Chunk, Vec<f32>)> = chunks.into_iter().zip(embeddings).collect();
    index
        .rebuild(&entries, embedder.model_name(), embedder.dims())
        .await?;

    println!(
        "Ingested {} documents ({} chunks) with {}",
        summary.documents,
        summary.chunks,
        embedder.model_name()
    );

    Ok(summary)
}

/// Embed all chunks in batches of `batch_size`, preserving chunk order.
async fn embed_chunks(
    chunks: &[Chunk],
    embedder: &dyn EmbeddingProvider,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let mut embeddings = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let mut vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != texts.len() {
            anyhow::bail!(
                "Embedding provider returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            );
        }
        embeddings.append(&mut vectors);
    }

    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use crate::embedding::HashProvider;
    use std::fs;
    use std::io::Write;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"
[index]
path = "{}/index.sqlite"

[policies]
dir = "{}/policies"

[chunking]
chunk_size = 120
overlap = 20
"#,
            dir.display(),
            dir.display()
        )
        .unwrap();
        load_config(f.path()).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_populates_index() {
        let tmp = tempfile::tempdir().unwrap();
        let policies = tmp.path().join("policies");
        fs::create_dir_all(&policies).unwrap();
        fs::write(
            policies.join("retention.md"),
            "Customer data is retained for 90 days after a deletion request.",
        )
        .unwrap();
        fs::write(
            policies.join("access.md"),
            "Employees must wear badges at all times while on site.",
        )
        .unwrap();

        let cfg = test_config(tmp.path());
        PolicyIndex::init(&cfg).await.unwrap();
        let index = PolicyIndex::open(&cfg).await.unwrap();
        let embedder = Arc::new(HashProvider::new(64));

        let summary = ingest(&cfg, &index, embedder, false).await.unwrap();
        assert_eq!(summary.documents, 2);
        assert!(summary.chunks >= 2);
        assert_eq!(index.len().await.unwrap() as usize, summary.chunks);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_index_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let policies = tmp.path().join("policies");
        fs::create_dir_all(&policies).unwrap();
        fs::write(policies.join("p.md"), "Some policy body.").unwrap();

        let cfg = test_config(tmp.path());
        PolicyIndex::init(&cfg).await.unwrap();
        let index = PolicyIndex::open(&cfg).await.unwrap();
        let embedder = Arc::new(HashProvider::new(64));

        let summary = ingest(&cfg, &index, embedder, true).await.unwrap();
        assert_eq!(summary.chunks, 1);
        assert!(index.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_documents_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let policies = tmp.path().join("policies");
        fs::create_dir_all(&policies).unwrap();
        fs::write(policies.join("empty.md"), "   \n\n ").unwrap();
        fs::write(policies.join("real.md"), "Actual policy content.").unwrap();

        let cfg = test_config(tmp.path());
        PolicyIndex::init(&cfg).await.unwrap();
        let index = PolicyIndex::open(&cfg).await.unwrap();
        let embedder = Arc::new(HashProvider::new(64));

        let summary = ingest(&cfg, &index, embedder, false).await.unwrap();
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.skipped_empty, 1);
    }

    #[tokio::test]
    async fn test_reingest_replaces_not_appends() {
        let tmp = tempfile::tempdir().unwrap();
        let policies = tmp.path().join("policies");
        fs::create_dir_all(&policies).unwrap();
        fs::write(policies.join("p.md"), "First version of the policy.").unwrap();

        let cfg = test_config(tmp.path());
        PolicyIndex::init(&cfg).await.unwrap();
        let index = PolicyIndex::open(&cfg).await.unwrap();
        let embedder: Arc<HashProvider> = Arc::new(HashProvider::new(64));

        ingest(&cfg, &index, embedder.clone(), false).await.unwrap();
        let first = index.len().await.unwrap();
        ingest(&cfg, &index, embedder, false).await.unwrap();
        assert_eq!(index.len().await.unwrap(), first);
    }
}

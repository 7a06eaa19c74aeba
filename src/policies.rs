//! Policy corpus loader.
//!
//! Scans the configured policies directory for text/markdown files and
//! produces [`PolicyDocument`]s. The source id is the file stem, which
//! stays stable across re-ingestion runs and becomes the `policy_id`
//! surfaced in retrieval results.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::PolicyDocument;

pub fn load_policies(config: &Config) -> Result<Vec<PolicyDocument>> {
    let dir = &config.policies.dir;
    if !dir.exists() {
        bail!("Policies directory does not exist: {}", dir.display());
    }

    let include_set = build_globset(&config.policies.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string()];
    default_excludes.extend(config.policies.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut docs = Vec::new();

    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        docs.push(file_to_document(path)?);
    }

    // Sort for deterministic ordering
    docs.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    Ok(docs)
}

fn file_to_document(path: &Path) -> Result<PolicyDocument> {
    let body = std::fs::read_to_string(path).unwrap_or_default();

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let source_id = path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.clone());

    Ok(PolicyDocument {
        source_id,
        file_name,
        body,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

//! # reglens
//!
//! A regulatory conflict analysis pipeline for internal policy corpora.
//!
//! reglens ingests a directory of company policy documents, chunks and
//! embeds them into a persistent SQLite index, and then — given the text
//! of a new regulation — retrieves the most relevant policy excerpts,
//! classifies each one's conflict risk via a reasoning oracle, and emits
//! a schema-validated JSON report with a content-addressed regulation id.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │ Policies │──▶│ Chunk+Embed  │──▶│  SQLite   │
//! │ (*.md)   │   │  (ingest)    │   │  index    │
//! └──────────┘   └──────────────┘   └────┬─────┘
//!                                        │
//!               RETRIEVE ◀───────────────┘
//!                  │
//!               CLASSIFY (reasoning oracle, per-item fallback)
//!                  │
//!               ASSEMBLE (validated JSON report)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! reglens init                          # create the index
//! reglens ingest                        # index the policy corpus
//! reglens search "data retention"      # inspect retrieval
//! reglens analyze --file new_law.txt   # run the full pipeline
//! reglens serve                         # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Boundary-aware overlapping chunker |
//! | [`policies`] | Policy corpus loader |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Persistent SQLite similarity index |
//! | [`ingest`] | Ingestion orchestration |
//! | [`retrieve`] | Top-k semantic retrieval |
//! | [`oracle`] | Reasoning oracle abstraction |
//! | [`classify`] | Per-excerpt conflict classification |
//! | [`report`] | Report assembly and validation |
//! | [`pipeline`] | Stage orchestration |
//! | [`server`] | HTTP API |

pub mod chunk;
pub mod classify;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod models;
pub mod oracle;
pub mod pipeline;
pub mod policies;
pub mod report;
pub mod retrieve;
pub mod server;

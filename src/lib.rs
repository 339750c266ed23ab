//! Personal memory store with keyword, vector and hybrid retrieval.
//!
//! xmemory keeps short-lived user input ("raw" memories) and the knowledge
//! distilled from it (insights, projects, tasks, periodic summaries) in one
//! document/vector index, and serves it to agents over
//! [MCP](https://modelcontextprotocol.io/) and to everything else over HTTP.
//!
//! | Type | Purpose |
//! |------|---------|
//! | **raw** | Unprocessed input awaiting enrichment |
//! | **insight** | Distilled preferences and facts |
//! | **project** / **task** | Projects and their tasks (`parent_id` links them) |
//! | **diary** … **yearly** | Periodic summaries |
//! | **archived** | Retired memories |
//!
//! # Architecture
//!
//! - **Storage**: a [`store::DocumentStore`] backend, either embedded SQLite
//!   (FTS5 for keywords, [sqlite-vec](https://github.com/asg017/sqlite-vec) for
//!   vectors) or an Elasticsearch cluster over HTTP
//! - **Embeddings**: an OpenAI-compatible embeddings API, or offline feature hashing
//! - **Search**: BM25 keyword search, exact or approximate kNN, and keyword-gated
//!   hybrid ranking
//! - **Transport**: MCP over stdio, or REST plus streamable MCP over HTTP
//!
//! # Modules
//!
//! - [`config`]: configuration from TOML files and environment variables
//! - [`store`]: backends, typed mappings and queries, the generic repository
//! - [`embedding`]: text-to-vector providers
//! - [`memory`]: memory documents and the memory repository
//! - [`worker`]: background enrichment of raw memories
//! - [`tools`] / [`api`]: MCP and HTTP surfaces

pub mod api;
pub mod config;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod server;
pub mod store;
pub mod tools;
pub mod worker;

pub use error::{Error, Result};

#![deny(missing_docs)]

//! Core library for the ragpipe document pipeline.

/// HTTP routing and REST handlers.
pub mod api;
/// Glue catalog registration and symlink manifests.
pub mod catalog;
mod clock;
/// Text completion clients.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// PDF text extraction.
pub mod extraction;
/// Structured logging and tracing setup.
pub mod logging;
/// Document and chat metadata records.
pub mod metadata;
/// Pipeline counters.
pub mod metrics;
/// Document processing pipeline utilities.
pub mod processing;
/// Appendable columnar snapshots, CSV exports, and derived tables.
pub mod snapshot;
/// Blob storage backends.
pub mod storage;
/// LLM-guided table extraction.
pub mod tables;
/// Vector index client.
pub mod vector;

//! StemVault Engine - Orchestration layer
//!
//! Coordinates the pure diff engine in `stemvault-core` with the repository
//! handle in `stemvault-store`:
//! - Configuration loading
//! - Per-project write serialization
//! - External project-parser invocation with a timeout
//! - Upload ingestion, preview diffs and collaboration merges
//! - An async [`ProjectService`] facade for callers on a tokio runtime

pub mod commands;
pub mod config;
pub mod locks;
pub mod parser;
pub mod service;

pub use config::EngineConfig;
pub use locks::ProjectLocks;
pub use service::ProjectService;

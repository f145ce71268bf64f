//! Ledger schema migrations
//!
//! SQL files under `migrations/` are compiled in and applied in order, each
//! in its own transaction. `schema_version` records the sha256 of every
//! applied file; reopening a ledger whose recorded checksum differs from the
//! embedded SQL fails instead of running against an unknown schema.

mod checksums;
mod embedded;
mod runner;

pub use runner::apply_migrations;

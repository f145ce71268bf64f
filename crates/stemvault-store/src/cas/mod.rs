//! Content-addressed blob store under `.stemvault/cas/`
//!
//! Blobs are named by the hex sha256 of their bytes and sharded by the first
//! two digest characters. Writes go through a sibling temp file and a rename,
//! so a reader never sees a partial blob.

mod atomic;
mod fs_store;

pub use atomic::atomic_write;
pub use fs_store::{digest_of, FsStore};

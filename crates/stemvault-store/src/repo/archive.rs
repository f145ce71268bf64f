//! Zip export of a revision's tree

#![allow(clippy::result_large_err)]

use crate::cas::FsStore;
use crate::errors::{Result, StoreContext};
use crate::tree::TreeManifest;
use std::io::{Cursor, Write};
use stemvault_core::errors::{ExError, ExErrorKind};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

fn zip_error(err: zip::result::ZipError) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op("export_archive")
        .with_message(err.to_string())
}

/// Zip every file of `tree` in path order
pub fn build_zip(cas: &FsStore, tree: &TreeManifest) -> Result<Vec<u8>> {
    let cursor = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(cursor);
    let options = FileOptions::<()>::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for (path, digest) in &tree.files {
        let content = cas.read(digest)?;
        zip.start_file(path.as_str(), options).map_err(zip_error)?;
        zip.write_all(&content)
            .store_op("export_archive")?;
    }

    let cursor = zip.finish().map_err(zip_error)?;
    Ok(cursor.into_inner())
}

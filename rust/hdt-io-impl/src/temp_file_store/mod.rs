//! In-memory and file-based implementations of the `TemporaryFileStore`.

use std::{path::Path, sync::Arc};

use hdt_io::TemporaryFileStore;

pub mod file_based;
pub mod memory;

pub fn create_in_memory(capacity: u64) -> std::io::Result<Arc<dyn TemporaryFileStore>> {
    Ok(Arc::new(memory::InMemoryTempFileStore::new(capacity)))
}

pub fn create_file_based(
    capacity: u64,
    parent_path: Option<&Path>,
) -> std::io::Result<Arc<dyn TemporaryFileStore>> {
    Ok(Arc::new(file_based::ScratchDirStore::new(
        capacity,
        parent_path,
    )?))
}

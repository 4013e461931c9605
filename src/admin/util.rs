use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::compare::{Comparator, StructureMatcher};
use crate::registry::GroupRegistry;
use crate::store::{FileStore, RecordStore, StoreOptions};

use crate::admin::error::{AdminError, Result};
use crate::admin::options::AdminOpenOptions;

/// Handle containing the file store and the registry placing records into it.
pub struct RegistryHandle {
    /// The snapshot-backed store.
    pub store: Arc<FileStore>,
    /// The registry over `store`.
    pub registry: GroupRegistry,
}

impl RegistryHandle {
    /// Writes pending changes back to the snapshot file.
    pub fn flush(&self) -> Result<()> {
        self.store.flush()?;
        Ok(())
    }
}

/// Opens or creates the store at the specified path.
///
/// # Errors
///
/// Returns an error if the store doesn't exist and `create_if_missing` is false,
/// or if the snapshot cannot be decoded.
pub fn open_store(path: &Path, opts: &AdminOpenOptions) -> Result<Arc<FileStore>> {
    if !path.exists() {
        if !opts.create_if_missing {
            return Err(AdminError::MissingStore(path.to_path_buf()));
        }
        ensure_parent_dir(path)?;
    }
    let store = FileStore::open(
        path,
        &StoreOptions {
            create_if_missing: opts.create_if_missing,
        },
    )?;
    Ok(Arc::new(store))
}

/// Opens a store together with a registry using the bundled structure matcher.
///
/// # Errors
///
/// Returns an error if opening the store or the registry fails.
pub fn open_registry(path: &Path, opts: &AdminOpenOptions) -> Result<RegistryHandle> {
    let store = open_store(path, opts)?;
    let comparator: Arc<dyn Comparator> = Arc::new(StructureMatcher::new(opts.matcher));
    let dyn_store: Arc<dyn RecordStore> = store.clone();
    let registry = GroupRegistry::open(dyn_store, comparator, opts.registry.clone())?;
    Ok(RegistryHandle { store, registry })
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::{Group, GroupKey, Record};
use crate::store::{MemoryStore, RecordStore};
use crate::types::{GroupId, RecordId, Result, StrudexError};

const SNAPSHOT_VERSION: u32 = 1;

/// Options for opening a [`FileStore`].
#[derive(Clone, Debug, Default)]
pub struct StoreOptions {
    /// Start from an empty store when the file does not exist.
    pub create_if_missing: bool,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    records: Vec<Record>,
    groups: Vec<Group>,
}

/// A [`MemoryStore`] persisted as one JSON snapshot file.
///
/// Writes go to memory; [`RecordStore::flush`] rewrites the file through a
/// temporary sibling and a rename. Flushes from different threads are
/// serialized; each one writes the tables as they stand when it starts.
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
    dirty: AtomicBool,
    flush_gate: Mutex<()>,
}

impl FileStore {
    /// Opens the snapshot at `path`.
    ///
    /// # Errors
    ///
    /// Fails with [`StrudexError::Io`] of kind `NotFound` when the file is
    /// missing and `create_if_missing` is false, with `Serialization` when the
    /// snapshot cannot be decoded, and with `Corruption` on an unknown version.
    pub fn open(path: impl AsRef<Path>, opts: &StoreOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = if path.exists() {
            let file = fs::File::open(&path)?;
            let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(StrudexError::Corruption(format!(
                    "unsupported snapshot version {} in {}",
                    snapshot.version,
                    path.display()
                )));
            }
            info!(
                path = %path.display(),
                records = snapshot.records.len(),
                groups = snapshot.groups.len(),
                "store.file.loaded"
            );
            MemoryStore::from_parts(snapshot.records, snapshot.groups)
        } else if opts.create_if_missing {
            MemoryStore::new()
        } else {
            return Err(StrudexError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("store not found: {}", path.display()),
            )));
        };
        Ok(Self {
            path,
            inner,
            dirty: AtomicBool::new(false),
            flush_gate: Mutex::new(()),
        })
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-memory tables backing this store.
    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }
}

impl RecordStore for FileStore {
    fn put_record(&self, record: &Record) -> Result<()> {
        self.inner.put_record(record)?;
        self.mark_dirty();
        Ok(())
    }

    fn record(&self, id: RecordId) -> Result<Option<Record>> {
        self.inner.record(id)
    }

    fn record_ids(&self) -> Result<Vec<RecordId>> {
        self.inner.record_ids()
    }

    fn max_record_id(&self) -> Result<u64> {
        self.inner.max_record_id()
    }

    fn put_group(&self, group: &Group) -> Result<()> {
        self.inner.put_group(group)?;
        self.mark_dirty();
        Ok(())
    }

    fn group(&self, id: GroupId) -> Result<Option<Group>> {
        self.inner.group(id)
    }

    fn group_ids(&self) -> Result<Vec<GroupId>> {
        self.inner.group_ids()
    }

    fn max_group_id(&self) -> Result<u64> {
        self.inner.max_group_id()
    }

    fn groups_with_key(&self, key: &GroupKey) -> Result<Vec<Group>> {
        self.inner.groups_with_key(key)
    }

    fn group_containing(&self, id: RecordId) -> Result<Option<GroupId>> {
        self.inner.group_containing(id)
    }

    fn flush(&self) -> Result<()> {
        let _gate = self.flush_gate.lock();
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let (records, groups) = self.inner.export();
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            records,
            groups,
        };
        let tmp = self.path.with_extension("tmp");
        let result = (|| -> Result<()> {
            let mut writer = BufWriter::new(fs::File::create(&tmp)?);
            serde_json::to_writer(&mut writer, &snapshot)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            fs::rename(&tmp, &self.path)?;
            Ok(())
        })();
        if result.is_err() {
            self.mark_dirty();
        }
        result?;
        debug!(
            path = %self.path.display(),
            records = snapshot.records.len(),
            groups = snapshot.groups.len(),
            "store.file.flushed"
        );
        Ok(())
    }
}

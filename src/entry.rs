//! Per-file entries: each one owns a single data file and all of its
//! metadata sidecars, and mediates every mutation under a per-entry lock.

use crate::{
    error::{Result, StoreError},
    handle::FileReadWriter,
    metadata::{self, MetadataType},
    state::{Directories, FileState, ALL_STATES},
};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::{
    collections::HashMap,
    fs::{self, OpenOptions},
    io,
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::warn;

/// The in-memory record tracking one file on disk.
///
/// Entries are shared as `Arc<FileEntry>`: the owning backend holds one
/// reference through its index, and every open [`FileReadWriter`] holds
/// another, so an entry outlives its index slot for as long as handles
/// read from the (possibly already unlinked) inode.
#[derive(Debug)]
pub struct FileEntry {
    inner: RwLock<Inner>,
}

#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) name: String,
    pub(crate) state: FileState,
    pub(crate) open_count: u32,
    pub(crate) deleted: bool,
    pub(crate) metadata: HashMap<String, Arc<dyn MetadataType>>,
    pub(crate) dirs: Arc<Directories>,
}

impl Inner {
    pub(crate) fn data_path(&self) -> PathBuf {
        self.dirs.path(self.state).join(&self.name)
    }

    fn metadata_path(&self, md: &dyn MetadataType) -> PathBuf {
        self.metadata_path_in(self.state, md)
    }

    fn metadata_path_in(&self, state: FileState, md: &dyn MetadataType) -> PathBuf {
        self.dirs
            .path(state)
            .join(format!("{}{}", self.name, md.suffix()))
    }

    /// Every state-gated operation funnels through here before touching
    /// disk. A deleted entry is gone no matter what the caller accepts.
    fn verify(&self, op: &'static str, accepted: &[FileState]) -> Result<()> {
        if self.deleted {
            return Err(StoreError::NotFound {
                name: self.name.clone(),
            });
        }
        if !accepted.is_empty() && !accepted.contains(&self.state) {
            return Err(StoreError::WrongState {
                op,
                name: self.name.clone(),
                current: self.state,
                expected: accepted.to_vec(),
            });
        }
        Ok(())
    }

    /// Create the data file sized to `len`, cleaning up on failure.
    pub(crate) fn create_data_file(&mut self, len: u64) -> Result<()> {
        let path = self.data_path();
        let create = || -> io::Result<()> {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?;
            file.set_len(len)
        };
        if let Err(err) = create() {
            let _ = fs::remove_file(&path);
            return Err(err.into());
        }
        Ok(())
    }

    /// Produce the data file by hardlinking `source`. A failed link
    /// creates nothing, so there is no partial state to clean up.
    pub(crate) fn create_data_link(&mut self, source: &Path) -> Result<()> {
        fs::hard_link(source, self.data_path())?;
        Ok(())
    }

    fn read_ref_count(&self) -> Result<i64> {
        let path = self.metadata_path(&metadata::RefCount);
        match fs::read(&path) {
            Ok(bytes) => {
                metadata::ref_count::decode(&bytes).map_err(|err| StoreError::InvalidContent {
                    name: self.name.clone(),
                    reason: err.to_string(),
                })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    /// Remove one sidecar file and prune any directory chain (e.g.
    /// `<name>_hashstates/<algo>`) it leaves empty.
    fn remove_metadata_file(&self, md: &dyn MetadataType) -> io::Result<()> {
        let path = self.metadata_path(md);
        fs::remove_file(&path)?;

        let state_dir = self.dirs.path(self.state);
        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir == state_dir || fs::remove_dir(dir).is_err() {
                break;
            }
            parent = dir.parent();
        }
        Ok(())
    }
}

impl FileEntry {
    pub(crate) fn new(
        name: impl Into<String>,
        state: FileState,
        dirs: Arc<Directories>,
    ) -> Arc<FileEntry> {
        Arc::new(FileEntry {
            inner: RwLock::new(Inner {
                name: name.into(),
                state,
                open_count: 0,
                deleted: false,
                metadata: HashMap::new(),
                dirs,
            }),
        })
    }

    pub(crate) fn write_inner(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write()
    }

    pub(crate) fn check(&self, op: &'static str, accepted: &[FileState]) -> Result<()> {
        self.inner.read().verify(op, accepted)
    }

    pub fn name(&self) -> String {
        self.inner.read().name.clone()
    }

    pub fn state(&self) -> FileState {
        self.inner.read().state
    }

    pub fn open_count(&self) -> u32 {
        self.inner.read().open_count
    }

    pub fn path(&self, accepted: &[FileState]) -> Result<PathBuf> {
        let inner = self.inner.read();
        inner.verify("path", accepted)?;
        Ok(inner.data_path())
    }

    pub fn stat(&self, accepted: &[FileState]) -> Result<fs::Metadata> {
        let inner = self.inner.read();
        inner.verify("stat", accepted)?;
        Ok(fs::metadata(inner.data_path())?)
    }

    /// Hardlink this entry's data file to an unmanaged location.
    pub fn link_to(&self, accepted: &[FileState], target: impl AsRef<Path>) -> Result<()> {
        let inner = self.inner.write();
        inner.verify("link_to", accepted)?;
        if let Some(parent) = target.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::hard_link(inner.data_path(), target)?;
        Ok(())
    }

    /// Move the data file into `target`'s directory, carrying movable
    /// metadata along.
    ///
    /// Sidecars are copied into the target before the rename, so a crash
    /// anywhere in between leaves the source intact; stale copies in the
    /// target are rewritten idempotently on retry. The rename itself is
    /// the one observable transition.
    pub fn move_to(&self, accepted: &[FileState], target: FileState) -> Result<()> {
        let mut inner = self.inner.write();
        inner.verify("move", accepted)?;
        if inner.state == target {
            return Err(StoreError::AlreadyInState {
                name: inner.name.clone(),
                state: target,
            });
        }
        let refs = inner.read_ref_count()?;
        if refs > 0 {
            return Err(StoreError::StillReferenced {
                name: inner.name.clone(),
                count: refs,
            });
        }

        let mut carried: Vec<String> = vec![];
        for (suffix, md) in &inner.metadata {
            if !md.movable() || !md.valid_state(target) {
                continue;
            }
            let target_path = inner.metadata_path_in(target, md.as_ref());
            if let Some(parent) = target_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(inner.metadata_path(md.as_ref()), &target_path)?;
            carried.push(suffix.clone());
        }

        fs::rename(
            inner.data_path(),
            inner.dirs.path(target).join(&inner.name),
        )?;

        // The authoritative copies now live in the target directory;
        // failures here only leave residue for reload or a sweeper.
        for md in inner.metadata.values() {
            if let Err(err) = inner.remove_metadata_file(md.as_ref()) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(
                        name = %inner.name,
                        suffix = %md.suffix(),
                        error = %err,
                        "stale metadata left behind after move"
                    );
                }
            }
        }

        inner.state = target;
        inner.metadata.retain(|suffix, _| carried.contains(suffix));
        Ok(())
    }

    /// Remove the data file and every known sidecar, then drop the name
    /// from the owning index through `unregister`. Live handles keep
    /// reading from the unlinked inode.
    pub fn delete(&self, accepted: &[FileState], unregister: impl FnOnce()) -> Result<()> {
        let mut inner = self.inner.write();
        inner.verify("delete", accepted)?;
        let refs = inner.read_ref_count()?;
        if refs > 0 {
            return Err(StoreError::StillReferenced {
                name: inner.name.clone(),
                count: refs,
            });
        }

        fs::remove_file(inner.data_path())?;
        for md in inner.metadata.values() {
            if let Err(err) = inner.remove_metadata_file(md.as_ref()) {
                if err.kind() != io::ErrorKind::NotFound {
                    return Err(err.into());
                }
            }
        }

        inner.deleted = true;
        inner.metadata.clear();
        unregister();
        Ok(())
    }

    /// Read the full sidecar payload.
    pub fn read_metadata(&self, accepted: &[FileState], md: &dyn MetadataType) -> Result<Vec<u8>> {
        let inner = self.inner.read();
        inner.verify("read_metadata", accepted)?;
        let path = inner.metadata_path(md);
        fs::read(&path)
            .map_err(|err| StoreError::from_probe(err, &format!("{}{}", inner.name, md.suffix())))
    }

    /// Replace the sidecar payload. Returns whether the bytes changed.
    pub fn write_metadata(
        &self,
        accepted: &[FileState],
        md: Arc<dyn MetadataType>,
        content: &[u8],
    ) -> Result<bool> {
        let mut inner = self.inner.write();
        inner.verify("write_metadata", accepted)?;
        verify_writable(&inner, "write_metadata", md.as_ref())?;

        let path = inner.metadata_path(md.as_ref());
        if let Ok(existing) = fs::read(&path) {
            if existing == content {
                inner.metadata.entry(md.suffix()).or_insert(md);
                return Ok(false);
            }
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        inner.metadata.insert(md.suffix(), md);
        Ok(true)
    }

    /// Random-access read of `buf.len()` bytes at `offset`.
    pub fn read_metadata_at(
        &self,
        accepted: &[FileState],
        md: &dyn MetadataType,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<usize> {
        let inner = self.inner.read();
        inner.verify("read_metadata_at", accepted)?;
        let path = inner.metadata_path(md);
        let file = fs::File::open(&path)
            .map_err(|err| StoreError::from_probe(err, &format!("{}{}", inner.name, md.suffix())))?;
        file.read_exact_at(buf, offset)?;
        Ok(buf.len())
    }

    /// Random-access write at `offset`. The sidecar must already exist.
    /// Returns whether the bytes changed.
    pub fn write_metadata_at(
        &self,
        accepted: &[FileState],
        md: &dyn MetadataType,
        content: &[u8],
        offset: u64,
    ) -> Result<bool> {
        let inner = self.inner.write();
        inner.verify("write_metadata_at", accepted)?;
        verify_writable(&inner, "write_metadata_at", md)?;

        let path = inner.metadata_path(md);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| StoreError::from_probe(err, &format!("{}{}", inner.name, md.suffix())))?;

        let mut existing = vec![0u8; content.len()];
        if file.read_exact_at(&mut existing, offset).is_ok() && existing == content {
            return Ok(false);
        }
        file.write_all_at(content, offset)?;
        Ok(true)
    }

    /// Remove one sidecar.
    pub fn delete_metadata(&self, accepted: &[FileState], md: &dyn MetadataType) -> Result<()> {
        let mut inner = self.inner.write();
        inner.verify("delete_metadata", accepted)?;
        if let Err(err) = inner.remove_metadata_file(md) {
            if err.kind() != io::ErrorKind::NotFound {
                return Err(err.into());
            }
        }
        inner.metadata.remove(&md.suffix());
        Ok(())
    }

    /// Snapshot the known sidecars.
    pub fn list_metadata(&self, accepted: &[FileState]) -> Result<Vec<Arc<dyn MetadataType>>> {
        let inner = self.inner.read();
        inner.verify("list_metadata", accepted)?;
        Ok(inner.metadata.values().cloned().collect())
    }

    /// Open a read-only handle on the data file.
    pub fn get_reader(self: &Arc<Self>, accepted: &[FileState]) -> Result<FileReadWriter> {
        self.open_handle("get_reader", accepted, false)
    }

    /// Open a read-write handle on the data file.
    pub fn get_read_writer(self: &Arc<Self>, accepted: &[FileState]) -> Result<FileReadWriter> {
        self.open_handle("get_read_writer", accepted, true)
    }

    fn open_handle(
        self: &Arc<Self>,
        op: &'static str,
        accepted: &[FileState],
        writable: bool,
    ) -> Result<FileReadWriter> {
        let mut inner = self.inner.write();
        inner.verify(op, accepted)?;
        let mut opts = OpenOptions::new();
        opts.read(true);
        if writable {
            opts.write(true);
        }
        let file = opts.open(inner.data_path())?;
        inner.open_count += 1;
        Ok(FileReadWriter::new(self.clone(), file))
    }

    pub(crate) fn release_handle(&self) {
        let mut inner = self.inner.write();
        inner.open_count = inner.open_count.saturating_sub(1);
    }

    pub fn get_ref_count(&self, accepted: &[FileState]) -> Result<i64> {
        let inner = self.inner.read();
        inner.verify("get_ref_count", accepted)?;
        inner.read_ref_count()
    }

    pub fn inc_ref_count(&self, accepted: &[FileState]) -> Result<i64> {
        self.adjust_ref_count(accepted, 1)
    }

    /// Decrement, clamped at zero.
    pub fn dec_ref_count(&self, accepted: &[FileState]) -> Result<i64> {
        self.adjust_ref_count(accepted, -1)
    }

    fn adjust_ref_count(&self, accepted: &[FileState], delta: i64) -> Result<i64> {
        let mut inner = self.inner.write();
        inner.verify("adjust_ref_count", accepted)?;
        let count = (inner.read_ref_count()? + delta).max(0);
        fs::write(
            inner.metadata_path(&metadata::RefCount),
            metadata::ref_count::encode(count),
        )?;
        inner
            .metadata
            .entry(metadata::RefCount.suffix())
            .or_insert_with(|| Arc::new(metadata::RefCount));
        Ok(count)
    }
}

fn verify_writable(inner: &Inner, op: &'static str, md: &dyn MetadataType) -> Result<()> {
    if md.valid_state(inner.state) {
        return Ok(());
    }
    Err(StoreError::WrongState {
        op,
        name: format!("{}{}", inner.name, md.suffix()),
        current: inner.state,
        expected: ALL_STATES
            .iter()
            .copied()
            .filter(|state| md.valid_state(*state))
            .collect(),
    })
}

//! The name → entry index and the single-writer discipline over
//! creation, moves, and deletion.

use crate::{
    entry::{FileEntry, Inner},
    error::{Result, StoreError},
    handle::FileReadWriter,
    metadata::{self, MetadataType},
    state::{Directories, FileState, ALL_STATES},
};
use scc::HashMap;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::debug;

/// Custodian of every entry of one store partition.
///
/// The index serializes creations: exactly one creator wins per name, and
/// the winner performs file I/O under its own entry lock rather than any
/// index-wide lock. Lookups that miss the index probe the filesystem so a
/// restarted process finds its files again.
pub struct FileStoreBackend {
    index: HashMap<String, Arc<FileEntry>>,
    dirs: Arc<Directories>,
}

impl FileStoreBackend {
    pub fn new(dirs: Arc<Directories>) -> Self {
        FileStoreBackend {
            index: HashMap::default(),
            dirs,
        }
    }

    fn index_get(&self, name: &str) -> Option<Arc<FileEntry>> {
        self.index.read(name, |_, entry| entry.clone())
    }

    /// Idempotent creation of a zeroed file of `len` bytes. Returns
    /// whether this call created it.
    pub fn create_file(
        &self,
        name: &str,
        accepted: &[FileState],
        target: FileState,
        len: u64,
    ) -> Result<bool> {
        self.create_with(name, accepted, target, |inner| inner.create_data_file(len))
    }

    /// Like [`create_file`](Self::create_file), but the data file is
    /// hardlinked from `source`.
    pub fn create_link_from_file(
        &self,
        name: &str,
        accepted: &[FileState],
        target: FileState,
        source: impl AsRef<Path>,
    ) -> Result<bool> {
        self.create_with(name, accepted, target, |inner| {
            inner.create_data_link(source.as_ref())
        })
    }

    fn create_with(
        &self,
        name: &str,
        accepted: &[FileState],
        target: FileState,
        create: impl FnOnce(&mut Inner) -> Result<()>,
    ) -> Result<bool> {
        let mut acceptable = accepted.to_vec();
        if !acceptable.contains(&target) {
            acceptable.push(target);
        }

        loop {
            match self.get_file_entry(name, &acceptable) {
                Ok(entry) => match entry.check("create", &acceptable) {
                    // an equivalent file already exists
                    Ok(()) => return Ok(false),
                    // raced with a deletion; the slot frees up
                    Err(err) if err.is_not_found() => continue,
                    Err(err) => return Err(err),
                },
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }

            let entry = FileEntry::new(name, target, self.dirs.clone());
            let mut guard = entry.write_inner();
            if self.index.insert(name.to_owned(), entry.clone()).is_err() {
                // another creator claimed the name first; re-examine it
                drop(guard);
                continue;
            }

            return match create(&mut guard) {
                Ok(()) => Ok(true),
                Err(err) => {
                    guard.deleted = true;
                    self.index.remove(name);
                    Err(err)
                }
            };
        }
    }

    /// Hardlink an entry's data file out to an unmanaged location.
    pub fn link_to_file(
        &self,
        name: &str,
        accepted: &[FileState],
        target: impl AsRef<Path>,
    ) -> Result<()> {
        self.get_file_entry(name, accepted)?.link_to(accepted, target)
    }

    pub fn move_file(
        &self,
        name: &str,
        accepted: &[FileState],
        target: FileState,
    ) -> Result<()> {
        self.get_file_entry(name, accepted)?.move_to(accepted, target)
    }

    pub fn delete_file(&self, name: &str, accepted: &[FileState]) -> Result<()> {
        let entry = self.get_file_entry(name, accepted)?;
        entry.delete(accepted, || {
            self.index.remove(name);
        })
    }

    pub fn get_file_path(&self, name: &str, accepted: &[FileState]) -> Result<PathBuf> {
        self.get_file_entry(name, accepted)?.path(accepted)
    }

    pub fn get_file_stat(&self, name: &str, accepted: &[FileState]) -> Result<fs::Metadata> {
        self.get_file_entry(name, accepted)?.stat(accepted)
    }

    pub fn get_file_reader(
        &self,
        name: &str,
        accepted: &[FileState],
    ) -> Result<FileReadWriter> {
        self.get_file_entry(name, accepted)?.get_reader(accepted)
    }

    pub fn get_file_read_writer(
        &self,
        name: &str,
        accepted: &[FileState],
    ) -> Result<FileReadWriter> {
        self.get_file_entry(name, accepted)?
            .get_read_writer(accepted)
    }

    pub fn read_file_metadata(
        &self,
        name: &str,
        accepted: &[FileState],
        md: &dyn MetadataType,
    ) -> Result<Vec<u8>> {
        self.get_file_entry(name, accepted)?
            .read_metadata(accepted, md)
    }

    pub fn write_file_metadata(
        &self,
        name: &str,
        accepted: &[FileState],
        md: Arc<dyn MetadataType>,
        content: &[u8],
    ) -> Result<bool> {
        self.get_file_entry(name, accepted)?
            .write_metadata(accepted, md, content)
    }

    pub fn read_file_metadata_at(
        &self,
        name: &str,
        accepted: &[FileState],
        md: &dyn MetadataType,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<usize> {
        self.get_file_entry(name, accepted)?
            .read_metadata_at(accepted, md, buf, offset)
    }

    pub fn write_file_metadata_at(
        &self,
        name: &str,
        accepted: &[FileState],
        md: &dyn MetadataType,
        content: &[u8],
        offset: u64,
    ) -> Result<bool> {
        self.get_file_entry(name, accepted)?
            .write_metadata_at(accepted, md, content, offset)
    }

    pub fn delete_file_metadata(
        &self,
        name: &str,
        accepted: &[FileState],
        md: &dyn MetadataType,
    ) -> Result<()> {
        self.get_file_entry(name, accepted)?
            .delete_metadata(accepted, md)
    }

    pub fn list_file_metadata(
        &self,
        name: &str,
        accepted: &[FileState],
    ) -> Result<Vec<Arc<dyn MetadataType>>> {
        self.get_file_entry(name, accepted)?.list_metadata(accepted)
    }

    pub fn increment_file_ref_count(&self, name: &str, accepted: &[FileState]) -> Result<i64> {
        self.get_file_entry(name, accepted)?.inc_ref_count(accepted)
    }

    pub fn decrement_file_ref_count(&self, name: &str, accepted: &[FileState]) -> Result<i64> {
        self.get_file_entry(name, accepted)?.dec_ref_count(accepted)
    }

    pub fn get_file_ref_count(&self, name: &str, accepted: &[FileState]) -> Result<i64> {
        self.get_file_entry(name, accepted)?.get_ref_count(accepted)
    }

    /// Resolve `name` to its entry, lazily rebuilding from disk when the
    /// index has no record of it (process restart, external population).
    /// The caller's state gate is enforced by the operation that follows,
    /// inside the entry.
    pub fn get_file_entry(&self, name: &str, accepted: &[FileState]) -> Result<Arc<FileEntry>> {
        if let Some(entry) = self.index_get(name) {
            return Ok(entry);
        }
        self.reload_file_entry(name, accepted)
    }

    fn reload_file_entry(&self, name: &str, accepted: &[FileState]) -> Result<Arc<FileEntry>> {
        let states: &[FileState] = if accepted.is_empty() {
            &ALL_STATES
        } else {
            accepted
        };

        for &state in states {
            let path = self.dirs.path(state).join(name);
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => return self.rebuild_entry(name, state),
                _ => continue,
            }
        }

        Err(StoreError::NotFound {
            name: name.to_owned(),
        })
    }

    fn rebuild_entry(&self, name: &str, state: FileState) -> Result<Arc<FileEntry>> {
        debug!(name, ?state, "rebuilding entry from disk");

        let entry = FileEntry::new(name, state, self.dirs.clone());
        {
            let mut guard = entry.write_inner();
            for (suffix, md) in scan_metadata(self.dirs.path(state), name)? {
                guard.metadata.insert(suffix, md);
            }
        }

        match self.index.insert(name.to_owned(), entry.clone()) {
            Ok(()) => Ok(entry),
            // a concurrent reloader won; use its entry
            Err(_) => self.index_get(name).ok_or_else(|| StoreError::NotFound {
                name: name.to_owned(),
            }),
        }
    }
}

/// Enumerate `dir/name*` and classify recognized sidecar suffixes.
///
/// The data file itself and unrecognized siblings (including other
/// entries sharing the name as a prefix) are skipped; directories are
/// walked for nested suffixes like `_hashstates/<algo>/<offset>`.
fn scan_metadata(dir: &Path, name: &str) -> Result<Vec<(String, Arc<dyn MetadataType>)>> {
    let mut found: Vec<(String, Arc<dyn MetadataType>)> = vec![];
    let mut classify = |path: &Path| {
        if let Some(suffix) = suffix_of(dir, name, path) {
            if let Some(md) = metadata::registry().parse(&suffix) {
                found.push((suffix, md));
            }
        }
    };

    for dirent in fs::read_dir(dir)? {
        let dirent = dirent?;
        let file_name = dirent.file_name();
        let file_name = match file_name.to_str() {
            Some(n) => n,
            None => continue,
        };
        if !file_name.starts_with(name) {
            continue;
        }

        if dirent.file_type()?.is_dir() {
            let mut stack = vec![dirent.path()];
            while let Some(nested_dir) = stack.pop() {
                for nested in fs::read_dir(&nested_dir)? {
                    let nested = nested?;
                    if nested.file_type()?.is_dir() {
                        stack.push(nested.path());
                    } else {
                        classify(&nested.path());
                    }
                }
            }
        } else if file_name != name {
            classify(&dirent.path());
        }
    }

    Ok(found)
}

fn suffix_of(dir: &Path, name: &str, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(dir).ok()?;
    rel.to_str()?.strip_prefix(name).map(str::to_owned)
}

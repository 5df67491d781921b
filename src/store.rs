//! The high-level store facade: an upload partition for transient
//! scratch files and a download/cache partition for content-addressed
//! blobs, glued together by hardlink-based transitions.

use crate::{
    backend::FileStoreBackend,
    config::Config,
    error::{Result, StoreError},
    handle::FileReadWriter,
    metadata::{
        self, HashState, MetaInfo, MetadataType, PieceState, PieceStatus, StartedAt, TorrentMeta,
    },
    state::{Directories, FileState},
};
use chrono::{DateTime, Utc};
use std::{fs, io, path::PathBuf, sync::Arc};
use tracing::warn;
use uuid::Uuid;

const UPLOAD: &[FileState] = &[FileState::Upload];
const DOWNLOAD: &[FileState] = &[FileState::Download];
const CACHE: &[FileState] = &[FileState::Cache];
const DOWNLOAD_OR_CACHE: &[FileState] = &[FileState::Download, FileState::Cache];

pub struct Store {
    dirs: Arc<Directories>,
    upload: FileStoreBackend,
    cache: FileStoreBackend,
}

impl Store {
    pub fn new(config: &Config) -> Result<Store> {
        let dirs = Arc::new(Directories::new(config)?);
        Ok(Store {
            upload: FileStoreBackend::new(dirs.clone()),
            cache: FileStoreBackend::new(dirs.clone()),
            dirs,
        })
    }

    // Upload scratch files.

    pub fn create_upload_file(&self, name: &str, len: u64) -> Result<bool> {
        self.upload.create_file(name, &[], FileState::Upload, len)
    }

    pub fn get_upload_file_reader(&self, name: &str) -> Result<FileReadWriter> {
        self.upload.get_file_reader(name, UPLOAD)
    }

    pub fn get_upload_file_read_writer(&self, name: &str) -> Result<FileReadWriter> {
        self.upload.get_file_read_writer(name, UPLOAD)
    }

    pub fn get_upload_file_stat(&self, name: &str) -> Result<fs::Metadata> {
        self.upload.get_file_stat(name, UPLOAD)
    }

    pub fn read_upload_file_metadata(&self, name: &str, md: &dyn MetadataType) -> Result<Vec<u8>> {
        self.upload.read_file_metadata(name, UPLOAD, md)
    }

    pub fn write_upload_file_metadata(
        &self,
        name: &str,
        md: Arc<dyn MetadataType>,
        content: &[u8],
    ) -> Result<bool> {
        self.upload.write_file_metadata(name, UPLOAD, md, content)
    }

    pub fn set_upload_file_started_at(&self, name: &str) -> Result<()> {
        self.upload
            .write_file_metadata(name, UPLOAD, Arc::new(StartedAt), &metadata::started_at::now_bytes())?;
        Ok(())
    }

    pub fn get_upload_file_started_at(&self, name: &str) -> Result<DateTime<Utc>> {
        let bytes = self.upload.read_file_metadata(name, UPLOAD, &StartedAt)?;
        metadata::started_at::parse(&bytes).ok_or_else(|| StoreError::InvalidContent {
            name: name.to_owned(),
            reason: "malformed started-at timestamp".to_owned(),
        })
    }

    pub fn get_upload_file_hash_state(
        &self,
        name: &str,
        algo: &str,
        offset: &str,
    ) -> Result<Vec<u8>> {
        self.upload
            .read_file_metadata(name, UPLOAD, &HashState::new(algo, offset))
    }

    pub fn set_upload_file_hash_state(
        &self,
        name: &str,
        algo: &str,
        offset: &str,
        content: &[u8],
    ) -> Result<()> {
        self.upload
            .write_file_metadata(name, UPLOAD, Arc::new(HashState::new(algo, offset)), content)?;
        Ok(())
    }

    /// Registry-facing names of every hash state saved for an upload,
    /// shaped `<name>/hashstates/<algo>/<offset>`.
    pub fn list_upload_file_hash_state_paths(&self, name: &str) -> Result<Vec<String>> {
        let mut paths = vec![];
        for md in self.upload.list_file_metadata(name, UPLOAD)? {
            if let Some(rest) = md.suffix().strip_prefix(metadata::hash_state::PREFIX) {
                paths.push(format!("{}/hashstates/{}", name, rest));
            }
        }
        Ok(paths)
    }

    /// Commit an upload into the cache under its content-addressed name.
    /// The upload entry is dropped either way; its non-movable sidecars
    /// (hash states, started-at) die with it.
    pub fn move_upload_file_to_cache(&self, name: &str, target_name: &str) -> Result<()> {
        let path = self.upload.get_file_path(name, UPLOAD)?;
        let linked =
            self.cache
                .create_link_from_file(target_name, CACHE, FileState::Cache, &path);
        let removed = self.upload.delete_file(name, UPLOAD);
        linked?;
        removed
    }

    // Download and cache blobs.

    pub fn create_download_file(&self, name: &str, len: u64) -> Result<bool> {
        self.cache
            .create_file(name, DOWNLOAD, FileState::Download, len)
    }

    pub fn get_download_file_read_writer(&self, name: &str) -> Result<FileReadWriter> {
        self.cache.get_file_read_writer(name, DOWNLOAD)
    }

    pub fn move_download_file_to_cache(&self, name: &str) -> Result<()> {
        self.cache.move_file(name, DOWNLOAD, FileState::Cache)
    }

    /// Land a blob fetched from a remote source. Bytes stream into a
    /// uniquely-named upload scratch file first, so a failed transfer
    /// never becomes visible under the content-addressed name.
    pub fn create_cache_file(&self, name: &str, reader: &mut (impl io::Read + ?Sized)) -> Result<()> {
        let scratch = format!("{}.{}", name, Uuid::new_v4());
        self.upload.create_file(&scratch, &[], FileState::Upload, 0)?;

        let mut writer = self.upload.get_file_read_writer(&scratch, UPLOAD)?;
        let copied = io::copy(reader, &mut writer);
        let closed = writer.commit();

        match copied.map_err(StoreError::from).and(closed) {
            Ok(()) => self.move_upload_file_to_cache(&scratch, name),
            Err(err) => {
                let _ = self.upload.delete_file(&scratch, UPLOAD);
                Err(err)
            }
        }
    }

    pub fn get_cache_file_reader(&self, name: &str) -> Result<FileReadWriter> {
        self.cache.get_file_reader(name, CACHE)
    }

    pub fn get_download_or_cache_file_reader(&self, name: &str) -> Result<FileReadWriter> {
        self.cache.get_file_reader(name, DOWNLOAD_OR_CACHE)
    }

    pub fn get_cache_file_stat(&self, name: &str) -> Result<fs::Metadata> {
        self.cache.get_file_stat(name, CACHE)
    }

    pub fn get_cache_file_path(&self, name: &str) -> Result<PathBuf> {
        self.cache.get_file_path(name, CACHE)
    }

    pub fn move_cache_file_to_trash(&self, name: &str) -> Result<()> {
        self.cache.move_file(name, CACHE, FileState::Trash)
    }

    pub fn move_download_or_cache_file_to_trash(&self, name: &str) -> Result<()> {
        self.cache
            .move_file(name, DOWNLOAD_OR_CACHE, FileState::Trash)
    }

    // Metadata on download/cache blobs.

    pub fn read_file_metadata(&self, name: &str, md: &dyn MetadataType) -> Result<Vec<u8>> {
        self.cache.read_file_metadata(name, DOWNLOAD_OR_CACHE, md)
    }

    pub fn write_file_metadata(
        &self,
        name: &str,
        md: Arc<dyn MetadataType>,
        content: &[u8],
    ) -> Result<bool> {
        self.cache
            .write_file_metadata(name, DOWNLOAD_OR_CACHE, md, content)
    }

    pub fn list_file_metadata(&self, name: &str) -> Result<Vec<Arc<dyn MetadataType>>> {
        self.cache.list_file_metadata(name, DOWNLOAD_OR_CACHE)
    }

    pub fn read_torrent_meta(&self, name: &str) -> Result<MetaInfo> {
        let bytes = self
            .cache
            .read_file_metadata(name, DOWNLOAD_OR_CACHE, &TorrentMeta)?;
        MetaInfo::from_bytes(&bytes).map_err(|err| StoreError::InvalidContent {
            name: name.to_owned(),
            reason: err.to_string(),
        })
    }

    pub fn write_torrent_meta(&self, name: &str, meta: &MetaInfo) -> Result<bool> {
        let bytes = meta.to_bytes().map_err(|err| StoreError::InvalidContent {
            name: name.to_owned(),
            reason: err.to_string(),
        })?;
        self.cache
            .write_file_metadata(name, DOWNLOAD_OR_CACHE, Arc::new(TorrentMeta), &bytes)
    }

    /// Seed the piece-status sidecar for a download in flight.
    pub fn write_download_file_piece_status(
        &self,
        name: &str,
        statuses: &[PieceState],
    ) -> Result<bool> {
        let bytes: Vec<u8> = statuses.iter().map(|status| status.as_byte()).collect();
        self.cache
            .write_file_metadata(name, DOWNLOAD, Arc::new(PieceStatus), &bytes)
    }

    /// Mark one piece. `content` must be a single status byte.
    pub fn set_file_piece_status(&self, name: &str, index: usize, content: &[u8]) -> Result<bool> {
        if content.len() != 1 {
            return Err(StoreError::InvalidContent {
                name: name.to_owned(),
                reason: format!("piece status is one byte, got {}", content.len()),
            });
        }
        self.cache
            .write_file_metadata_at(name, DOWNLOAD, &PieceStatus, content, index as u64)
    }

    /// Per-piece progress for `count` pieces starting at `start`. A blob
    /// that made it to the cache is complete by definition, whether or
    /// not a status sidecar ever existed.
    pub fn get_file_piece_status(
        &self,
        name: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<PieceState>> {
        let mut buf = vec![0u8; count];
        match self
            .cache
            .read_file_metadata_at(name, DOWNLOAD, &PieceStatus, &mut buf, start as u64)
        {
            Ok(_) => buf
                .iter()
                .map(|&byte| {
                    PieceState::from_byte(byte).ok_or_else(|| StoreError::InvalidContent {
                        name: name.to_owned(),
                        reason: format!("unknown piece status byte {byte}"),
                    })
                })
                .collect(),
            Err(StoreError::WrongState {
                current: FileState::Cache,
                ..
            }) => Ok(vec![PieceState::Done; count]),
            // a restarted process may only know the blob through the
            // cache directory
            Err(err) if err.is_not_found() && self.get_cache_file_stat(name).is_ok() => {
                Ok(vec![PieceState::Done; count])
            }
            Err(err) => Err(err),
        }
    }

    // Refcounted eviction.

    /// Pin a cache file against eviction. Returns the new count.
    pub fn ref_cache_file(&self, name: &str) -> Result<i64> {
        self.cache.increment_file_ref_count(name, CACHE)
    }

    /// Unpin a cache file. Hitting zero evicts: the payload is hardlinked
    /// into trash under a unique name, then the cache entry is deleted. A
    /// pin racing in between wins, and the trash link is left as orphaned
    /// bytes for the sweeper.
    pub fn deref_cache_file(&self, name: &str) -> Result<i64> {
        let count = self.cache.decrement_file_ref_count(name, CACHE)?;
        if count == 0 {
            let path = self.cache.get_file_path(name, CACHE)?;
            let trash_path = self
                .dirs
                .path(FileState::Trash)
                .join(format!("{}.{}", name, Uuid::new_v4()));
            fs::hard_link(&path, &trash_path)?;

            match self.cache.delete_file(name, CACHE) {
                Ok(()) => {}
                Err(err) if err.is_still_referenced() || err.is_not_found() => {
                    warn!(name, error = %err, "eviction lost a race, orphaning the trash link");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(count)
    }

    pub fn get_cache_file_ref_count(&self, name: &str) -> Result<i64> {
        self.cache.get_file_ref_count(name, CACHE)
    }
}

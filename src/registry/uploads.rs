use super::{path, Result};
use crate::{
    error::StoreError,
    handle::FileReadWriter,
    metadata::StartedAt,
    store::Store,
};
use std::{
    io::{Read, Seek, SeekFrom},
    sync::Arc,
};

/// Serves `_uploads/<uuid>/…` scratch state: the data file being
/// written, its started-at stamp, and resumable hash states.
pub(super) struct UploadHandler {
    store: Arc<Store>,
}

impl UploadHandler {
    pub(super) fn new(store: Arc<Store>) -> Self {
        UploadHandler { store }
    }

    /// Writing `startedat` is how the registry opens an upload.
    pub(super) fn start(&self, path: &str) -> Result<()> {
        let uuid = path::get_upload_uuid(path)?;
        self.store.create_upload_file(&uuid, 0)?;
        self.store.set_upload_file_started_at(&uuid)?;
        Ok(())
    }

    pub(super) fn started_at(&self, path: &str) -> Result<Vec<u8>> {
        let uuid = path::get_upload_uuid(path)?;
        Ok(self.store.read_upload_file_metadata(&uuid, &StartedAt)?)
    }

    pub(super) fn hash_state(&self, path: &str) -> Result<Vec<u8>> {
        let uuid = path::get_upload_uuid(path)?;
        let (algo, offset) = path::get_upload_algo_and_offset(path)?;
        Ok(self
            .store
            .get_upload_file_hash_state(&uuid, &algo, &offset.to_string())?)
    }

    pub(super) fn put_hash_state(&self, path: &str, content: &[u8]) -> Result<()> {
        let uuid = path::get_upload_uuid(path)?;
        let (algo, offset) = path::get_upload_algo_and_offset(path)?;
        self.store
            .set_upload_file_hash_state(&uuid, &algo, &offset.to_string(), content)?;
        Ok(())
    }

    pub(super) fn list_hash_states(&self, path: &str) -> Result<Vec<String>> {
        let uuid = path::get_upload_uuid(path)?;
        Ok(self.store.list_upload_file_hash_state_paths(&uuid)?)
    }

    pub(super) fn get_reader(&self, path: &str, offset: u64) -> Result<FileReadWriter> {
        let uuid = path::get_upload_uuid(path)?;
        let mut reader = self.store.get_upload_file_reader(&uuid)?;
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(StoreError::from)?;
        Ok(reader)
    }

    pub(super) fn get_writer(&self, path: &str) -> Result<FileReadWriter> {
        let uuid = path::get_upload_uuid(path)?;
        Ok(self.store.get_upload_file_read_writer(&uuid)?)
    }

    pub(super) fn get_content(&self, path: &str) -> Result<Vec<u8>> {
        let uuid = path::get_upload_uuid(path)?;
        let mut reader = self.store.get_upload_file_reader(&uuid)?;
        let mut content = Vec::new();
        reader.read_to_end(&mut content).map_err(StoreError::from)?;
        Ok(content)
    }

    pub(super) fn stat(&self, path: &str) -> Result<u64> {
        let uuid = path::get_upload_uuid(path)?;
        Ok(self.store.get_upload_file_stat(&uuid)?.len())
    }

    /// Commit the finished upload under its content-addressed blob name.
    pub(super) fn commit(&self, upload_path: &str, blob_path: &str) -> Result<()> {
        let uuid = path::get_upload_uuid(upload_path)?;
        let digest = path::get_blob_digest(blob_path)?;
        self.store.move_upload_file_to_cache(&uuid, digest.hex())?;
        Ok(())
    }
}

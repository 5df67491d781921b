use super::{path, Result};
use crate::{error::StoreError, handle::FileReadWriter, store::Store};
use std::{
    io::{Read, Seek, SeekFrom},
    sync::Arc,
};

/// Serves `blobs/sha256/<shard>/<digest>/data` straight from the cache,
/// and `_layers/…/link` contents derived from it.
pub(super) struct BlobHandler {
    store: Arc<Store>,
}

impl BlobHandler {
    pub(super) fn new(store: Arc<Store>) -> Self {
        BlobHandler { store }
    }

    pub(super) fn get_content(&self, path: &str) -> Result<Vec<u8>> {
        let digest = path::get_blob_digest(path)?;
        let mut reader = self.store.get_cache_file_reader(digest.hex())?;
        let mut content = Vec::new();
        reader.read_to_end(&mut content).map_err(StoreError::from)?;
        Ok(content)
    }

    pub(super) fn get_reader(&self, path: &str, offset: u64) -> Result<FileReadWriter> {
        let digest = path::get_blob_digest(path)?;
        let mut reader = self.store.get_cache_file_reader(digest.hex())?;
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(StoreError::from)?;
        Ok(reader)
    }

    pub(super) fn stat(&self, path: &str) -> Result<u64> {
        let digest = path::get_blob_digest(path)?;
        Ok(self.store.get_cache_file_stat(digest.hex())?.len())
    }

    /// A layer link exists exactly when the blob it names is cached; its
    /// content is the serialized digest.
    pub(super) fn layer_link_content(&self, path: &str) -> Result<Vec<u8>> {
        let digest = path::get_layer_digest(path)?;
        self.store.get_cache_file_stat(digest.hex())?;
        Ok(digest.to_string().into_bytes())
    }
}

//! Docker-registry path conventions layered over the store.
//!
//! The dispatcher itself never touches the filesystem: it parses a path
//! into `(type, subtype)` and routes the operation to the blob, upload,
//! or manifest handler, which call into [`Store`]. Tag resolution goes
//! through the external [`Transferer`].

mod blobs;
mod manifests;
mod path;
mod uploads;

pub use path::{
    get_blob_digest, get_layer_digest, get_manifest_digest, get_manifest_tag, get_repo,
    get_upload_algo_and_offset, get_upload_uuid, parse_path, PathSubType, PathType,
};

use crate::{error::StoreError, handle::FileReadWriter, store::Store, transfer::Transferer};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("invalid registry path for {path_type:?}: {path}")]
pub struct InvalidRegistryPathError {
    pub path_type: PathType,
    pub path: String,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    InvalidPath(#[from] InvalidRegistryPathError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("transfer failed: {source}")]
    Transfer {
        #[from]
        source: anyhow::Error,
    },

    #[error("{op} is not supported on {path}")]
    Unsupported { op: &'static str, path: String },
}

pub type Result<T> = std::result::Result<T, RegistryError>;

fn unsupported(op: &'static str, path: &str) -> RegistryError {
    RegistryError::Unsupported {
        op,
        path: path.to_owned(),
    }
}

/// Routes registry paths to the store.
pub struct Dispatcher {
    blobs: blobs::BlobHandler,
    uploads: uploads::UploadHandler,
    manifests: manifests::ManifestHandler,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, transferer: Arc<dyn Transferer>) -> Self {
        Dispatcher {
            blobs: blobs::BlobHandler::new(store.clone()),
            uploads: uploads::UploadHandler::new(store.clone()),
            manifests: manifests::ManifestHandler::new(store, transferer),
        }
    }

    pub fn get_content(&self, path: &str) -> Result<Vec<u8>> {
        match parse_path(path)? {
            (PathType::Blobs, PathSubType::Data) => self.blobs.get_content(path),
            (PathType::Layers, PathSubType::Link) => self.blobs.layer_link_content(path),
            (PathType::Manifests, subtype) => self.manifests.get_digest(path, subtype),
            (PathType::Uploads, PathSubType::StartedAt) => self.uploads.started_at(path),
            (PathType::Uploads, PathSubType::HashStates) => self.uploads.hash_state(path),
            (PathType::Uploads, PathSubType::Data) => self.uploads.get_content(path),
            _ => Err(unsupported("get_content", path)),
        }
    }

    pub fn put_content(&self, path: &str, content: &[u8]) -> Result<()> {
        match parse_path(path)? {
            (PathType::Uploads, PathSubType::StartedAt) => self.uploads.start(path),
            (PathType::Uploads, PathSubType::HashStates) => {
                self.uploads.put_hash_state(path, content)
            }
            (PathType::Manifests, subtype) => self.manifests.put_digest(path, subtype, content),
            // layer links are implied by content addressing
            (PathType::Layers, PathSubType::Link) => Ok(()),
            _ => Err(unsupported("put_content", path)),
        }
    }

    pub fn get_reader(&self, path: &str, offset: u64) -> Result<FileReadWriter> {
        match parse_path(path)? {
            (PathType::Blobs, PathSubType::Data) => self.blobs.get_reader(path, offset),
            (PathType::Uploads, PathSubType::Data) => self.uploads.get_reader(path, offset),
            _ => Err(unsupported("get_reader", path)),
        }
    }

    pub fn get_writer(&self, path: &str) -> Result<FileReadWriter> {
        match parse_path(path)? {
            (PathType::Uploads, PathSubType::Data) => self.uploads.get_writer(path),
            _ => Err(unsupported("get_writer", path)),
        }
    }

    /// Size of the content at `path`.
    pub fn stat(&self, path: &str) -> Result<u64> {
        match parse_path(path)? {
            (PathType::Blobs, PathSubType::Data) => self.blobs.stat(path),
            (PathType::Uploads, PathSubType::Data) => self.uploads.stat(path),
            _ => Err(unsupported("stat", path)),
        }
    }

    pub fn list(&self, path: &str) -> Result<Vec<String>> {
        match parse_path(path)? {
            (PathType::Uploads, PathSubType::HashStates) => self.uploads.list_hash_states(path),
            _ => Err(unsupported("list", path)),
        }
    }

    /// The only supported move is committing an upload to its blob path.
    pub fn move_path(&self, from: &str, to: &str) -> Result<()> {
        match (parse_path(from)?, parse_path(to)?) {
            ((PathType::Uploads, PathSubType::Data), (PathType::Blobs, PathSubType::Data)) => {
                self.uploads.commit(from, to)
            }
            _ => Err(unsupported("move", from)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{config::Config, digest::Digest};
    use anyhow::anyhow;
    use parking_lot::Mutex;
    use std::{collections::HashMap, io::Write};

    const DIGEST: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[derive(Default)]
    struct FakeTransferer {
        tags: Mutex<HashMap<String, Digest>>,
    }

    impl Transferer for FakeTransferer {
        fn stat(&self, _namespace: &str, _digest: &Digest) -> anyhow::Result<crate::BlobInfo> {
            Err(anyhow!("unused"))
        }
        fn download(
            &self,
            _namespace: &str,
            _digest: &Digest,
        ) -> anyhow::Result<Box<dyn std::io::Read + Send>> {
            Err(anyhow!("unused"))
        }
        fn upload(
            &self,
            _namespace: &str,
            _digest: &Digest,
            _blob: Box<dyn std::io::Read + Send>,
        ) -> anyhow::Result<()> {
            Err(anyhow!("unused"))
        }
        fn get_tag(&self, tag: &str) -> anyhow::Result<Digest> {
            self.tags
                .lock()
                .get(tag)
                .cloned()
                .ok_or_else(|| anyhow!("tag {tag} not found"))
        }
        fn put_tag(&self, tag: &str, digest: &Digest) -> anyhow::Result<()> {
            self.tags.lock().insert(tag.to_owned(), digest.clone());
            Ok(())
        }
        fn list_tags(&self, _prefix: &str) -> anyhow::Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn fixture() -> (tempfile::TempDir, Arc<FakeTransferer>, Dispatcher) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::new(&Config::under_root(tmp.path())).unwrap());
        let transferer = Arc::new(FakeTransferer::default());
        let dispatcher = Dispatcher::new(store, transferer.clone());
        (tmp, transferer, dispatcher)
    }

    #[test]
    fn upload_then_commit_then_serve() {
        let (_tmp, _transferer, dispatcher) = fixture();
        let upload = "/v2/repositories/foo/_uploads/0b40b95e";
        let blob = format!("/v2/blobs/sha256/e3/{DIGEST}/data");

        dispatcher
            .put_content(&format!("{upload}/startedat"), b"")
            .unwrap();
        dispatcher
            .put_content(&format!("{upload}/hashstates/sha256/0"), &[0xaa])
            .unwrap();
        assert_eq!(
            dispatcher
                .get_content(&format!("{upload}/hashstates/sha256/0"))
                .unwrap(),
            vec![0xaa]
        );
        assert_eq!(
            dispatcher.list(&format!("{upload}/hashstates")).unwrap(),
            vec!["0b40b95e/hashstates/sha256/0".to_owned()]
        );

        let mut writer = dispatcher.get_writer(&format!("{upload}/data")).unwrap();
        writer.write_all(b"layer-bytes").unwrap();
        writer.commit().unwrap();
        assert_eq!(dispatcher.stat(&format!("{upload}/data")).unwrap(), 11);

        dispatcher
            .move_path(&format!("{upload}/data"), &blob)
            .unwrap();

        assert_eq!(dispatcher.get_content(&blob).unwrap(), b"layer-bytes");
        assert_eq!(dispatcher.stat(&blob).unwrap(), 11);

        use std::io::Read;
        let mut reader = dispatcher.get_reader(&blob, 6).unwrap();
        let mut rest = String::new();
        reader.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "bytes");
    }

    #[test]
    fn layer_links_resolve_to_cached_blobs() {
        let (_tmp, _transferer, dispatcher) = fixture();
        let upload = "/v2/repositories/foo/_uploads/1f2e3d4c";
        let blob = format!("/v2/blobs/sha256/e3/{DIGEST}/data");

        dispatcher
            .put_content(&format!("{upload}/startedat"), b"")
            .unwrap();
        dispatcher.get_writer(&format!("{upload}/data")).unwrap().commit().unwrap();
        dispatcher
            .move_path(&format!("{upload}/data"), &blob)
            .unwrap();

        let link = format!("/v2/repositories/foo/_layers/sha256/{DIGEST}/link");
        assert_eq!(
            dispatcher.get_content(&link).unwrap(),
            format!("sha256:{DIGEST}").into_bytes()
        );
        // putting a layer link is a no-op
        dispatcher.put_content(&link, b"ignored").unwrap();

        let missing = format!(
            "/v2/repositories/foo/_layers/sha256/{}/link",
            "a".repeat(64)
        );
        assert!(dispatcher.get_content(&missing).is_err());
    }

    #[test]
    fn manifest_tags_round_trip_through_the_transferer() {
        let (_tmp, transferer, dispatcher) = fixture();
        let current = "/v2/repositories/foo/_manifests/tags/latest/current/link";

        dispatcher
            .put_content(current, format!("sha256:{DIGEST}").as_bytes())
            .unwrap();
        assert_eq!(
            transferer.tags.lock().get("foo:latest").unwrap().hex(),
            DIGEST
        );
        assert_eq!(
            dispatcher.get_content(current).unwrap(),
            format!("sha256:{DIGEST}").into_bytes()
        );
    }

    #[test]
    fn unsupported_routes_are_rejected() {
        let (_tmp, _transferer, dispatcher) = fixture();
        let blob = format!("/v2/blobs/sha256/e3/{DIGEST}/data");

        assert!(matches!(
            dispatcher.put_content(&blob, b"").unwrap_err(),
            RegistryError::Unsupported { .. }
        ));
        assert!(matches!(
            dispatcher.get_content("/v2/bogus").unwrap_err(),
            RegistryError::InvalidPath(_)
        ));
    }
}

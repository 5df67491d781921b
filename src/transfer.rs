//! Contract consumed from the peer-to-peer transfer layer.
//!
//! The store never initiates network I/O. When a higher layer needs a
//! blob the store reports as absent, it satisfies the miss through an
//! implementation of [`Transferer`] and lands the bytes via
//! [`Store::create_cache_file`](crate::Store::create_cache_file).

use crate::digest::Digest;
use anyhow::Result;
use std::io::Read;

/// Facts about a remote blob.
#[derive(Clone, Debug)]
pub struct BlobInfo {
    pub size: u64,
}

pub trait Transferer: Send + Sync {
    fn stat(&self, namespace: &str, digest: &Digest) -> Result<BlobInfo>;

    fn download(&self, namespace: &str, digest: &Digest) -> Result<Box<dyn Read + Send>>;

    fn upload(&self, namespace: &str, digest: &Digest, blob: Box<dyn Read + Send>) -> Result<()>;

    fn get_tag(&self, tag: &str) -> Result<Digest>;

    fn put_tag(&self, tag: &str, digest: &Digest) -> Result<()>;

    fn list_tags(&self, prefix: &str) -> Result<Vec<String>>;
}

use super::{path, unsupported, PathSubType, Result};
use crate::{digest::Digest, error::StoreError, store::Store, transfer::Transferer};
use std::sync::Arc;

/// Resolves `_manifests/…` link files. Tag pointers go through the
/// transfer layer; pinned revision links are implied by the presence of
/// the manifest blob in the cache.
pub(super) struct ManifestHandler {
    store: Arc<Store>,
    transferer: Arc<dyn Transferer>,
}

impl ManifestHandler {
    pub(super) fn new(store: Arc<Store>, transferer: Arc<dyn Transferer>) -> Self {
        ManifestHandler { store, transferer }
    }

    pub(super) fn get_digest(&self, path: &str, subtype: PathSubType) -> Result<Vec<u8>> {
        match subtype {
            PathSubType::Tags => {
                let (tag, is_current) = path::get_manifest_tag(path)?;
                if is_current {
                    let repo = path::get_repo(path)?;
                    let digest = self.transferer.get_tag(&format!("{repo}:{tag}"))?;
                    Ok(digest.to_string().into_bytes())
                } else {
                    self.cached_digest_link(path)
                }
            }
            PathSubType::Revisions => self.cached_digest_link(path),
            _ => Err(unsupported("get_digest", path)),
        }
    }

    pub(super) fn put_digest(
        &self,
        path: &str,
        subtype: PathSubType,
        content: &[u8],
    ) -> Result<()> {
        match subtype {
            PathSubType::Tags => {
                let (tag, is_current) = path::get_manifest_tag(path)?;
                if is_current {
                    let repo = path::get_repo(path)?;
                    let digest = parse_digest(path, content)?;
                    self.transferer.put_tag(&format!("{repo}:{tag}"), &digest)?;
                }
                // index links are implied by the tag itself
                Ok(())
            }
            // revision links are implied by content addressing
            PathSubType::Revisions => Ok(()),
            _ => Err(unsupported("put_digest", path)),
        }
    }

    fn cached_digest_link(&self, path: &str) -> Result<Vec<u8>> {
        let digest = path::get_manifest_digest(path)?;
        self.store.get_cache_file_stat(digest.hex())?;
        Ok(digest.to_string().into_bytes())
    }
}

fn parse_digest(path: &str, content: &[u8]) -> Result<Digest> {
    std::str::from_utf8(content)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| {
            StoreError::InvalidContent {
                name: path.to_owned(),
                reason: "link content is not a digest".to_owned(),
            }
            .into()
        })
}

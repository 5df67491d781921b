use super::{MetadataFactory, MetadataType};
use crate::state::FileState;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

pub const PREFIX: &str = "_hashstates/";

static SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^_hashstates/(?P<algo>\w+)/(?P<offset>\w+)$").unwrap());

/// Snapshot of a streaming hasher, keyed by algorithm and byte offset, so
/// a chunked upload can resume hashing where it left off. The payload is
/// opaque to the store.
///
/// Hash states never follow the data file out of the upload directory;
/// once the upload is committed there is nothing left to resume.
#[derive(Clone, Debug)]
pub struct HashState {
    algo: String,
    offset: String,
}

impl HashState {
    pub fn new(algo: impl Into<String>, offset: impl Into<String>) -> Self {
        HashState {
            algo: algo.into(),
            offset: offset.into(),
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        let caps = SUFFIX_RE.captures(suffix)?;
        Some(HashState::new(&caps["algo"], &caps["offset"]))
    }

    pub fn algo(&self) -> &str {
        &self.algo
    }

    pub fn offset(&self) -> &str {
        &self.offset
    }
}

impl MetadataType for HashState {
    fn suffix(&self) -> String {
        format!("{}{}/{}", PREFIX, self.algo, self.offset)
    }

    fn movable(&self) -> bool {
        false
    }

    fn valid_state(&self, state: FileState) -> bool {
        state == FileState::Upload
    }
}

pub(super) struct Factory;

impl MetadataFactory for Factory {
    fn create(&self, suffix: &str) -> Option<Arc<dyn MetadataType>> {
        HashState::from_suffix(suffix).map(|hs| Arc::new(hs) as Arc<dyn MetadataType>)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn suffix_roundtrip() {
        let hs = HashState::new("sha256", "500");
        assert_eq!(hs.suffix(), "_hashstates/sha256/500");

        let parsed = HashState::from_suffix(&hs.suffix()).unwrap();
        assert_eq!(parsed.algo(), "sha256");
        assert_eq!(parsed.offset(), "500");
    }

    #[test]
    fn malformed_suffixes() {
        assert!(HashState::from_suffix("_hashstates/sha256").is_none());
        assert!(HashState::from_suffix("_hashstates/sha256/500/9").is_none());
        assert!(HashState::from_suffix("hashstates/sha256/500").is_none());
    }
}

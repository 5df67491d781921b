use super::{MetadataFactory, MetadataType};
use std::sync::Arc;

pub const SUFFIX: &str = "_torrentmeta";

/// Torrent metainfo attached to a blob, so peers can serve and verify
/// pieces of it. Follows the blob from download into cache.
#[derive(Debug)]
pub struct TorrentMeta;

impl MetadataType for TorrentMeta {
    fn suffix(&self) -> String {
        SUFFIX.to_owned()
    }

    fn movable(&self) -> bool {
        true
    }
}

pub(super) struct Factory;

impl MetadataFactory for Factory {
    fn create(&self, _suffix: &str) -> Option<Arc<dyn MetadataType>> {
        Some(Arc::new(TorrentMeta))
    }
}

/// The metainfo payload itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetaInfo {
    pub name: String,
    pub length: u64,
    pub piece_length: u64,
    pub piece_hashes: Vec<[u8; 20]>,
    pub announce: String,
}

impl MetaInfo {
    pub fn num_pieces(&self) -> usize {
        self.piece_hashes.len()
    }

    /// Length of piece `index`; the final piece may run short.
    pub fn piece_len(&self, index: usize) -> u64 {
        let start = index as u64 * self.piece_length;
        self.piece_length.min(self.length.saturating_sub(start))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn meta() -> MetaInfo {
        MetaInfo {
            name: "layer".to_owned(),
            length: 10,
            piece_length: 4,
            piece_hashes: vec![[1u8; 20], [2u8; 20], [3u8; 20]],
            announce: "http://tracker:6881/announce".to_owned(),
        }
    }

    #[test]
    fn encode_roundtrip() {
        let original = meta();
        let decoded = MetaInfo::from_bytes(&original.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn final_piece_runs_short() {
        let meta = meta();
        assert_eq!(meta.num_pieces(), 3);
        assert_eq!(meta.piece_len(0), 4);
        assert_eq!(meta.piece_len(2), 2);
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(MetaInfo::from_bytes(&[0xc1, 0x00]).is_err());
    }
}

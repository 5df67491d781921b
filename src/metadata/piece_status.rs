use super::{MetadataFactory, MetadataType};
use crate::state::FileState;
use std::sync::Arc;

pub const SUFFIX: &str = "_status";

/// Download progress of a single piece.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PieceState {
    Clean = 0,
    Dirty = 1,
    Done = 2,
    DontCare = 3,
}

impl PieceState {
    pub fn from_byte(byte: u8) -> Option<PieceState> {
        match byte {
            0 => Some(PieceState::Clean),
            1 => Some(PieceState::Dirty),
            2 => Some(PieceState::Done),
            3 => Some(PieceState::DontCare),
            _ => None,
        }
    }

    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Per-piece status bytes for a blob arriving through the torrent path.
/// One byte per piece, written individually as pieces complete.
///
/// A cached blob is immutable, so writes are rejected there; readers of a
/// cached blob see every piece as [`PieceState::Done`] without consulting
/// the sidecar.
#[derive(Debug)]
pub struct PieceStatus;

impl MetadataType for PieceStatus {
    fn suffix(&self) -> String {
        SUFFIX.to_owned()
    }

    fn movable(&self) -> bool {
        true
    }

    fn valid_state(&self, state: FileState) -> bool {
        state != FileState::Cache
    }
}

pub(super) struct Factory;

impl MetadataFactory for Factory {
    fn create(&self, _suffix: &str) -> Option<Arc<dyn MetadataType>> {
        Some(Arc::new(PieceStatus))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn byte_roundtrip() {
        for state in [
            PieceState::Clean,
            PieceState::Dirty,
            PieceState::Done,
            PieceState::DontCare,
        ] {
            assert_eq!(PieceState::from_byte(state.as_byte()), Some(state));
        }
        assert_eq!(PieceState::from_byte(4), None);
    }

    #[test]
    fn rejected_in_cache_only() {
        assert!(PieceStatus.valid_state(FileState::Upload));
        assert!(PieceStatus.valid_state(FileState::Download));
        assert!(PieceStatus.valid_state(FileState::Trash));
        assert!(!PieceStatus.valid_state(FileState::Cache));
    }
}

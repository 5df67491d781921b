//! Pluggable metadata sidecars keyed by filename suffix.
//!
//! Every sidecar type declares its on-disk suffix, whether it follows the
//! data file through state transitions, and in which states it may be
//! written. A process-wide registry maps suffixes discovered on disk back
//! to typed instances so entries can be rehydrated after a restart.

pub mod hash_state;
mod piece_status;
pub mod ref_count;
pub mod started_at;
mod torrent_meta;

pub use hash_state::HashState;
pub use piece_status::{PieceState, PieceStatus};
pub use ref_count::RefCount;
pub use started_at::StartedAt;
pub use torrent_meta::{MetaInfo, TorrentMeta};

use crate::state::FileState;
use once_cell::sync::Lazy;
use regex::Regex;
use std::{fmt, sync::Arc};

/// A metadata sidecar type. Identified on disk by a suffix appended to
/// the data file's basename.
pub trait MetadataType: fmt::Debug + Send + Sync {
    /// The concrete on-disk suffix, e.g. `_status` or
    /// `_hashstates/sha256/500`.
    fn suffix(&self) -> String;

    /// Whether the sidecar is copied along when the entry changes state.
    fn movable(&self) -> bool;

    /// States in which this sidecar may be written, and into which it is
    /// carried on a move.
    fn valid_state(&self, state: FileState) -> bool {
        let _ = state;
        true
    }
}

/// Reconstructs a typed metadata instance from a suffix found on disk.
pub trait MetadataFactory: Send + Sync {
    fn create(&self, suffix: &str) -> Option<Arc<dyn MetadataType>>;
}

/// Suffix → factory table. First registered match wins; suffixes nothing
/// matches are not metadata.
pub struct Registry {
    entries: Vec<(Regex, Box<dyn MetadataFactory>)>,
}

impl Registry {
    pub fn new() -> Self {
        Registry { entries: vec![] }
    }

    pub fn register(&mut self, pattern: Regex, factory: Box<dyn MetadataFactory>) {
        self.entries.push((pattern, factory));
    }

    /// Classify an on-disk suffix.
    pub fn parse(&self, suffix: &str) -> Option<Arc<dyn MetadataType>> {
        self.entries
            .iter()
            .find(|(pattern, _)| pattern.is_match(suffix))
            .and_then(|(_, factory)| factory.create(suffix))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide registry, seeded with the built-in sidecar types and
/// immutable afterwards.
pub fn registry() -> &'static Registry {
    static REGISTRY: Lazy<Registry> = Lazy::new(|| {
        let mut registry = Registry::new();
        registry.register(
            Regex::new(r"^_status$").unwrap(),
            Box::new(piece_status::Factory),
        );
        registry.register(
            Regex::new(r"^_startedat$").unwrap(),
            Box::new(started_at::Factory),
        );
        registry.register(
            Regex::new(r"^_hashstates/\w+/\w+$").unwrap(),
            Box::new(hash_state::Factory),
        );
        registry.register(
            Regex::new(r"^_torrentmeta$").unwrap(),
            Box::new(torrent_meta::Factory),
        );
        registry.register(
            Regex::new(r"^_refcount$").unwrap(),
            Box::new(ref_count::Factory),
        );
        registry
    });
    &REGISTRY
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builtin_suffixes_classify() {
        for suffix in [
            "_status",
            "_startedat",
            "_hashstates/sha256/500",
            "_torrentmeta",
            "_refcount",
        ] {
            let md = registry().parse(suffix).unwrap();
            assert_eq!(md.suffix(), suffix);
        }
    }

    #[test]
    fn unknown_suffixes_are_not_metadata() {
        assert!(registry().parse("_bogus").is_none());
        assert!(registry().parse("").is_none());
        assert!(registry().parse("d_status").is_none());
        assert!(registry().parse("_hashstates/sha256").is_none());
    }

    #[test]
    fn first_match_wins() {
        #[derive(Debug)]
        struct Marker(&'static str);
        impl MetadataType for Marker {
            fn suffix(&self) -> String {
                self.0.to_owned()
            }
            fn movable(&self) -> bool {
                false
            }
        }
        struct MarkerFactory(&'static str);
        impl MetadataFactory for MarkerFactory {
            fn create(&self, _suffix: &str) -> Option<Arc<dyn MetadataType>> {
                Some(Arc::new(Marker(self.0)))
            }
        }

        let mut registry = Registry::new();
        registry.register(
            Regex::new(r"^_x.*$").unwrap(),
            Box::new(MarkerFactory("first")),
        );
        registry.register(
            Regex::new(r"^_xy$").unwrap(),
            Box::new(MarkerFactory("second")),
        );

        assert_eq!(registry.parse("_xy").unwrap().suffix(), "first");
    }
}

//! Store configuration.

use std::path::{Path, PathBuf};

/// Locations of the four state directories.
///
/// The directories may live on different paths but must share a
/// filesystem, since state transitions rename and hardlink across them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub upload_dir: PathBuf,
    pub download_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub trash_dir: PathBuf,
}

impl Config {
    /// The standard layout: one subdirectory per state under `root`.
    pub fn under_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Config {
            upload_dir: root.join("upload"),
            download_dir: root.join("download"),
            cache_dir: root.join("cache"),
            trash_dir: root.join("trash"),
        }
    }
}

//! File lifecycle states and their on-disk directories.

use crate::{config::Config, error::Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Lifecycle state of a stored file.
///
/// A file occupies exactly one state at any instant; its data file lives
/// under that state's directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileState {
    Upload,
    Download,
    Cache,
    Trash,
}

pub const ALL_STATES: [FileState; 4] = [
    FileState::Upload,
    FileState::Download,
    FileState::Cache,
    FileState::Trash,
];

/// The state → directory table.
///
/// Built once from [`Config`], shared as `Arc<Directories>` by backends
/// and entries, and never mutated afterwards.
#[derive(Debug)]
pub struct Directories {
    upload: PathBuf,
    download: PathBuf,
    cache: PathBuf,
    trash: PathBuf,
}

impl Directories {
    pub fn new(config: &Config) -> Result<Self> {
        let dirs = Directories {
            upload: config.upload_dir.clone(),
            download: config.download_dir.clone(),
            cache: config.cache_dir.clone(),
            trash: config.trash_dir.clone(),
        };

        for state in ALL_STATES {
            fs::create_dir_all(dirs.path(state))?;
        }

        Ok(dirs)
    }

    #[inline]
    pub fn path(&self, state: FileState) -> &Path {
        match state {
            FileState::Upload => &self.upload,
            FileState::Download => &self.download,
            FileState::Cache => &self.cache,
            FileState::Trash => &self.trash,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn directories_are_created_eagerly() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = Directories::new(&Config::under_root(tmp.path())).unwrap();

        for state in ALL_STATES {
            assert!(dirs.path(state).is_dir());
        }
        assert_eq!(dirs.path(FileState::Cache), tmp.path().join("cache"));
    }
}

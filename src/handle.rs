//! Read/write handles that survive entry renames.

use crate::{
    entry::FileEntry,
    error::{Result, StoreError},
};
use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
    sync::Arc,
};

/// An open handle on an entry's data file.
///
/// The descriptor is opened before any rename the entry may later
/// undergo, and POSIX keeps the inode alive until the last descriptor
/// closes, so reads and writes stay valid across state transitions and
/// even past deletion of the entry.
///
/// Closing is explicit so that open-handle accounting on the entry stays
/// exact; a second `close` is an error to keep double-release bugs
/// observable. Dropping an unclosed handle still releases the count.
#[derive(Debug)]
pub struct FileReadWriter {
    entry: Arc<FileEntry>,
    file: Option<File>,
}

impl FileReadWriter {
    pub(crate) fn new(entry: Arc<FileEntry>, file: File) -> Self {
        FileReadWriter {
            entry,
            file: Some(file),
        }
    }

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "handle already closed"))
    }

    /// Current size of the underlying data file.
    pub fn size(&self) -> Result<u64> {
        let file = self.file.as_ref().ok_or_else(|| StoreError::AlreadyClosed {
            name: self.entry.name(),
        })?;
        Ok(file.metadata()?.len())
    }

    /// Release the handle and its open-count slot on the entry.
    pub fn close(&mut self) -> Result<()> {
        match self.file.take() {
            Some(file) => {
                drop(file);
                self.entry.release_handle();
                Ok(())
            }
            None => Err(StoreError::AlreadyClosed {
                name: self.entry.name(),
            }),
        }
    }

    /// Flush everything written through this handle to disk, then close.
    pub fn commit(mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.sync_all()?;
        }
        self.close()
    }

    /// Abandon the handle. Alias of [`close`](Self::close).
    pub fn cancel(mut self) -> Result<()> {
        self.close()
    }
}

impl Read for FileReadWriter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file_mut()?.read(buf)
    }
}

impl Write for FileReadWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file_mut()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file_mut()?.flush()
    }
}

impl Seek for FileReadWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file_mut()?.seek(pos)
    }
}

impl Drop for FileReadWriter {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            self.entry.release_handle();
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        config::Config,
        entry::FileEntry,
        state::{Directories, FileState},
    };
    use std::{
        io::{Read, Seek, SeekFrom, Write},
        sync::Arc,
    };

    fn fixture(name: &str, len: u64) -> (tempfile::TempDir, Arc<Directories>, Arc<FileEntry>) {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = Arc::new(Directories::new(&Config::under_root(tmp.path())).unwrap());
        let entry = FileEntry::new(name, FileState::Download, dirs.clone());
        entry.write_inner().create_data_file(len).unwrap();
        (tmp, dirs, entry)
    }

    #[test]
    fn write_then_read_back() {
        let (_tmp, _dirs, entry) = fixture("blob", 0);
        let mut rw = entry.get_read_writer(&[]).unwrap();

        rw.write_all(b"hello").unwrap();
        rw.seek(SeekFrom::Start(0)).unwrap();
        let mut buf = String::new();
        rw.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "hello");
        assert_eq!(rw.size().unwrap(), 5);
        rw.commit().unwrap();
    }

    #[test]
    fn open_count_tracks_handles() {
        let (_tmp, _dirs, entry) = fixture("blob", 1);

        let mut first = entry.get_reader(&[]).unwrap();
        let second = entry.get_reader(&[]).unwrap();
        assert_eq!(entry.open_count(), 2);

        first.close().unwrap();
        assert_eq!(entry.open_count(), 1);
        drop(second);
        assert_eq!(entry.open_count(), 0);
    }

    #[test]
    fn second_close_is_an_error() {
        let (_tmp, _dirs, entry) = fixture("blob", 1);
        let mut reader = entry.get_reader(&[]).unwrap();

        reader.close().unwrap();
        assert!(reader.close().unwrap_err().to_string().contains("closed"));
        assert_eq!(entry.open_count(), 0);
    }

    #[test]
    fn handle_survives_move_and_delete() {
        let (_tmp, dirs, entry) = fixture("blob", 0);
        let mut rw = entry.get_read_writer(&[]).unwrap();
        rw.write_all(b"payload").unwrap();

        entry
            .move_to(&[FileState::Download], FileState::Cache)
            .unwrap();
        assert!(dirs.path(FileState::Cache).join("blob").is_file());

        // reads keep flowing through the renamed inode
        rw.seek(SeekFrom::Start(0)).unwrap();
        let mut buf = String::new();
        rw.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "payload");

        // and even through an unlinked one
        entry.delete(&[], || {}).unwrap();
        rw.seek(SeekFrom::Start(3)).unwrap();
        buf.clear();
        rw.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "load");
    }
}

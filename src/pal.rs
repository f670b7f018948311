/// Platform abstraction for file I/O.
///
/// Everything the engine does to the OS goes through `FileHandle`:
/// creation with durability, preallocation, positional reads/writes,
/// and read-only memory mapping. The WAL and data file never touch
/// `std::fs` directly.
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt as UnixFileExt;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt as Fs4FileExt;
use memmap2::{Mmap, MmapOptions};

use crate::error::Result;

/// File creation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationMode {
    /// Every positional write is flushed to the device before returning.
    Durable,
    /// Writes may sit in the page cache until an explicit sync.
    Buffered,
}

#[derive(Debug)]
pub struct FileHandle {
    file: File,
    path: PathBuf,
    size: u64,
    mode: CreationMode,
}

impl FileHandle {
    /// Open or create the file at `path`.
    pub fn create(path: &Path, mode: CreationMode) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        Self::from_file(file, path, mode)
    }

    /// Open an existing file; missing files are an error.
    pub fn open(path: &Path, mode: CreationMode) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::from_file(file, path, mode)
    }

    fn from_file(file: File, path: &Path, mode: CreationMode) -> Result<Self> {
        let size = file.metadata()?.len();
        Ok(FileHandle {
            file,
            path: path.to_path_buf(),
            size,
            mode,
        })
    }

    /// Ensure the file is at least `size` bytes, preallocating storage.
    /// A file that is already larger keeps its length.
    pub fn set_size(&mut self, size: u64) -> Result<()> {
        if self.size < size {
            self.file.allocate(size)?;
            self.size = size;
        }
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Positional write of the whole buffer. Durable handles flush before
    /// returning, so a successful write survives a crash.
    pub fn write_all_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        UnixFileExt::write_all_at(&self.file, buf, offset)?;
        if self.mode == CreationMode::Durable {
            self.file.sync_data()?;
        }
        let end = offset + buf.len() as u64;
        if end > self.size {
            self.size = end;
        }
        Ok(())
    }

    /// Positional read of exactly `buf.len()` bytes.
    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        UnixFileExt::read_exact_at(&self.file, buf, offset)?;
        Ok(())
    }

    /// Map the whole file read-only.
    pub fn mmap(&self) -> Result<Mmap> {
        let map = unsafe { MmapOptions::new().len(self.size as usize).map(&self.file)? };
        Ok(map)
    }

    /// Flush data and metadata to the device.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Sync and release the handle.
    pub fn close(self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_preallocate_and_rw() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.bin");

        let mut handle = FileHandle::create(&path, CreationMode::Buffered).unwrap();
        handle.set_size(8192).unwrap();
        assert_eq!(handle.size(), 8192);

        handle.write_all_at(100, b"positional").unwrap();
        let mut buf = [0u8; 10];
        handle.read_exact_at(100, &mut buf).unwrap();
        assert_eq!(&buf, b"positional");

        // Preallocating smaller never shrinks.
        handle.set_size(4096).unwrap();
        assert_eq!(handle.size(), 8192);
    }

    #[test]
    fn test_mmap_sees_positional_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.bin");

        let mut handle = FileHandle::create(&path, CreationMode::Durable).unwrap();
        handle.set_size(4096).unwrap();
        handle.write_all_at(0, b"mapped bytes").unwrap();

        let map = handle.mmap().unwrap();
        assert_eq!(&map[0..12], b"mapped bytes");
        assert_eq!(map.len(), 4096);
    }

    #[test]
    fn test_write_past_end_grows_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.bin");

        let mut handle = FileHandle::create(&path, CreationMode::Buffered).unwrap();
        handle.set_size(4096).unwrap();
        handle.write_all_at(4096, &[0xAB; 512]).unwrap();
        assert_eq!(handle.size(), 4608);
    }
}

/// The single data file backing the engine.
///
/// Readers go through a shared read-only map; commits and recovery write
/// page-granular slices positionally through the PAL handle. Both views
/// cover the same OS pages, so positional writes are visible to the map
/// without remapping.
use std::path::Path;

use memmap2::Mmap;

use crate::error::{Result, TalonError};
use crate::options::DbOptions;
use crate::pal::{CreationMode, FileHandle};
use crate::storage::header::FileHeader;
use crate::storage::page::{PageNum, PAGE_SIZE};

#[derive(Debug)]
pub struct DataFile {
    handle: FileHandle,
    map: Mmap,
}

impl DataFile {
    /// Create and bootstrap a new data file: preallocate to
    /// `options.data_size`, write the header page, and map it.
    pub fn create(path: &Path, options: &DbOptions) -> Result<DataFile> {
        let mut handle = FileHandle::create(path, CreationMode::Buffered)?;
        handle.set_size(options.data_size)?;

        let header = FileHeader {
            last_tx_id: 0,
            number_of_pages: options.data_size / PAGE_SIZE as u64,
        };
        let mut page0 = vec![0u8; PAGE_SIZE];
        header.encode_into(&mut page0);
        handle.write_all_at(0, &page0)?;
        handle.sync()?;

        let map = handle.mmap()?;
        Ok(DataFile { handle, map })
    }

    /// Open an existing data file and map it.
    pub fn open(path: &Path) -> Result<DataFile> {
        let handle = FileHandle::open(path, CreationMode::Buffered)?;
        if handle.size() < PAGE_SIZE as u64 {
            return Err(TalonError::Corruption(format!(
                "data file {} is smaller than one page",
                path.display()
            )));
        }
        let map = handle.mmap()?;
        Ok(DataFile { handle, map })
    }

    /// Size of the mapped file in bytes.
    pub fn mapped_size(&self) -> u64 {
        self.map.len() as u64
    }

    /// Borrow the raw bytes of `number_of_pages` pages starting at
    /// `page_num`, bounds-checked against the map.
    pub fn page_slice(&self, page_num: PageNum, number_of_pages: u64) -> Result<&[u8]> {
        let start = page_num
            .checked_mul(PAGE_SIZE as u64)
            .ok_or(TalonError::PageNotFound(page_num))?;
        let len = number_of_pages
            .checked_mul(PAGE_SIZE as u64)
            .ok_or(TalonError::PageNotFound(page_num))?;
        let end = start
            .checked_add(len)
            .ok_or(TalonError::PageNotFound(page_num))?;
        if number_of_pages == 0 || end > self.map.len() as u64 {
            return Err(TalonError::PageNotFound(page_num));
        }
        Ok(&self.map[start as usize..end as usize])
    }

    /// Write whole pages to their home slot. `bytes.len()` must be a
    /// multiple of `PAGE_SIZE` and land within the file.
    pub fn write_pages(&mut self, page_num: PageNum, bytes: &[u8]) -> Result<()> {
        debug_assert_eq!(bytes.len() % PAGE_SIZE, 0);
        let start = page_num
            .checked_mul(PAGE_SIZE as u64)
            .ok_or(TalonError::PageNotFound(page_num))?;
        let end = start
            .checked_add(bytes.len() as u64)
            .ok_or(TalonError::PageNotFound(page_num))?;
        if end > self.map.len() as u64 {
            return Err(TalonError::PageNotFound(page_num));
        }
        self.handle.write_all_at(start, bytes)
    }

    /// Parse the file header out of page 0.
    pub fn read_header(&self) -> Result<FileHeader> {
        FileHeader::decode(self.page_slice(0, 1)?)
    }

    /// Rewrite page 0 with `header`. The header page is engine-owned and
    /// never travels through the log; commits and recovery write it
    /// directly once the pages it describes are in place.
    pub fn write_header(&mut self, header: &FileHeader) -> Result<()> {
        let mut page0 = vec![0u8; PAGE_SIZE];
        header.encode_into(&mut page0);
        self.write_pages(0, &page0)
    }

    /// Flush all page writes to the device.
    pub fn sync(&self) -> Result<()> {
        self.handle.sync()
    }

    /// Sync and release the file.
    pub fn close(self) -> Result<()> {
        drop(self.map);
        self.handle.close()
    }
}

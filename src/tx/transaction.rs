/// Transactions over the page store.
///
/// A `WriteTx` buffers a dirty page set in memory; nothing touches disk
/// until commit, when the set is appended to the log and then applied to
/// the data file. Dropping a `WriteTx` abandons it. A `ReadTx` is a cheap
/// snapshot: a copy of the published header plus the shared read map.
use std::collections::HashMap;

use crate::error::{Result, TalonError};
use crate::storage::data_file::DataFile;
use crate::storage::header::FileHeader;
use crate::storage::page::{Page, PageNum};
use crate::wal::record::TxId;

/// A write transaction's in-memory state: its id and dirty page set.
pub struct WriteTx {
    tx_id: TxId,
    dirty: HashMap<PageNum, Page>,
}

impl WriteTx {
    pub(crate) fn begin(tx_id: TxId) -> WriteTx {
        WriteTx {
            tx_id,
            dirty: HashMap::new(),
        }
    }

    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    pub fn dirty_page_count(&self) -> usize {
        self.dirty.len()
    }

    pub(crate) fn dirty_pages(&self) -> &HashMap<PageNum, Page> {
        &self.dirty
    }

    /// Stage a fully-formed page, replacing any earlier version.
    pub fn put_page(&mut self, page: Page) {
        self.dirty.insert(page.page_num, page);
    }

    /// Fetch a page for modification. The first touch copies the current
    /// on-disk content into the dirty set; later touches return the same
    /// buffer.
    pub fn modify_page(
        &mut self,
        data: &DataFile,
        page_num: PageNum,
        number_of_pages: u64,
    ) -> Result<&mut Page> {
        use std::collections::hash_map::Entry;
        let page = match self.dirty.entry(page_num) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let bytes = data.page_slice(page_num, number_of_pages)?;
                entry.insert(Page::from_bytes(page_num, bytes)?)
            }
        };
        if page.number_of_pages != number_of_pages {
            return Err(TalonError::Transaction(format!(
                "page {} touched with {} pages but staged with {}",
                page_num, number_of_pages, page.number_of_pages
            )));
        }
        Ok(page)
    }
}

/// A read transaction: immutable snapshot of the engine's state.
pub struct ReadTx<'a> {
    data: &'a DataFile,
    header: FileHeader,
}

impl<'a> ReadTx<'a> {
    pub(crate) fn new(data: &'a DataFile, header: FileHeader) -> ReadTx<'a> {
        ReadTx { data, header }
    }

    /// A read view before any header has been published; only raw fetches
    /// are meaningful. Recovery uses this to read page 0 in the first
    /// place.
    pub(crate) fn bootstrap(data: &'a DataFile) -> ReadTx<'a> {
        ReadTx {
            data,
            header: FileHeader::default(),
        }
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Fetch one page with no interpretation; bounds come from the file
    /// itself, not the header.
    pub fn raw_page(&self, page_num: PageNum) -> Result<&'a [u8]> {
        self.data.page_slice(page_num, 1)
    }

    /// Fetch one page, validated.
    pub fn page(&self, page_num: PageNum) -> Result<&'a [u8]> {
        self.pages(page_num, 1)
    }

    /// Fetch a page span, validated against the published metadata: the
    /// span must sit inside the header's page count, and page 0 must
    /// still parse as a file header page.
    pub fn pages(&self, page_num: PageNum, number_of_pages: u64) -> Result<&'a [u8]> {
        let end = page_num
            .checked_add(number_of_pages)
            .ok_or(TalonError::PageNotFound(page_num))?;
        if number_of_pages == 0 || end > self.header.number_of_pages {
            return Err(TalonError::PageNotFound(page_num));
        }
        let bytes = self.data.page_slice(page_num, number_of_pages)?;
        if page_num == 0 {
            FileHeader::decode(bytes)?;
        }
        Ok(bytes)
    }
}

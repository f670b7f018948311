/// On-disk WAL record format.
///
/// A record is one committed transaction, page-aligned end to end:
///
///   [hash: 32]            BLAKE2b-256 of bytes [32, page_aligned_tx_size)
///   [tx_id: u64]          non-zero for a valid record
///   [page_aligned_tx_size: u64]
///   [tx_size: u64]        used bytes <= page_aligned_tx_size
///   [number_of_modified_pages: u64]
///   [flags: u32]          bit 0 = compressed (never written, rejected on read)
///   [padding: u32]
///   [descriptors: 32 * N]
///   [payload ...]         dirty page copies, zero-padded to the aligned size
///
/// A page descriptor locates one dirty page's payload inside the record:
///
///   [page_num: u64] [offset: u64] [number_of_pages: u64] [flags: u32] [pad: u32]
///
/// `offset` is measured from the start of the record.
use std::collections::HashMap;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use crate::error::{Result, TalonError};
use crate::storage::page::{page_align, Page, PageBuf, PageNum, PAGE_SIZE};

pub type TxId = u64;

pub const RECORD_HASH_SIZE: usize = 32;
pub const RECORD_HEADER_SIZE: usize = 72;
pub const PAGE_DESCRIPTOR_SIZE: usize = 32;
pub const RECORD_FLAG_COMPRESSED: u32 = 1;

type Blake2b256 = Blake2b<U32>;

/// Hash a whole record buffer: BLAKE2b-256, unkeyed, over everything past
/// the stored hash itself.
pub fn compute_record_hash(record: &[u8]) -> [u8; RECORD_HASH_SIZE] {
    let mut hasher = Blake2b256::new();
    hasher.update(&record[RECORD_HASH_SIZE..]);
    hasher.finalize().into()
}

/// The fixed part of a record, parsed out of the first 72 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub hash: [u8; RECORD_HASH_SIZE],
    pub tx_id: TxId,
    pub page_aligned_tx_size: u64,
    pub tx_size: u64,
    pub number_of_modified_pages: u64,
    pub flags: u32,
}

impl RecordHeader {
    fn parse(bytes: &[u8]) -> RecordHeader {
        let mut hash = [0u8; RECORD_HASH_SIZE];
        hash.copy_from_slice(&bytes[0..32]);
        RecordHeader {
            hash,
            tx_id: u64::from_le_bytes(bytes[32..40].try_into().unwrap()),
            page_aligned_tx_size: u64::from_le_bytes(bytes[40..48].try_into().unwrap()),
            tx_size: u64::from_le_bytes(bytes[48..56].try_into().unwrap()),
            number_of_modified_pages: u64::from_le_bytes(bytes[56..64].try_into().unwrap()),
            flags: u32::from_le_bytes(bytes[64..68].try_into().unwrap()),
        }
    }
}

/// One entry of the page-descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDescriptor {
    pub page_num: PageNum,
    pub offset: u64,
    pub number_of_pages: u64,
    pub flags: u32,
}

impl PageDescriptor {
    fn parse(bytes: &[u8]) -> PageDescriptor {
        PageDescriptor {
            page_num: u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            offset: u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            number_of_pages: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
            flags: u32::from_le_bytes(bytes[24..28].try_into().unwrap()),
        }
    }

    fn encode_into(&self, bytes: &mut [u8]) {
        bytes[0..8].copy_from_slice(&self.page_num.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.offset.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.number_of_pages.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.flags.to_le_bytes());
    }
}

/// Serialize a transaction's dirty page set into a page-aligned record,
/// hash included. The descriptor table is emitted in ascending page order.
pub fn encode_record(tx_id: TxId, dirty: &HashMap<PageNum, Page>) -> Result<PageBuf> {
    let count = dirty.len() as u64;
    let header_block = page_align(
        RECORD_HEADER_SIZE as u64 + count * PAGE_DESCRIPTOR_SIZE as u64,
    );
    let payload_bytes: u64 = dirty
        .values()
        .map(|p| p.number_of_pages * PAGE_SIZE as u64)
        .sum();
    let total = header_block + payload_bytes;

    let mut record = PageBuf::zeroed(total as usize)?;

    let mut page_nums: Vec<PageNum> = dirty.keys().copied().collect();
    page_nums.sort_unstable();

    let mut output = header_block;
    for (index, page_num) in page_nums.iter().enumerate() {
        let page = &dirty[page_num];
        let size = page.number_of_pages * PAGE_SIZE as u64;
        record[output as usize..(output + size) as usize].copy_from_slice(page.bytes());
        let descriptor = PageDescriptor {
            page_num: *page_num,
            offset: output,
            number_of_pages: page.number_of_pages,
            flags: 0,
        };
        let at = RECORD_HEADER_SIZE + index * PAGE_DESCRIPTOR_SIZE;
        descriptor.encode_into(&mut record[at..at + PAGE_DESCRIPTOR_SIZE]);
        output += size;
    }

    // end of payload measured from the record start
    let tx_size = output;
    let page_aligned_tx_size = page_align(tx_size);
    debug_assert_eq!(page_aligned_tx_size, total);

    record[32..40].copy_from_slice(&tx_id.to_le_bytes());
    record[40..48].copy_from_slice(&page_aligned_tx_size.to_le_bytes());
    record[48..56].copy_from_slice(&tx_size.to_le_bytes());
    record[56..64].copy_from_slice(&count.to_le_bytes());
    record[64..68].copy_from_slice(&0u32.to_le_bytes());

    let hash = compute_record_hash(&record);
    record[0..RECORD_HASH_SIZE].copy_from_slice(&hash);
    Ok(record)
}

/// A validated view over one record inside a log span.
#[derive(Debug)]
pub struct RecordView<'a> {
    header: RecordHeader,
    bytes: &'a [u8],
}

/// Check whether `log[pos..]` starts with a structurally plausible,
/// hash-valid record. `None` is the normal "not a record here" signal
/// (end of log, zeroed head, torn tail); it is never an error.
pub fn validate_record(log: &[u8], pos: usize) -> Option<RecordView<'_>> {
    if pos + RECORD_HEADER_SIZE > log.len() {
        return None;
    }
    let header = RecordHeader::parse(&log[pos..]);
    if header.tx_id == 0 {
        return None;
    }
    if header.page_aligned_tx_size == 0
        || header.page_aligned_tx_size % PAGE_SIZE as u64 != 0
    {
        return None;
    }
    let end = (pos as u64).checked_add(header.page_aligned_tx_size)?;
    if end > log.len() as u64 {
        return None;
    }

    let bytes = &log[pos..end as usize];
    if compute_record_hash(bytes) != header.hash {
        return None;
    }
    Some(RecordView { header, bytes })
}

impl<'a> RecordView<'a> {
    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    pub fn tx_id(&self) -> TxId {
        self.header.tx_id
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Structural checks beyond the hash: uncompressed, and a descriptor
    /// table that fits inside the record.
    pub fn check_structure(&self) -> Result<()> {
        if self.header.flags != 0 {
            return Err(TalonError::Corruption(format!(
                "record for tx {} carries unsupported flags {:#x}",
                self.header.tx_id, self.header.flags
            )));
        }
        let table_end = RECORD_HEADER_SIZE as u64
            + self.header.number_of_modified_pages * PAGE_DESCRIPTOR_SIZE as u64;
        if table_end > self.header.tx_size || self.header.tx_size > self.bytes.len() as u64 {
            return Err(TalonError::Corruption(format!(
                "record for tx {} declares {} pages but is only {} bytes",
                self.header.tx_id,
                self.header.number_of_modified_pages,
                self.bytes.len()
            )));
        }
        Ok(())
    }

    pub fn descriptor(&self, index: u64) -> PageDescriptor {
        debug_assert!(index < self.header.number_of_modified_pages);
        let at = RECORD_HEADER_SIZE + index as usize * PAGE_DESCRIPTOR_SIZE;
        PageDescriptor::parse(&self.bytes[at..at + PAGE_DESCRIPTOR_SIZE])
    }

    pub fn descriptors(&self) -> impl Iterator<Item = PageDescriptor> + '_ {
        (0..self.header.number_of_modified_pages).map(|i| self.descriptor(i))
    }

    /// Borrow the payload bytes a descriptor points at.
    pub fn payload(&self, descriptor: &PageDescriptor) -> Result<&'a [u8]> {
        let size = descriptor
            .number_of_pages
            .checked_mul(PAGE_SIZE as u64)
            .ok_or_else(|| corrupt_descriptor(self.header.tx_id, descriptor))?;
        let end = descriptor
            .offset
            .checked_add(size)
            .ok_or_else(|| corrupt_descriptor(self.header.tx_id, descriptor))?;
        if descriptor.number_of_pages == 0 || end > self.bytes.len() as u64 {
            return Err(corrupt_descriptor(self.header.tx_id, descriptor));
        }
        Ok(&self.bytes[descriptor.offset as usize..end as usize])
    }
}

fn corrupt_descriptor(tx_id: TxId, descriptor: &PageDescriptor) -> TalonError {
    TalonError::Corruption(format!(
        "record for tx {} has a descriptor for page {} pointing outside the record \
         (offset {}, pages {})",
        tx_id, descriptor.page_num, descriptor.offset, descriptor.number_of_pages
    ))
}

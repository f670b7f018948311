/// Append path: one committed transaction becomes one durable record.
use std::collections::HashMap;

use crate::error::Result;
use crate::storage::page::{Page, PageNum};
use crate::wal::record::{encode_record, TxId};
use crate::wal::Wal;

impl Wal {
    /// Serialize the dirty page set and append it at the current write
    /// position of the active slot with a single durable positional write.
    /// On failure the record is discarded and the write position does not
    /// advance, so the log never exposes a half-appended transaction.
    pub fn append(&mut self, tx_id: TxId, dirty: &HashMap<PageNum, Page>) -> Result<()> {
        let record = encode_record(tx_id, dirty)?;
        let file = &mut self.files[0];
        file.handle.write_all_at(file.last_write_pos, &record)?;
        file.last_write_pos += record.len() as u64;
        file.last_tx_id = tx_id;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DbOptions;
    use crate::storage::data_file::DataFile;
    use crate::storage::page::PAGE_SIZE;
    use tempfile::TempDir;

    fn open_wal(dir: &TempDir) -> (Wal, DataFile) {
        let db_path = dir.path().join("test.db");
        let options = DbOptions::default();
        let mut data = DataFile::create(&db_path, &options).unwrap();
        let (wal, _) = Wal::open_and_recover(&db_path, &options, &mut data).unwrap();
        (wal, data)
    }

    fn one_page(page_num: PageNum, fill: u8) -> HashMap<PageNum, Page> {
        let mut page = Page::zeroed(page_num, 1).unwrap();
        page.bytes_mut().fill(fill);
        HashMap::from([(page_num, page)])
    }

    #[test]
    fn test_append_advances_write_pos_and_tx_id() {
        let dir = TempDir::new().unwrap();
        let (mut wal, _data) = open_wal(&dir);

        assert_eq!(wal.last_write_pos(), 0);
        wal.append(1, &one_page(3, 0xAA)).unwrap();
        // header block + one payload page
        assert_eq!(wal.last_write_pos(), 2 * PAGE_SIZE as u64);
        assert_eq!(wal.last_tx_id(), 1);

        wal.append(2, &one_page(4, 0xBB)).unwrap();
        assert_eq!(wal.last_write_pos(), 4 * PAGE_SIZE as u64);
        assert_eq!(wal.last_tx_id(), 2);
    }

    #[test]
    fn test_appended_records_are_readable_in_place() {
        let dir = TempDir::new().unwrap();
        let (mut wal, _data) = open_wal(&dir);

        wal.append(1, &one_page(5, 0xCD)).unwrap();

        let map = wal.files[0].handle.mmap().unwrap();
        let view = crate::wal::record::validate_record(&map, 0).expect("record on disk");
        assert_eq!(view.tx_id(), 1);
        let descriptor = view.descriptor(0);
        assert_eq!(descriptor.page_num, 5);
        assert!(view
            .payload(&descriptor)
            .unwrap()
            .iter()
            .all(|&b| b == 0xCD));
    }
}

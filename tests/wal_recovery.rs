/// End-to-end recovery tests: opening a database replays the log and
/// publishes a state that agrees with the data file.
use talondb::options::DbOptions;
use talondb::storage::page::{Page, PAGE_SIZE};
use talondb::Database;
use tempfile::TempDir;

fn filled_page(page_num: u64, fill: u8) -> Page {
    let mut page = Page::zeroed(page_num, 1).unwrap();
    page.bytes_mut().fill(fill);
    page
}

#[test]
fn test_fresh_database_open() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("test.db");
    let options = DbOptions::default();

    let db = Database::create(&db_path, options).unwrap();
    let outcome = db.last_recovery();
    assert_eq!(outcome.last_recovered_tx_id, 0);
    assert!(outcome.replayed_tx_ids.is_empty());
    assert_eq!(outcome.pages_replayed, 0);
    assert_eq!(
        db.header().number_of_pages,
        options.data_size / PAGE_SIZE as u64
    );
    assert_eq!(db.header().last_tx_id, 0);
}

#[test]
fn test_single_commit_replay() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("test.db");

    {
        let mut db = Database::create(&db_path, DbOptions::default()).unwrap();
        let mut tx = db.begin_write();
        tx.put_page(filled_page(5, 0xAA));
        tx.put_page(filled_page(9, 0xBB));
        let tx_id = db.commit(tx).unwrap();
        assert_eq!(tx_id, 1);
        db.close().unwrap();
    }

    // wipe the replayed pages in the data file, simulating a crash where
    // the log was written but the page writes never hit the disk
    {
        use std::io::{Seek, SeekFrom, Write};
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .open(&db_path)
            .unwrap();
        for page_num in [5u64, 9] {
            file.seek(SeekFrom::Start(page_num * PAGE_SIZE as u64))
                .unwrap();
            file.write_all(&vec![0u8; PAGE_SIZE]).unwrap();
        }
        file.sync_all().unwrap();
    }

    let db = Database::open(&db_path, DbOptions::default()).unwrap();
    assert_eq!(db.last_recovery().replayed_tx_ids, vec![1]);
    assert_eq!(db.last_recovery().last_recovered_tx_id, 1);
    assert_eq!(db.header().last_tx_id, 1);

    let rtx = db.begin_read();
    assert!(rtx.page(5).unwrap().iter().all(|&b| b == 0xAA));
    assert!(rtx.page(9).unwrap().iter().all(|&b| b == 0xBB));
}

#[test]
fn test_monotonic_replay_of_commit_sequence() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("test.db");

    {
        let mut db = Database::create(&db_path, DbOptions::default()).unwrap();
        for fill in [0x01u8, 0x02, 0x03, 0x04] {
            let mut tx = db.begin_write();
            tx.put_page(filled_page(4, fill));
            db.commit(tx).unwrap();
        }
        db.close().unwrap();
    }

    let db = Database::open(&db_path, DbOptions::default()).unwrap();
    assert_eq!(db.last_recovery().replayed_tx_ids, vec![1, 2, 3, 4]);
    assert_eq!(db.last_recovery().last_recovered_tx_id, 4);

    // the latest committed content prevails
    let rtx = db.begin_read();
    assert!(rtx.page(4).unwrap().iter().all(|&b| b == 0x04));
}

#[test]
fn test_overflow_page_roundtrip() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("test.db");

    {
        let mut db = Database::create(&db_path, DbOptions::default()).unwrap();
        let mut tx = db.begin_write();
        let mut page = Page::zeroed(6, 3).unwrap();
        for (i, chunk) in page.bytes_mut().chunks_mut(PAGE_SIZE).enumerate() {
            chunk.fill(0x10 + i as u8);
        }
        tx.put_page(page);
        db.commit(tx).unwrap();
        db.close().unwrap();
    }

    let db = Database::open(&db_path, DbOptions::default()).unwrap();
    let rtx = db.begin_read();
    let bytes = rtx.pages(6, 3).unwrap();
    assert_eq!(bytes.len(), 3 * PAGE_SIZE);
    for (i, chunk) in bytes.chunks(PAGE_SIZE).enumerate() {
        assert!(chunk.iter().all(|&b| b == 0x10 + i as u8));
    }
}

#[test]
fn test_reads_are_bounds_checked() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("test.db");
    let options = DbOptions::default();

    let db = Database::create(&db_path, options).unwrap();
    let pages = options.data_size / PAGE_SIZE as u64;
    let rtx = db.begin_read();
    assert!(rtx.page(pages - 1).is_ok());
    assert!(rtx.page(pages).is_err());
}

#[test]
fn test_stale_write_transaction_rejected() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("test.db");

    let mut db = Database::create(&db_path, DbOptions::default()).unwrap();
    let mut tx1 = db.begin_write();
    let mut tx2 = db.begin_write();
    tx1.put_page(filled_page(3, 0x0A));
    tx2.put_page(filled_page(3, 0x0B));

    db.commit(tx1).unwrap();
    // tx2 was begun against the same snapshot; its id is now stale
    assert!(db.commit(tx2).is_err());
}

#[test]
fn test_reopen_after_clean_recovery_agrees_with_header() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("test.db");

    {
        let mut db = Database::create(&db_path, DbOptions::default()).unwrap();
        for _ in 0..2 {
            let mut tx = db.begin_write();
            tx.put_page(filled_page(7, 0x7E));
            db.commit(tx).unwrap();
        }
        db.close().unwrap();
    }

    for _ in 0..2 {
        let db = Database::open(&db_path, DbOptions::default()).unwrap();
        // reconciliation invariant: header and recovery agree
        assert_eq!(
            db.header().last_tx_id,
            db.last_recovery().last_recovered_tx_id
        );
        assert_eq!(db.header().last_tx_id, 2);
        db.close().unwrap();
    }
}

//! talondb: an embedded, single-file, page-oriented storage engine with a
//! checksummed write-ahead log.
//!
//! A write transaction buffers dirty pages in memory; commit serializes
//! them into one BLAKE2b-checksummed record, appends it durably to the
//! log, and only then applies the pages to the data file. On open, the
//! log is scanned and every committed transaction is replayed, so the
//! data file always reflects the last durable commit:
//! - fixed-size pages (8 KiB), overflow pages span several
//! - single writer, concurrent snapshot readers
//! - fixed-size circular log with checkpoint-on-half-full
//! - crash recovery that tolerates a torn tail and refuses a torn middle

pub mod concurrency;
pub mod error;
pub mod options;
pub mod pal;
pub mod storage;
pub mod tx;
pub mod wal;

use std::path::{Path, PathBuf};

use crate::concurrency::CommitLock;
use crate::error::{Result, TalonError};
use crate::options::DbOptions;
use crate::storage::data_file::DataFile;
use crate::storage::header::FileHeader;
use crate::tx::transaction::{ReadTx, WriteTx};
use crate::wal::{RecoveryOutcome, TxId, Wal};

/// Main database handle.
#[derive(Debug)]
pub struct Database {
    data: DataFile,
    wal: Wal,
    header: FileHeader,
    last_recovery: RecoveryOutcome,
    commit_lock: CommitLock,
    path: PathBuf,
}

impl Database {
    /// Create a database at `path`: bootstrap the data file, create the
    /// zero-filled log, and run the (empty) recovery pass.
    pub fn create(path: &Path, options: DbOptions) -> Result<Database> {
        options.validate()?;
        let data = DataFile::create(path, &options)?;
        Self::finish_open(path, options, data)
    }

    /// Open an existing database, replaying the log first.
    pub fn open(path: &Path, options: DbOptions) -> Result<Database> {
        options.validate()?;
        let data = DataFile::open(path)?;
        Self::finish_open(path, options, data)
    }

    fn finish_open(path: &Path, options: DbOptions, mut data: DataFile) -> Result<Database> {
        let (wal, outcome) = Wal::open_and_recover(path, &options, &mut data)?;
        let commit_lock = CommitLock::new(path)?;
        Ok(Database {
            data,
            wal,
            header: outcome.header,
            last_recovery: outcome,
            commit_lock,
            path: path.to_path_buf(),
        })
    }

    /// The engine's published global state.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// What the most recent open recovered from the log.
    pub fn last_recovery(&self) -> &RecoveryOutcome {
        &self.last_recovery
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Begin a snapshot read transaction.
    pub fn begin_read(&self) -> ReadTx<'_> {
        ReadTx::new(&self.data, self.header)
    }

    /// Begin a write transaction. Its id is fixed at begin time; commits
    /// must arrive in the same order ids were handed out.
    pub fn begin_write(&self) -> WriteTx {
        WriteTx::begin(self.header.last_tx_id + 1)
    }

    /// Commit a write transaction: append one record to the log, then
    /// apply the pages to the data file, advance the header page, and
    /// publish the new state. Dropping the transaction instead discards
    /// it. The record is the durability point; a crash after it leaves
    /// recovery to redo the rest.
    pub fn commit(&mut self, tx: WriteTx) -> Result<TxId> {
        let tx_id = tx.tx_id();
        let _guard = self.commit_lock.acquire(tx_id)?;

        if tx_id != self.header.last_tx_id + 1 {
            return Err(TalonError::Transaction(format!(
                "stale write transaction: tx {} cannot commit after tx {}",
                tx_id, self.header.last_tx_id
            )));
        }
        if tx.dirty_pages().contains_key(&0) {
            return Err(TalonError::Transaction(
                "page 0 is the engine's header page and cannot be written by a transaction"
                    .into(),
            ));
        }

        self.wal.append(tx_id, tx.dirty_pages())?;

        for (page_num, page) in tx.dirty_pages() {
            self.data.write_pages(*page_num, page.bytes())?;
        }
        let mut new_header = self.header;
        new_header.last_tx_id = tx_id;
        self.data.write_header(&new_header)?;
        self.header = new_header;

        if self.wal.will_checkpoint(tx_id) {
            // Best effort: a failed reset leaves the log valid and the
            // predicate still armed for the next commit.
            if self.data.sync().is_ok() {
                let _ = self.wal.checkpoint(tx_id);
            }
        }
        Ok(tx_id)
    }

    /// True when the log is due for a reset as observed by `tx_id`.
    pub fn will_checkpoint(&self, tx_id: TxId) -> bool {
        self.wal.will_checkpoint(tx_id)
    }

    /// Reset the log head. The data file is synced first so every page the
    /// log covered is durable before its records become unreachable.
    pub fn checkpoint(&mut self, tx_id: TxId) -> Result<()> {
        let _guard = self.commit_lock.acquire(tx_id)?;
        self.data.sync()?;
        self.wal.checkpoint(tx_id)
    }

    /// Close the engine, attempting both the log and the data file even if
    /// one fails, and reporting a single aggregated error.
    pub fn close(self) -> Result<()> {
        let Database { data, mut wal, .. } = self;
        let wal_result = wal.close();
        let data_result = data.close();

        let mut failures = Vec::new();
        if let Err(e) = wal_result {
            failures.push(e.to_string());
        }
        if let Err(e) = data_result {
            failures.push(e.to_string());
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(TalonError::Wal(format!(
                "unable to close the engine cleanly: {}",
                failures.join("; ")
            )))
        }
    }
}

/// Commit serialization for the single-writer engine.
///
/// At most one write transaction may be appending to the log at a time.
/// Two layers enforce that: an in-process mutex queues threads behind the
/// live commit, and an exclusive lock on `<db>.lock` keeps a second
/// process away from the log while a commit or checkpoint is in flight.
/// Readers take nothing here: a `ReadTx` is an immutable snapshot and
/// never touches the log, so snapshot reads proceed even while a writer
/// holds the commit lock.
use std::fs::{File, OpenOptions};
use std::path::Path;

use fs4::fs_std::FileExt;
use parking_lot::{Mutex, MutexGuard};

use crate::error::{Result, TalonError};
use crate::wal::record::TxId;

#[derive(Debug)]
pub struct CommitLock {
    writer: Mutex<()>,
    lock_file: File,
}

impl CommitLock {
    pub fn new(db_path: &Path) -> Result<CommitLock> {
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(db_path.with_extension("lock"))?;
        Ok(CommitLock {
            writer: Mutex::new(()),
            lock_file,
        })
    }

    /// Serialize one commit or checkpoint. Blocks until every earlier
    /// writer, in this process or another, has released the log.
    pub fn acquire(&self, tx_id: TxId) -> Result<CommitGuard<'_>> {
        let serialized = self.writer.lock();
        self.lock_file.lock_exclusive().map_err(|e| {
            TalonError::Lock(format!(
                "failed to lock the log for tx {}: {}",
                tx_id, e
            ))
        })?;
        Ok(CommitGuard {
            tx_id,
            _serialized: serialized,
            lock_file: &self.lock_file,
        })
    }
}

/// Held across one commit's append/apply/header sequence; dropping it
/// hands the log to the next writer.
pub struct CommitGuard<'a> {
    tx_id: TxId,
    _serialized: MutexGuard<'a, ()>,
    lock_file: &'a File,
}

impl CommitGuard<'_> {
    /// The transaction this guard is committing.
    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

/// Write-ahead log: append, crash recovery, checkpointing.
///
/// The log is a preallocated fixed-size file; records are laid end to end
/// from offset 0 and the unused suffix stays zero-filled. Recovery maps
/// the file read-only, replays every valid record in tx order, then tears
/// the map down; normal appends go through positional durable writes.
use std::path::{Path, PathBuf};

use crate::error::{Result, TalonError};
use crate::options::DbOptions;
use crate::pal::{CreationMode, FileHandle};
use crate::storage::data_file::DataFile;
use crate::storage::page::{PageBuf, PAGE_SIZE};

pub mod record;
pub mod recovery;
pub mod writer;

pub use record::TxId;
pub use recovery::RecoveryOutcome;

/// Slot codes for the log file names. Only slot 0 is in use; slot 1 is
/// reserved for a future rotation scheme.
const WAL_SLOT_CODES: [char; 2] = ['a', 'b'];

/// Path of a log slot: `<db_file_name>-a.wal`.
pub fn wal_file_path(db_path: &Path, slot: usize) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(format!("-{}.wal", WAL_SLOT_CODES[slot]));
    PathBuf::from(name)
}

/// In-memory state of one log slot.
#[derive(Debug)]
pub(crate) struct WalFileState {
    pub(crate) handle: FileHandle,
    pub(crate) last_write_pos: u64,
    pub(crate) last_tx_id: TxId,
}

impl WalFileState {
    fn open_slot(db_path: &Path, slot: usize, options: &DbOptions) -> Result<WalFileState> {
        let path = wal_file_path(db_path, slot);
        let mut handle = FileHandle::create(&path, CreationMode::Durable)?;
        handle.set_size(options.wal_size)?;
        Ok(WalFileState {
            handle,
            last_write_pos: 0,
            last_tx_id: 0,
        })
    }
}

#[derive(Debug)]
pub struct Wal {
    pub(crate) files: Vec<WalFileState>,
    wal_size: u64,
}

impl Wal {
    /// Open slot 0 and replay it against the data file. The recovery
    /// mapping lives only for the duration of this call.
    pub fn open_and_recover(
        db_path: &Path,
        options: &DbOptions,
        data: &mut DataFile,
    ) -> Result<(Wal, RecoveryOutcome)> {
        let file = WalFileState::open_slot(db_path, 0, options)?;
        let outcome = {
            let map = file.handle.mmap()?;
            recovery::recover(data, &map)?
        };
        let wal = Wal {
            files: vec![file],
            wal_size: options.wal_size,
        };
        Ok((wal, outcome))
    }

    /// Highest transaction id appended to the active slot this session.
    pub fn last_tx_id(&self) -> TxId {
        self.files[0].last_tx_id
    }

    /// Next append position in the active slot.
    pub fn last_write_pos(&self) -> u64 {
        self.files[0].last_write_pos
    }

    /// True when the log is full enough to reset and no transaction at or
    /// after `tx_id` still needs it.
    pub fn will_checkpoint(&self, tx_id: TxId) -> bool {
        let file = &self.files[0];
        let full = file.last_write_pos > self.wal_size / 2;
        let at_end = tx_id >= file.last_tx_id;
        full && at_end
    }

    /// Truncate the record chain at the head: zero page 0 of the log so a
    /// later recovery stops immediately, then rewind the write position.
    /// The decision to checkpoint belongs to `will_checkpoint`; the
    /// transaction id is not re-checked here.
    pub fn checkpoint(&mut self, _tx_id: TxId) -> Result<()> {
        let zero = PageBuf::zeroed(PAGE_SIZE)?;
        let file = &mut self.files[0];
        file.handle
            .write_all_at(0, &zero)
            .map_err(|e| TalonError::Wal(format!("unable to reset the log head: {}", e)))?;
        file.last_write_pos = 0;
        Ok(())
    }

    /// Close every slot, attempting each even after a failure, and report
    /// a single aggregated error. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        let mut failures = Vec::new();
        for file in self.files.drain(..) {
            let path = file.handle.path().display().to_string();
            if let Err(e) = file.handle.close() {
                failures.push(format!("{}: {}", path, e));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(TalonError::Wal(format!(
                "unable to close the log cleanly: {}",
                failures.join("; ")
            )))
        }
    }
}

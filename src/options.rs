use crate::error::{Result, TalonError};
use crate::storage::page::PAGE_SIZE;

/// Smallest data file we will create.
pub const MINIMUM_DATA_FILE_SIZE: u64 = 128 * 1024;

/// Database creation options.
#[derive(Debug, Clone, Copy)]
pub struct DbOptions {
    /// Total size of the data file in bytes. Multiple of `PAGE_SIZE`.
    pub data_size: u64,
    /// Total size of the log file in bytes. Multiple of `PAGE_SIZE`,
    /// at least two pages.
    pub wal_size: u64,
}

impl Default for DbOptions {
    fn default() -> Self {
        DbOptions {
            data_size: MINIMUM_DATA_FILE_SIZE,
            wal_size: 1024 * 1024,
        }
    }
}

impl DbOptions {
    pub fn validate(&self) -> Result<()> {
        let page = PAGE_SIZE as u64;
        if self.data_size < MINIMUM_DATA_FILE_SIZE || self.data_size % page != 0 {
            return Err(TalonError::Config(format!(
                "data_size must be a multiple of {} and at least {}, got {}",
                page, MINIMUM_DATA_FILE_SIZE, self.data_size
            )));
        }
        if self.wal_size < 2 * page || self.wal_size % page != 0 {
            return Err(TalonError::Config(format!(
                "wal_size must be a multiple of {} and at least {}, got {}",
                page,
                2 * page,
                self.wal_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_valid() {
        DbOptions::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_unaligned_wal_size() {
        let opts = DbOptions {
            wal_size: 3 * PAGE_SIZE as u64 + 17,
            ..DbOptions::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_rejects_tiny_wal() {
        let opts = DbOptions {
            wal_size: PAGE_SIZE as u64,
            ..DbOptions::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_rejects_tiny_data_file() {
        let opts = DbOptions {
            data_size: PAGE_SIZE as u64,
            ..DbOptions::default()
        };
        assert!(opts.validate().is_err());
    }
}

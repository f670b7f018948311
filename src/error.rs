use thiserror::Error;

#[derive(Error, Debug)]
pub enum TalonError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("WAL error: {0}")]
    Wal(String),

    #[error("out of memory: allocation of {0} bytes failed")]
    OutOfMemory(usize),

    #[error("invalid page format")]
    InvalidPage,

    #[error("page not found: page_num={0}")]
    PageNotFound(u64),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TalonError>;

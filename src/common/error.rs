use thiserror::Error;

/// Database error types
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Header page has no room for another root record")]
    HeaderPageFull,
}

pub type Result<T> = std::result::Result<T, StrataError>;

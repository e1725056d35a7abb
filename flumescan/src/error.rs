use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("no scan file at {0}")]
    MissingFile(PathBuf),

    #[error("invalid scan len {0}")]
    ScanLen(u64),

    #[error("no valid samples in {0}")]
    NoValidData(PathBuf),
}

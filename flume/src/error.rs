use flumescan::ScanError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlumeError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Scan(#[from] ScanError),

    #[error("no scan files in {0}")]
    Path(PathBuf),

    #[error("position {position_mm} mm is outside the {axis} axis ({len} cells)")]
    IndexOutOfRange {
        axis: &'static str,
        position_mm: f32,
        len: usize,
    },

    #[error("snapshot index {index} out of range for series of {len}")]
    SelectionIndex { index: isize, len: usize },

    #[error("drainage topology not initialized")]
    UninitializedTopology,

    #[error("render failed: {0}")]
    Render(String),
}

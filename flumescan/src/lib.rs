//! Flume bed-scanner (`.dat`) snapshot format.
//!
//! One snapshot is a fixed-shape binary dump of the laser scanner's
//! bed elevation measurement: 1001 rows by 1024 columns of row-major
//! little-endian `f32`, in mm, with `-9999.0` marking cells the
//! scanner could not resolve. Loading a snapshot decodes the raw
//! buffer, flips it to the flume's x orientation, masks the
//! calibration-putty corners and the walls, and computes the valid
//! elevation bounds used for plot color scales.

mod error;

pub use crate::error::ScanError;

use byteorder::{ByteOrder, LittleEndian as LE};
use log::debug;
use memmap2::Mmap;
use ndarray::{s, Array2, Axis};
use std::{
    fs::File,
    io::{ErrorKind, Read},
    mem::size_of,
    path::Path,
};

/// Number of scan rows (the flume's cross-stream, y axis).
pub const GRID_ROWS: usize = 1001;

/// Number of scan columns (the flume's streamwise, x axis).
pub const GRID_COLS: usize = 1024;

/// Physical cell spacing in mm, both axes.
pub const CELL_SPACING: f32 = 0.5;

/// Value the scanner writes for cells it could not resolve.
pub const NODATA: f32 = -9999.0;

/// Expected byte length of one raw snapshot.
pub const RAW_LEN: usize = GRID_ROWS * GRID_COLS * size_of::<f32>();

/// Elevation grid of one snapshot. Missing cells are `NAN`.
pub type Grid = Array2<f32>;

/// Converts a physical distance in mm to a whole cell count.
///
/// Truncates, never rounds. Border masking and profile row/column
/// lookup both go through this so a given position always lands on
/// the same cell.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
#[must_use]
pub fn to_cells(distance_mm: f32) -> usize {
    (distance_mm / CELL_SPACING) as usize
}

/// Decodes one raw snapshot buffer into an elevation grid.
///
/// The buffer must be exactly [`RAW_LEN`] bytes. The scanner records
/// columns mirrored relative to the flume's x axis, so the decoded
/// grid is flipped left-to-right. Sentinel samples become `NAN`; no
/// other validation is applied.
pub fn decode(raw: &[u8]) -> Result<Grid, ScanError> {
    if raw.len() != RAW_LEN {
        return Err(ScanError::ScanLen(raw.len() as u64));
    }

    let samples: Vec<f32> = raw
        .chunks_exact(size_of::<f32>())
        .map(|bytes| {
            let sample = LE::read_f32(bytes);
            if sample == NODATA {
                f32::NAN
            } else {
                sample
            }
        })
        .collect();

    let mut eta = Array2::from_shape_vec((GRID_ROWS, GRID_COLS), samples)
        .expect("sample count checked against RAW_LEN");
    eta.invert_axis(Axis(1));
    Ok(eta)
}

/// Masks the calibration-putty corner blocks and the flume walls.
///
/// Overwrites the masked regions with `NAN` in place; callers must
/// not retain copies expecting the pre-mask values. Widths are
/// physical mm, converted with [`to_cells`]. Zero-cell widths are
/// no-ops; widths wider than the grid mask whatever the slice
/// addresses. Masking only ever adds missing cells, so applying it
/// again with the same widths changes nothing.
pub fn mask_borders(grid: &mut Grid, corner_buffer_mm: f32, wall_buffer_mm: f32) {
    let (rows, cols) = grid.dim();
    let corner = to_cells(corner_buffer_mm).min(rows).min(cols);
    let wall_rows = to_cells(wall_buffer_mm).min(rows);
    let wall_cols = to_cells(wall_buffer_mm).min(cols);

    if corner > 0 {
        grid.slice_mut(s![..corner, ..corner]).fill(f32::NAN);
        grid.slice_mut(s![..corner, cols - corner..]).fill(f32::NAN);
        grid.slice_mut(s![rows - corner.., ..corner]).fill(f32::NAN);
        grid.slice_mut(s![rows - corner.., cols - corner..])
            .fill(f32::NAN);
    }

    if wall_rows > 0 {
        grid.slice_mut(s![..wall_rows, ..]).fill(f32::NAN);
        grid.slice_mut(s![rows - wall_rows.., ..]).fill(f32::NAN);
    }
    if wall_cols > 0 {
        grid.slice_mut(s![.., ..wall_cols]).fill(f32::NAN);
        grid.slice_mut(s![.., cols - wall_cols..]).fill(f32::NAN);
    }
}

/// Lowest and highest valid elevation of one masked grid.
///
/// Only used to pick plot color scales, never for masking decisions.
/// `min <= max` holds by construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f32,
    pub max: f32,
}

fn valid_bounds(grid: &Grid) -> Option<Bounds> {
    let mut bounds: Option<Bounds> = None;
    for &sample in grid {
        if sample.is_nan() {
            continue;
        }
        match bounds.as_mut() {
            None => {
                bounds = Some(Bounds {
                    min: sample,
                    max: sample,
                });
            }
            Some(b) => {
                b.min = b.min.min(sample);
                b.max = b.max.max(sample);
            }
        }
    }
    bounds
}

/// How to read raw snapshot bytes off disk.
///
/// Snapshots are ~4 MB, so the trade off only matters for long
/// series; measure before preferring one over the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Buffered read into memory.
    InMem,
    /// Memory map the file and decode out of the mapping.
    MemMap,
}

/// One loaded, masked snapshot.
#[derive(Debug)]
pub struct Snapshot {
    /// File stem, used to label plots.
    label: String,

    /// Masked elevation grid.
    eta: Grid,

    /// Min/max over valid cells.
    bounds: Bounds,
}

impl Snapshot {
    /// Reads, decodes, and masks the snapshot at `path`.
    pub fn load<P: AsRef<Path>>(
        path: P,
        corner_buffer_mm: f32,
        wall_buffer_mm: f32,
    ) -> Result<Self, ScanError> {
        Self::open(path, LoadMode::InMem, corner_buffer_mm, wall_buffer_mm)
    }

    /// Like [`Snapshot::load`], but decodes out of a memory-mapped
    /// file.
    pub fn memmap<P: AsRef<Path>>(
        path: P,
        corner_buffer_mm: f32,
        wall_buffer_mm: f32,
    ) -> Result<Self, ScanError> {
        Self::open(path, LoadMode::MemMap, corner_buffer_mm, wall_buffer_mm)
    }

    /// Loads the snapshot at `path` with an explicit [`LoadMode`].
    pub fn open<P: AsRef<Path>>(
        path: P,
        mode: LoadMode,
        corner_buffer_mm: f32,
        wall_buffer_mm: f32,
    ) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ScanError::MissingFile(path.to_owned()),
            _ => ScanError::Io(e),
        })?;

        let mut eta = match mode {
            LoadMode::InMem => {
                let mut raw = Vec::with_capacity(RAW_LEN);
                file.read_to_end(&mut raw)?;
                decode(&raw)?
            }
            LoadMode::MemMap => {
                let raw = unsafe { Mmap::map(&file)? };
                decode(&raw)?
            }
        };

        mask_borders(&mut eta, corner_buffer_mm, wall_buffer_mm);
        debug!("loaded {path:?}");

        let bounds =
            valid_bounds(&eta).ok_or_else(|| ScanError::NoValidData(path.to_owned()))?;

        let label = path
            .file_stem()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or_default()
            .to_owned();

        Ok(Self { label, eta, bounds })
    }

    /// Plot label for this snapshot (the file stem).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The masked elevation grid.
    pub fn grid(&self) -> &Grid {
        &self.eta
    }

    /// Consumes the snapshot, keeping only the grid.
    #[must_use]
    pub fn into_grid(self) -> Grid {
        self.eta
    }

    /// Valid elevation bounds of the masked grid.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::{
        decode, mask_borders, to_cells, Bounds, ScanError, Snapshot, GRID_COLS, GRID_ROWS,
        NODATA, RAW_LEN,
    };
    use byteorder::{ByteOrder, LittleEndian as LE};
    use ndarray::Array2;

    fn raw_snapshot(fill: f32) -> Vec<u8> {
        let mut raw = vec![0u8; RAW_LEN];
        for bytes in raw.chunks_exact_mut(4) {
            LE::write_f32(bytes, fill);
        }
        raw
    }

    fn write_sample(raw: &mut [u8], row: usize, col: usize, value: f32) {
        let offset = (row * GRID_COLS + col) * 4;
        LE::write_f32(&mut raw[offset..offset + 4], value);
    }

    #[test]
    fn test_decode_shape() {
        let eta = decode(&raw_snapshot(5.0)).unwrap();
        assert_eq!(eta.dim(), (GRID_ROWS, GRID_COLS));
        assert!(eta.iter().all(|v| *v == 5.0));
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        let mut raw = raw_snapshot(5.0);
        raw.pop();
        let err = decode(&raw).unwrap_err();
        assert!(matches!(err, ScanError::ScanLen(len) if len == RAW_LEN as u64 - 1));
    }

    #[test]
    fn test_decode_rejects_long_buffer() {
        let mut raw = raw_snapshot(5.0);
        raw.extend_from_slice(&[0; 4]);
        assert!(matches!(decode(&raw), Err(ScanError::ScanLen(_))));
    }

    #[test]
    fn test_decode_sentinel_becomes_nan() {
        let mut raw = raw_snapshot(5.0);
        write_sample(&mut raw, 0, 0, NODATA);
        let eta = decode(&raw).unwrap();
        // Source (0, 0) lands at (0, 1023) after the flip.
        assert!(eta[[0, GRID_COLS - 1]].is_nan());
        assert_eq!(eta.iter().filter(|v| v.is_nan()).count(), 1);
    }

    #[test]
    fn test_decode_mirrors_columns() {
        let mut raw = raw_snapshot(0.0);
        write_sample(&mut raw, 3, 0, 7.0);
        write_sample(&mut raw, 3, 1, 8.0);
        let eta = decode(&raw).unwrap();
        assert_eq!(eta[[3, GRID_COLS - 1]], 7.0);
        assert_eq!(eta[[3, GRID_COLS - 2]], 8.0);
        assert_eq!(eta[[3, 0]], 0.0);
    }

    #[test]
    fn test_to_cells_truncates() {
        assert_eq!(to_cells(20.0), 40);
        assert_eq!(to_cells(10.0), 20);
        assert_eq!(to_cells(0.9), 1);
        assert_eq!(to_cells(0.4), 0);
    }

    #[test]
    fn test_mask_geometry() {
        let mut eta = Array2::from_elem((GRID_ROWS, GRID_COLS), 5.0f32);
        mask_borders(&mut eta, 20.0, 10.0);

        // 40-cell corner blocks and 20-cell wall strips.
        assert!(eta[[0, 0]].is_nan());
        assert!(eta[[39, 39]].is_nan());
        assert!(eta[[39, GRID_COLS - 40]].is_nan());
        assert!(eta[[GRID_ROWS - 40, 39]].is_nan());
        assert!(eta[[19, 512]].is_nan());
        assert!(eta[[GRID_ROWS - 20, 512]].is_nan());
        assert!(eta[[500, 19]].is_nan());
        assert!(eta[[500, GRID_COLS - 20]].is_nan());

        // First surviving cells inside corner block and wall strips.
        assert_eq!(eta[[40, 40]], 5.0);
        assert_eq!(eta[[20, 40]], 5.0);
        assert_eq!(eta[[40, 20]], 5.0);
        assert_eq!(eta[[500, 512]], 5.0);
    }

    #[test]
    fn test_mask_idempotent() {
        let mut once = Array2::from_elem((GRID_ROWS, GRID_COLS), 5.0f32);
        mask_borders(&mut once, 20.0, 10.0);
        let mut twice = once.clone();
        mask_borders(&mut twice, 20.0, 10.0);
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.is_nan(), b.is_nan());
            if !a.is_nan() {
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_mask_zero_width_is_noop() {
        let mut eta = Array2::from_elem((GRID_ROWS, GRID_COLS), 5.0f32);
        mask_borders(&mut eta, 0.0, 0.0);
        assert!(eta.iter().all(|v| *v == 5.0));
    }

    #[test]
    fn test_mask_oversized_masks_everything() {
        let mut eta = Array2::from_elem((GRID_ROWS, GRID_COLS), 5.0f32);
        mask_borders(&mut eta, 0.0, 2000.0);
        assert!(eta.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_snapshot_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_0001.DAT");
        std::fs::write(&path, raw_snapshot(5.0)).unwrap();

        let snap = Snapshot::load(&path, 20.0, 10.0).unwrap();
        assert_eq!(snap.label(), "scan_0001");
        assert_eq!(snap.grid().dim(), (GRID_ROWS, GRID_COLS));
        assert_eq!(snap.bounds(), Bounds { min: 5.0, max: 5.0 });
        // Masked cells are missing, the centre region survives.
        assert!(snap.grid()[[0, 0]].is_nan());
        assert_eq!(snap.grid()[[500, 512]], 5.0);
    }

    #[test]
    fn test_snapshot_bounds_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_0002.DAT");
        let mut raw = raw_snapshot(5.0);
        write_sample(&mut raw, 500, 512, -3.0);
        write_sample(&mut raw, 500, 513, 11.0);
        std::fs::write(&path, raw).unwrap();

        let snap = Snapshot::load(&path, 20.0, 10.0).unwrap();
        assert_eq!(snap.bounds(), Bounds { min: -3.0, max: 11.0 });
    }

    #[test]
    fn test_snapshot_memmap_matches_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_0003.DAT");
        let mut raw = raw_snapshot(0.0);
        for row in 0..GRID_ROWS {
            write_sample(&mut raw, row, 100, row as f32);
        }
        std::fs::write(&path, raw).unwrap();

        let in_mem = Snapshot::load(&path, 20.0, 10.0).unwrap();
        let mapped = Snapshot::memmap(&path, 20.0, 10.0).unwrap();
        assert_eq!(in_mem.bounds(), mapped.bounds());
        for (a, b) in in_mem.grid().iter().zip(mapped.grid().iter()) {
            assert_eq!(a.is_nan(), b.is_nan());
            if !a.is_nan() {
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_snapshot_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.DAT");
        let err = Snapshot::load(&path, 20.0, 10.0).unwrap_err();
        assert!(matches!(err, ScanError::MissingFile(p) if p == path));
    }

    #[test]
    fn test_snapshot_all_sentinel_is_no_valid_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_0004.DAT");
        std::fs::write(&path, raw_snapshot(NODATA)).unwrap();
        let err = Snapshot::load(&path, 20.0, 10.0).unwrap_err();
        assert!(matches!(err, ScanError::NoValidData(p) if p == path));
    }

    #[test]
    fn test_snapshot_fully_masked_is_no_valid_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_0005.DAT");
        std::fs::write(&path, raw_snapshot(5.0)).unwrap();
        let err = Snapshot::load(&path, 0.0, 2000.0).unwrap_err();
        assert!(matches!(err, ScanError::NoValidData(_)));
    }
}

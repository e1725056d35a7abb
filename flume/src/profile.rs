//! 1-D reductions of one masked grid.

use crate::FlumeError;
use flumescan::{to_cells, Grid};
use log::debug;
use ndarray::{Array1, Axis};

/// Longitudinal bed profile: the grid row nearest `y_mm`, verbatim.
///
/// Row lookup truncates `y_mm` to a cell index with the same rule as
/// border masking. Missing cells stay `NAN`; what to draw for them is
/// the renderer's concern. A position off the grid is a caller error,
/// never clamped.
pub fn long_profile(grid: &Grid, y_mm: f32) -> Result<Array1<f32>, FlumeError> {
    let row = to_cells(y_mm);
    if y_mm < 0.0 || row >= grid.nrows() {
        return Err(FlumeError::IndexOutOfRange {
            axis: "y",
            position_mm: y_mm,
            len: grid.nrows(),
        });
    }
    Ok(grid.row(row).to_owned())
}

/// Cross-stream section: the grid column nearest `x_mm`, verbatim.
pub fn cross_section(grid: &Grid, x_mm: f32) -> Result<Array1<f32>, FlumeError> {
    let col = to_cells(x_mm);
    if x_mm < 0.0 || col >= grid.ncols() {
        return Err(FlumeError::IndexOutOfRange {
            axis: "x",
            position_mm: x_mm,
            len: grid.ncols(),
        });
    }
    Ok(grid.column(col).to_owned())
}

/// Column-wise mean over valid cells only.
///
/// Missing cells are excluded, not treated as zero. A column with no
/// valid cells averages to `NAN`; wide corner buffers can blank whole
/// columns near the walls, so that case is expected and merely logged.
#[must_use]
pub fn averaged_profile(grid: &Grid) -> Array1<f32> {
    let mut blank = 0usize;
    let means: Array1<f32> = grid
        .axis_iter(Axis(1))
        .map(|column| {
            let (sum, count) = column
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0f64, 0usize), |(sum, count), &v| {
                    (sum + f64::from(v), count + 1)
                });
            if count == 0 {
                blank += 1;
                f32::NAN
            } else {
                (sum / count as f64) as f32
            }
        })
        .collect();
    if blank > 0 {
        debug!("{blank} fully masked columns averaged to NAN");
    }
    means
}

//! Derived products for a flume scan series: coordinate axes, profile
//! reductions, drainage routing, and the per-run orchestrator.

mod d8;
mod drainage;
mod error;
mod profile;
mod series;

pub use crate::{
    d8::D8FlowAccumulator,
    drainage::{BoundarySpec, DrainageAdapter, FlowRouter},
    error::FlumeError,
    profile::{averaged_profile, cross_section, long_profile},
    series::{
        render_drainage, render_profiles, render_topography, Config, ProfileKind, Renderer,
        RunReport, SeriesOrder, Skip, SnapshotSeries, Stage,
    },
};

use flumescan::{CELL_SPACING, GRID_COLS, GRID_ROWS};
use ndarray::Array1;

/// Streamwise (x) cell-centre positions in mm, one per grid column.
#[must_use]
pub fn x_axis() -> Array1<f32> {
    Array1::linspace(0.0, (GRID_COLS - 1) as f32 * CELL_SPACING, GRID_COLS)
}

/// Cross-stream (y) cell-centre positions in mm, one per grid row.
#[must_use]
pub fn y_axis() -> Array1<f32> {
    Array1::linspace(0.0, (GRID_ROWS - 1) as f32 * CELL_SPACING, GRID_ROWS)
}

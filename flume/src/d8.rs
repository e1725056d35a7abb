//! Steepest-descent (D8) flow accumulation over sealed elevation
//! grids.

use crate::drainage::{BoundarySpec, FlowRouter};
use flumescan::{to_cells, Grid, NODATA};
use log::debug;
use ndarray::Array2;
use std::{cmp::Ordering, collections::BinaryHeap};

const SQRT_2: f32 = std::f32::consts::SQRT_2;

/// Raise applied when filling a cell level with its pour point, so
/// filled depressions still drain.
const FILL_EPSILON: f32 = 1e-4;

/// Eight neighbor offsets with centre-to-centre distances in cells.
const NEIGHBORS: [(isize, isize, f32); 8] = [
    (-1, 0, 1.0),
    (1, 0, 1.0),
    (0, -1, 1.0),
    (0, 1, 1.0),
    (-1, -1, SQRT_2),
    (-1, 1, SQRT_2),
    (1, -1, SQRT_2),
    (1, 1, SQRT_2),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeStatus {
    /// Interior cell; routes to its steepest downhill neighbor.
    Core,
    /// Outlet cell on an open wall strip.
    Open,
    /// Perimeter or nodata cell; takes no part in routing.
    Closed,
}

/// D8 flow accumulator with optional depression filling.
///
/// Sealed nodata cells sit far below any real bed elevation, so open
/// wall-strip cells (which are masked, hence nodata) pull flow out of
/// the interior exactly where the boundary is declared open.
pub struct D8FlowAccumulator {
    cell_spacing: f32,
    fill_depressions: bool,
    status: Array2<NodeStatus>,
}

impl D8FlowAccumulator {
    #[must_use]
    pub fn new(cell_spacing: f32, fill_depressions: bool) -> Self {
        Self {
            cell_spacing,
            fill_depressions,
            status: Array2::from_elem((0, 0), NodeStatus::Closed),
        }
    }
}

impl FlowRouter for D8FlowAccumulator {
    fn set_boundaries(&mut self, elevation: &Grid, boundaries: &BoundarySpec) {
        let (rows, cols) = elevation.dim();
        let mut status = Array2::from_elem((rows, cols), NodeStatus::Core);

        // Perimeter closed, as is anything the scanner left unresolved.
        for ((row, col), &eta) in elevation.indexed_iter() {
            let perimeter = row == 0 || row == rows - 1 || col == 0 || col == cols - 1;
            if perimeter || eta == NODATA {
                status[[row, col]] = NodeStatus::Closed;
            }
        }

        // Re-open the wall strips that drain out of the flume.
        let strip = to_cells(boundaries.wall_buffer_mm).min(cols);
        for row in 0..rows {
            for offset in 0..strip {
                if boundaries.left_open {
                    status[[row, offset]] = NodeStatus::Open;
                }
                if boundaries.right_open {
                    status[[row, cols - 1 - offset]] = NodeStatus::Open;
                }
            }
        }

        let open = status.iter().filter(|s| **s == NodeStatus::Open).count();
        let closed = status.iter().filter(|s| **s == NodeStatus::Closed).count();
        debug!("D8 boundaries: {open} open, {closed} closed of {}", rows * cols);
        self.status = status;
    }

    fn drainage_area(&mut self, elevation: &Grid) -> Grid {
        assert_eq!(
            elevation.dim(),
            self.status.dim(),
            "boundaries must be set before routing"
        );
        let (rows, cols) = elevation.dim();

        let eta = if self.fill_depressions {
            fill_depressions(elevation, &self.status)
        } else {
            elevation.clone()
        };

        // Steepest-descent receiver for every core cell. Cells with no
        // downhill neighbor are pits and keep their accumulation.
        let mut receiver: Array2<Option<(usize, usize)>> = Array2::from_elem((rows, cols), None);
        for ((row, col), &status) in self.status.indexed_iter() {
            if status != NodeStatus::Core {
                continue;
            }
            let here = eta[[row, col]];
            let mut best: Option<((usize, usize), f32)> = None;
            for &(dr, dc, dist) in &NEIGHBORS {
                let (nr, nc) = (row as isize + dr, col as isize + dc);
                if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                    continue;
                }
                let (nr, nc) = (nr as usize, nc as usize);
                if self.status[[nr, nc]] == NodeStatus::Closed {
                    continue;
                }
                let slope = (here - eta[[nr, nc]]) / (dist * self.cell_spacing);
                if slope > 0.0 && best.map_or(true, |(_, s)| slope > s) {
                    best = Some(((nr, nc), slope));
                }
            }
            receiver[[row, col]] = best.map(|(cell, _)| cell);
        }

        // Hand each cell's accumulated area downstream, highest first.
        let cell_area = self.cell_spacing * self.cell_spacing;
        let mut area = Array2::zeros((rows, cols));
        let mut order: Vec<(usize, usize)> = Vec::new();
        for ((row, col), &status) in self.status.indexed_iter() {
            if status != NodeStatus::Closed {
                area[[row, col]] = cell_area;
                order.push((row, col));
            }
        }
        order.sort_by(|&a, &b| {
            eta[[b.0, b.1]]
                .partial_cmp(&eta[[a.0, a.1]])
                .unwrap_or(Ordering::Equal)
        });
        for (row, col) in order {
            if let Some((nr, nc)) = receiver[[row, col]] {
                let upstream = area[[row, col]];
                area[[nr, nc]] += upstream;
            }
        }
        area
    }
}

/// Priority-flood depression filling seeded from the open outlets.
///
/// Closed cells never fill; a core region with no path to an outlet
/// is left untouched, it has nowhere to drain regardless.
fn fill_depressions(elevation: &Grid, status: &Array2<NodeStatus>) -> Grid {
    struct Frontier {
        eta: f32,
        cell: (usize, usize),
    }

    impl PartialEq for Frontier {
        fn eq(&self, other: &Self) -> bool {
            self.eta == other.eta
        }
    }

    impl Eq for Frontier {}

    impl PartialOrd for Frontier {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    impl Ord for Frontier {
        fn cmp(&self, other: &Self) -> Ordering {
            // Lowest frontier cell pops first.
            other
                .eta
                .partial_cmp(&self.eta)
                .unwrap_or(Ordering::Equal)
        }
    }

    let (rows, cols) = elevation.dim();
    let mut filled = elevation.clone();
    let mut visited = Array2::from_elem((rows, cols), false);
    let mut heap = BinaryHeap::new();

    for ((row, col), &s) in status.indexed_iter() {
        match s {
            NodeStatus::Open => {
                visited[[row, col]] = true;
                heap.push(Frontier {
                    eta: filled[[row, col]],
                    cell: (row, col),
                });
            }
            NodeStatus::Closed => visited[[row, col]] = true,
            NodeStatus::Core => {}
        }
    }

    while let Some(Frontier {
        eta,
        cell: (row, col),
    }) = heap.pop()
    {
        for &(dr, dc, _) in &NEIGHBORS {
            let (nr, nc) = (row as isize + dr, col as isize + dc);
            if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                continue;
            }
            let (nr, nc) = (nr as usize, nc as usize);
            if visited[[nr, nc]] {
                continue;
            }
            visited[[nr, nc]] = true;
            if filled[[nr, nc]] <= eta {
                filled[[nr, nc]] = eta + FILL_EPSILON;
            }
            heap.push(Frontier {
                eta: filled[[nr, nc]],
                cell: (nr, nc),
            });
        }
    }

    filled
}

#[cfg(test)]
mod tests {
    use super::{D8FlowAccumulator, NodeStatus};
    use crate::drainage::{BoundarySpec, FlowRouter};
    use assert_approx_eq::assert_approx_eq;
    use ndarray::Array2;

    fn right_open() -> BoundarySpec {
        // 0.5 mm at 0.5 mm per cell opens a one-cell strip.
        BoundarySpec {
            left_open: false,
            right_open: true,
            wall_buffer_mm: 0.5,
        }
    }

    fn ramp(rows: usize, cols: usize) -> Array2<f32> {
        Array2::from_shape_fn((rows, cols), |(_, col)| 10.0 - col as f32)
    }

    #[test]
    fn test_boundary_statuses() {
        let eta = ramp(5, 5);
        let mut router = D8FlowAccumulator::new(1.0, false);
        router.set_boundaries(&eta, &right_open());

        assert_eq!(router.status[[0, 0]], NodeStatus::Closed);
        assert_eq!(router.status[[2, 0]], NodeStatus::Closed);
        assert_eq!(router.status[[2, 2]], NodeStatus::Core);
        // The open strip overrides perimeter closure, every row.
        assert_eq!(router.status[[0, 4]], NodeStatus::Open);
        assert_eq!(router.status[[2, 4]], NodeStatus::Open);
    }

    #[test]
    fn test_ramp_accumulates_downslope() {
        let eta = ramp(5, 5);
        let mut router = D8FlowAccumulator::new(1.0, false);
        router.set_boundaries(&eta, &right_open());
        let area = router.drainage_area(&eta);

        // Area grows monotonically toward the open right edge.
        assert_approx_eq!(area[[2, 1]], 1.0);
        assert_approx_eq!(area[[2, 2]], 2.0);
        assert_approx_eq!(area[[2, 3]], 3.0);
        assert_approx_eq!(area[[2, 4]], 4.0);
        // Closed cells take no part.
        assert_approx_eq!(area[[2, 0]], 0.0);
        assert_approx_eq!(area[[0, 0]], 0.0);
    }

    #[test]
    fn test_cell_area_scales_with_spacing() {
        let eta = ramp(5, 5);
        let mut router = D8FlowAccumulator::new(0.5, false);
        router.set_boundaries(&eta, &right_open());
        let area = router.drainage_area(&eta);
        assert_approx_eq!(area[[2, 1]], 0.25);
        assert_approx_eq!(area[[2, 4]], 1.0);
    }

    fn pit_grid() -> Array2<f32> {
        let mut eta = Array2::zeros((3, 5));
        for mut row in eta.rows_mut() {
            row[0] = 9.0;
            row[1] = 3.0;
            row[2] = 1.0;
            row[3] = 2.0;
            row[4] = 1.5;
        }
        eta
    }

    #[test]
    fn test_pit_traps_flow_without_filling() {
        let eta = pit_grid();
        let mut router = D8FlowAccumulator::new(1.0, false);
        router.set_boundaries(&eta, &right_open());
        let area = router.drainage_area(&eta);

        // Both neighbors drain into the pit; the outlet only gets its
        // own cell.
        assert_approx_eq!(area[[1, 2]], 3.0);
        assert_approx_eq!(area[[1, 4]], 1.0);
    }

    #[test]
    fn test_filling_routes_the_pit_to_the_outlet() {
        let eta = pit_grid();
        let mut router = D8FlowAccumulator::new(1.0, true);
        router.set_boundaries(&eta, &right_open());
        let area = router.drainage_area(&eta);

        assert_approx_eq!(area[[1, 4]], 4.0);
    }

    #[test]
    fn test_nodata_cells_are_closed() {
        let mut eta = ramp(5, 5);
        eta[[2, 2]] = flumescan::NODATA;
        let mut router = D8FlowAccumulator::new(1.0, false);
        router.set_boundaries(&eta, &right_open());
        let area = router.drainage_area(&eta);
        assert_approx_eq!(area[[2, 2]], 0.0);
    }
}

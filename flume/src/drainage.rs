//! Bridge between masked grids and the flow-routing collaborator.

use crate::FlumeError;
use flumescan::{Grid, NODATA};
use log::debug;

/// Which wall strips drain out of the flume.
///
/// An open strip covers every row of the `wall_buffer_mm`-wide column
/// band along the named edge; the rest of the perimeter stays closed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundarySpec {
    pub left_open: bool,
    pub right_open: bool,
    pub wall_buffer_mm: f32,
}

impl Default for BoundarySpec {
    fn default() -> Self {
        // The test flume drains over its right wall only.
        Self {
            left_open: false,
            right_open: true,
            wall_buffer_mm: 10.0,
        }
    }
}

/// Flow-routing collaborator.
///
/// Consumes sealed elevation grids (missing cells carry [`NODATA`],
/// not `NAN`) and produces a drainage-area field of identical shape.
/// The routing algorithm itself is the implementor's business.
pub trait FlowRouter {
    /// One-time topology setup from the first sealed grid: perimeter
    /// closure, nodata closure, and open wall strips.
    fn set_boundaries(&mut self, elevation: &Grid, boundaries: &BoundarySpec);

    /// Routes flow over `elevation` using the boundaries fixed by
    /// [`FlowRouter::set_boundaries`].
    fn drainage_area(&mut self, elevation: &Grid) -> Grid;
}

enum Topology {
    Uninitialized,
    Ready,
}

/// Prepares masked grids for a [`FlowRouter`].
///
/// Strict call order: [`DrainageAdapter::initialize_topology`] once,
/// then [`DrainageAdapter::update_elevation`] any number of times.
/// Updating first is an error; the router never sees an elevation
/// grid without boundaries.
pub struct DrainageAdapter<R> {
    router: R,
    topology: Topology,
}

impl<R: FlowRouter> DrainageAdapter<R> {
    pub fn new(router: R) -> Self {
        Self {
            router,
            topology: Topology::Uninitialized,
        }
    }

    /// True once the router topology has been set up.
    pub fn is_ready(&self) -> bool {
        matches!(self.topology, Topology::Ready)
    }

    /// Seals `eta`, performs the one-time topology setup, and routes.
    ///
    /// Takes the grid by value: sealing overwrites missing cells with
    /// the sentinel the router's boundary closure keys off.
    pub fn initialize_topology(&mut self, eta: Grid, boundaries: &BoundarySpec) -> Grid {
        let sealed = seal(eta);
        debug!("drainage topology setup: {boundaries:?}");
        self.router.set_boundaries(&sealed, boundaries);
        self.topology = Topology::Ready;
        self.router.drainage_area(&sealed)
    }

    /// Routes a later snapshot over the established topology.
    ///
    /// Only the elevation values are replaced; boundaries are reused
    /// from [`DrainageAdapter::initialize_topology`].
    pub fn update_elevation(&mut self, eta: Grid) -> Result<Grid, FlumeError> {
        match self.topology {
            Topology::Uninitialized => Err(FlumeError::UninitializedTopology),
            Topology::Ready => {
                let sealed = seal(eta);
                Ok(self.router.drainage_area(&sealed))
            }
        }
    }
}

/// Re-substitutes the scanner sentinel for missing cells.
fn seal(mut eta: Grid) -> Grid {
    eta.mapv_inplace(|v| if v.is_nan() { NODATA } else { v });
    eta
}

#[cfg(test)]
mod tests {
    use super::{BoundarySpec, DrainageAdapter, FlowRouter};
    use crate::FlumeError;
    use flumescan::{Grid, NODATA};
    use ndarray::array;

    /// Echoes the sealed elevation back and counts calls.
    #[derive(Default)]
    struct SpyRouter {
        boundary_calls: usize,
        route_calls: usize,
    }

    impl FlowRouter for SpyRouter {
        fn set_boundaries(&mut self, _elevation: &Grid, _boundaries: &BoundarySpec) {
            self.boundary_calls += 1;
        }

        fn drainage_area(&mut self, elevation: &Grid) -> Grid {
            self.route_calls += 1;
            elevation.clone()
        }
    }

    #[test]
    fn test_update_before_initialize_is_an_error() {
        let mut adapter = DrainageAdapter::new(SpyRouter::default());
        let err = adapter.update_elevation(array![[1.0f32]]).unwrap_err();
        assert!(matches!(err, FlumeError::UninitializedTopology));
        assert!(!adapter.is_ready());
    }

    #[test]
    fn test_topology_is_set_up_once() {
        let mut adapter = DrainageAdapter::new(SpyRouter::default());
        let eta = array![[1.0f32, 2.0], [3.0, 4.0]];

        adapter.initialize_topology(eta.clone(), &BoundarySpec::default());
        assert!(adapter.is_ready());
        adapter.update_elevation(eta.clone()).unwrap();
        adapter.update_elevation(eta).unwrap();

        assert_eq!(adapter.router.boundary_calls, 1);
        assert_eq!(adapter.router.route_calls, 3);
    }

    #[test]
    fn test_sealing_substitutes_the_sentinel() {
        let mut adapter = DrainageAdapter::new(SpyRouter::default());
        let eta = array![[1.0f32, f32::NAN], [f32::NAN, 4.0]];

        let sealed = adapter.initialize_topology(eta, &BoundarySpec::default());
        assert_eq!(sealed[[0, 0]], 1.0);
        assert_eq!(sealed[[0, 1]], NODATA);
        assert_eq!(sealed[[1, 0]], NODATA);
        assert_eq!(sealed[[1, 1]], 4.0);
    }
}

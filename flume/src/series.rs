//! Snapshot-series discovery and the per-run orchestrator.

use crate::{
    drainage::{BoundarySpec, DrainageAdapter, FlowRouter},
    profile::{averaged_profile, cross_section, long_profile},
    FlumeError,
};
use flumescan::{Bounds, Grid, LoadMode, Snapshot};
use log::{error, info};
use ndarray::Array1;
use std::path::{Path, PathBuf};

/// How discovered scan files are ordered into a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeriesOrder {
    /// Sort file names lexically. Scan names in this dataset embed
    /// acquisition timestamps that sort chronologically, which raw
    /// directory order does not guarantee.
    #[default]
    Lexical,

    /// Raw directory-listing order.
    Directory,
}

/// Masking, ordering, and load configuration for one run.
///
/// Built once at startup and passed to everything that needs it;
/// nothing reads ambient process state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Corner calibration-putty buffer in mm.
    pub putty_buffer_mm: f32,

    /// Wall buffer in mm.
    pub wall_buffer_mm: f32,

    /// Snapshot ordering.
    pub order: SeriesOrder,

    /// How raw scan files are read.
    pub load_mode: LoadMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            putty_buffer_mm: 20.0,
            wall_buffer_mm: 10.0,
            order: SeriesOrder::Lexical,
            load_mode: LoadMode::InMem,
        }
    }
}

/// Ordered scan files of one experiment run.
///
/// Index 0 is the initial bed state and the last index the final one;
/// both serve as fixed references for color scaling no matter which
/// snapshots end up plotted.
#[derive(Debug)]
pub struct SnapshotSeries {
    paths: Vec<PathBuf>,
}

impl SnapshotSeries {
    /// Collects `.dat` files under `dir` (extension matched case
    /// insensitively).
    pub fn discover<P: AsRef<Path>>(dir: P, order: SeriesOrder) -> Result<Self, FlumeError> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_dat = path
                .extension()
                .and_then(std::ffi::OsStr::to_str)
                .map_or(false, |ext| ext.eq_ignore_ascii_case("dat"));
            if is_dat {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(FlumeError::Path(dir.to_owned()));
        }
        if order == SeriesOrder::Lexical {
            paths.sort();
        }
        Ok(Self { paths })
    }

    /// Number of snapshots in the series.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// The ordered scan files.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Every snapshot index, in order.
    pub fn all_indices(&self) -> Vec<isize> {
        #[allow(clippy::cast_possible_wrap)]
        (0..self.paths.len() as isize).collect()
    }

    /// Resolves a signed index; negatives count from the end.
    pub fn resolve(&self, index: isize) -> Option<&Path> {
        #[allow(clippy::cast_possible_wrap)]
        let n = self.paths.len() as isize;
        let idx = if index < 0 { index + n } else { index };
        if (0..n).contains(&idx) {
            #[allow(clippy::cast_sign_loss)]
            Some(&self.paths[idx as usize])
        } else {
            None
        }
    }

    /// Reference color scale: the final snapshot's minimum up to the
    /// initial snapshot's maximum.
    pub fn reference_scale(&self, cfg: &Config) -> Result<Bounds, FlumeError> {
        let first = self.load(&self.paths[0], cfg)?;
        let last = self.load(&self.paths[self.paths.len() - 1], cfg)?;
        Ok(Bounds {
            min: last.bounds().min,
            max: first.bounds().max,
        })
    }

    fn load(&self, path: &Path, cfg: &Config) -> Result<Snapshot, FlumeError> {
        Ok(Snapshot::open(
            path,
            cfg.load_mode,
            cfg.putty_buffer_mm,
            cfg.wall_buffer_mm,
        )?)
    }

    fn resolve_or_err(&self, index: isize) -> Result<&Path, FlumeError> {
        self.resolve(index).ok_or(FlumeError::SelectionIndex {
            index,
            len: self.len(),
        })
    }
}

/// Which 1-D product a comparison chart is built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProfileKind {
    /// Fixed-row slice along the flume at `y_mm`.
    Long { y_mm: f32 },

    /// Column-wise mean over valid cells.
    Averaged,

    /// Fixed-column section across the flume at `x_mm`.
    Cross { x_mm: f32 },
}

impl ProfileKind {
    /// Positions along the reduced axis, in mm.
    #[must_use]
    pub fn axis(self) -> Array1<f32> {
        match self {
            Self::Cross { .. } => crate::y_axis(),
            Self::Long { .. } | Self::Averaged => crate::x_axis(),
        }
    }

    fn reduce(self, grid: &Grid) -> Result<Array1<f32>, FlumeError> {
        match self {
            Self::Long { y_mm } => long_profile(grid, y_mm),
            Self::Averaged => Ok(averaged_profile(grid)),
            Self::Cross { x_mm } => cross_section(grid, x_mm),
        }
    }
}

/// Rendering collaborator. Implementations encode numeric products
/// into image files; tests record them instead.
pub trait Renderer {
    /// One topography heatmap for `snapshot`, colored over `scale`.
    fn topography(&mut self, snapshot: &Snapshot, scale: Bounds) -> Result<(), FlumeError>;

    /// One comparison chart of labelled curves over `axis`.
    fn profiles(
        &mut self,
        kind: ProfileKind,
        axis: &Array1<f32>,
        series: &[(String, Array1<f32>)],
    ) -> Result<(), FlumeError>;

    /// One drainage-area heatmap for the snapshot labelled `label`.
    fn drainage(&mut self, label: &str, area: &Grid) -> Result<(), FlumeError>;
}

/// Pipeline stage a snapshot failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Reduce,
    Drainage,
    Render,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Reduce => "reduce",
            Self::Drainage => "drainage",
            Self::Render => "render",
        };
        f.write_str(name)
    }
}

/// One snapshot the orchestrator had to skip.
#[derive(Debug)]
pub struct Skip {
    pub label: String,
    pub stage: Stage,
    pub error: FlumeError,
}

/// Outcome of one orchestrator pass. Failed snapshots never abort the
/// remaining work, but every one of them is recorded here.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Image artifacts produced.
    pub rendered: usize,

    /// Snapshots skipped, with the stage that failed.
    pub skipped: Vec<Skip>,
}

impl RunReport {
    fn skip(&mut self, label: &str, stage: Stage, error: FlumeError) {
        error!("{label}: {stage} failed: {error}");
        self.skipped.push(Skip {
            label: label.to_owned(),
            stage,
            error,
        });
    }
}

fn label_of(path: &Path) -> String {
    path.file_stem()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or_default()
        .to_owned()
}

/// Renders a topography heatmap for every snapshot in the series.
pub fn render_topography<R: Renderer>(
    series: &SnapshotSeries,
    cfg: &Config,
    renderer: &mut R,
) -> Result<RunReport, FlumeError> {
    let scale = series.reference_scale(cfg)?;
    let mut report = RunReport::default();
    for path in series.paths() {
        let label = label_of(path);
        info!("topography {label}");
        let snapshot = match series.load(path, cfg) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                report.skip(&label, Stage::Load, e);
                continue;
            }
        };
        match renderer.topography(&snapshot, scale) {
            Ok(()) => report.rendered += 1,
            Err(e) => report.skip(&label, Stage::Render, e),
        }
    }
    Ok(report)
}

/// Renders one comparison chart over the selected snapshots.
///
/// Selections may repeat indices; each is plotted as its own curve.
pub fn render_profiles<R: Renderer>(
    series: &SnapshotSeries,
    cfg: &Config,
    selection: &[isize],
    kind: ProfileKind,
    renderer: &mut R,
) -> Result<RunReport, FlumeError> {
    let mut report = RunReport::default();
    let mut curves = Vec::with_capacity(selection.len());
    for &index in selection {
        let path = series.resolve_or_err(index)?;
        let label = label_of(path);
        info!("profile {label}");
        let snapshot = match series.load(path, cfg) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                report.skip(&label, Stage::Load, e);
                continue;
            }
        };
        match kind.reduce(snapshot.grid()) {
            Ok(curve) => curves.push((label, curve)),
            Err(e) => report.skip(&label, Stage::Reduce, e),
        }
    }
    if !curves.is_empty() {
        renderer.profiles(kind, &kind.axis(), &curves)?;
        report.rendered += 1;
    }
    Ok(report)
}

/// Routes and renders drainage for the selected snapshots, reusing
/// one topology across the whole selection.
pub fn render_drainage<R, F>(
    series: &SnapshotSeries,
    cfg: &Config,
    selection: &[isize],
    boundaries: &BoundarySpec,
    router: F,
    renderer: &mut R,
) -> Result<RunReport, FlumeError>
where
    R: Renderer,
    F: FlowRouter,
{
    let mut adapter = DrainageAdapter::new(router);
    let mut report = RunReport::default();
    for &index in selection {
        let path = series.resolve_or_err(index)?;
        let label = label_of(path);
        info!("drainage {label}");
        let snapshot = match series.load(path, cfg) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                report.skip(&label, Stage::Load, e);
                continue;
            }
        };
        let area = if adapter.is_ready() {
            match adapter.update_elevation(snapshot.into_grid()) {
                Ok(area) => area,
                Err(e) => {
                    report.skip(&label, Stage::Drainage, e);
                    continue;
                }
            }
        } else {
            adapter.initialize_topology(snapshot.into_grid(), boundaries)
        };
        match renderer.drainage(&label, &area) {
            Ok(()) => report.rendered += 1,
            Err(e) => report.skip(&label, Stage::Render, e),
        }
    }
    Ok(report)
}

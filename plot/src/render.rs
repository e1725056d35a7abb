//! Plotters-backed implementation of the rendering collaborator.

use crate::options::Colormap;
use flume::{FlumeError, ProfileKind, Renderer};
use flumescan::{Bounds, Grid, Snapshot, CELL_SPACING};
use log::info;
use ndarray::Array1;
use plotters::prelude::*;
use plotters::style::colors::colormaps::{BlackWhite, ColorMap, ViridisRGB};
use std::path::{Path, PathBuf};

/// Rendered image size in pixels.
const WIDTH: u32 = 900;
const HEIGHT: u32 = 750;

pub struct PlottersRenderer {
    out_dir: PathBuf,
    colormap: Colormap,
}

impl PlottersRenderer {
    /// Creates `out_dir` if needed and renders everything into it.
    pub fn new(out_dir: PathBuf, colormap: Colormap) -> std::io::Result<Self> {
        std::fs::create_dir_all(&out_dir)?;
        Ok(Self { out_dir, colormap })
    }

    /// Draws `grid` as a per-cell heatmap with mm axes.
    fn heatmap<F>(&self, out: &Path, grid: &Grid, color: F) -> Result<(), FlumeError>
    where
        F: Fn(f32) -> RGBColor,
    {
        let (rows, cols) = grid.dim();
        let x_max = cols as f32 * CELL_SPACING;
        let y_max = rows as f32 * CELL_SPACING;

        let root = BitMapBackend::new(out, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            // y runs downward, like the scanner's row order.
            .build_cartesian_2d(0f32..x_max, y_max..0f32)
            .map_err(draw_err)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("x [mm]")
            .y_desc("y [mm]")
            .draw()
            .map_err(draw_err)?;

        chart
            .draw_series(grid.indexed_iter().map(|((row, col), &value)| {
                let x0 = col as f32 * CELL_SPACING;
                let y0 = row as f32 * CELL_SPACING;
                Rectangle::new(
                    [(x0, y0), (x0 + CELL_SPACING, y0 + CELL_SPACING)],
                    color(value).filled(),
                )
            }))
            .map_err(draw_err)?;

        root.present().map_err(draw_err)?;
        info!("wrote {out:?}");
        Ok(())
    }
}

impl Renderer for PlottersRenderer {
    fn topography(&mut self, snapshot: &Snapshot, scale: Bounds) -> Result<(), FlumeError> {
        let out = self
            .out_dir
            .join(format!("topography_{}.png", snapshot.label()));
        let colormap = self.colormap;
        self.heatmap(&out, snapshot.grid(), move |value| {
            if value.is_nan() {
                BLACK
            } else {
                scale_color(colormap, value, scale)
            }
        })
    }

    fn profiles(
        &mut self,
        kind: ProfileKind,
        axis: &Array1<f32>,
        series: &[(String, Array1<f32>)],
    ) -> Result<(), FlumeError> {
        let (file, x_desc) = match kind {
            ProfileKind::Long { .. } => ("profile_evolution.png", "x [mm]"),
            ProfileKind::Averaged => ("averaged_profile_evolution.png", "x [mm]"),
            ProfileKind::Cross { .. } => ("cross-section_evolution.png", "y [mm]"),
        };
        let out = self.out_dir.join(file);

        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for (_, curve) in series {
            for &value in curve {
                if !value.is_nan() {
                    lo = lo.min(value);
                    hi = hi.max(value);
                }
            }
        }
        if lo > hi {
            return Err(FlumeError::Render("no valid samples to plot".into()));
        }
        let pad = ((hi - lo) * 0.05).max(0.1);

        let root = BitMapBackend::new(&out, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;
        let x_hi = axis[axis.len() - 1];
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(0f32..x_hi, (lo - pad)..(hi + pad))
            .map_err(draw_err)?;
        chart
            .configure_mesh()
            .x_desc(x_desc)
            .y_desc("eta [mm]")
            .draw()
            .map_err(draw_err)?;

        for (i, (label, curve)) in series.iter().enumerate() {
            let style = Palette99::pick(i).stroke_width(2);
            chart
                .draw_series(LineSeries::new(
                    axis.iter()
                        .zip(curve.iter())
                        .filter(|(_, value)| !value.is_nan())
                        .map(|(&x, &value)| (x, value)),
                    style,
                ))
                .map_err(draw_err)?
                .label(label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], style));
        }
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(draw_err)?;

        root.present().map_err(draw_err)?;
        info!("wrote {out:?}");
        Ok(())
    }

    fn drainage(&mut self, label: &str, area: &Grid) -> Result<(), FlumeError> {
        let out = self.out_dir.join(format!("drainage_area_{label}.png"));
        let cell_area = CELL_SPACING * CELL_SPACING;
        // Log color range from one cell up to a 500 mm square.
        let scale = Bounds {
            min: cell_area.ln(),
            max: (500.0f32 * 500.0).ln(),
        };
        let colormap = self.colormap;
        self.heatmap(&out, area, move |value| {
            let ln_area = (value + cell_area).ln().clamp(scale.min, scale.max);
            scale_color(colormap, ln_area, scale)
        })
    }
}

fn scale_color(colormap: Colormap, value: f32, scale: Bounds) -> RGBColor {
    if scale.max <= scale.min {
        // Degenerate scale (uniform bed); any mid-range color will do.
        return match colormap {
            Colormap::Viridis => ViridisRGB.get_color(0.5),
            Colormap::Grayscale => BlackWhite.get_color(0.5),
        };
    }
    let clamped = value.clamp(scale.min, scale.max);
    match colormap {
        Colormap::Viridis => ViridisRGB.get_color_normalized(clamped, scale.min, scale.max),
        Colormap::Grayscale => BlackWhite.get_color_normalized(clamped, scale.min, scale.max),
    }
}

fn draw_err<E: std::fmt::Display>(e: E) -> FlumeError {
    FlumeError::Render(e.to_string())
}

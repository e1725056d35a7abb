mod options;
mod render;

use anyhow::Error as AnyError;
use clap::Parser;
use flume::{
    averaged_profile, cross_section, long_profile, render_drainage, render_profiles,
    render_topography, BoundarySpec, Config, D8FlowAccumulator, ProfileKind, RunReport,
    SeriesOrder, SnapshotSeries,
};
use flumescan::{LoadMode, Snapshot, CELL_SPACING};
use log::warn;
use ndarray::Array1;
use options::{Cli, Command as CliCmd, Order};
use render::PlottersRenderer;
use serde::Serialize;

fn main() -> Result<(), AnyError> {
    env_logger::init();

    let cli = Cli::parse();
    let cfg = Config {
        putty_buffer_mm: cli.putty_buffer,
        wall_buffer_mm: cli.wall_buffer,
        order: match cli.order {
            Order::Lexical => SeriesOrder::Lexical,
            Order::Directory => SeriesOrder::Directory,
        },
        load_mode: if cli.memmap {
            LoadMode::MemMap
        } else {
            LoadMode::InMem
        },
    };
    let boundaries = BoundarySpec {
        left_open: false,
        right_open: true,
        wall_buffer_mm: cli.wall_buffer,
    };

    let series = SnapshotSeries::discover(&cli.data_dir, cfg.order)?;
    let out_dir = cli
        .out_dir
        .clone()
        .unwrap_or_else(|| cli.data_dir.join("plot_files"));

    match cli.cmd {
        CliCmd::All => {
            let mut renderer = PlottersRenderer::new(out_dir, cli.colormap)?;
            report(render_topography(&series, &cfg, &mut renderer)?);
            let selection = [0, -1];
            report(render_profiles(
                &series,
                &cfg,
                &selection,
                ProfileKind::Long { y_mm: 250.0 },
                &mut renderer,
            )?);
            report(render_profiles(
                &series,
                &cfg,
                &selection,
                ProfileKind::Averaged,
                &mut renderer,
            )?);
            report(render_profiles(
                &series,
                &cfg,
                &selection,
                ProfileKind::Cross { x_mm: 250.0 },
                &mut renderer,
            )?);
            report(render_drainage(
                &series,
                &cfg,
                &series.all_indices(),
                &boundaries,
                D8FlowAccumulator::new(CELL_SPACING, false),
                &mut renderer,
            )?);
            // Depression filling crawls on a near-flat bed, so it only
            // runs for the final scan.
            report(render_drainage(
                &series,
                &cfg,
                &[-1],
                &boundaries,
                D8FlowAccumulator::new(CELL_SPACING, true),
                &mut renderer,
            )?);
        }
        CliCmd::Topography => {
            let mut renderer = PlottersRenderer::new(out_dir, cli.colormap)?;
            report(render_topography(&series, &cfg, &mut renderer)?);
        }
        CliCmd::Profile { y, ref selection } => {
            let mut renderer = PlottersRenderer::new(out_dir, cli.colormap)?;
            report(render_profiles(
                &series,
                &cfg,
                &selection.indices(),
                ProfileKind::Long { y_mm: y },
                &mut renderer,
            )?);
        }
        CliCmd::Averaged { ref selection } => {
            let mut renderer = PlottersRenderer::new(out_dir, cli.colormap)?;
            report(render_profiles(
                &series,
                &cfg,
                &selection.indices(),
                ProfileKind::Averaged,
                &mut renderer,
            )?);
        }
        CliCmd::CrossSection { x, ref selection } => {
            let mut renderer = PlottersRenderer::new(out_dir, cli.colormap)?;
            report(render_profiles(
                &series,
                &cfg,
                &selection.indices(),
                ProfileKind::Cross { x_mm: x },
                &mut renderer,
            )?);
        }
        CliCmd::Drainage {
            depressions,
            last_only,
        } => {
            let mut renderer = PlottersRenderer::new(out_dir, cli.colormap)?;
            let indices = if last_only {
                vec![-1]
            } else {
                series.all_indices()
            };
            report(render_drainage(
                &series,
                &cfg,
                &indices,
                &boundaries,
                D8FlowAccumulator::new(CELL_SPACING, depressions),
                &mut renderer,
            )?);
        }
        CliCmd::Json {
            y,
            x,
            ref selection,
        } => json(&series, &cfg, y, x, &selection.indices())?,
    }
    Ok(())
}

fn report(report: RunReport) {
    for skip in &report.skipped {
        warn!("skipped {} at {}: {}", skip.label, skip.stage, skip.error);
    }
}

fn json(
    series: &SnapshotSeries,
    cfg: &Config,
    y_mm: f32,
    x_mm: f32,
    selection: &[isize],
) -> Result<(), AnyError> {
    #[derive(Serialize)]
    struct ScanProfiles {
        scan: String,
        profile: Vec<Option<f32>>,
        averaged: Vec<Option<f32>>,
        cross_section: Vec<Option<f32>>,
    }

    // JSON has no NaN; missing cells become null.
    fn nullable(curve: &Array1<f32>) -> Vec<Option<f32>> {
        curve
            .iter()
            .map(|&v| if v.is_nan() { None } else { Some(v) })
            .collect()
    }

    let mut entries = Vec::with_capacity(selection.len());
    for &index in selection {
        let path = series
            .resolve(index)
            .ok_or_else(|| anyhow::anyhow!("no scan at index {index}"))?;
        let snapshot = Snapshot::open(path, cfg.load_mode, cfg.putty_buffer_mm, cfg.wall_buffer_mm)?;
        entries.push(ScanProfiles {
            scan: snapshot.label().to_owned(),
            profile: nullable(&long_profile(snapshot.grid(), y_mm)?),
            averaged: nullable(&averaged_profile(snapshot.grid())),
            cross_section: nullable(&cross_section(snapshot.grid(), x_mm)?),
        });
    }

    let json = serde_json::to_string(&entries)?;
    println!("{json}");
    Ok(())
}

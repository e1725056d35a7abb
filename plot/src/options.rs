use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Renders a flume scan series as topography, profile, and drainage
/// images.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory containing processed .dat scans.
    #[arg(short, long)]
    pub data_dir: PathBuf,

    /// Output directory for rendered images [default: <data-dir>/plot_files].
    #[arg(short, long)]
    pub out_dir: Option<PathBuf>,

    /// Corner calibration-putty buffer in mm.
    #[arg(long, default_value_t = 20.0)]
    pub putty_buffer: f32,

    /// Wall buffer in mm.
    #[arg(long, default_value_t = 10.0)]
    pub wall_buffer: f32,

    /// Topography colormap.
    #[arg(long, value_enum, default_value_t = Colormap::Viridis)]
    pub colormap: Colormap,

    /// Scan ordering within the series.
    #[arg(long, value_enum, default_value_t = Order::Lexical)]
    pub order: Order,

    /// Memory-map scan files instead of reading them into memory.
    #[arg(long)]
    pub memmap: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Colormap {
    Viridis,
    Grayscale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Order {
    /// Sort scan file names; names embed acquisition timestamps.
    Lexical,
    /// Raw directory-listing order.
    Directory,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Every plot kind: topography and drainage for the full series,
    /// comparison charts for the first and last scans.
    All,

    /// Per-scan topography heatmaps.
    Topography,

    /// Longitudinal profile comparison.
    Profile {
        /// Cross-stream position of the profile in mm.
        #[arg(long, default_value_t = 250.0)]
        y: f32,

        #[command(flatten)]
        selection: Selection,
    },

    /// Column-averaged profile comparison.
    Averaged {
        #[command(flatten)]
        selection: Selection,
    },

    /// Cross-section comparison.
    CrossSection {
        /// Streamwise position of the section in mm.
        #[arg(long, default_value_t = 250.0)]
        x: f32,

        #[command(flatten)]
        selection: Selection,
    },

    /// Per-scan drainage-area heatmaps.
    Drainage {
        /// Route ponded regions through the depression filler first.
        /// Slow on near-flat beds.
        #[arg(long)]
        depressions: bool,

        /// Only route the final scan.
        #[arg(long)]
        last_only: bool,
    },

    /// Dump profile curves for the selected scans as JSON.
    Json {
        /// Cross-stream position of the longitudinal profile in mm.
        #[arg(long, default_value_t = 250.0)]
        y: f32,

        /// Streamwise position of the cross-section in mm.
        #[arg(long, default_value_t = 250.0)]
        x: f32,

        #[command(flatten)]
        selection: Selection,
    },
}

/// Scan indices to compare; negatives count from the end of the
/// series.
#[derive(Debug, Clone, Args)]
pub struct Selection {
    /// Scan index; repeat for several [default: 0 -1].
    #[arg(long = "index", allow_hyphen_values = true)]
    pub index: Vec<isize>,
}

impl Selection {
    pub fn indices(&self) -> Vec<isize> {
        if self.index.is_empty() {
            vec![0, -1]
        } else {
            self.index.clone()
        }
    }
}

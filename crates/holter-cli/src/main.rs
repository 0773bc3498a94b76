use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use holter_lib::{
    compare::{compare_metrics, promising_metrics, to_long, TestKind},
    config::PipelineConfig,
    features::FeatureTable,
    io::table::{read_feature_csv, write_comparisons_csv, write_feature_csv, write_windows_csv},
    metrics::window::{Downsample, WindowLength},
    pca::{pca, prepare_matrix},
    pipeline::{build_windows, ingest, run},
    plot::{
        figure_from_pca, figure_from_windows, Color as FigureColor, Figure, PlotBackend, Series,
    },
};
use log::info;
use plotters::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::json;
use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "holter",
    version,
    about = "Windowed HRV features and group comparison for Holter beat-interval recordings"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum WindowArg {
    #[value(name = "1min")]
    OneMinute,
    #[value(name = "5min")]
    FiveMinutes,
}

impl From<WindowArg> for WindowLength {
    fn from(arg: WindowArg) -> Self {
        match arg {
            WindowArg::OneMinute => WindowLength::OneMinute,
            WindowArg::FiveMinutes => WindowLength::FiveMinutes,
        }
    }
}

/// Options shared by every subcommand that reads recordings.
#[derive(Args)]
struct InputArgs {
    /// Directory holding one beat-interval file per subject
    #[arg(long)]
    input_dir: Option<PathBuf>,
    /// Only files whose name ends with this are read
    #[arg(long)]
    suffix: Option<String>,
    #[arg(long)]
    window_seconds: Option<WindowArg>,
    /// Keep windows with `index % modulus == phase`
    #[arg(long)]
    downsample_phase: Option<usize>,
    #[arg(long)]
    downsample_modulus: Option<usize>,
    /// Keep every window
    #[arg(long, conflicts_with_all = ["downsample_phase", "downsample_modulus"])]
    no_downsample: bool,
    /// TOML pipeline config; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

impl InputArgs {
    fn resolve(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(dir) = &self.input_dir {
            config.input_dir = dir.clone();
        }
        if let Some(suffix) = &self.suffix {
            config.suffix = suffix.clone();
        }
        if let Some(window) = self.window_seconds {
            config.window_seconds = WindowLength::from(window).seconds();
        }
        if self.no_downsample {
            config.downsample = None;
        } else if self.downsample_phase.is_some() || self.downsample_modulus.is_some() {
            let base = config.downsample.unwrap_or_default();
            config.downsample = Some(Downsample {
                modulus: self.downsample_modulus.unwrap_or(base.modulus),
                phase: self.downsample_phase.unwrap_or(base.phase),
            });
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest, window, downsample and extract the per-subject feature table
    Extract {
        #[command(flatten)]
        input: InputArgs,
        /// Wide feature table (CSV)
        #[arg(long)]
        out: PathBuf,
        /// Windows the features were computed from (CSV)
        #[arg(long)]
        windows_out: Option<PathBuf>,
        #[cfg(feature = "polars")]
        #[arg(long)]
        parquet_out: Option<PathBuf>,
    },
    /// Window recordings without extracting features
    Windows {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Render per-window heart rate to a PNG
        #[arg(long)]
        plot: Option<PathBuf>,
    },
    /// Run the two- and three-group tests on every feature column
    Compare {
        #[arg(long)]
        features: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = 0.05)]
        alpha: f64,
        /// Test used to pick promising metrics
        #[arg(long, default_value = "three-group-nonparametric")]
        selection: TestKind,
    },
    /// PCA over the promising (or all) feature columns
    Pca {
        #[arg(long)]
        features: PathBuf,
        #[arg(long, default_value_t = 0.05)]
        alpha: f64,
        #[arg(long, default_value = "three-group-nonparametric")]
        selection: TestKind,
        /// Use every feature column instead of the promising ones
        #[arg(long)]
        all_metrics: bool,
        /// Render the PC1/PC2 score plot to a PNG
        #[arg(long)]
        plot: Option<PathBuf>,
    },
    /// Write synthetic Normal/AF/CHF recordings in the input format
    Synth {
        #[arg(long)]
        out_dir: PathBuf,
        #[arg(long, default_value_t = 10)]
        minutes: usize,
        /// Subjects per condition
        #[arg(long, default_value_t = 1)]
        subjects: usize,
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Extract {
            input,
            out,
            windows_out,
            #[cfg(feature = "polars")]
            parquet_out,
        } => {
            let features = cmd_extract(&input, &out, windows_out.as_deref())?;
            #[cfg(feature = "polars")]
            if let Some(path) = parquet_out {
                holter_lib::io::csv::polars_io::write_feature_parquet(&path, &features)?;
            }
            #[cfg(not(feature = "polars"))]
            drop(features);
        }
        Commands::Windows { input, out, plot } => {
            cmd_windows(&input, out.as_deref(), plot.as_deref())?
        }
        Commands::Compare {
            features,
            out,
            alpha,
            selection,
        } => cmd_compare(&features, out.as_deref(), alpha, selection)?,
        Commands::Pca {
            features,
            alpha,
            selection,
            all_metrics,
            plot,
        } => cmd_pca(&features, alpha, selection, all_metrics, plot.as_deref())?,
        Commands::Synth {
            out_dir,
            minutes,
            subjects,
            seed,
        } => cmd_synth(&out_dir, minutes, subjects, seed)?,
    }
    Ok(())
}

fn cmd_extract(input: &InputArgs, out: &Path, windows_out: Option<&Path>) -> Result<FeatureTable> {
    let config = input.resolve()?;
    let output = run(&config)?;
    write_feature_csv(out, &output.features)?;
    if let Some(path) = windows_out {
        write_windows_csv(path, &output.windows)?;
    }
    info!("wrote {} feature rows to {}", output.features.len(), out.display());
    println!("{}", serde_json::to_string(&output.summary)?);
    Ok(output.features)
}

fn cmd_windows(input: &InputArgs, out: Option<&Path>, plot: Option<&Path>) -> Result<()> {
    let config = input.resolve()?;
    let report = ingest(&config)?;
    let (all, kept) = build_windows(&report, &config)?;
    if let Some(path) = plot {
        PngBackend::new(path).draw(&figure_from_windows(&kept, 2048))?;
    }
    match out {
        Some(path) => {
            write_windows_csv(path, &kept)?;
            println!(
                "{}",
                json!({
                    "subjects": report.recordings.len(),
                    "windows": all.len(),
                    "windows_kept": kept.len(),
                    "skipped_files": report.skipped,
                })
            );
        }
        None => println!("{}", serde_json::to_string(&kept)?),
    }
    Ok(())
}

fn cmd_compare(features: &Path, out: Option<&Path>, alpha: f64, selection: TestKind) -> Result<()> {
    let table = read_feature_csv(features)?;
    let results = compare_metrics(&to_long(&table));
    if let Some(path) = out {
        write_comparisons_csv(path, &results)?;
    }
    let promising = promising_metrics(&results, alpha, selection);
    println!(
        "{}",
        json!({
            "metrics": table.columns.len(),
            "tests": results.len(),
            "unavailable": results.iter().filter(|r| r.error.is_some()).count(),
            "alpha": alpha,
            "selection": selection,
            "promising": promising,
        })
    );
    Ok(())
}

fn cmd_pca(
    features: &Path,
    alpha: f64,
    selection: TestKind,
    all_metrics: bool,
    plot: Option<&Path>,
) -> Result<()> {
    let table = read_feature_csv(features)?;
    let columns = if all_metrics {
        table.columns.clone()
    } else {
        let results = compare_metrics(&to_long(&table));
        promising_metrics(&results, alpha, selection)
    };
    if columns.is_empty() {
        bail!("no {selection} p-value below {alpha}; rerun with --all-metrics");
    }
    let input = prepare_matrix(&table, &columns)?;
    let result = pca(&input)?;
    if let Some(path) = plot {
        PngBackend::new(path).draw(&figure_from_pca(&result, &input.conditions))?;
    }
    println!(
        "{}",
        json!({
            "ids": input.ids,
            "columns": result.columns,
            "dropped_rows": input.dropped_rows,
            "dropped_columns": input.dropped_columns,
            "explained_variance": result.explained_variance,
            "explained_variance_ratio": result.explained_variance_ratio,
        })
    );
    Ok(())
}

/// Interval generator per condition prefix; all in seconds.
fn synth_interval(prefix: char, beat: usize, rng: &mut StdRng) -> f64 {
    match prefix {
        // sinus rhythm around 70 bpm with respiratory modulation
        'n' => 0.857 + 0.04 * (beat as f64 * 0.25).sin() + rng.gen_range(-0.02..0.02),
        // irregularly irregular
        'a' => rng.gen_range(0.4..1.2),
        // fast and stiff
        _ => 0.75 + rng.gen_range(-0.005..0.005),
    }
}

fn cmd_synth(out_dir: &Path, minutes: usize, subjects: usize, seed: u64) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let mut rng = StdRng::seed_from_u64(seed);
    let span = minutes as f64 * 60.0;
    let mut files = Vec::new();
    for prefix in ['n', 'a', 'c'] {
        for subject in 1..=subjects {
            let mut text = String::new();
            let mut elapsed = 0.0;
            let mut beat = 0;
            while elapsed < span {
                let interval = synth_interval(prefix, beat, &mut rng);
                elapsed += interval;
                writeln!(text, "{interval:.3} 0 {elapsed:.3}")?;
                beat += 1;
            }
            let path = out_dir.join(format!("{prefix}{subject}nn.txt"));
            fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
            files.push(path);
        }
    }
    println!("{}", json!({ "files": files }));
    Ok(())
}

fn rgb(color: FigureColor) -> RGBColor {
    RGBColor(
        ((color.0 >> 16) & 0xFF) as u8,
        ((color.0 >> 8) & 0xFF) as u8,
        (color.0 & 0xFF) as u8,
    )
}

/// Renders figures to a PNG file via plotters.
struct PngBackend<'a> {
    path: &'a Path,
    size: (u32, u32),
}

impl<'a> PngBackend<'a> {
    fn new(path: &'a Path) -> Self {
        Self {
            path,
            size: (800, 480),
        }
    }
}

fn padded(lo: f64, hi: f64) -> std::ops::Range<f64> {
    if hi > lo {
        let pad = (hi - lo) * 0.05;
        (lo - pad)..(hi + pad)
    } else {
        (lo - 1.0)..(hi + 1.0)
    }
}

impl PlotBackend for PngBackend<'_> {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        let (x_min, x_max, y_min, y_max) = fig
            .bounds()
            .ok_or_else(|| anyhow!("nothing to plot"))?;
        let root = BitMapBackend::new(self.path, self.size).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(
                fig.title.clone().unwrap_or_else(|| "Plot".into()),
                ("sans-serif", 24),
            )
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d(padded(x_min, x_max), padded(y_min, y_max))?;
        let mut mesh = chart.configure_mesh();
        if let Some(label) = &fig.x.label {
            mesh.x_desc(label.as_str());
        }
        if let Some(label) = &fig.y.label {
            mesh.y_desc(label.as_str());
        }
        mesh.draw()?;
        for series in &fig.series {
            match series {
                Series::Line(line) => {
                    let color = rgb(line.style.color);
                    chart
                        .draw_series(LineSeries::new(
                            line.points.iter().map(|p| (p[0], p[1])),
                            color.stroke_width(line.style.width.round() as u32),
                        ))?
                        .label(line.name.as_str())
                        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 16, y)], color));
                }
                Series::Scatter(scatter) => {
                    let color = rgb(scatter.color);
                    let size = scatter.size;
                    chart
                        .draw_series(
                            scatter
                                .points
                                .iter()
                                .map(|p| Circle::new((p[0], p[1]), size, color.filled())),
                        )?
                        .label(scatter.name.as_str())
                        .legend(move |(x, y)| Circle::new((x + 8, y), size, color.filled()));
                }
            }
        }
        if fig.series.len() > 1 {
            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()?;
        }
        root.present()?;
        Ok(())
    }
}

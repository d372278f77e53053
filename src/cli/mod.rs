//! Command-line interface for the augmentation pipeline.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::core::bag::BagReader;
use crate::core::cloud::read_augmented_points;
use crate::core::messages::Message;
use crate::core::writers::{write_csv_rows, write_ply};
use crate::processors::Pipeline;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "cloud-augment")]
#[command(about = "Semantic label augmentation for multi-rig point cloud recordings", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Label every rig's point clouds and write the merged clouds to a new bag
    Augment {
        /// Input bag (defaults to paths.input from the config)
        input: Option<PathBuf>,
        /// Output bag (defaults to paths.output from the config)
        output: Option<PathBuf>,
        /// Frames read per rig per window
        #[arg(short, long)]
        window_size: Option<usize>,
        /// Write per-frame statistics to this CSV file
        #[arg(long)]
        stats: Option<PathBuf>,
    },

    /// Show topics, message counts and duration of a bag
    Info {
        /// Bag file to inspect
        bag: PathBuf,
    },

    /// Dump augmented clouds as ASCII PLY files
    ExportPly {
        /// Bag written by `augment`
        bag: PathBuf,
        /// Output directory for PLY files
        output_dir: PathBuf,
        /// Topic to export (defaults to the configured output topic)
        #[arg(short, long)]
        topic: Option<String>,
        /// Maximum number of frames to export
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Destination YAML file
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            let head: String = value.chars().take(36).collect();
            format!("{}...", head)
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}, using defaults",
                    path.display(),
                    e
                );
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    let result = match cli.command {
        Commands::Augment {
            input,
            output,
            window_size,
            stats,
        } => cmd_augment(config, input, output, window_size, stats),
        Commands::Info { bag } => cmd_info(&bag),
        Commands::ExportPly {
            bag,
            output_dir,
            topic,
            limit,
        } => cmd_export_ply(&bag, &output_dir, topic, limit, &config),
        Commands::InitConfig { path } => cmd_init_config(&path),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn cmd_augment(
    mut config: PipelineConfig,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    window_size: Option<usize>,
    stats: Option<PathBuf>,
) -> Result<()> {
    let start = Instant::now();

    let input = input
        .or_else(|| config.paths.input.clone())
        .ok_or_else(|| anyhow!("no input bag given on the command line or in the config"))?;
    let output = output
        .or_else(|| config.paths.output.clone())
        .ok_or_else(|| anyhow!("no output bag given on the command line or in the config"))?;
    if input == output {
        bail!("input and output are the same file: {}", input.display());
    }
    if let Some(size) = window_size {
        config.window_size = size;
    }

    println!("Augmenting point clouds...");
    println!("Input: {}", input.display());
    println!("Output: {}", output.display());
    println!("Rigs: {}", config.rigs.len());
    println!("Window size: {}", config.window_size);

    let pipeline = Pipeline::new(config).context("invalid pipeline configuration")?;

    let spinner = create_spinner("Processing first window...");
    let mut frames_seen = 0usize;
    let outcome = pipeline.run(&input, &output, |window| {
        frames_seen += window.frames.len();
        spinner.set_message(format!(
            "Window at frame {} done, {} frames merged",
            window.index, frames_seen
        ));
    });
    spinner.finish_and_clear();

    let summary = outcome.with_context(|| format!("augmenting {}", input.display()))?;

    if let Some(stats_path) = &stats {
        write_csv_rows(stats_path, &summary.reports)
            .with_context(|| format!("writing statistics to {}", stats_path.display()))?;
        info!("Wrote {} report rows to {}", summary.reports.len(), stats_path.display());
    }

    let labeled_share = if summary.points_written > 0 {
        100.0 * summary.labeled_points as f64 / summary.points_written as f64
    } else {
        0.0
    };

    print_summary(
        "Augmentation Complete",
        &[
            ("Input bag", summary.input.display().to_string()),
            ("Output bag", summary.output.path.display().to_string()),
            ("Windows", summary.windows.to_string()),
            ("Frames written", summary.frames_written.to_string()),
            ("Points written", summary.points_written.to_string()),
            ("Labeled points", format!("{} ({:.1}%)", summary.labeled_points, labeled_share)),
            ("Transforms copied", summary.tf_messages.to_string()),
            ("Output size", format!("{:.2} MB", summary.output.file_size_mb())),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_info(bag: &Path) -> Result<()> {
    let spinner = create_spinner("Scanning bag...");
    let info = BagReader::open(bag)
        .and_then(|mut reader| reader.info())
        .with_context(|| format!("reading {}", bag.display()));
    spinner.finish_and_clear();
    let info = info?;

    let mut items = vec![
        ("Bag", info.path.display().to_string()),
        ("Records", info.record_count.to_string()),
        ("Duration", format!("{:.3} s", info.duration_secs())),
        ("Size", format!("{:.2} MB", info.file_size_mb())),
    ];
    for (topic, count) in &info.topics {
        items.push((topic.as_str(), count.to_string()));
    }

    print_summary("Bag Info", &items);
    Ok(())
}

fn cmd_export_ply(
    bag: &Path,
    output_dir: &Path,
    topic: Option<String>,
    limit: Option<usize>,
    config: &PipelineConfig,
) -> Result<()> {
    let start = Instant::now();
    let topic = topic.unwrap_or_else(|| config.output.output_topic.clone());

    println!("Exporting '{}' from {}", topic, bag.display());
    println!("Output directory: {}", output_dir.display());

    let mut reader = BagReader::open(bag).with_context(|| format!("opening {}", bag.display()))?;
    let spinner = create_spinner("Writing PLY files...");

    let mut exported = 0usize;
    let mut points = 0usize;
    for record in reader.topic_iter(&topic) {
        if limit.is_some_and(|max| exported >= max) {
            break;
        }
        let record = record.context("reading bag record")?;
        let cloud = match record.message {
            Message::PointCloud2(cloud) => cloud,
            other => {
                warn!("Skipping {} message on '{}'", other.kind(), topic);
                continue;
            }
        };

        let frame = read_augmented_points(&cloud)
            .with_context(|| format!("decoding cloud at {} ns", cloud.header.stamp_ns))?;
        let path = output_dir.join(format!(
            "frame_{:06}_{}.ply",
            exported, cloud.header.stamp_ns
        ));
        write_ply(&path, &frame)?;

        exported += 1;
        points += frame.len();
        spinner.set_message(format!("Wrote {} frames", exported));
    }
    spinner.finish_and_clear();

    if exported == 0 {
        warn!("No point clouds found on '{}'", topic);
    }

    print_summary(
        "PLY Export Complete",
        &[
            ("Bag", bag.display().to_string()),
            ("Topic", topic),
            ("Frames exported", exported.to_string()),
            ("Points exported", points.to_string()),
            ("Output directory", output_dir.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_init_config(path: &Path) -> Result<()> {
    PipelineConfig::default()
        .to_yaml(path)
        .with_context(|| format!("writing config to {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

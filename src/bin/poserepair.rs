use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use poserepair::{
    detection::{load_detections, save_detections},
    inspect::{collect_json_files, inspect_file, MAX_FILES},
    recycle::recycle,
    repair, ConfigOverrides, RepairConfig,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "poserepair",
    about = "Repair track identities in AlphaPose-style pose JSON",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Re-associate detections to the identities of the first frame
    Repair(RepairArgs),
    /// Renumber raw track labels, reusing freed slots
    Recycle(IoArgs),
    /// Summarize keypoint layouts of JSON files or directories
    Inspect {
        /// Files or directories to inspect
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[derive(Args)]
struct IoArgs {
    /// Input JSON (array of detections)
    #[arg(short, long)]
    input: PathBuf,

    /// Output JSON path
    #[arg(short, long)]
    output: PathBuf,

    /// Pretty-print the output
    #[arg(long)]
    pretty: bool,
}

#[derive(Args)]
struct RepairArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Max center movement between frames, in pixels
    #[arg(long)]
    max_center_jump: Option<f64>,

    /// Max normalized pose distance (lower is stricter)
    #[arg(long)]
    similarity_threshold: Option<f64>,

    /// Poses remembered per identity
    #[arg(long)]
    history: Option<usize>,

    /// Retire identities absent for more than this many frames
    #[arg(long)]
    max_absent_frames: Option<u32>,

    /// Use minimum-cost matching instead of greedy
    #[arg(long)]
    optimal: bool,
}

impl RepairArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            max_center_jump: self.max_center_jump,
            similarity_threshold: self.similarity_threshold,
            pose_history: self.history,
            max_absent_frames: self.max_absent_frames,
            optimal: self.optimal,
        }
    }

    /// Defaults, then the config file, then command-line flags.
    fn resolve_config(&self) -> anyhow::Result<RepairConfig> {
        let base = match &self.config {
            Some(path) => RepairConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => RepairConfig::default(),
        };
        let cfg = base
            .with_overrides(&self.overrides())
            .context("applying command-line settings")?;

        info!(
            "Repair settings: jump={:.1}, similarity={:.2}, weights={:.2}/{:.2}, history={}, assignment={:?}",
            cfg.max_center_jump,
            cfg.similarity_threshold,
            cfg.pose_weight,
            cfg.center_weight,
            cfg.pose_history,
            cfg.assignment
        );
        Ok(cfg)
    }
}

fn run_repair(args: &RepairArgs) -> anyhow::Result<()> {
    let cfg = args.resolve_config()?;
    let detections = load_detections(&args.io.input)
        .with_context(|| format!("reading {}", args.io.input.display()))?;

    let output = repair(&detections, &cfg)
        .with_context(|| format!("repairing {}", args.io.input.display()))?;

    save_detections(&args.io.output, &output.detections, args.io.pretty)
        .with_context(|| format!("writing {}", args.io.output.display()))?;

    print!("{}", output.report);
    println!(
        "Wrote {} repaired entries to {}",
        output.detections.len(),
        args.io.output.display()
    );
    Ok(())
}

fn run_recycle(args: &IoArgs) -> anyhow::Result<()> {
    let detections = load_detections(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let (recycled, report) = recycle(&detections)?;
    save_detections(&args.output, &recycled, args.pretty)
        .with_context(|| format!("writing {}", args.output.display()))?;

    println!(
        "Recycled ID JSON saved to {} ({} frames, {} ids, {} reused)",
        args.output.display(),
        report.frames,
        report.slots,
        report.reused
    );
    Ok(())
}

fn run_inspect(paths: &[PathBuf]) -> anyhow::Result<()> {
    let mut files = Vec::new();
    for path in paths {
        files.extend(collect_json_files(path)?);
    }
    if files.is_empty() {
        anyhow::bail!("no JSON files found");
    }

    for file in files.iter().take(MAX_FILES) {
        println!("\n=== {} ===", file.display());
        match inspect_file(file) {
            Ok(summary) => println!("{}", summary),
            Err(e) => println!("  [ERROR] Could not parse JSON: {}", e),
        }
    }
    if files.len() > MAX_FILES {
        println!("\n[Note] {} more files not shown.", files.len() - MAX_FILES);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("poserepair=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Repair(args) => run_repair(args),
        Command::Recycle(args) => run_recycle(args),
        Command::Inspect { paths } => run_inspect(paths),
    }
}

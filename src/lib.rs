//! pcbscan: PCB defect dataset preparation, training and inspection.
//!
//! The pipeline has three stages, one subcommand each:
//!
//! - `prepare` converts a raw per-class dataset with Pascal VOC XML
//!   annotations into a YOLO-format train/val dataset plus a `data.yaml`
//!   manifest.
//! - `train` hands that manifest to an external detection trainer.
//! - `inspect` runs the trained model on a board image and reports each
//!   defect with a severity grade.
//!
//! # Modules
//!
//! - [`geometry`]: Bounding boxes tagged with their coordinate space
//! - [`registry`]: The ordered defect class list
//! - [`label`]: VOC XML reading and YOLO label conversion
//! - [`split`]: Train/validation partitioning
//! - [`dataset`]: Output dataset layout and the manifest
//! - [`train`]: The training boundary
//! - [`inspect`]: Detection, severity grading and reporting
//! - [`config`]: Pipeline configuration
//! - [`error`]: Error types

pub mod config;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod inspect;
pub mod label;
pub mod registry;
pub mod split;
pub mod train;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use config::{AnnotationFallback, PipelineConfig};
use train::UltralyticsTrainer;

pub use error::PcbScanError;

/// The pcbscan CLI application.
#[derive(Parser)]
#[command(name = "pcbscan")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// YAML configuration file. Flags override its values.
    #[arg(long, global = true, env = "PCBSCAN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Build the YOLO train/val dataset from the raw VOC dataset.
    Prepare(PrepareArgs),
    /// Train a detector on the prepared dataset.
    Train(TrainArgs),
    /// Inspect a board image with the trained detector.
    Inspect(InspectArgs),
}

#[derive(clap::Args)]
struct PrepareArgs {
    /// Raw dataset root with `images/<class>/` and `Annotations/<class>/`.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Output dataset root (deleted and rebuilt).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Fraction of each class used for training.
    #[arg(long)]
    train_fraction: Option<f64>,

    /// Seed for a reproducible shuffle.
    #[arg(long)]
    seed: Option<u64>,

    /// Behaviour when an XML annotation cannot be parsed.
    #[arg(long, value_enum)]
    on_corrupt_annotation: Option<AnnotationFallback>,
}

#[derive(clap::Args)]
struct TrainArgs {
    /// Prepared dataset root holding `data.yaml`.
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Pretrained starting weights.
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    epochs: Option<u32>,

    #[arg(long)]
    imgsz: Option<u32>,

    #[arg(long)]
    batch: Option<u32>,

    /// Run name; repeated runs get numeric suffixes.
    #[arg(long)]
    name: Option<String>,

    /// Directory that receives run directories.
    #[arg(long)]
    project: Option<PathBuf>,

    /// Trainer executable.
    #[arg(long)]
    trainer: Option<String>,
}

#[derive(clap::Args)]
struct InspectArgs {
    /// Image to inspect. Defaults to the first validation image.
    image: Option<PathBuf>,

    /// Trained weights. Defaults to the latest training run.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Prepared dataset root searched for a default image.
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Minimum detector confidence.
    #[arg(long)]
    conf: Option<f64>,

    /// Box area / image area above which a defect is Critical.
    #[arg(long)]
    severity_threshold: Option<f64>,

    /// Directory for the annotated `result_<image>` file.
    #[arg(long)]
    result_dir: Option<PathBuf>,

    /// Font for box captions.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Also write the JSON report to this file.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Detector executable.
    #[arg(long)]
    trainer: Option<String>,
}

/// Run the pcbscan CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), PcbScanError> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Prepare(args)) => run_prepare(config, args),
        Some(Commands::Train(args)) => run_train(config, args),
        Some(Commands::Inspect(args)) => run_inspect(config, args),
        None => {
            println!("pcbscan {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("PCB defect dataset preparation, training and inspection.");
            println!();
            println!("Run 'pcbscan --help' for usage information.");
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, PcbScanError> {
    match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            PipelineConfig::from_yaml_file(path)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn run_prepare(mut config: PipelineConfig, args: PrepareArgs) -> Result<(), PcbScanError> {
    if let Some(input) = args.input {
        config.input_root = input;
    }
    if let Some(output) = args.output {
        config.output_root = output;
    }
    if let Some(fraction) = args.train_fraction {
        config.train_fraction = fraction;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(policy) = args.on_corrupt_annotation {
        config.on_corrupt_annotation = policy;
    }

    let report = dataset::materialize(&config)?;
    print!("{report}");
    Ok(())
}

fn run_train(mut config: PipelineConfig, args: TrainArgs) -> Result<(), PcbScanError> {
    if let Some(dataset) = args.dataset {
        config.output_root = dataset;
    }
    if let Some(model) = args.model {
        config.train.base_weights = model;
    }
    if let Some(epochs) = args.epochs {
        config.train.epochs = epochs;
    }
    if let Some(imgsz) = args.imgsz {
        config.train.image_size = imgsz;
    }
    if let Some(batch) = args.batch {
        config.train.batch = batch;
    }
    if let Some(name) = args.name {
        config.train.run_name = name;
    }
    if let Some(project) = args.project {
        config.train.project = project;
    }
    if let Some(trainer) = args.trainer {
        config.trainer_program = trainer;
    }

    let trainer = UltralyticsTrainer::new(config.trainer_program.clone());
    let artifact = train::train_dataset(&config, &trainer)?;
    println!("Training complete. Best weights: {}", artifact.display());
    Ok(())
}

fn run_inspect(mut config: PipelineConfig, args: InspectArgs) -> Result<(), PcbScanError> {
    if let Some(dataset) = args.dataset {
        config.output_root = dataset;
    }
    if let Some(conf) = args.conf {
        config.confidence_threshold = conf;
    }
    if let Some(threshold) = args.severity_threshold {
        config.severity_area_threshold = threshold;
    }
    if let Some(result_dir) = args.result_dir {
        config.result_dir = result_dir;
    }
    if args.font.is_some() {
        config.font_path = args.font;
    }
    if let Some(trainer) = args.trainer {
        config.trainer_program = trainer;
    }
    config.validate()?;

    let artifact = match args.model {
        Some(model) => model,
        None => train::find_latest_artifact(&config.train)?,
    };
    println!("Using model: {}", artifact.display());

    let image_path = match args.image {
        Some(image) => image,
        None => match inspect::first_validation_image(&config.output_root)? {
            Some(image) => image,
            None => {
                println!("No test images found.");
                return Ok(());
            }
        },
    };

    let Some(inspection) = inspect::inspect(&config, &artifact, &image_path)? else {
        return Ok(());
    };

    let json = inspection.report.to_json_pretty()?;
    println!("{json}");
    if let Some(report_path) = args.report {
        std::fs::write(&report_path, &json).map_err(PcbScanError::Io)?;
        info!("Wrote report to {}", report_path.display());
    }
    println!("{}", inspection.report);
    println!(
        "Saved visual output to: {}",
        inspection.annotated_path.display()
    );
    Ok(())
}

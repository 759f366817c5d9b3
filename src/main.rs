//! Leaf Classifier CLI
//!
//! Command-line entry point: classify images with a weight bundle, write a
//! freshly initialised bundle, or report which compute device would be used.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use leaf_classifier::backend::{describe_devices, negotiate, CpuBackend, DevicePreference};
use leaf_classifier::inference::{load_classifier, Classification, DEFAULT_LOW_CONFIDENCE_THRESHOLD};
use leaf_classifier::model::{save_bundle, ModelManifest, SupConMobileNet, SupConMobileNetConfig};
use leaf_classifier::utils::logging::{init_logging, LogConfig, LogLevel};
use leaf_classifier::utils::{format_percent, format_probability_bar};
use leaf_classifier::{ClassifierError, LabelSet};

/// Plant leaf disease classifier
#[derive(Parser, Debug)]
#[command(name = "leaf_classifier")]
#[command(version)]
#[command(about = "Classify plant leaf diseases with a MobileNetV2 model on Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a single image or every image in a directory
    Classify {
        /// Path to input image or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Path to the weight bundle (.mpk, manifest alongside as .json)
        #[arg(short, long, env = "LEAF_WEIGHTS")]
        weights: PathBuf,

        /// Compute device: auto, cpu, cuda or cuda:N
        #[arg(long, env = "LEAF_DEVICE", default_value = "auto")]
        device: String,

        /// Print JSON instead of a table
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Write a randomly initialised weight bundle (for smoke tests)
    InitWeights {
        /// Output path of the bundle (.mpk)
        #[arg(short, long, default_value = "models/leaf_classifier.mpk")]
        output: PathBuf,

        /// Comma-separated label order; defaults to the 7 reference classes
        #[arg(long)]
        labels: Option<String>,
    },

    /// Show which compute device would be selected
    DeviceInfo {
        /// Compute device preference to resolve
        #[arg(long, env = "LEAF_DEVICE", default_value = "auto")]
        device: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default().with_level(LogLevel::Warn)
    };
    init_logging(&log_config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Classify {
            input,
            weights,
            device,
            json,
        } => cmd_classify(&input, &weights, &device, json),
        Commands::InitWeights { output, labels } => cmd_init_weights(&output, labels.as_deref()),
        Commands::DeviceInfo { device } => cmd_device_info(&device),
    }
}

fn cmd_classify(input: &Path, weights: &Path, device: &str, json: bool) -> Result<()> {
    let preference: DevicePreference = device.parse()?;
    let target = negotiate(preference);

    info!("Running classification");
    info!("  Input:   {:?}", input);
    info!("  Weights: {:?}", weights);
    info!("  Device:  {}", target);

    if !input.exists() {
        return Err(ClassifierError::PathNotFound(input.to_path_buf()).into());
    }

    let classifier = load_classifier(weights, target).context("failed to load model")?;

    let files: Vec<PathBuf> = if input.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(input)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| {
                        ["jpg", "jpeg", "png", "webp", "bmp"].contains(&e.to_lowercase().as_str())
                    })
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        files
    } else {
        vec![input.to_path_buf()]
    };

    if files.is_empty() {
        return Err(ClassifierError::InvalidInput(format!("no images found in {:?}", input)).into());
    }

    if !json {
        println!("{}", "Classification:".cyan().bold());
        println!("  Weights: {}", weights.display());
        println!("  Backend: {}", target.backend_name());
        println!();
    }

    for file in &files {
        let bytes = std::fs::read(file).with_context(|| format!("failed to read {:?}", file))?;
        match classifier.classify(&bytes) {
            Ok(result) if json => {
                println!(
                    "{}",
                    serde_json::json!({ "file": file, "result": result })
                );
            }
            Ok(result) => print_classification(file, &result),
            Err(e) if e.is_decode() => {
                println!("{} {}: {}", "Skipped".yellow(), file.display(), e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn print_classification(file: &Path, result: &Classification) {
    let headline = format!("{} ({})", result.label, format_percent(result.confidence));
    let headline = if result.is_confident(DEFAULT_LOW_CONFIDENCE_THRESHOLD) {
        headline.green().bold()
    } else {
        headline.yellow().bold()
    };

    println!("{} {}", file.display().to_string().bold(), headline);
    for entry in &result.probabilities {
        println!(
            "  {:<14} {} {:>8}",
            entry.label,
            format_probability_bar(entry.probability, 20),
            format_percent(entry.probability)
        );
    }
    println!("  {:.1} ms", result.inference_time_ms);
    println!();
}

fn cmd_init_weights(output: &Path, labels: Option<&str>) -> Result<()> {
    let labels = match labels {
        Some(list) => LabelSet::parse_list(list)?,
        None => LabelSet::default(),
    };

    let config = SupConMobileNetConfig::new().with_num_classes(labels.len());
    let device = Default::default();
    let model = SupConMobileNet::<CpuBackend>::new(&config, &device);
    let manifest = ModelManifest::new(&config, labels);

    save_bundle(&model, &manifest, output)?;

    println!(
        "{} {} ({} classes: {})",
        "Wrote".green().bold(),
        output.display(),
        manifest.num_classes,
        manifest.labels.as_slice().join(", ")
    );
    Ok(())
}

fn cmd_device_info(device: &str) -> Result<()> {
    let preference: DevicePreference = device.parse()?;
    print!("{}", describe_devices());
    let target = negotiate(preference);
    println!("Selected:         {} ({})", target, target.backend_name());
    Ok(())
}

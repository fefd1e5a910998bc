//! salient CLI: Smooth Gradients saliency maps for `.npy` images.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use salient_core::{DeviceSpec, ImageShape};
use salient_explain::{
    GradientOf, ImageInput, Interpreter, Normalization, NpyReader, SavePath, SmoothGradArgs,
    SmoothGradConfig, SmoothGradInterpreter,
};
use salient_models::{ModelCheckpoint, SaliencyCnnConfig};

/// Backend used for the gradient passes.
type ExplainBackend = Autodiff<NdArray>;

#[derive(Parser)]
#[command(name = "salient")]
#[command(author, version)]
#[command(about = "Gradient-based saliency maps for image classifiers")]
#[command(long_about = "salient: explain image classifier predictions with Smooth Gradients.

EXAMPLES:
  # Explain the predicted class of one image
  salient smoothgrad --input cat.npy --checkpoint model.mpk --n-classes 10

  # Explain class 3 for two images, 20 samples, reproducible noise
  salient smoothgrad --input a.npy --input b.npy --labels 3 3 --n-samples 20 --seed 7

  # Save renderings and the raw averaged gradients
  salient smoothgrad --input a.npy --save a_vis.npy --output grads.npy

  # Print the default sampling config as JSON
  salient config")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run Smooth Gradients on `.npy` images
    Smoothgrad(SmoothGradCmd),
    /// Print the default Smooth Gradients config as JSON
    Config,
}

#[derive(clap::Args)]
struct SmoothGradCmd {
    /// Input images, `[H, W, C]` or `[N, H, W, C]` `.npy` files with pixels in [0, 255]
    #[arg(long = "input", required = true, value_name = "NPY")]
    inputs: Vec<PathBuf>,

    /// Labels to explain, one per image (default: predicted classes)
    #[arg(long, num_args = 1.., value_name = "LABEL")]
    labels: Option<Vec<usize>>,

    /// Device: cpu or gpu
    #[arg(long, default_value = "cpu", value_name = "DEVICE")]
    device: String,

    /// Noise level relative to each image's value range
    #[arg(long, value_name = "F")]
    noise_amount: Option<f32>,

    /// Number of noisy samples per image
    #[arg(long, value_name = "N")]
    n_samples: Option<usize>,

    /// Seed for the noise
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// JSON sampling config; flags override its fields
    #[arg(long, value_name = "JSON")]
    config: Option<PathBuf>,

    /// Model weights saved with `save_checkpoint`
    #[arg(long, value_name = "MPK")]
    checkpoint: Option<PathBuf>,

    /// Number of classes of the model
    #[arg(long, default_value = "10", value_name = "N")]
    n_classes: usize,

    /// Image channels
    #[arg(long, default_value = "3", value_name = "C")]
    channels: usize,

    /// Filters in the first conv block of the model
    #[arg(long, default_value = "16", value_name = "N")]
    n_filters: usize,

    /// Target of the gradient: loss, logit or probability
    #[arg(long, default_value = "probability", value_name = "TARGET")]
    gradient_of: String,

    /// Pixel normalization: imagenet or identity
    #[arg(long, default_value = "imagenet", value_name = "NORM")]
    normalization: String,

    /// Where to save the rendered explanations, one per image
    #[arg(long = "save", value_name = "NPY")]
    save: Vec<PathBuf>,

    /// Write the averaged gradients `[B, H, W, C]` here
    #[arg(long, value_name = "NPY")]
    output: Option<PathBuf>,

    /// Do not show the explanations
    #[arg(long)]
    no_visual: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Smoothgrad(cmd) => handle_smoothgrad(cmd),
        Commands::Config => {
            let json = serde_json::to_string_pretty(&SmoothGradConfig::default())?;
            println!("{json}");
            Ok(())
        }
    }
}

fn handle_smoothgrad(cmd: SmoothGradCmd) -> Result<()> {
    let device_spec = DeviceSpec::parse(&cmd.device).context("Invalid --device")?;
    if device_spec.is_gpu() && device_spec.index() != 0 {
        tracing::warn!(requested = %device_spec, "Smooth Gradients runs on gpu:0");
    }
    let gradient_of: GradientOf = cmd.gradient_of.parse()?;
    let normalization = parse_normalization(&cmd.normalization)?;
    let config = load_config(
        cmd.config.as_deref(),
        cmd.noise_amount,
        cmd.n_samples,
        cmd.seed,
        !cmd.no_visual,
    )?;

    let device = Default::default();
    let model_config = SaliencyCnnConfig::new(cmd.channels, cmd.n_classes).with_filters(cmd.n_filters);
    let mut model = model_config.init::<ExplainBackend>(&device);
    match &cmd.checkpoint {
        Some(path) => {
            model = model
                .load_checkpoint(path, &device)
                .with_context(|| format!("Failed to load checkpoint {}", path.display()))?;
            tracing::info!(path = %path.display(), "loaded checkpoint");
        }
        None => tracing::warn!("no --checkpoint given, explaining a randomly initialized model"),
    }

    let shape = ImageShape::new(cmd.channels, 224, 224);
    let mut interpreter = SmoothGradInterpreter::new(model, device_spec.is_gpu(), shape)?
        .with_reader(NpyReader::new(normalization))
        .with_gradient_of(gradient_of);

    let inputs = match cmd.inputs.as_slice() {
        [single] => ImageInput::Path(single.clone()),
        _ => ImageInput::Paths(cmd.inputs.clone()),
    };
    let save_path = match cmd.save.as_slice() {
        [] => SavePath::None,
        [single] => SavePath::Single(single.clone()),
        _ => SavePath::Many(cmd.save.clone()),
    };

    let mut args = SmoothGradArgs::new(inputs)
        .with_save_path(save_path)
        .with_config(config.clone());
    if let Some(labels) = cmd.labels {
        args = args.with_labels(labels);
    }

    println!(
        "Running Smooth Gradients: {} samples, noise amount {}, device {}",
        config.n_samples,
        config.noise_amount,
        interpreter.device()
    );
    let map = interpreter
        .interpret(args)
        .context("Smooth Gradients failed")?;

    for index in 0..map.len() {
        let magnitude = map
            .channel_magnitude(index)
            .context("missing attribution for image")?;
        println!(
            "  image {index}: label {}, mean |gradient| {:.6}",
            map.labels[index],
            magnitude.mean().unwrap_or(0.0)
        );
    }

    if let Some(output) = &cmd.output {
        ndarray_npy::write_npy(output, &map.values)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!("Saved averaged gradients to {}", output.display());
    }

    Ok(())
}

fn parse_normalization(value: &str) -> Result<Normalization> {
    match value {
        "imagenet" => Ok(Normalization::ImageNet),
        "identity" => Ok(Normalization::Identity),
        other => bail!("Unknown normalization '{}'. Use 'imagenet' or 'identity'", other),
    }
}

/// Read the JSON config (or defaults) and apply flag overrides.
fn load_config(
    path: Option<&Path>,
    noise_amount: Option<f32>,
    n_samples: Option<usize>,
    seed: Option<u64>,
    visual: bool,
) -> Result<SmoothGradConfig> {
    let mut config = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => SmoothGradConfig::default(),
    };

    if let Some(noise_amount) = noise_amount {
        config.noise_amount = noise_amount;
    }
    if let Some(n_samples) = n_samples {
        config.n_samples = n_samples;
    }
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    if !visual {
        config.visual = false;
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_smoothgrad_flags() {
        let cli = Cli::try_parse_from([
            "salient",
            "smoothgrad",
            "--input",
            "a.npy",
            "--input",
            "b.npy",
            "--labels",
            "1",
            "4",
            "--n-samples",
            "8",
            "--no-visual",
        ])
        .unwrap();

        match cli.command {
            Commands::Smoothgrad(cmd) => {
                assert_eq!(cmd.inputs.len(), 2);
                assert_eq!(cmd.labels, Some(vec![1, 4]));
                assert_eq!(cmd.n_samples, Some(8));
                assert!(cmd.no_visual);
                assert_eq!(cmd.device, "cpu");
            }
            Commands::Config => panic!("expected smoothgrad"),
        }
    }

    #[test]
    fn test_flags_override_config_file() {
        let path = std::env::temp_dir().join(format!("salient_cli_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"noise_amount": 0.3, "n_samples": 12, "seed": 5}"#).unwrap();

        let config = load_config(Some(&path), None, Some(4), None, false).unwrap();
        assert_eq!(config.noise_amount, 0.3);
        assert_eq!(config.n_samples, 4);
        assert_eq!(config.seed.map(|s| s.value()), Some(5));
        assert!(!config.visual);

        assert!(load_config(Some(&path), None, Some(0), None, true).is_err());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_parse_normalization() {
        assert_eq!(parse_normalization("identity").unwrap(), Normalization::Identity);
        assert!(parse_normalization("zscore").is_err());
    }
}

//! AlexNet ImageNet CLI
//!
//! Without a subcommand this trains nothing: it samples a tenth of the corpus,
//! builds a freshly initialized AlexNet and prints its predictions for a few
//! training images.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{debug, info, warn};

use alexnet_imagenet::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use alexnet_imagenet::dataset::{Data, LabelMap, IMAGE_EXTENSIONS};
use alexnet_imagenet::inference::{PredictionResult, Predictor, DEFAULT_TOP_K};
use alexnet_imagenet::model::{AlexNetConfig, TrainingConfig};
use alexnet_imagenet::training::Trainer;
use alexnet_imagenet::utils::format_number;
use alexnet_imagenet::utils::logging::{init_logging, LogConfig};

/// AlexNet image classification on ImageNet 2012
#[derive(Parser, Debug)]
#[command(name = "alexnet")]
#[command(version = "0.1.0")]
#[command(about = "AlexNet on ImageNet 2012 with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false")]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error), overrides the flags above
    #[arg(long)]
    log_level: Option<String>,

    /// Directory holding the `train/` and `validation/` splits
    #[arg(short, long, global = true, default_value = "data/imagenet2012")]
    data_dir: PathBuf,

    /// Subcommand to execute (defaults to a quick sample prediction run)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train AlexNet with SGD
    Train {
        /// Number of passes over the training sample
        #[arg(short, long, default_value = "5")]
        epochs: usize,

        /// Batch size for training
        #[arg(short, long, default_value = "128")]
        batch_size: usize,

        /// Learning rate
        #[arg(short, long, default_value = "0.001")]
        learning_rate: f64,

        /// SGD momentum
        #[arg(long, default_value = "0.9")]
        momentum: f64,

        /// L2 weight decay (disabled when omitted)
        #[arg(long)]
        weight_decay: Option<f64>,

        /// Divide the learning rate by 10 after this many epochs without
        /// validation improvement (constant rate when omitted)
        #[arg(long)]
        plateau_patience: Option<usize>,

        /// Fraction of the corpus to sample (0.0-1.0]
        #[arg(short, long, default_value = "1.0")]
        sample_fraction: f64,

        /// Use a single training and validation image
        #[arg(long, default_value = "false")]
        only_one: bool,

        /// Save the trained model under this directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Random seed for sampling and shuffling
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Background loader threads
        #[arg(long, default_value = "4")]
        num_workers: usize,
    },

    /// Classify image files with a saved model
    Predict {
        /// Image files or directories of images
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Directory the model was saved to
        #[arg(short, long, default_value = "output/models")]
        model: PathBuf,

        /// Average the prediction over ten crops
        #[arg(long, default_value = "false")]
        ten_crop: bool,

        /// Number of classes reported per image
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// Directory caching the downloaded label names
        #[arg(long, default_value = "output")]
        labels_dir: PathBuf,
    },

    /// Discover the corpus and check the input assumptions
    Check,

    /// Download (or read from cache) the class name mapping
    Labels {
        /// Directory caching the downloaded label names
        #[arg(long, default_value = "output")]
        labels_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_flags(cli.verbose, cli.quiet, cli.log_level.as_deref());

    let _ = init_logging(&log_config);
    debug!("Log level: {}", log_config.level);

    print_banner();

    match cli.command {
        None => cmd_sample(&cli.data_dir)?,

        Some(Commands::Train {
            epochs,
            batch_size,
            learning_rate,
            momentum,
            weight_decay,
            plateau_patience,
            sample_fraction,
            only_one,
            output_dir,
            seed,
            num_workers,
        }) => {
            let config = TrainingConfig::new()
                .with_epochs(epochs)
                .with_batch_size(batch_size)
                .with_learning_rate(learning_rate)
                .with_momentum(momentum)
                .with_weight_decay(weight_decay)
                .with_plateau_patience(plateau_patience)
                .with_seed(seed)
                .with_num_workers(num_workers);

            cmd_train(
                &cli.data_dir,
                config,
                sample_fraction,
                only_one,
                output_dir.as_deref(),
            )?;
        }

        Some(Commands::Predict {
            inputs,
            model,
            ten_crop,
            top_k,
            labels_dir,
        }) => {
            cmd_predict(&inputs, &model, ten_crop, top_k, &labels_dir)?;
        }

        Some(Commands::Check) => cmd_check(&cli.data_dir)?,

        Some(Commands::Labels { labels_dir }) => cmd_labels(&labels_dir)?,
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 +--------------------------------------------------+
 |   AlexNet on ImageNet 2012                       |
 |   Image classification with Burn + Rust          |
 +--------------------------------------------------+
  "#
        .green()
    );
}

/// Label names are optional: predictions fall back to class numbers
fn labels_or_warn(cache_dir: &Path) -> Option<LabelMap> {
    match LabelMap::load_or_fetch(cache_dir) {
        Ok(labels) => Some(labels),
        Err(e) => {
            warn!("Label names unavailable, showing class numbers: {}", e);
            None
        }
    }
}

fn print_predictions(results: &[PredictionResult]) {
    for result in results {
        println!("{}", result.display());
    }
}

fn cmd_sample(data_dir: &Path) -> Result<()> {
    const SAMPLE_FRACTION: f64 = 0.1;
    const SAMPLE_PREDICTIONS: usize = 10;

    let config = TrainingConfig::new();
    let batch_size = config.batch_size;
    let mut trainer: Trainer<TrainingBackend> =
        Trainer::new(data_dir, AlexNetConfig::new(), config);

    trainer.load_data(SAMPLE_FRACTION, false)?;
    trainer.create_generator(batch_size)?;
    trainer.build_model()?;

    let labels = labels_or_warn(Path::new("output"));
    let results = trainer.predict_samples(SAMPLE_PREDICTIONS, labels.as_ref())?;

    println!("{}", "Sample predictions (untrained):".cyan().bold());
    print_predictions(&results);
    Ok(())
}

fn cmd_train(
    data_dir: &Path,
    config: TrainingConfig,
    sample_fraction: f64,
    only_one: bool,
    output_dir: Option<&Path>,
) -> Result<()> {
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Data:          {:?}", data_dir);
    println!("  Epochs:        {}", config.epochs);
    println!("  Batch size:    {}", config.batch_size);
    println!("  Learning rate: {}", config.learning_rate);
    println!("  Momentum:      {}", config.momentum);
    println!("  Sample:        {}", sample_fraction);
    println!("  Backend:       {}", backend_name());
    println!();

    let epochs = config.epochs;
    let batch_size = config.batch_size;
    let mut trainer: Trainer<TrainingBackend> =
        Trainer::new(data_dir, AlexNetConfig::new(), config);

    trainer.load_data(sample_fraction, only_one)?;
    trainer.create_generator(batch_size)?;
    trainer.build_model()?;

    let history = trainer.train(epochs)?;
    if let Some(last) = history.last() {
        println!();
        println!("{}", "Final epoch:".green().bold());
        println!("  Train loss:      {:.4}", last.train_loss);
        println!("  Validation loss: {:.4}", last.val_loss);
        println!("  Top-1 accuracy:  {:.2}%", last.val_top1 * 100.0);
        println!("  Top-k accuracy:  {:.2}%", last.val_top_k * 100.0);
    }

    if let Some(dir) = output_dir {
        let saved = trainer.save(dir)?;
        println!("{} {:?}", "Model saved to".green(), saved);
    }

    Ok(())
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Expand directories into the image files they contain, sorted
fn collect_images(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && has_image_extension(p))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

fn cmd_predict(
    inputs: &[PathBuf],
    model: &Path,
    ten_crop: bool,
    top_k: usize,
    labels_dir: &Path,
) -> Result<()> {
    info!("Running inference with model {:?}", model);

    let files = collect_images(inputs)?;
    if files.is_empty() {
        println!("{} No images found", "Error:".red());
        return Ok(());
    }

    println!("{}", "Loading model...".cyan());
    let predictor = Predictor::<DefaultBackend>::load(model, default_device())?
        .with_labels(labels_or_warn(labels_dir))
        .with_top_k(top_k);

    let results = if ten_crop {
        files
            .iter()
            .map(|path| predictor.predict_ten_crop(path))
            .collect::<alexnet_imagenet::Result<Vec<_>>>()?
    } else {
        predictor.predict_files(&files)?
    };

    print_predictions(&results);
    Ok(())
}

fn cmd_check(data_dir: &Path) -> Result<()> {
    let data = Data::load(data_dir)?;

    println!("{}", "Dataset:".cyan().bold());
    println!("  Classes:           {}", data.train.num_classes());
    println!("  Training images:   {}", format_number(data.train.len()));
    println!("  Validation images: {}", format_number(data.validation.len()));
    println!("{}", "First training image satisfies the input assumptions".green());
    Ok(())
}

fn cmd_labels(labels_dir: &Path) -> Result<()> {
    let labels = LabelMap::load_or_fetch(labels_dir)?;

    println!("{} {} class names", "Loaded".green(), labels.len());
    for (label, name) in labels.iter().take(5) {
        println!("  {:>4}: {}", label, name);
    }
    Ok(())
}

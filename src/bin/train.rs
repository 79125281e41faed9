use anyhow::Context;
use burn::backend::{Autodiff, NdArray};
use clap::Parser;
use std::path::PathBuf;

use neurolens::training::{run_modality, PipelineConfig};
use neurolens::Modality;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train the per-modality risk models", long_about = None)]
struct Args {
    /// Modalities to train; all of them when omitted
    #[arg(short, long, value_enum)]
    modality: Vec<Modality>,

    /// Pipeline config; a default one is written here when missing
    #[arg(short, long, default_value = "configs/pipeline.yaml")]
    config: PathBuf,

    /// Override the configured number of epochs
    #[arg(long)]
    epochs: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    type MyBackend = NdArray;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    // Load or create config
    let mut config = if args.config.exists() {
        log::info!("Loading config from {}", args.config.display());
        PipelineConfig::from_yaml(&args.config)
            .with_context(|| format!("reading {}", args.config.display()))?
    } else {
        let config = PipelineConfig::default();
        config.save(&args.config)?;
        log::info!("Created default config at {}", args.config.display());
        config
    };
    if let Some(epochs) = args.epochs {
        config.training.epochs = epochs;
    }

    let modalities = if args.modality.is_empty() {
        Modality::ALL.to_vec()
    } else {
        args.modality
    };

    println!("Training configuration:");
    println!("  Modalities: {:?}", modalities);
    println!("  Epochs: {}", config.training.epochs);
    println!("  Learning rate: {}", config.training.learning_rate);
    println!("  Weight decay: {}", config.training.weight_decay);
    println!("  Workers: {}", config.hardware.num_workers);
    println!("  Runs dir: {}", config.paths.runs_dir().display());
    println!();

    for modality in modalities {
        println!("Training {} model...", modality);
        let artifact = run_modality::<MyAutodiffBackend>(&config, modality, Default::default())
            .with_context(|| format!("training the {modality} model"))?;
        println!(
            "Best {}: {:.4} at epoch {} -> {}",
            artifact.meta.metric_name,
            artifact.meta.metric,
            artifact.meta.epoch,
            config.checkpoint_dir(modality).display()
        );
        println!();
    }

    println!("Training completed!");
    Ok(())
}

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use neurolens::inference::{export_portable, ServingBackend};
use neurolens::training::{load_checkpoint, PipelineConfig};
use neurolens::Modality;

#[derive(Parser, Debug)]
#[command(author, version, about = "Export trained checkpoints as portable graphs", long_about = None)]
struct Args {
    /// Modalities to export; all of them when omitted
    #[arg(short, long, value_enum)]
    modality: Vec<Modality>,

    #[arg(short, long, default_value = "configs/pipeline.yaml")]
    config: PathBuf,

    /// Batch dimension recorded in the graph input shape
    #[arg(long, default_value_t = 1)]
    batch: usize,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    let config = if args.config.exists() {
        PipelineConfig::from_yaml(&args.config)?
    } else {
        PipelineConfig::default()
    };

    let modalities = if args.modality.is_empty() {
        Modality::ALL.to_vec()
    } else {
        args.modality
    };

    let device = Default::default();
    for modality in modalities {
        let checkpoint = config.checkpoint_dir(modality);
        let (model, outcome, meta) = load_checkpoint::<ServingBackend>(&checkpoint, &device)
            .with_context(|| format!("loading {}", checkpoint.display()))?;
        if !outcome.is_strict() {
            log::warn!("[{}] exporting a partially loaded checkpoint", modality);
        }

        let size = meta.image_size as usize;
        let out_dir = config.export_dir(modality);
        let manifest = export_portable(&model, &meta, [args.batch, 3, size, size], &out_dir, &device)?;
        println!(
            "{}: {} {:?} -> {} {:?} in {}",
            modality,
            manifest.input_name,
            manifest.input_shape,
            manifest.output_name,
            manifest.output_shape,
            out_dir.display()
        );
    }

    Ok(())
}

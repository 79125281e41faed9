use clap::Parser;
use std::path::PathBuf;

use neurolens::inference::evaluation::{evaluate_cimt, read_cimt_csv, single_item_report};
use neurolens::inference::signal::{RawSignal, CIMT_THRESHOLDS};
use neurolens::inference::{BackendKind, InferenceService};
use neurolens::training::PipelineConfig;
use neurolens::Modality;

#[derive(Parser, Debug)]
#[command(author, version, about = "Per-modality predictions", long_about = None)]
struct Args {
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    #[arg(short, long, default_value = "configs/pipeline.yaml")]
    config: PathBuf,

    /// Retinal image
    #[arg(long)]
    eye_image: Option<PathBuf>,

    /// Carotid ultrasound image
    #[arg(long)]
    cimt_image: Option<PathBuf>,

    /// Brain image
    #[arg(long)]
    brain_image: Option<PathBuf>,

    /// Known CIMT (mm) of `--cimt-image`, prints single-item metrics
    #[arg(long)]
    cimt_gt: Option<f64>,

    /// CSV with an image and a CIMT column for batch evaluation
    #[arg(long)]
    csv: Option<PathBuf>,
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

    let mut service = InferenceService::new(config);
    if let Some(kind) = args.backend {
        service = service.with_backend(kind);
    }

    if let Some(image) = &args.eye_image {
        println!("{}\n", service.predict(Modality::Eye, image)?);
    }

    if let Some(csv) = &args.csv {
        let rows = read_cimt_csv(csv)?;
        let backend = service.backend(Modality::Cimt)?;
        let report = evaluate_cimt(backend.as_ref(), &rows)?;
        println!("cimt (batch):");
        println!("Evaluation Metrics: {report}");
        println!("{CIMT_THRESHOLDS}\n");
    }

    if let Some(image) = &args.cimt_image {
        let prediction = service.predict(Modality::Cimt, image)?;
        println!("{prediction}");
        if let (Some(gt), RawSignal::Value { value }) = (args.cimt_gt, &prediction.raw) {
            println!("Evaluation Metrics: {}", single_item_report(gt, *value as f64));
        }
        println!();
    }

    if let Some(image) = &args.brain_image {
        println!("{}\n", service.predict(Modality::Brain, image)?);
    }

    Ok(())
}

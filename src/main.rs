use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use neurolens::inference::{AssessmentRequest, BackendKind, InferenceService};
use neurolens::training::PipelineConfig;
use neurolens::Vitals;

/// One-shot stroke-risk assessment: three images plus vitals in, JSON report out.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Retinal image
    #[arg(long)]
    eye: PathBuf,

    /// Carotid ultrasound image
    #[arg(long)]
    cimt: PathBuf,

    /// Brain image
    #[arg(long)]
    brain: PathBuf,

    /// Age in years
    #[arg(long)]
    age: f64,

    /// Systolic blood pressure (mmHg)
    #[arg(long)]
    systolic: f64,

    /// Diastolic blood pressure (mmHg)
    #[arg(long)]
    diastolic: f64,

    #[arg(short, long, default_value = "configs/pipeline.yaml")]
    config: PathBuf,

    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Also print the per-modality predictions
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    let vitals = Vitals::new(args.age, args.systolic, args.diastolic);
    vitals.validate()?;

    let config = if args.config.exists() {
        PipelineConfig::from_yaml(&args.config)
            .with_context(|| format!("reading {}", args.config.display()))?
    } else {
        PipelineConfig::default()
    };

    let mut service = InferenceService::new(config);
    if let Some(kind) = args.backend {
        service = service.with_backend(kind);
    }

    let assessment = service.assess(&AssessmentRequest {
        eye_image: args.eye,
        cimt_image: args.cimt,
        brain_image: args.brain,
        vitals,
    })?;

    if args.verbose {
        for prediction in [&assessment.eye, &assessment.cimt, &assessment.brain] {
            eprintln!("{prediction}\n");
        }
        eprintln!("ePWV: {:.2} m/s\n", assessment.epwv);
    }

    println!("{}", serde_json::to_string_pretty(&assessment.report())?);
    Ok(())
}

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{NeurolensError, Result};
use crate::model::{ModelBlueprint, RiskModel};
use crate::modality::Modality;
use crate::training::checkpoint::{
    load_components, CheckpointMeta, LoadOutcome, EXTRACTOR_RECORD, HEAD_RECORD,
};

pub const PORTABLE_FORMAT_VERSION: u32 = 1;
pub const GRAPH_MANIFEST: &str = "graph.json";
pub const INPUT_NAME: &str = "input";
pub const OUTPUT_NAME: &str = "output";

/// Self-describing header of an exported graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortableManifest {
    pub format_version: u32,
    pub modality: Modality,
    pub blueprint: ModelBlueprint,
    pub classes: Vec<String>,
    pub image_size: u32,
    pub input_name: String,
    pub output_name: String,
    /// `[batch, 3, size, size]`
    pub input_shape: [usize; 4],
    pub output_shape: [usize; 2],
}

impl PortableManifest {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(GRAPH_MANIFEST);
        if !path.is_file() {
            return Err(NeurolensError::CheckpointNotFound(dir.to_path_buf()));
        }
        let manifest: PortableManifest = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        if manifest.format_version != PORTABLE_FORMAT_VERSION {
            return Err(NeurolensError::InvalidConfig(format!(
                "unsupported portable format version {} (expected {})",
                manifest.format_version, PORTABLE_FORMAT_VERSION
            )));
        }
        Ok(manifest)
    }
}

fn portable_recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Write `model` as a portable graph into `dir`: `graph.json` plus named
/// MessagePack records. The output shape is taken from a trial forward pass
/// on a zero input of `input_shape`.
pub fn export_portable<B: Backend>(
    model: &RiskModel<B>,
    meta: &CheckpointMeta,
    input_shape: [usize; 4],
    dir: &Path,
    device: &B::Device,
) -> Result<PortableManifest> {
    let [batch, channels, height, width] = input_shape;
    if batch == 0 || channels != 3 || height != width || height == 0 {
        return Err(NeurolensError::InvalidConfig(format!(
            "export input shape must be [N, 3, S, S], got {input_shape:?}"
        )));
    }

    let output_shape = model.forward(Tensor::<B, 4>::zeros(input_shape, device)).dims();

    std::fs::create_dir_all(dir)?;
    let recorder = portable_recorder();
    recorder
        .record(model.extractor.clone().into_record(), dir.join(EXTRACTOR_RECORD))
        .map_err(|e| NeurolensError::Recorder(format!("extractor: {e:?}")))?;
    recorder
        .record(model.head.clone().into_record(), dir.join(HEAD_RECORD))
        .map_err(|e| NeurolensError::Recorder(format!("head: {e:?}")))?;

    let manifest = PortableManifest {
        format_version: PORTABLE_FORMAT_VERSION,
        modality: meta.modality,
        blueprint: meta.blueprint.clone(),
        classes: meta.classes.clone(),
        image_size: height as u32,
        input_name: INPUT_NAME.to_string(),
        output_name: OUTPUT_NAME.to_string(),
        input_shape,
        output_shape,
    };
    std::fs::write(dir.join(GRAPH_MANIFEST), serde_json::to_string_pretty(&manifest)?)?;

    log::info!(
        "Exported {} model to {} (input {:?} -> output {:?})",
        meta.modality,
        dir.display(),
        input_shape,
        output_shape
    );
    Ok(manifest)
}

/// Rebuild a model from a portable graph directory.
pub fn load_portable<B: Backend>(
    dir: &Path,
    device: &B::Device,
) -> Result<(RiskModel<B>, LoadOutcome, PortableManifest)> {
    let manifest = PortableManifest::load(dir)?;
    let (model, outcome) = load_components(&portable_recorder(), &manifest.blueprint, dir, device);
    outcome.log(dir);
    Ok((model, outcome, manifest))
}

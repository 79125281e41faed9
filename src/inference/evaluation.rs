use std::path::{Path, PathBuf};

use super::backend::InferenceBackend;
use super::signal::RawSignal;
use crate::error::{NeurolensError, Result};
use crate::training::metrics::RegressionReport;

const IMAGE_COLUMNS: [&str; 3] = ["image", "img", "path"];
const TARGET_COLUMNS: [&str; 3] = ["cimt", "cimt_mm", "thickness"];

/// One labeled row of a CIMT evaluation sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct CimtGroundTruth {
    pub image: PathBuf,
    pub cimt_mm: f64,
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|name| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    })
}

/// Read `image,cimt` rows. Rows with an empty image or target are skipped,
/// as are rows whose target is not a number.
pub fn read_cimt_csv(path: &Path) -> Result<Vec<CimtGroundTruth>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();

    let image_col = find_column(&headers, &IMAGE_COLUMNS).ok_or_else(|| {
        NeurolensError::InvalidConfig(format!(
            "{}: no image column (expected one of {:?})",
            path.display(),
            IMAGE_COLUMNS
        ))
    })?;
    let target_col = find_column(&headers, &TARGET_COLUMNS).ok_or_else(|| {
        NeurolensError::InvalidConfig(format!(
            "{}: no CIMT column (expected one of {:?})",
            path.display(),
            TARGET_COLUMNS
        ))
    })?;

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let image = record
            .get(image_col)
            .map(|s| s.trim().trim_matches('"').trim())
            .unwrap_or_default();
        let target = record.get(target_col).map(str::trim).unwrap_or_default();
        if image.is_empty() || target.is_empty() {
            continue;
        }
        match target.parse::<f64>() {
            Ok(cimt_mm) => rows.push(CimtGroundTruth {
                image: PathBuf::from(image),
                cimt_mm,
            }),
            Err(_) => log::warn!("row {}: CIMT value '{}' is not a number, skipped", line + 2, target),
        }
    }
    Ok(rows)
}

/// Predict every row and score the predictions against the ground truth.
pub fn evaluate_cimt(
    backend: &dyn InferenceBackend,
    rows: &[CimtGroundTruth],
) -> Result<RegressionReport> {
    let mut y_true = Vec::with_capacity(rows.len());
    let mut y_pred = Vec::with_capacity(rows.len());

    for row in rows {
        let prediction = backend.predict_path(&row.image)?;
        let value = match prediction.raw {
            RawSignal::Value { value } => value as f64,
            RawSignal::Class(_) => {
                return Err(NeurolensError::InvalidConfig(format!(
                    "{} model does not produce a CIMT value",
                    backend.modality()
                )))
            }
        };
        y_true.push(row.cimt_mm);
        y_pred.push(value);
    }

    log::info!("Evaluated {} CIMT rows", y_true.len());
    Ok(RegressionReport::compute(&y_true, &y_pred))
}

/// Metrics of a single prediction against a known CIMT.
pub fn single_item_report(ground_truth: f64, predicted: f64) -> RegressionReport {
    RegressionReport::compute(&[ground_truth], &[predicted])
}

//! Clinical-formula modality: estimated pulse-wave velocity (ePWV) from age
//! and blood pressure.

use serde::{Deserialize, Serialize};

use super::signals::{bucket_signal, ModalitySignal};
use super::tier::RiskTier;
use crate::error::{NeurolensError, Result};

/// Patient vitals accepted by the assessment entry points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    /// Age in years
    pub age: f64,
    /// Systolic blood pressure in mmHg
    pub systolic: f64,
    /// Diastolic blood pressure in mmHg
    pub diastolic: f64,
}

impl Vitals {
    pub fn new(age: f64, systolic: f64, diastolic: f64) -> Self {
        Self {
            age,
            systolic,
            diastolic,
        }
    }

    /// Range checks applied at the request boundary, before any inference runs.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=120.0).contains(&self.age) {
            return Err(NeurolensError::InvalidVitalRange(
                "Age must be between 0 and 120".into(),
            ));
        }
        if !(50.0..=300.0).contains(&self.systolic) {
            return Err(NeurolensError::InvalidVitalRange(
                "Systolic blood pressure must be between 50-300 mmHg".into(),
            ));
        }
        if !(30.0..=200.0).contains(&self.diastolic) {
            return Err(NeurolensError::InvalidVitalRange(
                "Diastolic blood pressure must be between 30-200 mmHg".into(),
            ));
        }
        if self.diastolic >= self.systolic {
            return Err(NeurolensError::InvalidVitalRange(
                "Diastolic blood pressure must be less than systolic blood pressure".into(),
            ));
        }
        Ok(())
    }

    pub fn mean_blood_pressure(&self) -> f64 {
        mean_blood_pressure(self.systolic, self.diastolic)
    }

    pub fn estimated_pwv(&self) -> f64 {
        estimated_pwv(self.age, self.mean_blood_pressure())
    }
}

pub fn mean_blood_pressure(systolic: f64, diastolic: f64) -> f64 {
    diastolic + 0.4 * (systolic - diastolic)
}

/// Quadratic-in-age, linear-in-MBP ePWV polynomial.
pub fn estimated_pwv(age: f64, mbp: f64) -> f64 {
    let age2 = age * age;
    0.587 - 0.402 * age + 4.560e-3 * age2 - 2.621e-5 * age2 * mbp + 3.176e-3 * age * mbp
        - 1.832e-2 * mbp
}

/// ePWV thresholds `(low, high)` for the patient's age band.
pub fn age_band_thresholds(age: f64) -> (f64, f64) {
    if age < 40.0 {
        (7.0, 8.0)
    } else if (40.0..=59.0).contains(&age) {
        (9.0, 10.0)
    } else {
        (11.0, 12.0)
    }
}

pub fn epwv_bucket(age: f64, epwv: f64) -> RiskTier {
    let (low, high) = age_band_thresholds(age);
    if epwv < low {
        RiskTier::Low
    } else if (low..=high).contains(&epwv) {
        RiskTier::Medium
    } else {
        RiskTier::High
    }
}

pub fn epwv_signal(vitals: &Vitals) -> ModalitySignal {
    bucket_signal(epwv_bucket(vitals.age, vitals.estimated_pwv()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_blood_pressure() {
        assert!((mean_blood_pressure(130.0, 85.0) - 103.0).abs() < 1e-12);
        assert!((mean_blood_pressure(120.0, 80.0) - 96.0).abs() < 1e-12);
    }

    #[test]
    fn test_epwv_polynomial() {
        // 0.587 - 18.09 + 9.234 - 5.46675075 + 14.72076 - 1.88696
        let v = estimated_pwv(45.0, 103.0);
        assert!((v - (-0.90195075)).abs() < 1e-9, "got {v}");
    }

    #[test]
    fn test_bucket_depends_on_age_band() {
        assert_eq!(epwv_bucket(39.0, 8.5), RiskTier::High);
        assert_eq!(epwv_bucket(40.0, 8.5), RiskTier::Low);

        assert_eq!(epwv_bucket(59.0, 10.5), RiskTier::High);
        assert_eq!(epwv_bucket(60.0, 10.5), RiskTier::Low);

        assert_eq!(epwv_bucket(39.0, 7.5), RiskTier::Medium);
        assert_eq!(epwv_bucket(59.0, 9.5), RiskTier::Medium);
        assert_eq!(epwv_bucket(60.0, 11.5), RiskTier::Medium);
    }

    #[test]
    fn test_threshold_edges_inclusive() {
        assert_eq!(epwv_bucket(30.0, 7.0), RiskTier::Medium);
        assert_eq!(epwv_bucket(30.0, 8.0), RiskTier::Medium);
        assert_eq!(epwv_bucket(30.0, 6.999), RiskTier::Low);
        assert_eq!(epwv_bucket(30.0, 8.001), RiskTier::High);
    }

    #[test]
    fn test_vitals_validation() {
        assert!(Vitals::new(45.0, 130.0, 85.0).validate().is_ok());
        assert!(Vitals::new(121.0, 130.0, 85.0).validate().is_err());
        assert!(Vitals::new(45.0, 40.0, 35.0).validate().is_err());
        assert!(Vitals::new(45.0, 130.0, 25.0).validate().is_err());
        assert!(matches!(
            Vitals::new(45.0, 120.0, 120.0).validate(),
            Err(NeurolensError::InvalidVitalRange(_))
        ));
    }

    #[test]
    fn test_signal_defined_over_valid_domain() {
        for age in 0..=120 {
            for sbp in (50..=300).step_by(10) {
                for dbp in (30..=200).step_by(10) {
                    let vitals = Vitals::new(age as f64, sbp as f64, dbp as f64);
                    if vitals.validate().is_err() {
                        continue;
                    }
                    let s = epwv_signal(&vitals).value();
                    assert!([0.20, 0.55, 0.90].contains(&s));
                }
            }
        }
    }
}

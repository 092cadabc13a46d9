//! Series normalization
//!
//! Scalers are fit once on the whole value sequence of a single dataset and
//! never shared between datasets.

use serde::{Deserialize, Serialize};

/// Normalization requested by an analysis configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Values are used as stored
    #[default]
    None,
    /// Median / interquartile range (25-75)
    Robust,
    /// Median / wide quantile range (10-90)
    #[serde(alias = "robust_extreme")]
    RobustWide,
    /// Mean / standard deviation
    #[serde(alias = "z-score", alias = "z_score")]
    Zscore,
}

impl Normalization {
    /// Resolve into a scaling strategy, `None` when values pass through
    pub fn scaler(self) -> Option<Scaler> {
        match self {
            Normalization::None => None,
            Normalization::Robust => Some(Scaler::Robust { quantile_range: (25.0, 75.0) }),
            Normalization::RobustWide => Some(Scaler::Robust { quantile_range: (10.0, 90.0) }),
            Normalization::Zscore => Some(Scaler::Standard),
        }
    }
}

/// Unfitted scaling strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Scaler {
    /// Quantile range given in percent
    Robust { quantile_range: (f64, f64) },
    Standard,
}

impl Scaler {
    /// Fit center and scale on one feature column
    pub fn fit(&self, values: &[f64]) -> FittedScaler {
        let (center, scale) = match *self {
            Scaler::Robust { quantile_range: (low, high) } => {
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let median = percentile(&sorted, 50.0);
                let range = percentile(&sorted, high) - percentile(&sorted, low);
                (median, range)
            }
            Scaler::Standard => {
                let n = values.len().max(1) as f64;
                let mean = values.iter().sum::<f64>() / n;
                let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                (mean, variance.sqrt())
            }
        };

        FittedScaler {
            kind: *self,
            center,
            scale: handle_zero_scale(scale),
        }
    }
}

/// Scaler parameters fit on one dataset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedScaler {
    pub kind: Scaler,
    pub center: f64,
    pub scale: f64,
}

impl FittedScaler {
    pub fn transform(&self, values: &[f64]) -> Vec<f32> {
        values.iter()
            .map(|v| ((v - self.center) / self.scale) as f32)
            .collect()
    }

    pub fn inverse_transform(&self, values: &[f32]) -> Vec<f64> {
        values.iter()
            .map(|&v| v as f64 * self.scale + self.center)
            .collect()
    }
}

/// Constant features keep unit scale
fn handle_zero_scale(scale: f64) -> f64 {
    if !scale.is_finite() || scale < 10.0 * f64::EPSILON {
        1.0
    } else {
        scale
    }
}

/// Percentile (0-100) with linear interpolation over sorted values
fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let idx = q / 100.0 * (n - 1) as f64;
            let lower = idx.floor() as usize;
            let upper = idx.ceil() as usize;
            let frac = idx - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * frac
        }
    }
}

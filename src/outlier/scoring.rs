//! Reconstruction of a full series and modified z-score outlier flags

use crate::error::PipelineResult;
use super::model::Reconstructor;
use super::windows::WindowedSeries;

const LOG_EPS: f64 = 1e-6;
const MAD_EPS: f64 = 1e-8;
const MAD_CONSISTENCY: f64 = 0.6745;

/// Per-timestep averages over every window covering that timestep
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionProfile {
    /// Mean reconstructed value, `NaN` where no window covers the timestep
    pub prediction: Vec<f64>,
    /// Mean absolute reconstruction error, `NaN` where uncovered
    pub error: Vec<f64>,
    /// Number of windows covering each timestep
    pub coverage: Vec<u32>,
}

impl ReconstructionProfile {
    pub fn len(&self) -> usize {
        self.error.len()
    }

    pub fn is_empty(&self) -> bool {
        self.error.is_empty()
    }

    /// Timesteps reached by no window (tail left over by the stride)
    pub fn uncovered(&self) -> usize {
        self.coverage.iter().filter(|&&c| c == 0).count()
    }
}

/// Run every window through the model in batches and average predictions and
/// absolute errors over the windows covering each timestep.
pub fn reconstruct_series<R: Reconstructor + ?Sized>(
    series: &WindowedSeries,
    model: &R,
    batch_size: usize,
) -> PipelineResult<ReconstructionProfile> {
    let n = series.num_samples();
    let seq_len = series.sequence_length();
    let values = series.values();

    let mut pred_sums = vec![0.0f64; n];
    let mut error_sums = vec![0.0f64; n];
    let mut coverage = vec![0u32; n];

    let indices: Vec<usize> = (0..series.len()).collect();
    for chunk in indices.chunks(batch_size.max(1)) {
        let batch = series.batch(chunk)?;
        let prediction = model.reconstruct(&batch);

        for (row, &idx) in chunk.iter().enumerate() {
            let start = series.window_start(idx)?;
            for pos in 0..seq_len {
                let t = start + pos;
                let pred = prediction[[row, pos, 0]] as f64;
                pred_sums[t] += pred;
                error_sums[t] += (values[t] as f64 - pred).abs();
                coverage[t] += 1;
            }
        }
    }

    let average = |sums: Vec<f64>| -> Vec<f64> {
        sums.into_iter()
            .zip(&coverage)
            .map(|(sum, &count)| if count == 0 { f64::NAN } else { sum / count as f64 })
            .collect()
    };
    let prediction = average(pred_sums);
    let error = average(error_sums);

    let profile = ReconstructionProfile {
        prediction,
        error,
        coverage,
    };

    if profile.uncovered() > 0 {
        tracing::debug!(
            uncovered = profile.uncovered(),
            "Trailing timesteps not covered by any window"
        );
    }

    Ok(profile)
}

/// Median taking the lower middle element for even lengths
fn lower_median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted[(sorted.len() - 1) / 2]
}

/// Modified z-score of the log error; `NaN` stays `NaN` and is left out of
/// the median and MAD.
pub fn modified_z_scores(error: &[f64]) -> Vec<f64> {
    let log_error: Vec<f64> = error.iter().map(|e| (e + LOG_EPS).ln()).collect();
    let finite: Vec<f64> = log_error.iter().copied().filter(|v| !v.is_nan()).collect();
    if finite.is_empty() {
        return vec![f64::NAN; error.len()];
    }

    let median = lower_median(&finite);
    let deviations: Vec<f64> = finite.iter().map(|v| (v - median).abs()).collect();
    let mad = lower_median(&deviations);

    log_error
        .iter()
        .map(|v| MAD_CONSISTENCY * (v - median) / (mad + MAD_EPS))
        .collect()
}

/// Flag timesteps whose |modified z-score| exceeds `threshold`
pub fn outlier_mask(error: &[f64], threshold: f64) -> Vec<bool> {
    modified_z_scores(error)
        .into_iter()
        .map(|z| z.abs() > threshold)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use ndarray::Array3;
    use crate::models::Sample;

    /// Always predicts the same value
    struct Constant(f32);

    impl Reconstructor for Constant {
        fn reconstruct(&self, batch: &Array3<f32>) -> Array3<f32> {
            Array3::from_elem(batch.dim(), self.0)
        }
    }

    /// Echoes the input back
    struct Identity;

    impl Reconstructor for Identity {
        fn reconstruct(&self, batch: &Array3<f32>) -> Array3<f32> {
            batch.clone()
        }
    }

    fn series(values: &[f64], seq_len: usize, stride: usize) -> WindowedSeries {
        let t0 = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let samples: Vec<Sample> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample::new(t0 + Duration::minutes(i as i64), v))
            .collect();
        WindowedSeries::from_samples(1, &samples, seq_len, stride, None).unwrap()
    }

    #[test]
    fn test_overlap_averaging() {
        let s = series(&[1.0, 2.0, 3.0, 4.0, 5.0], 3, 1);
        let profile = reconstruct_series(&s, &Constant(0.0), 2).unwrap();

        assert_eq!(profile.coverage, vec![1, 2, 3, 2, 1]);
        assert_eq!(profile.prediction, vec![0.0; 5]);
        assert_eq!(profile.error, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_identity_has_zero_error() {
        let s = series(&[0.5, -1.0, 2.0, 8.0, 1.0, 0.0], 2, 2);
        let profile = reconstruct_series(&s, &Identity, 32).unwrap();

        assert!(profile.error.iter().all(|e| *e == 0.0));
        assert_eq!(profile.prediction, vec![0.5, -1.0, 2.0, 8.0, 1.0, 0.0]);
    }

    #[test]
    fn test_stride_leaves_tail_uncovered() {
        let s = series(&[1.0; 8], 3, 2);
        let profile = reconstruct_series(&s, &Constant(1.0), 4).unwrap();

        // windows start at 0, 2, 4 and cover indices 0..=6
        assert_eq!(profile.coverage, vec![1, 1, 2, 1, 2, 1, 1, 0]);
        assert_eq!(profile.uncovered(), 1);
        assert!(profile.error[7].is_nan());
        assert!(!outlier_mask(&profile.error, 3.5)[7]);
    }

    #[test]
    fn test_spike_is_flagged() {
        let mut values: Vec<f64> = (0..60).map(|i| 1.0 + 0.01 * (1 + i % 5) as f64).collect();
        values[30] = 25.0;

        let s = series(&values, 8, 1);
        let profile = reconstruct_series(&s, &Constant(1.0), 16).unwrap();
        let mask = outlier_mask(&profile.error, 3.5);

        assert!(mask[30]);
        assert_eq!(mask.iter().filter(|m| **m).count(), 1);
    }

    #[test]
    fn test_lower_median() {
        assert_eq!(lower_median(&[4.0, 1.0, 3.0, 2.0]), 2.0);
        assert_eq!(lower_median(&[5.0, 1.0, 3.0]), 3.0);
    }

    #[test]
    fn test_modified_z_scores_known_values() {
        // log errors: ln(e + 1e-6) is close to 0, 1, 2, 3, 4
        let error: Vec<f64> = (0..5).map(|k| (k as f64).exp() - LOG_EPS).collect();
        let z = modified_z_scores(&error);

        // median 2, MAD 1
        for (k, score) in z.iter().enumerate() {
            let expected = MAD_CONSISTENCY * (k as f64 - 2.0);
            assert!((score - expected).abs() < 1e-6, "{} vs {}", score, expected);
        }
    }

    #[test]
    fn test_constant_error_flags_nothing() {
        let mask = outlier_mask(&[0.2; 10], 3.5);
        assert!(mask.iter().all(|m| !m));
    }
}

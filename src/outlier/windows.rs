//! Fixed-length sliding windows over a stored dataset

use chrono::{DateTime, Utc};
use ndarray::{Array2, Array3};

use crate::error::{PipelineError, PipelineResult};
use crate::models::Sample;
use crate::storage::AnalysisStore;
use super::scaler::{FittedScaler, Scaler};

/// Ordered, optionally normalized values of one dataset viewed as
/// overlapping windows of `sequence_length` samples spaced `stride` apart.
#[derive(Debug, Clone)]
pub struct WindowedSeries {
    dataset_id: i64,
    sequence_length: usize,
    stride: usize,
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f32>,
    scaler: Option<FittedScaler>,
    num_windows: usize,
}

impl WindowedSeries {
    /// Load every sample of the dataset and build the window view.
    ///
    /// A missing dataset and a dataset without samples fail with different
    /// errors; existence is only queried when no samples came back.
    pub async fn load(
        store: &dyn AnalysisStore,
        dataset_id: i64,
        sequence_length: usize,
        stride: usize,
        scaler: Option<Scaler>,
    ) -> PipelineResult<Self> {
        let samples = store.get_ordered_samples(dataset_id).await?;

        if samples.is_empty() {
            if !store.dataset_exists(dataset_id).await? {
                return Err(PipelineError::NotFound(dataset_id));
            }
            return Err(PipelineError::EmptyData(dataset_id));
        }

        Self::from_samples(dataset_id, &samples, sequence_length, stride, scaler)
    }

    /// Build from samples already ordered by time
    pub fn from_samples(
        dataset_id: i64,
        samples: &[Sample],
        sequence_length: usize,
        stride: usize,
        scaler: Option<Scaler>,
    ) -> PipelineResult<Self> {
        if sequence_length == 0 || stride == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "sequence_length and stride must be > 0, got {} and {}",
                sequence_length, stride
            )));
        }
        if samples.is_empty() {
            return Err(PipelineError::EmptyData(dataset_id));
        }

        let timestamps: Vec<DateTime<Utc>> = samples.iter().map(|s| s.time).collect();
        let raw: Vec<f64> = samples.iter().map(|s| s.value).collect();

        let fitted = scaler.map(|s| s.fit(&raw));
        let values = match &fitted {
            Some(fitted) => fitted.transform(&raw),
            None => raw.iter().map(|&v| v as f32).collect(),
        };

        let num_windows = if values.len() < sequence_length {
            0
        } else {
            (values.len() - sequence_length) / stride + 1
        };

        tracing::debug!(
            dataset_id,
            samples = values.len(),
            num_windows,
            scaled = fitted.is_some(),
            "Windowed series loaded"
        );

        Ok(Self {
            dataset_id,
            sequence_length,
            stride,
            timestamps,
            values,
            scaler: fitted,
            num_windows,
        })
    }

    pub fn dataset_id(&self) -> i64 {
        self.dataset_id
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of windows
    pub fn len(&self) -> usize {
        self.num_windows
    }

    pub fn is_empty(&self) -> bool {
        self.num_windows == 0
    }

    /// Number of underlying samples
    pub fn num_samples(&self) -> usize {
        self.values.len()
    }

    /// All sample timestamps in order
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// All (scaled) values in order
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Scaler fit on this dataset, if normalization was requested
    pub fn scaler(&self) -> Option<&FittedScaler> {
        self.scaler.as_ref()
    }

    /// Sample index where window `idx` starts
    pub fn window_start(&self, idx: usize) -> PipelineResult<usize> {
        if idx >= self.num_windows {
            return Err(PipelineError::IndexRange { index: idx, len: self.num_windows });
        }
        Ok(idx * self.stride)
    }

    /// Window values shaped `(sequence_length, 1)`
    pub fn get_window(&self, idx: usize) -> PipelineResult<Array2<f32>> {
        let start = self.window_start(idx)?;
        let window = self.values[start..start + self.sequence_length].to_vec();
        Ok(Array2::from_shape_vec((self.sequence_length, 1), window)?)
    }

    /// Timestamps of window `idx`
    pub fn get_timestamps(&self, idx: usize) -> PipelineResult<&[DateTime<Utc>]> {
        let start = self.window_start(idx)?;
        Ok(&self.timestamps[start..start + self.sequence_length])
    }

    /// Stack windows into a `(batch, sequence_length, 1)` tensor
    pub fn batch(&self, indices: &[usize]) -> PipelineResult<Array3<f32>> {
        let mut batch = Array3::<f32>::zeros((indices.len(), self.sequence_length, 1));

        for (row, &idx) in indices.iter().enumerate() {
            let start = self.window_start(idx)?;
            let window = &self.values[start..start + self.sequence_length];
            for (pos, &value) in window.iter().enumerate() {
                batch[[row, pos, 0]] = value;
            }
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use crate::outlier::scaler::Normalization;

    fn samples(values: &[f64]) -> Vec<Sample> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        values.iter()
            .enumerate()
            .map(|(i, &v)| Sample::new(t0 + Duration::seconds(60 * i as i64), v))
            .collect()
    }

    fn ramp(n: usize) -> Vec<Sample> {
        samples(&(0..n).map(|i| i as f64).collect::<Vec<_>>())
    }

    #[test]
    fn test_window_count_formula() {
        for n in 1..40usize {
            for l in 1..12usize {
                for s in 1..6usize {
                    let series = WindowedSeries::from_samples(1, &ramp(n), l, s, None).unwrap();
                    let expected = if n < l { 0 } else { (n - l) / s + 1 };
                    assert_eq!(series.len(), expected, "n={} l={} s={}", n, l, s);

                    for idx in 0..series.len() {
                        assert!(series.get_window(idx).is_ok());
                    }
                    assert!(matches!(
                        series.get_window(series.len()),
                        Err(PipelineError::IndexRange { .. })
                    ));
                }
            }
        }
    }

    #[test]
    fn test_get_window_and_timestamps() {
        let data = ramp(10);
        let series = WindowedSeries::from_samples(1, &data, 4, 3, None).unwrap();

        assert_eq!(series.len(), 3);
        let window = series.get_window(2).unwrap();
        assert_eq!(window.dim(), (4, 1));
        assert_eq!(window.column(0).to_vec(), vec![6.0f32, 7.0, 8.0, 9.0]);

        let stamps = series.get_timestamps(1).unwrap();
        assert_eq!(stamps.len(), 4);
        assert_eq!(stamps[0], data[3].time);
        assert_eq!(stamps[3], data[6].time);

        assert!(matches!(
            series.get_timestamps(3),
            Err(PipelineError::IndexRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_consecutive_windows_overlap() {
        let (l, s) = (8, 3);
        let series = WindowedSeries::from_samples(1, &ramp(30), l, s, None).unwrap();

        for k in 0..series.len() - 1 {
            let a = series.get_window(k).unwrap().column(0).to_vec();
            let b = series.get_window(k + 1).unwrap().column(0).to_vec();
            assert_eq!(&a[s..], &b[..l - s]);
        }
    }

    #[test]
    fn test_too_short_series_has_no_windows() {
        let series = WindowedSeries::from_samples(1, &ramp(5), 16, 1, None).unwrap();
        assert!(series.is_empty());
        assert!(series.get_window(0).is_err());
    }

    #[test]
    fn test_empty_samples_rejected() {
        let err = WindowedSeries::from_samples(4, &[], 4, 1, None).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyData(4)));
    }

    #[test]
    fn test_zero_stride_rejected() {
        let err = WindowedSeries::from_samples(4, &ramp(10), 4, 0, None).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_batch_layout() {
        let series = WindowedSeries::from_samples(1, &ramp(12), 4, 2, None).unwrap();
        let batch = series.batch(&[3, 0]).unwrap();

        assert_eq!(batch.dim(), (2, 4, 1));
        assert_eq!(batch[[0, 0, 0]], 6.0);
        assert_eq!(batch[[1, 3, 0]], 3.0);
        assert!(series.batch(&[5]).is_err());
    }

    #[test]
    fn test_scaler_fit_per_dataset() {
        let a = samples(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let b = samples(&[100.0, 250.0, 130.0, 900.0, 120.0, 110.0, 140.0, 115.0]);
        let scaler = Normalization::Zscore.scaler();

        let series_a = WindowedSeries::from_samples(1, &a, 4, 1, scaler).unwrap();
        let series_b = WindowedSeries::from_samples(2, &b, 4, 1, scaler).unwrap();

        let fit_a = series_a.scaler().unwrap();
        let fit_b = series_b.scaler().unwrap();
        assert_ne!(fit_a.center, fit_b.center);
        assert_ne!(fit_a.scale, fit_b.scale);

        // Each fit only reflects its own data
        let own_a = scaler.unwrap().fit(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(fit_a, &own_a);
        assert!((series_a.values().iter().sum::<f32>()).abs() < 1e-5);
    }

    #[test]
    fn test_load_from_store() {
        use crate::storage::MemoryStore;

        let store = MemoryStore::new();
        let series = tokio_test::block_on(async {
            let dataset = store.create_dataset("ramp", None).await.unwrap();
            store.insert_samples(dataset.id, &ramp(12)).await.unwrap();
            WindowedSeries::load(&store, dataset.id, 4, 4, None).await
        })
        .unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series.get_window(2).unwrap().column(0).to_vec(), vec![8.0f32, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_unscaled_values_pass_through() {
        let series = WindowedSeries::from_samples(1, &samples(&[0.5, -1.25, 3.0]), 2, 1, None).unwrap();
        assert!(series.scaler().is_none());
        assert_eq!(series.values(), &[0.5f32, -1.25, 3.0]);
    }
}

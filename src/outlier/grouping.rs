//! Merge flagged timestamps into anomaly intervals

use chrono::{DateTime, Duration, Utc};

use crate::models::NewAnomaly;

/// Group ordered timestamps into `(start, end)` runs where each consecutive
/// gap equals `spacing` exactly.
pub fn group_timestamps(
    timestamps: &[DateTime<Utc>],
    spacing: Duration,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let Some((&first, rest)) = timestamps.split_first() else {
        return Vec::new();
    };

    let mut groups = Vec::new();
    let (mut start, mut end) = (first, first);

    for &ts in rest {
        if ts - end == spacing {
            end = ts;
        } else {
            groups.push((start, end));
            start = ts;
            end = ts;
        }
    }
    groups.push((start, end));

    groups
}

/// Turn an outlier mask over the series timestamps into point anomalies.
///
/// The nominal spacing is the gap between the first two timestamps. Series
/// with fewer than two timestamps give one interval per flagged timestamp.
pub fn group_anomalies(
    analysis_id: i64,
    timestamps: &[DateTime<Utc>],
    outlier_mask: &[bool],
) -> Vec<NewAnomaly> {
    let flagged: Vec<DateTime<Utc>> = timestamps
        .iter()
        .zip(outlier_mask)
        .filter_map(|(&ts, &is_outlier)| is_outlier.then_some(ts))
        .collect();

    let intervals = match timestamps {
        [t0, t1, ..] => {
            let spacing = *t1 - *t0;
            if !is_regular(timestamps, spacing) {
                tracing::warn!(
                    analysis_id,
                    spacing_secs = spacing.num_seconds(),
                    "Irregular sample spacing, anomaly intervals may be split"
                );
            }
            group_timestamps(&flagged, spacing)
        }
        _ => flagged.iter().map(|&ts| (ts, ts)).collect(),
    };

    intervals
        .into_iter()
        .map(|(start, end)| NewAnomaly::point(analysis_id, start, end))
        .collect()
}

fn is_regular(timestamps: &[DateTime<Utc>], spacing: Duration) -> bool {
    timestamps.windows(2).all(|pair| pair[1] - pair[0] == spacing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crate::models::AnomalyType;

    fn minutes(n: i64) -> Vec<DateTime<Utc>> {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        (0..n).map(|i| t0 + Duration::seconds(60 * i)).collect()
    }

    #[test]
    fn test_group_mask_into_intervals() {
        let ts = minutes(7);
        let mask = [true, true, false, true, true, true, false];

        let anomalies = group_anomalies(9, &ts, &mask);

        assert_eq!(anomalies.len(), 2);
        assert_eq!((anomalies[0].start, anomalies[0].end), (ts[0], ts[1]));
        assert_eq!((anomalies[1].start, anomalies[1].end), (ts[3], ts[5]));
        assert!(anomalies.iter().all(|a| a.analysis_id == 9));
        assert!(anomalies.iter().all(|a| a.anomaly_type == AnomalyType::Point));
    }

    #[test]
    fn test_no_outliers_no_intervals() {
        let ts = minutes(5);
        assert!(group_anomalies(1, &ts, &[false; 5]).is_empty());
        assert!(group_timestamps(&[], Duration::seconds(60)).is_empty());
    }

    #[test]
    fn test_single_flag_is_point_interval() {
        let ts = minutes(4);
        let anomalies = group_anomalies(1, &ts, &[false, false, true, false]);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].start, anomalies[0].end);
    }

    #[test]
    fn test_single_timestamp_series() {
        let ts = minutes(1);
        let anomalies = group_anomalies(3, &ts, &[true]);
        assert_eq!(anomalies.len(), 1);
        assert_eq!((anomalies[0].start, anomalies[0].end), (ts[0], ts[0]));

        assert!(group_anomalies(3, &[], &[]).is_empty());
    }

    #[test]
    fn test_irregular_gap_splits_run() {
        let mut ts = minutes(5);
        ts[3] = ts[3] + Duration::seconds(30);
        ts[4] = ts[4] + Duration::seconds(30);

        let groups = group_timestamps(&ts, Duration::seconds(60));
        assert_eq!(groups, vec![(ts[0], ts[2]), (ts[3], ts[4])]);
    }

    #[test]
    fn test_all_flagged_is_one_interval() {
        let ts = minutes(10);
        let anomalies = group_anomalies(2, &ts, &[true; 10]);
        assert_eq!(anomalies.len(), 1);
        assert_eq!((anomalies[0].start, anomalies[0].end), (ts[0], ts[9]));
    }
}

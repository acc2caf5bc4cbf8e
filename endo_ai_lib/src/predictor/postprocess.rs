use std::collections::BTreeMap;

use eyre::Result;
use tracing::{debug, warn};

use crate::{
    config::PostprocessConfig, error::PipelineError, predictor::classifier::PredictionVector,
};

/// Inclusive `(start, end)` positions of a run of `true` frames.
pub type Sequence = (usize, usize);

/// Label name to its detected sequences.
pub type SequenceMap = BTreeMap<String, Vec<Sequence>>;

/// Label name to one probability per frame.
pub type LabelSeries = BTreeMap<String, Vec<f32>>;

/// Turns per-frame vectors into one series per label.
///
/// The label set comes from the first vector and every other vector must
/// carry exactly the same labels.
pub fn aggregate_predictions(predictions: &[PredictionVector]) -> Result<LabelSeries> {
    let Some(first) = predictions.first() else {
        return Ok(LabelSeries::new());
    };
    let labels: Vec<String> = first.keys().cloned().collect();
    aggregate_with_labels(&labels, predictions)
}

/// Like [`aggregate_predictions`] with a fixed label vocabulary.
///
/// With no predictions every label maps to an empty series.
pub fn aggregate_with_labels(
    labels: &[String],
    predictions: &[PredictionVector],
) -> Result<LabelSeries> {
    let mut series: LabelSeries = labels
        .iter()
        .map(|label| (label.clone(), Vec::with_capacity(predictions.len())))
        .collect();

    for (frame, prediction) in predictions.iter().enumerate() {
        if let Some(extra) = prediction.keys().find(|label| !series.contains_key(*label)) {
            return Err(PipelineError::UnexpectedLabel {
                frame,
                label: extra.clone(),
            }
            .into());
        }

        for (label, values) in series.iter_mut() {
            let value = prediction
                .get(label)
                .ok_or_else(|| PipelineError::MissingLabel {
                    frame,
                    label: label.clone(),
                })?;
            values.push(*value);
        }
    }

    Ok(series)
}

/// Number of frames covered by a smoothing window of `window_s` seconds.
///
/// Always within `[1, len]`, and 1 for an empty series.
pub fn window_frames(window_s: f64, fps: f64, len: usize) -> usize {
    let frames = (window_s * fps).round();
    let frames = if frames.is_finite() && frames >= 1.0 {
        frames as usize
    } else {
        1
    };
    frames.clamp(1, len.max(1))
}

/// Centered moving average over a `window_s` second window.
///
/// Near the ends the window shrinks to the frames that exist instead of
/// padding, so boundary values are not pulled towards zero. For an even
/// window `w` frame `i` averages `i - w/2 ..= i + w/2 - 1`.
pub fn smooth_predictions(series: &[f32], window_s: f64, fps: f64) -> Result<Vec<f32>> {
    if !window_s.is_finite() || window_s <= 0.0 {
        return Err(PipelineError::InvalidConfig(format!(
            "smoothing window must be positive, got {window_s}s"
        ))
        .into());
    }
    if !fps.is_finite() || fps <= 0.0 {
        return Err(PipelineError::InvalidConfig(format!("fps must be positive, got {fps}")).into());
    }

    if let Some((index, &value)) = series.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(PipelineError::NonFiniteValue { index, value }.into());
    }

    let len = series.len();
    let window = window_frames(window_s, fps, len);
    if window == 1 {
        return Ok(series.to_vec());
    }

    let before = window / 2;
    let after = window - 1 - before;

    Ok((0..len)
        .map(|i| {
            let start = i.saturating_sub(before);
            let end = (i + after).min(len - 1);
            let values = &series[start..=end];
            values.iter().sum::<f32>() / values.len() as f32
        })
        .collect())
}

/// `value > threshold` for every frame.
pub fn binarize(series: &[f32], threshold: f32) -> Vec<bool> {
    series.iter().map(|&value| value > threshold).collect()
}

/// Finds every maximal run of `true`, in order.
pub fn find_true_sequences(flags: &[bool]) -> Vec<Sequence> {
    let mut sequences = Vec::new();
    let mut inside_run = false;
    let mut start_idx = 0;

    for (idx, &flag) in flags.iter().enumerate() {
        match (flag, inside_run) {
            (true, false) => {
                start_idx = idx;
                inside_run = true;
            }
            (false, true) => {
                sequences.push((start_idx, idx - 1));
                inside_run = false;
            }
            _ => continue,
        }
    }

    // Run reaching the last frame
    if inside_run {
        sequences.push((start_idx, flags.len() - 1));
    }

    sequences
}

/// Drops sequences shorter than `min_len` frames.
pub fn filter_short_sequences(sequences: Vec<Sequence>, min_len: usize) -> Vec<Sequence> {
    if min_len <= 1 {
        return sequences;
    }
    sequences
        .into_iter()
        .filter(|&(start, end)| end - start + 1 >= min_len)
        .collect()
}

/// Smooths, thresholds and extracts the sequences of every label.
///
/// The configuration is validated before any series is touched.
pub fn extract_sequences(
    labels: &[String],
    predictions: &[PredictionVector],
    config: &PostprocessConfig,
) -> Result<SequenceMap> {
    config.validate()?;

    let series = aggregate_with_labels(labels, predictions)?;
    if predictions.is_empty() {
        warn!("No predictions, every label gets an empty sequence list");
    }

    let window = window_frames(config.smooth_window_s, config.fps, predictions.len());
    let min_len = config.min_seq_len_frames();
    debug!(
        "Smoothing window {} frames, threshold {}, minimum sequence {} frames",
        window, config.threshold, min_len
    );

    let mut sequence_map = SequenceMap::new();
    for (label, values) in &series {
        let smooth = smooth_predictions(values, config.smooth_window_s, config.fps)?;
        let flags = binarize(&smooth, config.threshold);
        let sequences = filter_short_sequences(find_true_sequences(&flags), min_len);
        debug!("{label}: {} sequences", sequences.len());
        sequence_map.insert(label.clone(), sequences);
    }

    Ok(sequence_map)
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: bool = true;
    const F: bool = false;

    fn vector(values: &[(&str, f32)]) -> PredictionVector {
        values.iter().map(|&(l, v)| (l.to_owned(), v)).collect()
    }

    #[test]
    fn test_find_true_sequences() {
        assert_eq!(
            find_true_sequences(&[F, T, T, F, T, F, F, T, T, T]),
            vec![(1, 2), (4, 4), (7, 9)]
        );
        assert_eq!(find_true_sequences(&[F; 5]), vec![]);
        assert_eq!(find_true_sequences(&[T; 3]), vec![(0, 2)]);
        assert_eq!(find_true_sequences(&[T]), vec![(0, 0)]);
        assert_eq!(find_true_sequences(&[]), vec![]);
    }

    #[test]
    fn test_binarize_is_strict() {
        assert_eq!(binarize(&[0.5, 0.500_001, 0.2, 1.0], 0.5), vec![F, T, F, T]);
        assert_eq!(binarize(&[], 0.5), Vec::<bool>::new());
    }

    #[test]
    fn test_aggregate() {
        let predictions = vec![
            vector(&[("outside", 0.1), ("polyp", 0.7)]),
            vector(&[("outside", 0.2), ("polyp", 0.8)]),
            vector(&[("outside", 0.3), ("polyp", 0.9)]),
        ];
        let series = aggregate_predictions(&predictions).unwrap();

        assert_eq!(series.len(), 2);
        for (label, values) in &series {
            for (i, value) in values.iter().enumerate() {
                assert_eq!(*value, predictions[i][label]);
            }
        }
    }

    #[test]
    fn test_aggregate_rejects_missing_label() {
        let predictions = vec![
            vector(&[("outside", 0.1), ("polyp", 0.7)]),
            vector(&[("outside", 0.2)]),
        ];
        let err = aggregate_predictions(&predictions).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingLabel { frame: 1, label }) if label == "polyp"
        ));
    }

    #[test]
    fn test_aggregate_rejects_extra_label() {
        let predictions = vec![
            vector(&[("outside", 0.1)]),
            vector(&[("outside", 0.2), ("blood", 0.4)]),
        ];
        let err = aggregate_predictions(&predictions).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::UnexpectedLabel { frame: 1, label }) if label == "blood"
        ));
    }

    #[test]
    fn test_aggregate_empty() {
        assert!(aggregate_predictions(&[]).unwrap().is_empty());

        let labels = vec!["outside".to_owned(), "polyp".to_owned()];
        let series = aggregate_with_labels(&labels, &[]).unwrap();
        assert_eq!(series.len(), 2);
        assert!(series.values().all(Vec::is_empty));
    }

    #[test]
    fn test_window_frames() {
        assert_eq!(window_frames(1.0, 50.0, 1000), 50);
        assert_eq!(window_frames(1.0, 50.0, 10), 10);
        assert_eq!(window_frames(0.001, 50.0, 10), 1);
        assert_eq!(window_frames(1.0, 50.0, 0), 1);
        assert_eq!(window_frames(0.25, 30.0, 100), 8);
    }

    #[test]
    fn test_smooth_keeps_length_and_truncates_edges() {
        let series = [0.0, 3.0, 6.0, 9.0, 12.0];
        // 3 frame window
        let smooth = smooth_predictions(&series, 3.0, 1.0).unwrap();
        assert_eq!(smooth.len(), series.len());
        assert_eq!(smooth, vec![1.5, 3.0, 6.0, 9.0, 10.5]);

        // 2 frame window: i-1 ..= i
        let smooth = smooth_predictions(&series, 2.0, 1.0).unwrap();
        assert_eq!(smooth, vec![0.0, 1.5, 4.5, 7.5, 10.5]);
    }

    #[test]
    fn test_smooth_window_of_one_is_identity() {
        let series = [0.1, 0.9, 0.3, 0.7];
        assert_eq!(smooth_predictions(&series, 0.01, 50.0).unwrap(), series.to_vec());
    }

    #[test]
    fn test_smooth_window_larger_than_series() {
        let series = [1.0, 2.0, 3.0];
        let smooth = smooth_predictions(&series, 10.0, 50.0).unwrap();
        assert_eq!(smooth.len(), 3);
        // window clamps to 3: i-1 ..= i+1
        assert_eq!(smooth, vec![1.5, 2.0, 2.5]);
    }

    #[test]
    fn test_smooth_rejects_bad_parameters() {
        for (window, fps) in [(0.0, 50.0), (-1.0, 50.0), (1.0, 0.0), (1.0, f64::NAN)] {
            let err = smooth_predictions(&[0.5], window, fps).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PipelineError>(),
                Some(PipelineError::InvalidConfig(_))
            ));
        }
        assert!(smooth_predictions(&[], 1.0, 50.0).unwrap().is_empty());
    }

    #[test]
    fn test_smooth_rejects_non_finite_values() {
        let cases: [(&[f32], f64, f64, usize); 4] = [
            (&[f32::NAN, 0.5, 0.5], 1.0, 2.0, 0),
            (&[0.5, f32::INFINITY], 1.0, 1.0, 1),
            // window of one frame skips the averaging entirely
            (&[0.5, 0.5, f32::NEG_INFINITY], 0.01, 50.0, 2),
            (&[0.1, f32::NAN], 0.01, 50.0, 1),
        ];
        for (series, window, fps, bad) in cases {
            let err = smooth_predictions(series, window, fps).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PipelineError>(),
                Some(PipelineError::NonFiniteValue { index, .. }) if *index == bad
            ));
        }
    }

    #[test]
    fn test_plateau_is_recovered() {
        let series: Vec<f32> = (0..300)
            .map(|i| if (100..150).contains(&i) { 0.9 } else { 0.1 })
            .collect();
        let window = window_frames(1.0, 50.0, series.len());
        assert_eq!(window, 50);

        let smooth = smooth_predictions(&series, 1.0, 50.0).unwrap();
        let sequences = find_true_sequences(&binarize(&smooth, 0.5));
        assert_eq!(sequences.len(), 1);

        let (start, end) = sequences[0];
        assert!(start.abs_diff(100) <= window / 2);
        assert!(end.abs_diff(149) <= window / 2);
        // With the truncated window a frame is above 0.5 once more than half of
        // its 50 frame window lies on the plateau: 101..=149, give or take the
        // exact tie at 25 frames.
        assert!((100..=101).contains(&start), "start {start}");
        assert!((149..=150).contains(&end), "end {end}");
    }

    #[test]
    fn test_filter_short_sequences() {
        let sequences = vec![(0, 0), (3, 5), (10, 19)];
        assert_eq!(filter_short_sequences(sequences.clone(), 0), sequences);
        assert_eq!(filter_short_sequences(sequences.clone(), 3), vec![(3, 5), (10, 19)]);
        assert_eq!(filter_short_sequences(sequences, 4), vec![(10, 19)]);
    }

    #[test]
    fn test_extract_sequences_validates_first() {
        let config = PostprocessConfig {
            threshold: 2.0,
            ..Default::default()
        };
        // Inconsistent labels would also fail, the config error must win.
        let predictions = vec![vector(&[("polyp", 0.7)]), vector(&[])];
        let err = extract_sequences(&["polyp".to_owned()], &predictions, &config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_extract_sequences_empty_video() {
        let labels = vec!["outside".to_owned(), "polyp".to_owned()];
        let sequences = extract_sequences(&labels, &[], &PostprocessConfig::default()).unwrap();
        assert_eq!(sequences.len(), 2);
        assert!(sequences.values().all(Vec::is_empty));
    }

    #[test]
    fn test_extract_sequences() {
        let labels = vec!["outside".to_owned(), "polyp".to_owned()];
        let predictions: Vec<PredictionVector> = (0..20)
            .map(|i| {
                let outside = if i < 5 { 0.95 } else { 0.05 };
                let polyp = if (10..16).contains(&i) { 0.8 } else { 0.2 };
                vector(&[("outside", outside), ("polyp", polyp)])
            })
            .collect();
        let config = PostprocessConfig {
            fps: 1.0,
            smooth_window_s: 1.0,
            threshold: 0.5,
            min_seq_len_s: 0.0,
        };

        let sequences = extract_sequences(&labels, &predictions, &config).unwrap();
        assert_eq!(sequences["outside"], vec![(0, 4)]);
        assert_eq!(sequences["polyp"], vec![(10, 15)]);

        let config = PostprocessConfig {
            min_seq_len_s: 6.0,
            ..config
        };
        let sequences = extract_sequences(&labels, &predictions, &config).unwrap();
        assert!(sequences["outside"].is_empty());
        assert_eq!(sequences["polyp"], vec![(10, 15)]);
    }
}

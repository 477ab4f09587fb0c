//! Isolation-forest anomaly detector.
//!
//! An ensemble of random isolation trees is fitted on the standardized
//! history plus the current reading; points that isolate in few splits are
//! outliers. The forest is rebuilt for every call from a fixed seed, so the
//! same inputs always produce the same labels.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::anomaly::{AnomalyDetector, AnomalyResult, DetectorKind};
use super::stats::{negligible_spread, round_to};
use crate::models::{Parameter, SensorValues};

// ---

const FEATURES: usize = Parameter::ALL.len();
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

type Row = [f64; FEATURES];

#[derive(Debug, Clone)]
pub struct IsolationForestDetector {
    // ---
    pub n_trees: usize,
    pub max_samples: usize,
    /// Expected share of outliers; sets the labelling cut-off.
    pub contamination: f64,
    pub seed: u64,
    /// Fewest history rows before the forest is fitted.
    pub min_history: usize,
    /// Trailing labels that make up the score.
    pub label_window: usize,
}

impl Default for IsolationForestDetector {
    fn default() -> Self {
        IsolationForestDetector {
            n_trees: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: 42,
            min_history: 5,
            label_window: 20,
        }
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path(n: usize) -> f64 {
    // ---
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

fn build_tree(rows: &[&Row], depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
    // ---
    if rows.len() <= 1 || depth >= max_depth {
        return Node::Leaf { size: rows.len() };
    }

    let spread: Vec<(usize, f64, f64)> = (0..FEATURES)
        .filter_map(|f| {
            let lo = rows.iter().map(|r| r[f]).fold(f64::INFINITY, f64::min);
            let hi = rows.iter().map(|r| r[f]).fold(f64::NEG_INFINITY, f64::max);
            (lo < hi).then_some((f, lo, hi))
        })
        .collect();

    // All rows identical: cannot be separated further
    if spread.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = spread[rng.gen_range(0..spread.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left, right): (Vec<&Row>, Vec<&Row>) = rows.iter().copied().partition(|r| r[feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(&left, depth + 1, max_depth, rng)),
        right: Box::new(build_tree(&right, depth + 1, max_depth, rng)),
    }
}

fn path_length(node: &Node, row: &Row, depth: usize) -> f64 {
    // ---
    match node {
        Node::Leaf { size } => depth as f64 + average_path(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            let next = if row[*feature] < *threshold { left } else { right };
            path_length(next, row, depth + 1)
        }
    }
}

/// Rows for history then current; an absent channel reads as 0.
fn feature_matrix(history: &[SensorValues], current: &SensorValues) -> Vec<Row> {
    // ---
    history
        .iter()
        .chain(std::iter::once(current))
        .map(|values| {
            let mut row = [0.0; FEATURES];
            for (i, param) in Parameter::ALL.iter().enumerate() {
                row[i] = values.get(*param).unwrap_or(0.0);
            }
            row
        })
        .collect()
}

/// Scale each column to zero mean and unit variance. Constant columns become 0.
fn standardize(rows: &mut [Row]) {
    // ---
    let n = rows.len() as f64;
    for f in 0..FEATURES {
        let mean = rows.iter().map(|r| r[f]).sum::<f64>() / n;
        let sigma = (rows.iter().map(|r| (r[f] - mean).powi(2)).sum::<f64>() / n).sqrt();
        let constant = negligible_spread(sigma, mean);
        for row in rows.iter_mut() {
            row[f] = if constant { 0.0 } else { (row[f] - mean) / sigma };
        }
    }
}

/// Share of the trailing `window` labels that are outliers, as a percentage.
fn trailing_share(labels: &[bool], window: usize) -> f64 {
    // ---
    let window = window.min(labels.len());
    if window == 0 {
        return 0.0;
    }
    let flagged = labels[labels.len() - window..].iter().filter(|l| **l).count();
    flagged as f64 / window as f64 * 100.0
}

/// Linear-interpolated percentile, `q` in [0, 1].
fn percentile(sorted: &[f64], q: f64) -> f64 {
    // ---
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

impl IsolationForestDetector {
    // ---
    /// Outlier flag per row of `rows`.
    fn label(&self, rows: &[Row]) -> Vec<bool> {
        // ---
        let mut rng = StdRng::seed_from_u64(self.seed);
        let sample_size = self.max_samples.min(rows.len());
        let max_depth = (sample_size as f64).log2().ceil() as usize;

        let forest: Vec<Node> = (0..self.n_trees)
            .map(|_| {
                let picked: Vec<&Row> = rand::seq::index::sample(&mut rng, rows.len(), sample_size)
                    .into_iter()
                    .map(|i| &rows[i])
                    .collect();
                build_tree(&picked, 0, max_depth, &mut rng)
            })
            .collect();

        let norm = average_path(sample_size);
        let scores: Vec<f64> = rows
            .iter()
            .map(|row| {
                let mean_path =
                    forest.iter().map(|t| path_length(t, row, 0)).sum::<f64>() / forest.len() as f64;
                2f64.powf(-mean_path / norm)
            })
            .collect();

        let mut sorted = scores.clone();
        sorted.sort_by(f64::total_cmp);
        let cutoff = percentile(&sorted, 1.0 - self.contamination);

        scores.into_iter().map(|s| s > cutoff).collect()
    }
}

impl AnomalyDetector for IsolationForestDetector {
    fn detect(&self, history: &[SensorValues], current: &SensorValues) -> AnomalyResult {
        // ---
        if history.len() < self.min_history {
            tracing::debug!(
                rows = history.len(),
                needed = self.min_history,
                "isolation forest skipped: insufficient history"
            );
            return AnomalyResult::normal(DetectorKind::IsolationForest);
        }

        let mut rows = feature_matrix(history, current);
        standardize(&mut rows);
        let labels = self.label(&rows);

        let score = trailing_share(&labels, self.label_window);

        AnomalyResult {
            is_anomaly: labels.last().copied().unwrap_or(false),
            anomaly_score: round_to(score, 2),
            ..AnomalyResult::normal(DetectorKind::IsolationForest)
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn cluster(n: usize) -> Vec<SensorValues> {
        // ---
        (0..n)
            .map(|i| SensorValues {
                temperature: Some(65.0 + ((i % 5) as f64 - 2.0) * 0.5),
                pressure: Some(2.5 + (((i / 5) % 3) as f64 - 1.0) * 0.1),
                vibration: Some(2.5),
                flow: Some(120.0),
                rpm: Some(1450.0),
            })
            .collect()
    }

    #[test]
    fn test_short_history_is_normal() {
        // ---
        let detector = IsolationForestDetector::default();
        let result = detector.detect(&cluster(4), &cluster(1)[0]);
        assert!(!result.is_anomaly);
        assert_eq!(result.anomaly_score, 0.0);
        assert_eq!(result.method, DetectorKind::IsolationForest);
    }

    #[test]
    fn test_far_outlier_is_flagged() {
        // ---
        let detector = IsolationForestDetector::default();
        let current = SensorValues {
            temperature: Some(140.0),
            pressure: Some(9.0),
            vibration: Some(12.0),
            flow: Some(20.0),
            rpm: Some(3000.0),
        };

        let result = detector.detect(&cluster(30), &current);
        assert!(result.is_anomaly);
        assert!(result.anomaly_score > 0.0 && result.anomaly_score <= 100.0);
    }

    #[test]
    fn test_cluster_center_is_not_flagged() {
        // ---
        let detector = IsolationForestDetector::default();
        let center = SensorValues {
            temperature: Some(65.0),
            pressure: Some(2.5),
            vibration: Some(2.5),
            flow: Some(120.0),
            rpm: Some(1450.0),
        };

        let result = detector.detect(&cluster(30), &center);
        assert!(!result.is_anomaly);
    }

    #[test]
    fn test_fixed_seed_is_repeatable() {
        // ---
        let detector = IsolationForestDetector::default();
        let current = SensorValues {
            temperature: Some(70.0),
            ..Default::default()
        };
        let history = cluster(12);
        assert_eq!(detector.detect(&history, &current), detector.detect(&history, &current));
    }

    /// Labels the detector computes internally for `history` plus `current`.
    fn labels_for(detector: &IsolationForestDetector, history: &[SensorValues], current: &SensorValues) -> Vec<bool> {
        // ---
        let mut rows = feature_matrix(history, current);
        standardize(&mut rows);
        detector.label(&rows)
    }

    #[test]
    fn test_score_is_share_of_last_twenty_labels() {
        // ---
        let detector = IsolationForestDetector::default();
        let history = cluster(30);
        let current = SensorValues {
            temperature: Some(140.0),
            pressure: Some(9.0),
            vibration: Some(12.0),
            flow: Some(20.0),
            rpm: Some(3000.0),
        };

        let labels = labels_for(&detector, &history, &current);
        assert_eq!(labels.len(), 31);
        let flagged = labels[11..].iter().filter(|l| **l).count();

        let result = detector.detect(&history, &current);
        assert_eq!(result.anomaly_score, round_to(flagged as f64 / 20.0 * 100.0, 2));
    }

    #[test]
    fn test_short_matrix_uses_every_label() {
        // ---
        let detector = IsolationForestDetector::default();
        let history = cluster(5);
        let current = SensorValues {
            temperature: Some(90.0),
            ..cluster(1)[0]
        };

        let labels = labels_for(&detector, &history, &current);
        assert_eq!(labels.len(), 6);
        let flagged = labels.iter().filter(|l| **l).count();

        let result = detector.detect(&history, &current);
        assert_eq!(result.anomaly_score, round_to(flagged as f64 / 6.0 * 100.0, 2));
    }

    #[test]
    fn test_trailing_share() {
        // ---
        let labels = [true, false, false, true, true];
        assert_eq!(trailing_share(&labels, 20), 60.0);
        assert_eq!(trailing_share(&labels, 2), 100.0);
        assert_eq!(trailing_share(&labels[..3], 2), 0.0);
        assert_eq!(trailing_share(&[], 20), 0.0);
    }

    #[test]
    fn test_constant_column_standardizes_to_zero() {
        // ---
        let mut rows = feature_matrix(&cluster(10), &cluster(1)[0]);
        standardize(&mut rows);
        // Vibration (index 2) is 2.5 in every row
        assert!(rows.iter().all(|r| r[2] == 0.0));
        assert!(rows.iter().any(|r| r[0] != 0.0));
    }

    #[test]
    fn test_average_path() {
        // ---
        assert_eq!(average_path(1), 0.0);
        assert_eq!(average_path(2), 1.0);
        assert!(average_path(256) > average_path(16));
    }

    #[test]
    fn test_percentile_interpolates() {
        // ---
        let sorted = [0.0, 10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&sorted, 0.0), 0.0);
        assert_eq!(percentile(&sorted, 1.0), 40.0);
        assert!((percentile(&sorted, 0.9) - 36.0).abs() < 1e-9);
    }
}

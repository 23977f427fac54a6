// ============================================================
// Layer 5 — Metrics Aggregator
// ============================================================
// Accumulates (prediction, target) pairs across validation
// batches and reduces them to correlation statistics once per
// epoch.
//
//   update  — append a batch of pairs
//   compute — pure: reads the accumulated pairs, never mutates
//   reset   — clear, ready for the next epoch
//
// Two independent accumulators exist per run, one for the
// train subset (overfit monitor, prefix "train") and one for
// the validation set (prefix "val"). They never share storage.
//
// Reported per accumulator:
//   {prefix}_pearson   linear correlation
//   {prefix}_spearman  Pearson over average ranks
//   {prefix}_kendall   tau-b (tie-corrected)
// With fewer than two pairs every value is NaN.

use std::collections::BTreeMap;

// ─── Stream ───────────────────────────────────────────────────────────────────
/// Which held-out stream a validation batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    TrainSubset = 0,
    Validation  = 1,
}

impl Stream {
    pub fn prefix(&self) -> &'static str {
        match self {
            Stream::TrainSubset => "train",
            Stream::Validation  => "val",
        }
    }
}

// ─── RegressionMetrics ────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct RegressionMetrics {
    prefix:  String,
    preds:   Vec<f64>,
    targets: Vec<f64>,
}

impl RegressionMetrics {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), preds: Vec::new(), targets: Vec::new() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Pairs are matched by position; a length mismatch keeps the shorter.
    pub fn update(&mut self, preds: &[f32], targets: &[f32]) {
        for (p, t) in preds.iter().zip(targets) {
            self.preds.push(*p as f64);
            self.targets.push(*t as f64);
        }
    }

    pub fn len(&self) -> usize {
        self.preds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.preds.is_empty()
    }

    pub fn compute(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        out.insert(format!("{}_pearson", self.prefix), pearson(&self.preds, &self.targets));
        out.insert(format!("{}_spearman", self.prefix), spearman(&self.preds, &self.targets));
        out.insert(format!("{}_kendall", self.prefix), kendall_tau_b(&self.preds, &self.targets));
        out
    }

    pub fn reset(&mut self) {
        self.preds.clear();
        self.targets.clear();
    }
}

// ─── DualStreamMetrics ────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct DualStreamMetrics {
    streams: [RegressionMetrics; 2],
}

impl Default for DualStreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DualStreamMetrics {
    pub fn new() -> Self {
        Self {
            streams: [
                RegressionMetrics::new(Stream::TrainSubset.prefix()),
                RegressionMetrics::new(Stream::Validation.prefix()),
            ],
        }
    }

    pub fn get(&self, stream: Stream) -> &RegressionMetrics {
        &self.streams[stream as usize]
    }

    pub fn update(&mut self, stream: Stream, preds: &[f32], targets: &[f32]) {
        self.streams[stream as usize].update(preds, targets);
    }

    /// Both accumulators' values, merged. Prefixes keep the keys disjoint.
    pub fn compute_all(&self) -> BTreeMap<String, f64> {
        self.streams.iter().flat_map(|m| m.compute()).collect()
    }

    pub fn reset(&mut self) {
        self.streams.iter_mut().for_each(RegressionMetrics::reset);
    }
}

// ─── Statistics ───────────────────────────────────────────────────────────────
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mean_y = y[..n].iter().sum::<f64>() / n as f64;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y).take(n) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov   += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 { f64::NAN } else { cov / denom }
}

pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    pearson(&average_ranks(&x[..n]), &average_ranks(&y[..n]))
}

/// 1-based ranks; tied values share the mean of the ranks they span.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

pub fn kendall_tau_b(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let (mut concordant, mut discordant) = (0i64, 0i64);
    let (mut ties_x, mut ties_y) = (0i64, 0i64);
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];
            match (dx == 0.0, dy == 0.0) {
                (true, true)   => {}
                (true, false)  => ties_x += 1,
                (false, true)  => ties_y += 1,
                (false, false) => {
                    if (dx > 0.0) == (dy > 0.0) { concordant += 1 } else { discordant += 1 }
                }
            }
        }
    }
    let n_x = (concordant + discordant + ties_x) as f64;
    let n_y = (concordant + discordant + ties_y) as f64;
    let denom = (n_x * n_y).sqrt();
    if denom == 0.0 { f64::NAN } else { (concordant - discordant) as f64 / denom }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_two_pair_accumulation_then_reset() {
        let mut metrics = DualStreamMetrics::new();
        metrics.update(Stream::Validation, &[0.3, 0.7], &[0.2, 0.8]);

        let values = metrics.compute_all();
        assert!(close(values["val_pearson"], 1.0));
        assert!(close(values["val_spearman"], 1.0));
        assert!(close(values["val_kendall"], 1.0));
        assert!(values["train_pearson"].is_nan());

        metrics.reset();
        let values = metrics.compute_all();
        assert!(values["val_pearson"].is_nan());
        assert_eq!(metrics.get(Stream::Validation).len(), 0);
    }

    #[test]
    fn test_streams_are_isolated() {
        let mut metrics = DualStreamMetrics::new();
        metrics.update(Stream::TrainSubset, &[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]);
        metrics.update(Stream::Validation, &[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);

        assert_eq!(metrics.get(Stream::TrainSubset).len(), 3);
        assert_eq!(metrics.get(Stream::Validation).len(), 3);

        let values = metrics.compute_all();
        assert!(close(values["train_pearson"], -1.0));
        assert!(close(values["val_pearson"], 1.0));
        assert_eq!(values.len(), 6);
    }

    #[test]
    fn test_compute_is_pure() {
        let mut m = RegressionMetrics::new("val");
        m.update(&[0.1, 0.4, 0.2], &[0.0, 1.0, 0.5]);
        let first = m.compute();
        let second = m.compute();
        assert_eq!(first, second);
        assert_eq!(m.len(), 3);
    }

    #[test]
    fn test_single_pair_is_nan() {
        let mut m = RegressionMetrics::new("val");
        m.update(&[0.5], &[0.5]);
        assert!(m.compute().values().all(|v| v.is_nan()));
    }

    #[test]
    fn test_rank_statistics_with_ties() {
        assert_eq!(average_ranks(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);

        // Monotone but non-linear: rank statistics are perfect, Pearson is not.
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [1.0, 4.0, 9.0, 100.0];
        assert!(close(spearman(&x, &y), 1.0));
        assert!(close(kendall_tau_b(&x, &y), 1.0));
        assert!(pearson(&x, &y) < 1.0);
    }

    #[test]
    fn test_constant_series_is_nan() {
        assert!(pearson(&[1.0, 1.0, 1.0], &[0.0, 1.0, 2.0]).is_nan());
    }
}

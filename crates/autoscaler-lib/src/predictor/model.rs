//! Online-trained replica regressor
//!
//! A bagged ensemble of regression trees fit on (feature, replica) pairs the
//! decision engine records. The spread of per-tree predictions yields the
//! confidence signal that gates ML decisions. Model, scaler, and a tail of
//! recent training samples are persisted as JSON with an atomic replace.

use crate::models::FeatureVector;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Width of the model's feature subvector
pub const NUM_ML_FEATURES: usize = 12;

/// Labeled samples required before the first fit
pub const MIN_TRAINING_SAMPLES: usize = 20;

/// Refit cadence once the minimum is reached
const RETRAIN_EVERY: usize = 10;

/// Training samples kept on disk
const PERSISTED_SAMPLE_TAIL: usize = 100;

// Ensemble hyperparameters
const NUM_TREES: usize = 100;
const MAX_DEPTH: usize = 10;
const MIN_SAMPLES_SPLIT: usize = 5;
const MIN_SAMPLES_LEAF: usize = 2;

/// Fixed seed so refits on the same buffer reproduce the same ensemble
const TRAIN_SEED: u64 = 42;

/// Predictor statistics surface
#[derive(Debug, Clone, Serialize)]
pub struct PredictorStats {
    pub trained: bool,
    pub training_samples: usize,
    pub model_on_disk: bool,
    pub min_samples_needed: usize,
}

/// Per-feature standardization fit on the training matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    means: [f64; NUM_ML_FEATURES],
    stds: [f64; NUM_ML_FEATURES],
}

impl StandardScaler {
    fn fit(rows: &[[f64; NUM_ML_FEATURES]]) -> Self {
        let n = rows.len().max(1) as f64;
        let mut means = [0.0; NUM_ML_FEATURES];
        let mut stds = [0.0; NUM_ML_FEATURES];

        for row in rows {
            for (i, v) in row.iter().enumerate() {
                means[i] += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }
        for row in rows {
            for (i, v) in row.iter().enumerate() {
                stds[i] += (v - means[i]).powi(2);
            }
        }
        for s in &mut stds {
            *s = (*s / n).sqrt();
            // Constant columns pass through unscaled
            if *s < f64::EPSILON {
                *s = 1.0;
            }
        }

        Self { means, stds }
    }

    fn transform(&self, row: &[f64; NUM_ML_FEATURES]) -> [f64; NUM_ML_FEATURES] {
        let mut out = [0.0; NUM_ML_FEATURES];
        for i in 0..NUM_ML_FEATURES {
            out[i] = (row[i] - self.means[i]) / self.stds[i];
        }
        out
    }
}

/// One regression tree of the bagged ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, row: &[f64; NUM_ML_FEATURES]) -> f64 {
        match self {
            TreeNode::Leaf { value } => *value,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }
}

type Sample = ([f64; NUM_ML_FEATURES], f64);

/// Grow a CART regression tree by variance reduction
fn grow(samples: &[Sample], indices: &[usize], depth: usize) -> TreeNode {
    let node_mean =
        indices.iter().map(|&i| samples[i].1).sum::<f64>() / indices.len().max(1) as f64;

    if depth >= MAX_DEPTH || indices.len() < MIN_SAMPLES_SPLIT {
        return TreeNode::Leaf { value: node_mean };
    }

    let total_sum: f64 = indices.iter().map(|&i| samples[i].1).sum();
    let total_sq: f64 = indices.iter().map(|&i| samples[i].1.powi(2)).sum();
    let node_sse = total_sq - total_sum.powi(2) / indices.len() as f64;
    if node_sse < f64::EPSILON {
        return TreeNode::Leaf { value: node_mean };
    }

    let mut best: Option<(usize, f64, f64)> = None;

    for feature in 0..NUM_ML_FEATURES {
        let mut order = indices.to_vec();
        order.sort_by(|&a, &b| {
            samples[a].0[feature]
                .partial_cmp(&samples[b].0[feature])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for split in 1..order.len() {
            let label = samples[order[split - 1]].1;
            left_sum += label;
            left_sq += label.powi(2);

            let prev = samples[order[split - 1]].0[feature];
            let next = samples[order[split]].0[feature];
            if prev == next {
                continue;
            }
            if split < MIN_SAMPLES_LEAF || order.len() - split < MIN_SAMPLES_LEAF {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum.powi(2) / split as f64)
                + (right_sq - right_sum.powi(2) / (order.len() - split) as f64);

            if best.map(|(_, _, b)| sse < b).unwrap_or(true) {
                best = Some((feature, (prev + next) / 2.0, sse));
            }
        }
    }

    match best {
        None => TreeNode::Leaf { value: node_mean },
        Some((feature, threshold, _)) => {
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| samples[i].0[feature] <= threshold);
            TreeNode::Split {
                feature,
                threshold,
                left: Box::new(grow(samples, &left, depth + 1)),
                right: Box::new(grow(samples, &right, depth + 1)),
            }
        }
    }
}

/// Serialized model snapshot
#[derive(Debug, Serialize, Deserialize)]
struct ModelState {
    trees: Vec<TreeNode>,
    scaler: Option<StandardScaler>,
    training_samples: usize,
    trained: bool,
    features: Vec<[f64; NUM_ML_FEATURES]>,
    labels: Vec<f64>,
}

/// Replica-count regressor with online retraining and persistence
pub struct MLPredictor {
    model_path: PathBuf,
    trees: Vec<TreeNode>,
    scaler: Option<StandardScaler>,
    features: Vec<[f64; NUM_ML_FEATURES]>,
    labels: Vec<f64>,
    training_samples: usize,
    trained: bool,
}

impl MLPredictor {
    /// Create a predictor, restoring persisted state when the model file
    /// exists. A corrupt file is discarded and the predictor starts fresh.
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        let model_path = model_path.into();
        let mut predictor = Self {
            model_path,
            trees: Vec::new(),
            scaler: None,
            features: Vec::new(),
            labels: Vec::new(),
            training_samples: 0,
            trained: false,
        };

        if predictor.model_path.exists() {
            match Self::load(&predictor.model_path) {
                Ok(state) => {
                    predictor.trees = state.trees;
                    predictor.scaler = state.scaler;
                    predictor.features = state.features;
                    predictor.labels = state.labels;
                    predictor.training_samples = state.training_samples;
                    predictor.trained = state.trained;
                    info!(
                        path = %predictor.model_path.display(),
                        samples = predictor.training_samples,
                        trained = predictor.trained,
                        "Loaded persisted model"
                    );
                }
                Err(e) => {
                    warn!(
                        path = %predictor.model_path.display(),
                        error = %e,
                        "Failed to load persisted model, starting fresh"
                    );
                }
            }
        }

        predictor
    }

    /// The model's feature subvector, in training order
    pub fn ml_features(features: &FeatureVector) -> [f64; NUM_ML_FEATURES] {
        [
            features.cpu_current,
            features.memory_current,
            features.network_total,
            features.cpu_avg_15m,
            features.cpu_max_15m,
            features.cpu_min_15m,
            features.cpu_std_15m,
            features.memory_avg_15m,
            features.memory_max_15m,
            features.cpu_trend,
            features.cpu_trend_strength,
            features.pod_count,
        ]
    }

    /// Predict a replica count with an estimator-agreement confidence.
    /// Returns `(None, 0.0)` until the model is trained.
    pub fn predict(&self, features: &FeatureVector) -> (Option<i32>, f64) {
        if !self.trained || self.trees.is_empty() {
            return (None, 0.0);
        }
        let scaler = match &self.scaler {
            Some(s) => s,
            None => return (None, 0.0),
        };

        let row = scaler.transform(&Self::ml_features(features));
        let predictions: Vec<f64> = self.trees.iter().map(|t| t.predict(&row)).collect();

        let mu = predictions.iter().sum::<f64>() / predictions.len() as f64;
        let sigma = (predictions.iter().map(|p| (p - mu).powi(2)).sum::<f64>()
            / predictions.len() as f64)
            .sqrt();

        let replicas = (mu.round() as i32).max(1);
        let confidence = (1.0 - sigma / mu.max(1.0)).clamp(0.0, 1.0);

        debug!(replicas, confidence, "Model prediction");
        (Some(replicas), confidence)
    }

    /// Record a labeled sample; refits every 10 samples once 20 are buffered
    pub fn add_sample(&mut self, features: &FeatureVector, target_replicas: i32) {
        self.features.push(Self::ml_features(features));
        self.labels.push(target_replicas as f64);
        self.training_samples += 1;
        debug!(total = self.training_samples, "Added training sample");

        if self.training_samples >= MIN_TRAINING_SAMPLES
            && self.training_samples % RETRAIN_EVERY == 0
        {
            self.train();
        }
    }

    /// Fit the scaler and ensemble on the full buffered matrix.
    /// The previous model stays in place until the new one is complete.
    pub fn train(&mut self) -> bool {
        if self.features.len() < MIN_TRAINING_SAMPLES {
            warn!(
                samples = self.features.len(),
                needed = MIN_TRAINING_SAMPLES,
                "Not enough samples for training"
            );
            return false;
        }

        info!(samples = self.features.len(), "Training replica model");

        let scaler = StandardScaler::fit(&self.features);
        let samples: Vec<Sample> = self
            .features
            .iter()
            .map(|row| scaler.transform(row))
            .zip(self.labels.iter().copied())
            .collect();

        let mut rng = StdRng::seed_from_u64(TRAIN_SEED);
        let mut trees = Vec::with_capacity(NUM_TREES);
        for _ in 0..NUM_TREES {
            let indices: Vec<usize> = (0..samples.len())
                .map(|_| rng.gen_range(0..samples.len()))
                .collect();
            trees.push(grow(&samples, &indices, 0));
        }

        self.trees = trees;
        self.scaler = Some(scaler);
        self.trained = true;

        let r_squared = self.training_r_squared(&samples);
        info!(r_squared, "Model trained");

        if let Err(e) = self.save() {
            warn!(error = %e, "Failed to persist model");
        }
        true
    }

    /// Training-set R² of the fresh ensemble, for logging
    fn training_r_squared(&self, samples: &[Sample]) -> f64 {
        let label_mean = samples.iter().map(|(_, y)| y).sum::<f64>() / samples.len() as f64;
        let ss_tot: f64 = samples.iter().map(|(_, y)| (y - label_mean).powi(2)).sum();
        if ss_tot <= 0.0 {
            return 0.0;
        }
        let ss_res: f64 = samples
            .iter()
            .map(|(row, y)| {
                let pred =
                    self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64;
                (y - pred).powi(2)
            })
            .sum();
        1.0 - ss_res / ss_tot
    }

    pub fn stats(&self) -> PredictorStats {
        PredictorStats {
            trained: self.trained,
            training_samples: self.training_samples,
            model_on_disk: self.model_path.exists(),
            min_samples_needed: MIN_TRAINING_SAMPLES,
        }
    }

    /// Persist model state with a temp-file write and atomic rename
    fn save(&self) -> Result<()> {
        let tail = self.features.len().saturating_sub(PERSISTED_SAMPLE_TAIL);
        let state = ModelState {
            trees: self.trees.clone(),
            scaler: self.scaler.clone(),
            training_samples: self.training_samples,
            trained: self.trained,
            features: self.features[tail..].to_vec(),
            labels: self.labels[tail..].to_vec(),
        };

        if let Some(parent) = self.model_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
        }

        let json = serde_json::to_vec(&state).context("Failed to serialize model state")?;

        let temp_path = self.model_path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;
        file.write_all(&json).context("Failed to write model state")?;
        file.sync_all().context("Failed to sync model file")?;

        std::fs::rename(&temp_path, &self.model_path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, self.model_path))?;

        info!(path = %self.model_path.display(), "Model saved");
        Ok(())
    }

    fn load(path: &Path) -> Result<ModelState> {
        let mut file =
            File::open(path).with_context(|| format!("Failed to open model file {:?}", path))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .context("Failed to read model file")?;
        serde_json::from_slice(&data).context("Failed to deserialize model state")
    }
}

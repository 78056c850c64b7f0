//! Scaling decision fusion and dampening
//!
//! Fuses the rule-based estimate with the model's prediction under a
//! confidence gate, then applies the dampening rules that keep small or
//! noisy gaps from turning into scale actions. Non-trivial decisions are
//! fed back to the model as training labels.

use super::rules::{RuleEngine, Weights};
use crate::models::{Decision, DecisionSource, FeatureVector, ScaleAction, Scores};
use crate::predictor::{MLPredictor, PredictorStats};
use tracing::{debug, info};

/// Score above which an upward gap always scales
const SCALE_UP_SCORE: f64 = 60.0;

/// Score below which a downward gap always scales
const SCALE_DOWN_SCORE: f64 = 30.0;

/// Below this total score the model is never consulted, so the system
/// stays free to scale down aggressively
const FORCE_RULE_BASED_SCORE: f64 = 25.0;

/// Minimum model confidence before its estimate replaces the rules.
/// Exactly at the gate counts as too low.
const ML_CONFIDENCE_GATE: f64 = 0.6;

/// Replica gap that always scales, regardless of score
const LARGE_GAP_REPLICAS: i32 = 2;

/// Per-pod CPU under which a downward gap always scales
const VERY_IDLE_CPU_MCORES: f64 = 5.0;

/// CPU slope above which an upward gap always scales
const RAPID_TREND_SLOPE: f64 = 50.0;

/// Makes the per-cycle scaling decision
pub struct DecisionEngine {
    rules: RuleEngine,
    predictor: MLPredictor,
}

impl DecisionEngine {
    pub fn new(
        weights: Weights,
        min_replicas: i32,
        max_replicas: i32,
        predictor: MLPredictor,
    ) -> Self {
        let rules = RuleEngine::new(weights, min_replicas, max_replicas);
        info!(
            cpu = rules.weights().cpu,
            memory = rules.weights().memory,
            network = rules.weights().network,
            cost = rules.weights().cost,
            min_replicas,
            max_replicas,
            "Initialized decision engine"
        );
        Self { rules, predictor }
    }

    pub fn predictor_stats(&self) -> PredictorStats {
        self.predictor.stats()
    }

    /// Produce the full decision for one cycle's feature vector
    pub fn decide(&mut self, features: &FeatureVector) -> Decision {
        let current_replicas = features.pod_count as i32;

        let scores = self.rules.score(features);
        let rule_based_replicas = self.rules.optimal_replicas(features);
        let (ml_replicas, ml_confidence) = self.predictor.predict(features);

        let (optimal_replicas, decision_source) = if scores.total_score < FORCE_RULE_BASED_SCORE {
            debug!(
                total_score = scores.total_score,
                "Very low score, forcing rule-based estimate"
            );
            (rule_based_replicas, DecisionSource::RuleBased)
        } else if let Some(ml) = ml_replicas.filter(|_| ml_confidence > ML_CONFIDENCE_GATE) {
            (self.rules.clamp_replicas(ml), DecisionSource::MlModel)
        } else {
            (rule_based_replicas, DecisionSource::RuleBased)
        };

        let (should_scale, reason) =
            self.should_scale(current_replicas, optimal_replicas, &scores, features);

        let target_replicas = if should_scale {
            optimal_replicas
        } else {
            current_replicas
        };
        let action = if target_replicas > current_replicas {
            ScaleAction::ScaleUp
        } else if target_replicas < current_replicas {
            ScaleAction::ScaleDown
        } else {
            ScaleAction::NoChange
        };

        // Non-trivial decisions become training labels, so the model learns
        // to reproduce and generalize the deterministic estimator
        if action != ScaleAction::NoChange {
            self.predictor.add_sample(features, target_replicas);
        }

        let confidence = decision_confidence(&scores, features);

        info!(
            action = action.as_str(),
            current_replicas,
            target_replicas,
            total_score = scores.total_score,
            source = %decision_source,
            reason = %reason,
            "Scaling decision"
        );

        Decision {
            current_replicas,
            target_replicas,
            optimal_replicas,
            rule_based_replicas,
            ml_replicas,
            ml_confidence,
            decision_source,
            action,
            should_scale,
            reason,
            scores,
            confidence,
        }
    }

    /// Dampening: scale only when one of the six conditions holds
    fn should_scale(
        &self,
        current: i32,
        predicted: i32,
        scores: &Scores,
        features: &FeatureVector,
    ) -> (bool, String) {
        let gap = (predicted - current).abs();
        if gap >= LARGE_GAP_REPLICAS {
            return (true, format!("Large difference: {gap} pods"));
        }

        if scores.total_score > SCALE_UP_SCORE && predicted > current {
            return (true, format!("High load: score={:.1}", scores.total_score));
        }

        if scores.total_score < SCALE_DOWN_SCORE && predicted < current {
            return (true, format!("Low load: score={:.1}", scores.total_score));
        }

        let cpu_per_pod = if current > 0 {
            features.cpu_current / current as f64
        } else {
            features.cpu_current
        };
        if cpu_per_pod < VERY_IDLE_CPU_MCORES && predicted < current {
            return (true, format!("Very low CPU: {cpu_per_pod:.1}m per pod"));
        }

        if features.cpu_trend > RAPID_TREND_SLOPE && predicted > current {
            return (
                true,
                format!("Rapid CPU increase: trend={:.2}", features.cpu_trend),
            );
        }

        if predicted == self.rules.min_replicas() && scores.total_score < 10.0 {
            return (
                true,
                format!(
                    "At minimum with very low load: score={:.1}",
                    scores.total_score
                ),
            );
        }
        if predicted == self.rules.max_replicas() && scores.total_score > 90.0 {
            return (
                true,
                format!(
                    "At maximum with very high load: score={:.1}",
                    scores.total_score
                ),
            );
        }

        (false, "No scaling needed (dampening)".to_string())
    }
}

/// Overall decision confidence from score extremity and trend strength
fn decision_confidence(scores: &Scores, features: &FeatureVector) -> f64 {
    let score_confidence = if scores.total_score > 80.0 || scores.total_score < 20.0 {
        0.9
    } else if scores.total_score > 60.0 || scores.total_score < 40.0 {
        0.7
    } else {
        0.5
    };

    ((score_confidence + features.cpu_trend_strength) / 2.0).min(1.0)
}

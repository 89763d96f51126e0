//! Hybrid link fusion scoring.
//!
//! Normalizes the four retrieval signals, blends the weighted score with
//! reciprocal-rank fusion, and scales the result onto the point system the
//! ladder thresholds are written in.

use serde::{Deserialize, Serialize};

use crate::config::LinkingConfig;

/// Raw signals returned per candidate by the fused-retrieval procedure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FusionInputs {
    pub s_text: f64,
    pub s_vector: f64,
    pub s_recency: f64,
    pub s_bias: f64,
    pub rank_text: i32,
    pub rank_vector: i32,
}

pub const MAX_POINTS: i32 = 150;

/// Logistic normalization for raw cosine similarity.
pub fn logistic(raw: f64, mu: f64, sigma: f64) -> f64 {
    if sigma <= 0.0 {
        return if raw < mu { 0.0 } else { 1.0 };
    }
    let exponent = -(raw - mu) / sigma;
    // exp() overflows f64 around 709; clamp to the saturated ends instead.
    if exponent > 80.0 {
        return 0.0;
    }
    if exponent < -80.0 {
        return 1.0;
    }
    1.0 / (1.0 + exponent.exp())
}

/// Fused score in [0, 1]: `alpha * weighted + (1 - alpha) * rrf_scaled`.
pub fn fused_score(inputs: &FusionInputs, config: &LinkingConfig) -> f64 {
    let w = &config.hybrid_weights;

    let s_text = inputs.s_text.clamp(0.0, 1.0);
    let s_vector = logistic(inputs.s_vector, config.vector_mu, config.vector_sigma);
    let s_recency = inputs.s_recency.clamp(0.0, 1.0);
    let s_bias = inputs.s_bias.clamp(0.0, 1.0);

    let weighted = w.text * s_text + w.vector * s_vector + w.recency * s_recency + w.bias * s_bias;

    let k = config.rrf_k;
    let rrf = 1.0 / (k + f64::from(inputs.rank_text.max(1)))
        + 1.0 / (k + f64::from(inputs.rank_vector.max(1)));
    // Max possible is 2/(K+1), when both ranks are 1.
    let rrf_scaled = (rrf / (2.0 / (k + 1.0))).min(1.0);

    config.rrf_alpha * weighted + (1.0 - config.rrf_alpha) * rrf_scaled
}

/// Scale a fused score onto the ladder's point system, clamped to [0, 150].
pub fn to_points(fused: f64) -> i32 {
    ((fused * f64::from(MAX_POINTS)) as i32).clamp(0, MAX_POINTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> LinkingConfig {
        LinkingConfig::default()
    }

    fn inputs(s_text: f64, s_vector: f64, s_recency: f64, s_bias: f64) -> FusionInputs {
        FusionInputs { s_text, s_vector, s_recency, s_bias, rank_text: 1, rank_vector: 1 }
    }

    #[test]
    fn logistic_centers_at_mu() {
        let mid = logistic(0.72, 0.72, 0.05);
        assert!((mid - 0.5).abs() < 1e-9);
        assert!(logistic(0.9, 0.72, 0.05) > 0.95);
        assert!(logistic(0.5, 0.72, 0.05) < 0.05);
    }

    #[test]
    fn perfect_signals_hit_the_ceiling() {
        let score = fused_score(&inputs(1.0, 0.99, 1.0, 1.0), &cfg());
        assert!(score > 0.95, "{score}");
        assert_eq!(to_points(1.0), 150);
    }

    #[test]
    fn zero_signals_score_near_zero() {
        let zero = FusionInputs {
            s_text: 0.0,
            s_vector: 0.0,
            s_recency: 0.0,
            s_bias: 0.0,
            rank_text: 999_999,
            rank_vector: 999_999,
        };
        let score = fused_score(&zero, &cfg());
        assert!(score < 0.05, "{score}");
        assert_eq!(to_points(0.0), 0);
    }

    #[test]
    fn monotone_in_each_signal() {
        let base = inputs(0.5, 0.72, 0.5, 0.5);
        let cfg = cfg();
        let reference = fused_score(&base, &cfg);

        let mut better = base;
        better.s_text = 0.8;
        assert!(fused_score(&better, &cfg) > reference);

        let mut better = base;
        better.s_vector = 0.85;
        assert!(fused_score(&better, &cfg) > reference);

        let mut better = base;
        better.s_recency = 0.9;
        assert!(fused_score(&better, &cfg) > reference);

        let mut better = base;
        better.s_bias = 1.0;
        assert!(fused_score(&better, &cfg) > reference);

        let mut better = base;
        better.rank_text = 1;
        let mut worse = base;
        worse.rank_text = 50;
        assert!(fused_score(&better, &cfg) > fused_score(&worse, &cfg));
    }

    #[test]
    fn points_clamped_to_range() {
        assert_eq!(to_points(2.0), 150);
        assert_eq!(to_points(-0.5), 0);
        assert!(to_points(0.87) >= 130);
    }
}

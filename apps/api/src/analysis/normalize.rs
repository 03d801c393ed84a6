//! Normalization & validation applied after any extraction tier succeeds.
//!
//! The threshold table below is the single source of truth for deriving a
//! recommendation from a score. It is applied identically whether the
//! model's category token was missing, malformed, or from an unrecognized
//! vocabulary — a bad token is never an error, only a fallback.

use thiserror::Error;

use crate::analysis::extract::RawExtraction;
use crate::models::analysis::{AnalysisRecord, Recommendation};

/// Midpoint substituted when no score could be found anywhere in the text.
pub const DEFAULT_SCORE: i32 = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("analysis body too short: {len} chars (minimum {min})")]
    BodyTooShort { len: usize, min: usize },
}

/// Clamps into [0, 100] and rounds to the nearest integer.
pub fn clamp_score(raw: f64) -> i32 {
    raw.round().clamp(0.0, 100.0) as i32
}

/// Score → recommendation threshold table.
pub fn recommendation_for_score(score: i32) -> Recommendation {
    if score >= 85 {
        Recommendation::Strong
    } else if score >= 65 {
        Recommendation::Moderate
    } else if score >= 40 {
        Recommendation::Weak
    } else {
        Recommendation::NotRecommended
    }
}

/// Produces the canonical record from a tier's raw fields.
///
/// A short body is rejected regardless of which tier produced it; a missing
/// score defaults to the midpoint; an unrecognized category token is
/// silently replaced by the score-derived tier.
pub fn normalize(
    raw: RawExtraction,
    min_body_chars: usize,
) -> Result<AnalysisRecord, NormalizeError> {
    let body = raw.body.trim().to_string();
    let len = body.chars().count();
    if len < min_body_chars {
        return Err(NormalizeError::BodyTooShort {
            len,
            min: min_body_chars,
        });
    }

    let score = raw.score.map(clamp_score).unwrap_or(DEFAULT_SCORE);
    let recommendation = raw
        .recommendation
        .as_deref()
        .and_then(Recommendation::from_token)
        .unwrap_or_else(|| recommendation_for_score(score));

    Ok(AnalysisRecord {
        score,
        recommendation,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(score: Option<f64>, recommendation: Option<&str>, body: &str) -> RawExtraction {
        RawExtraction {
            score,
            recommendation: recommendation.map(str::to_string),
            body: body.to_string(),
        }
    }

    const LONG_BODY: &str = "A detailed assessment of the candidate against the posted role.";

    #[test]
    fn test_clamp_negative_to_zero() {
        assert_eq!(clamp_score(-5.0), 0);
    }

    #[test]
    fn test_clamp_overshoot_to_hundred() {
        assert_eq!(clamp_score(140.0), 100);
    }

    #[test]
    fn test_clamp_rounds_to_nearest() {
        assert_eq!(clamp_score(71.5), 72);
        assert_eq!(clamp_score(71.4), 71);
    }

    #[test]
    fn test_threshold_boundaries() {
        assert_eq!(recommendation_for_score(85), Recommendation::Strong);
        assert_eq!(recommendation_for_score(84), Recommendation::Moderate);
        assert_eq!(recommendation_for_score(65), Recommendation::Moderate);
        assert_eq!(recommendation_for_score(64), Recommendation::Weak);
        assert_eq!(recommendation_for_score(40), Recommendation::Weak);
        assert_eq!(recommendation_for_score(39), Recommendation::NotRecommended);
    }

    #[test]
    fn test_threshold_extremes() {
        assert_eq!(recommendation_for_score(100), Recommendation::Strong);
        assert_eq!(recommendation_for_score(0), Recommendation::NotRecommended);
    }

    #[test]
    fn test_missing_score_defaults_to_midpoint() {
        let record = normalize(raw(None, None, LONG_BODY), 50).unwrap();
        assert_eq!(record.score, DEFAULT_SCORE);
        // 50 falls in the weak band
        assert_eq!(record.recommendation, Recommendation::Weak);
    }

    #[test]
    fn test_unrecognized_token_falls_back_to_score() {
        let record = normalize(raw(Some(90.0), Some("lukewarm"), LONG_BODY), 50).unwrap();
        assert_eq!(record.recommendation, Recommendation::Strong);
    }

    #[test]
    fn test_recognized_token_wins_over_score() {
        let record = normalize(raw(Some(90.0), Some("weak"), LONG_BODY), 50).unwrap();
        assert_eq!(record.recommendation, Recommendation::Weak);
    }

    #[test]
    fn test_dialect_token_mapped_to_canonical() {
        let record = normalize(raw(Some(20.0), Some("exceptional"), LONG_BODY), 50).unwrap();
        assert_eq!(record.recommendation, Recommendation::Strong);
    }

    #[test]
    fn test_short_body_rejected() {
        let err = normalize(raw(Some(70.0), Some("strong"), "Short"), 50).unwrap_err();
        assert_eq!(err, NormalizeError::BodyTooShort { len: 5, min: 50 });
    }

    #[test]
    fn test_body_trimmed_before_length_check() {
        let padded = format!("   {}   \n", "x".repeat(49));
        let err = normalize(raw(None, None, &padded), 50).unwrap_err();
        assert!(matches!(err, NormalizeError::BodyTooShort { len: 49, .. }));
    }

    #[test]
    fn test_score_clamped_during_normalization() {
        let record = normalize(raw(Some(180.0), None, LONG_BODY), 50).unwrap();
        assert_eq!(record.score, 100);
        assert_eq!(record.recommendation, Recommendation::Strong);
    }
}

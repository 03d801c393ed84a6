use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Four-tier fit verdict. Newer prompt revisions occasionally emit a
/// five-tier vocabulary; those tokens are mapped down to this set before
/// anything is persisted (see `analysis::normalize`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Strong,
    Moderate,
    Weak,
    NotRecommended,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Strong => "strong",
            Recommendation::Moderate => "moderate",
            Recommendation::Weak => "weak",
            Recommendation::NotRecommended => "not_recommended",
        }
    }

    /// Resolves a model-emitted category token to a canonical tier.
    /// Accepts minor dialect variants (spacing, hyphens, the extended
    /// five-tier vocabulary). Returns `None` for anything unrecognized —
    /// the caller then derives the tier from the score instead.
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim().to_lowercase().replace(['-', ' '], "_");
        match token.as_str() {
            "strong" | "strongly_recommended" | "exceptional" | "outstanding" => {
                Some(Recommendation::Strong)
            }
            "moderate" | "good" => Some(Recommendation::Moderate),
            "weak" | "borderline" | "marginal" => Some(Recommendation::Weak),
            "not_recommended" | "poor" | "reject" | "no" => Some(Recommendation::NotRecommended),
            _ => None,
        }
    }
}

/// The canonical structured result of one fit analysis, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// 0–100 inclusive. Always present after normalization.
    pub score: i32,
    pub recommendation: Recommendation,
    /// Long free-text analysis (markdown). Never below the configured
    /// minimum length — shorter extractions are failures, not short answers.
    pub body: String,
}

/// Persisted fit analysis. Multiple rows may exist per
/// (application, document, user) triple; the most recently created one is
/// authoritative on reads.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FitAnalysisRow {
    pub id: Uuid,
    pub application_id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub score: i32,
    pub recommendation: String,
    pub body: String,
    /// Which extraction tier produced this record ("delimiter", "json", ...).
    pub strategy: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendation_serde_round_trip() {
        let json = serde_json::to_string(&Recommendation::NotRecommended).unwrap();
        assert_eq!(json, r#""not_recommended""#);
        let back: Recommendation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Recommendation::NotRecommended);
    }

    #[test]
    fn test_from_token_canonical_values() {
        assert_eq!(
            Recommendation::from_token("strong"),
            Some(Recommendation::Strong)
        );
        assert_eq!(
            Recommendation::from_token("moderate"),
            Some(Recommendation::Moderate)
        );
        assert_eq!(
            Recommendation::from_token("weak"),
            Some(Recommendation::Weak)
        );
        assert_eq!(
            Recommendation::from_token("not_recommended"),
            Some(Recommendation::NotRecommended)
        );
    }

    #[test]
    fn test_from_token_five_tier_dialect() {
        assert_eq!(
            Recommendation::from_token("exceptional"),
            Some(Recommendation::Strong)
        );
        assert_eq!(
            Recommendation::from_token("good"),
            Some(Recommendation::Moderate)
        );
        assert_eq!(
            Recommendation::from_token("borderline"),
            Some(Recommendation::Weak)
        );
        assert_eq!(
            Recommendation::from_token("poor"),
            Some(Recommendation::NotRecommended)
        );
    }

    #[test]
    fn test_from_token_spacing_and_case_variants() {
        assert_eq!(
            Recommendation::from_token("  Not Recommended "),
            Some(Recommendation::NotRecommended)
        );
        assert_eq!(
            Recommendation::from_token("STRONGLY-RECOMMENDED"),
            Some(Recommendation::Strong)
        );
    }

    #[test]
    fn test_from_token_unrecognized_is_none() {
        assert_eq!(Recommendation::from_token("maybe"), None);
        assert_eq!(Recommendation::from_token(""), None);
        assert_eq!(Recommendation::from_token("recommended-ish"), None);
    }
}

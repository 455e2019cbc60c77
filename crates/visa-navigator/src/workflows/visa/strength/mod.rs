mod advice;
mod rules;

pub use rules::parse_cost;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::{Application, UserProfile};
use super::tables::ScoringTables;

/// Stateless scorer applying the loaded tables to an application and its owner.
#[derive(Debug, Clone)]
pub struct StrengthEngine {
    tables: Arc<ScoringTables>,
}

impl StrengthEngine {
    pub fn new(tables: Arc<ScoringTables>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &ScoringTables {
        &self.tables
    }

    pub fn score(
        &self,
        application: &Application,
        profile: &UserProfile,
        document_count: usize,
    ) -> StrengthReport {
        let (breakdown, components) =
            rules::score_application(application, profile, document_count, &self.tables);
        let total_score = breakdown.weighted_total(&self.tables);
        let recommendations =
            advice::recommendations(&breakdown, total_score, document_count, &self.tables);

        StrengthReport {
            total_score,
            breakdown,
            recommendations,
            components,
            tables_version: self.tables.version.clone(),
        }
    }
}

impl Default for StrengthEngine {
    fn default() -> Self {
        Self::new(Arc::new(ScoringTables::default()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrengthFactor {
    InstitutionQuality,
    FinancialFit,
    UserProfile,
    ProgramFit,
    DocumentCompleteness,
}

/// Sub-scores, each in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrengthBreakdown {
    pub institution_quality: f64,
    pub financial_fit: f64,
    pub user_profile: f64,
    pub program_fit: f64,
    pub document_completeness: f64,
}

impl StrengthBreakdown {
    /// Weighted sum rounded half away from zero and clamped to `0..=100`.
    pub fn weighted_total(&self, tables: &ScoringTables) -> u8 {
        let weights = &tables.weights;
        let total = self.institution_quality * weights.institution_quality
            + self.financial_fit * weights.financial_fit
            + self.user_profile * weights.user_profile
            + self.program_fit * weights.program_fit
            + self.document_completeness * weights.document_completeness;
        total.round().clamp(0.0, 100.0) as u8
    }
}

/// One sub-score with its weight and a short audit note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub factor: StrengthFactor,
    pub score: f64,
    pub weight: f64,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrengthReport {
    pub total_score: u8,
    pub breakdown: StrengthBreakdown,
    pub recommendations: Vec<String>,
    pub components: Vec<ScoreComponent>,
    pub tables_version: String,
}

//! Versioned reference data behind scoring and the document checklist.
//!
//! The built-in tables are the defaults; a JSON file with any subset of the keys can
//! replace them at startup without a code change.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Weights applied to the five strength sub-scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub institution_quality: f64,
    pub financial_fit: f64,
    pub user_profile: f64,
    pub program_fit: f64,
    pub document_completeness: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            institution_quality: 0.25,
            financial_fit: 0.20,
            user_profile: 0.20,
            program_fit: 0.15,
            document_completeness: 0.20,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.institution_quality
            + self.financial_fit
            + self.user_profile
            + self.program_fit
            + self.document_completeness
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionScore {
    pub name: String,
    pub score: f64,
}

/// Scores for institutions missing from the table, keyed by what the name contains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstitutionFallbacks {
    pub university: f64,
    pub college: f64,
    pub other: f64,
}

impl Default for InstitutionFallbacks {
    fn default() -> Self {
        Self {
            university: 70.0,
            college: 60.0,
            other: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRisk {
    pub low: Vec<String>,
    pub medium: Vec<String>,
    pub high: Vec<String>,
    pub low_risk_bonus: f64,
    pub high_risk_penalty: f64,
}

impl Default for CountryRisk {
    fn default() -> Self {
        Self {
            low: strings(&[
                "USA",
                "UK",
                "Australia",
                "Germany",
                "France",
                "Japan",
                "South Korea",
            ]),
            medium: strings(&["India", "China", "Brazil", "Mexico", "Turkey", "Thailand"]),
            high: strings(&["Nigeria", "Pakistan", "Bangladesh", "Ghana", "Kenya"]),
            low_risk_bonus: 10.0,
            high_risk_penalty: 15.0,
        }
    }
}

impl CountryRisk {
    /// Case-insensitive substring match; low-risk entries are checked first.
    pub fn tier(&self, country: &str) -> Option<RiskTier> {
        let country = country.to_lowercase();
        if contains_any(&country, &self.low) {
            Some(RiskTier::Low)
        } else if contains_any(&country, &self.high) {
            Some(RiskTier::High)
        } else if contains_any(&country, &self.medium) {
            Some(RiskTier::Medium)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileBonuses {
    pub base: f64,
    pub complete_profile: f64,
    pub onboarded: f64,
    pub english_speaking: f64,
    pub low_risk_origin: f64,
    pub english_speaking_countries: Vec<String>,
}

impl Default for ProfileBonuses {
    fn default() -> Self {
        Self {
            base: 50.0,
            complete_profile: 20.0,
            onboarded: 15.0,
            english_speaking: 10.0,
            low_risk_origin: 5.0,
            english_speaking_countries: strings(&[
                "usa",
                "uk",
                "canada",
                "australia",
                "new zealand",
            ]),
        }
    }
}

/// Program-name keywords and the bonus they earn; the first matching category applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramCategory {
    pub keywords: Vec<String>,
    pub bonus: f64,
}

/// Institutions known for particular fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionProgramPair {
    pub institution: String,
    pub programs: Vec<String>,
    pub bonus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramFitTable {
    pub base: f64,
    pub categories: Vec<ProgramCategory>,
    pub pairs: Vec<InstitutionProgramPair>,
}

impl Default for ProgramFitTable {
    fn default() -> Self {
        Self {
            base: 70.0,
            categories: vec![
                category(&["computer", "software", "data"], 15.0),
                category(&["business", "management"], 10.0),
                category(&["engineering"], 12.0),
                category(&["arts", "humanities"], 5.0),
            ],
            pairs: vec![
                InstitutionProgramPair {
                    institution: "waterloo".to_string(),
                    programs: strings(&["computer"]),
                    bonus: 10.0,
                },
                InstitutionProgramPair {
                    institution: "toronto".to_string(),
                    programs: strings(&["business", "medicine"]),
                    bonus: 8.0,
                },
            ],
        }
    }
}

/// Sub-score levels below which a recommendation is emitted, plus the closing bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecommendationThresholds {
    pub institution_quality: f64,
    pub financial_fit: f64,
    pub document_completeness: f64,
    pub program_fit: f64,
    pub user_profile: f64,
    pub developing_band: u8,
    pub strong_band: u8,
}

impl Default for RecommendationThresholds {
    fn default() -> Self {
        Self {
            institution_quality: 70.0,
            financial_fit: 60.0,
            document_completeness: 80.0,
            program_fit: 70.0,
            user_profile: 70.0,
            developing_band: 60,
            strong_band: 80,
        }
    }
}

/// One entry of the visa document checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredDocument {
    pub name: String,
    /// Lowercase fragments matched inside upload tags. When several entries match one
    /// tag, the entry with the longest matching fragment claims it.
    pub keywords: Vec<String>,
}

impl RequiredDocument {
    pub fn matches(&self, tag: &str) -> bool {
        self.match_strength(tag).is_some()
    }

    /// Length of the longest keyword found in `tag`.
    pub fn match_strength(&self, tag: &str) -> Option<usize> {
        let tag = tag.to_lowercase();
        self.keywords
            .iter()
            .map(|keyword| keyword.to_lowercase())
            .filter(|keyword| !keyword.is_empty() && tag.contains(keyword.as_str()))
            .map(|keyword| keyword.chars().count())
            .max()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringTables {
    pub version: String,
    pub weights: ScoreWeights,
    /// Ordered; the first name found inside the institution wins.
    pub institutions: Vec<InstitutionScore>,
    pub institution_fallbacks: InstitutionFallbacks,
    pub country_risk: CountryRisk,
    pub profile: ProfileBonuses,
    pub program_fit: ProgramFitTable,
    /// Uploads needed for full document completeness in the strength score.
    pub documents_for_complete: usize,
    pub thresholds: RecommendationThresholds,
    pub required_documents: Vec<RequiredDocument>,
}

impl Default for ScoringTables {
    fn default() -> Self {
        Self {
            version: "2025.1".to_string(),
            weights: ScoreWeights::default(),
            institutions: [
                ("University of Toronto", 95.0),
                ("University of British Columbia", 92.0),
                ("McGill University", 90.0),
                ("University of Waterloo", 88.0),
                ("University of Alberta", 85.0),
                ("University of Montreal", 83.0),
                ("University of Calgary", 80.0),
                ("University of Ottawa", 78.0),
                ("Queen's University", 75.0),
                ("Western University", 72.0),
            ]
            .into_iter()
            .map(|(name, score)| InstitutionScore {
                name: name.to_string(),
                score,
            })
            .collect(),
            institution_fallbacks: InstitutionFallbacks::default(),
            country_risk: CountryRisk::default(),
            profile: ProfileBonuses::default(),
            program_fit: ProgramFitTable::default(),
            documents_for_complete: 8,
            thresholds: RecommendationThresholds::default(),
            required_documents: vec![
                required("Letter of Acceptance (LOA)", &["acceptance", "loa"]),
                required(
                    "Proof of Financial Support",
                    &["financial", "funds", "bank", "gic", "sponsor", "loan"],
                ),
                required("Passport", &["passport"]),
                required("Academic Transcripts", &["transcript", "marksheet"]),
                required(
                    "English Language Proficiency (IELTS/TOEFL)",
                    &[
                        "ielts",
                        "toefl",
                        "celpip",
                        "pte academic",
                        "duolingo",
                        "english test",
                        "english proficiency",
                        "language test",
                        "language proficiency",
                    ],
                ),
                required(
                    "Statement of Purpose",
                    &["statement of purpose", "sop", "study plan"],
                ),
                required("Resume/CV", &["resume", "cv", "curriculum"]),
                required("Medical Examination", &["medical"]),
                required("Police Certificate", &["police", "clearance"]),
                required("Photographs", &["photo", "passport photo", "passport-size"]),
            ],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TablesError {
    #[error("could not read reference tables: {0}")]
    Io(#[from] std::io::Error),
    #[error("reference tables are not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("reference tables rejected: {0}")]
    Invalid(String),
}

impl ScoringTables {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TablesError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, TablesError> {
        let tables: Self = serde_json::from_str(raw)?;
        tables.validate()?;
        Ok(tables)
    }

    pub fn validate(&self) -> Result<(), TablesError> {
        if self.documents_for_complete == 0 {
            return Err(TablesError::Invalid(
                "documents_for_complete must be at least 1".to_string(),
            ));
        }
        if self.required_documents.is_empty() {
            return Err(TablesError::Invalid(
                "required_documents cannot be empty".to_string(),
            ));
        }
        if (self.weights.sum() - 1.0).abs() > 1e-6 {
            return Err(TablesError::Invalid(format!(
                "weights must sum to 1.0, found {:.4}",
                self.weights.sum()
            )));
        }
        Ok(())
    }
}

pub(crate) fn contains_any(haystack_lower: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .any(|needle| haystack_lower.contains(&needle.to_lowercase()))
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn category(keywords: &[&str], bonus: f64) -> ProgramCategory {
    ProgramCategory {
        keywords: strings(keywords),
        bonus,
    }
}

fn required(name: &str, keywords: &[&str]) -> RequiredDocument {
    RequiredDocument {
        name: name.to_string(),
        keywords: strings(keywords),
    }
}

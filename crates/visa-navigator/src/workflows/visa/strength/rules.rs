use super::super::domain::{Application, UserProfile};
use super::super::tables::{contains_any, RiskTier, ScoringTables};
use super::{ScoreComponent, StrengthBreakdown, StrengthFactor};

pub(crate) fn score_application(
    application: &Application,
    profile: &UserProfile,
    document_count: usize,
    tables: &ScoringTables,
) -> (StrengthBreakdown, Vec<ScoreComponent>) {
    let weights = &tables.weights;
    let components = vec![
        institution_quality(&application.institution, tables)
            .weighted(weights.institution_quality),
        financial_fit(
            &application.total_cost,
            profile.country_of_origin.as_deref(),
            tables,
        )
        .weighted(weights.financial_fit),
        user_profile(profile, tables).weighted(weights.user_profile),
        program_fit(&application.program, &application.institution, tables)
            .weighted(weights.program_fit),
        document_completeness(document_count, tables).weighted(weights.document_completeness),
    ];

    let score_of = |factor: StrengthFactor| {
        components
            .iter()
            .find(|component| component.factor == factor)
            .map(|component| component.score)
            .unwrap_or_default()
    };

    let breakdown = StrengthBreakdown {
        institution_quality: score_of(StrengthFactor::InstitutionQuality),
        financial_fit: score_of(StrengthFactor::FinancialFit),
        user_profile: score_of(StrengthFactor::UserProfile),
        program_fit: score_of(StrengthFactor::ProgramFit),
        document_completeness: score_of(StrengthFactor::DocumentCompleteness),
    };

    (breakdown, components)
}

struct FactorScore {
    factor: StrengthFactor,
    score: f64,
    notes: String,
}

impl FactorScore {
    fn weighted(self, weight: f64) -> ScoreComponent {
        ScoreComponent {
            factor: self.factor,
            score: self.score,
            weight,
            notes: self.notes,
        }
    }
}

fn institution_quality(institution: &str, tables: &ScoringTables) -> FactorScore {
    let normalized = institution.trim().to_lowercase();
    let factor = StrengthFactor::InstitutionQuality;

    if let Some(entry) = tables
        .institutions
        .iter()
        .find(|entry| normalized.contains(&entry.name.to_lowercase()))
    {
        return FactorScore {
            factor,
            score: entry.score,
            notes: format!("ranked institution {}", entry.name),
        };
    }

    let fallbacks = &tables.institution_fallbacks;
    let (score, notes) = if normalized.contains("university") {
        (fallbacks.university, "unranked university")
    } else if normalized.contains("college") {
        (fallbacks.college, "unranked college")
    } else {
        (fallbacks.other, "unrecognised institution")
    };

    FactorScore {
        factor,
        score,
        notes: notes.to_string(),
    }
}

/// Reads a free-text amount such as `"$45,000 CAD"` as 45000.
///
/// Everything except ASCII digits and `.` is dropped, then the longest prefix of the
/// form `digits[.digits]` is parsed. Text without a leading number reads as zero.
pub fn parse_cost(raw: &str) -> f64 {
    let kept: String = raw
        .chars()
        .filter(|ch| ch.is_ascii_digit() || *ch == '.')
        .collect();

    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (index, ch) in kept.char_indices() {
        match ch {
            '0'..='9' => {
                seen_digit = true;
                end = index + 1;
            }
            '.' if !seen_dot => {
                seen_dot = true;
            }
            _ => break,
        }
    }

    if !seen_digit {
        return 0.0;
    }
    kept[..end].parse::<f64>().unwrap_or(0.0)
}

fn financial_fit(total_cost: &str, origin: Option<&str>, tables: &ScoringTables) -> FactorScore {
    let cost = parse_cost(total_cost);
    let mut score = (100.0 - cost / 1000.0).max(0.0);
    let mut notes = format!("cost {cost:.0} gives base {score:.1}");

    if let Some(origin) = origin.filter(|origin| !origin.trim().is_empty()) {
        match tables.country_risk.tier(origin) {
            Some(RiskTier::Low) => {
                score += tables.country_risk.low_risk_bonus;
                notes.push_str(&format!("; low-risk origin {origin}"));
            }
            Some(RiskTier::High) => {
                score -= tables.country_risk.high_risk_penalty;
                notes.push_str(&format!("; high-risk origin {origin}"));
            }
            Some(RiskTier::Medium) | None => {}
        }
    }

    FactorScore {
        factor: StrengthFactor::FinancialFit,
        score: score.clamp(0.0, 100.0),
        notes,
    }
}

fn user_profile(profile: &UserProfile, tables: &ScoringTables) -> FactorScore {
    let bonuses = &tables.profile;
    let mut score = bonuses.base;
    let mut notes = Vec::new();

    if profile.profile_complete() {
        score += bonuses.complete_profile;
        notes.push("profile complete");
    }
    if profile.is_onboarded {
        score += bonuses.onboarded;
        notes.push("onboarded");
    }
    if let Some(origin) = profile.country_of_origin.as_deref() {
        let origin = origin.to_lowercase();
        if !origin.trim().is_empty() {
            if contains_any(&origin, &bonuses.english_speaking_countries) {
                score += bonuses.english_speaking;
                notes.push("english-speaking origin");
            }
            if contains_any(&origin, &tables.country_risk.low) {
                score += bonuses.low_risk_origin;
                notes.push("low-risk origin");
            }
        }
    }

    FactorScore {
        factor: StrengthFactor::UserProfile,
        score: score.min(100.0),
        notes: if notes.is_empty() {
            "base profile score".to_string()
        } else {
            notes.join(", ")
        },
    }
}

fn program_fit(program: &str, institution: &str, tables: &ScoringTables) -> FactorScore {
    let table = &tables.program_fit;
    let program = program.to_lowercase();
    let institution = institution.to_lowercase();
    let mut score = table.base;
    let mut notes = Vec::new();

    if let Some(category) = table
        .categories
        .iter()
        .find(|category| contains_any(&program, &category.keywords))
    {
        score += category.bonus;
        notes.push(format!("in-demand field (+{})", category.bonus));
    }

    if let Some(pair) = table.pairs.iter().find(|pair| {
        institution.contains(&pair.institution.to_lowercase())
            && contains_any(&program, &pair.programs)
    }) {
        score += pair.bonus;
        notes.push(format!("{} known for this field (+{})", pair.institution, pair.bonus));
    }

    FactorScore {
        factor: StrengthFactor::ProgramFit,
        score: score.min(100.0),
        notes: if notes.is_empty() {
            "no program bonus".to_string()
        } else {
            notes.join(", ")
        },
    }
}

fn document_completeness(count: usize, tables: &ScoringTables) -> FactorScore {
    let needed = tables.documents_for_complete.max(1);
    let score = (count as f64 / needed as f64 * 100.0).min(100.0);
    FactorScore {
        factor: StrengthFactor::DocumentCompleteness,
        score,
        notes: format!("{count} of {needed} documents uploaded"),
    }
}

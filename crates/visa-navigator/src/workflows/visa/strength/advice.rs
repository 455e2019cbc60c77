use super::super::tables::ScoringTables;
use super::StrengthBreakdown;

pub(crate) fn recommendations(
    breakdown: &StrengthBreakdown,
    total: u8,
    document_count: usize,
    tables: &ScoringTables,
) -> Vec<String> {
    let thresholds = &tables.thresholds;
    let mut advice = Vec::new();

    if breakdown.institution_quality < thresholds.institution_quality {
        advice.push(
            "Consider applying to higher-ranked institutions to improve your application strength"
                .to_string(),
        );
    }
    if breakdown.financial_fit < thresholds.financial_fit {
        advice.push(
            "Strengthen your financial documentation and consider more affordable programs"
                .to_string(),
        );
    }
    if breakdown.document_completeness < thresholds.document_completeness {
        let missing = tables.documents_for_complete.saturating_sub(document_count);
        advice.push(format!(
            "Upload {missing} more required documents to complete your application"
        ));
    }
    if breakdown.program_fit < thresholds.program_fit {
        advice.push("Consider programs with higher demand in the Canadian job market".to_string());
    }
    if breakdown.user_profile < thresholds.user_profile {
        advice.push(
            "Complete your profile information to improve your application assessment"
                .to_string(),
        );
    }

    advice.push(closing_remark(total, tables).to_string());
    advice
}

fn closing_remark(total: u8, tables: &ScoringTables) -> &'static str {
    if total < tables.thresholds.developing_band {
        "Your application needs significant improvements. Consider working with an immigration consultant"
    } else if total < tables.thresholds.strong_band {
        "Your application is good but could be strengthened with additional documents and preparation"
    } else {
        "Excellent application strength! You have a high chance of approval"
    }
}

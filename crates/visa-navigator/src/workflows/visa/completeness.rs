use serde::{Deserialize, Serialize};

use super::tables::RequiredDocument;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletenessReport {
    pub missing_documents: Vec<String>,
    /// Present but flagged for attention; only filled by the qualitative review.
    pub incomplete_documents: Vec<String>,
    pub completeness_score: u8,
    pub recommendations: Vec<String>,
}

/// Matches uploaded document tags against the visa checklist.
#[derive(Debug, Clone)]
pub struct CompletenessChecker<'a> {
    required: &'a [RequiredDocument],
}

impl<'a> CompletenessChecker<'a> {
    pub fn new(required: &'a [RequiredDocument]) -> Self {
        Self { required }
    }

    pub fn check<S: AsRef<str>>(&self, tags: &[S]) -> CompletenessReport {
        let mut present = vec![false; self.required.len()];
        for tag in tags {
            if let Some(index) = self.claimed_by(tag.as_ref()) {
                present[index] = true;
            }
        }
        let missing: Vec<String> = self
            .required
            .iter()
            .zip(&present)
            .filter(|(_, present)| !**present)
            .map(|(document, _)| document.name.clone())
            .collect();

        let total = self.required.len();
        let present = total - missing.len();
        let completeness_score = if total == 0 {
            100
        } else {
            (present as f64 / total as f64 * 100.0).round() as u8
        };

        let recommendations = if missing.is_empty() {
            vec!["All required documents have been uploaded. Review each one for accuracy before submitting.".to_string()]
        } else {
            missing
                .iter()
                .map(|name| format!("Upload your {name} to complete your application"))
                .collect()
        };

        CompletenessReport {
            missing_documents: missing,
            incomplete_documents: Vec::new(),
            completeness_score,
            recommendations,
        }
    }

    /// A tag satisfies one entry: the most specific keyword match, earliest entry on ties.
    fn claimed_by(&self, tag: &str) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (index, document) in self.required.iter().enumerate() {
            if let Some(strength) = document.match_strength(tag) {
                if best.map_or(true, |(_, current)| strength > current) {
                    best = Some((index, strength));
                }
            }
        }
        best.map(|(index, _)| index)
    }
}

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::domain::DocumentRecord;
use super::prompts::{self, TemplateSubject};
use super::reasoning::{
    complete_within, parse_embedded_json, ReasoningError, ReasoningRequest, ReasoningService,
};

/// Model-written assessment of the uploaded document set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysis {
    #[serde(default)]
    pub document_type: String,
    #[serde(default)]
    pub completeness: f64,
    #[serde(default)]
    pub quality: f64,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub validity: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

impl DocumentAnalysis {
    pub fn fallback() -> Self {
        Self {
            document_type: "Student Visa Documents".to_string(),
            completeness: 75.0,
            quality: 80.0,
            issues: to_strings(&[
                "Some documents may need translation",
                "Consider adding additional financial proof",
            ]),
            recommendations: to_strings(&[
                "Ensure all documents are properly translated",
                "Add more detailed financial statements",
                "Include letter of explanation for any gaps",
            ]),
            validity: true,
            expiry_date: None,
            next_steps: to_strings(&[
                "Review all document requirements",
                "Prepare additional supporting documents",
                "Schedule document translation if needed",
            ]),
        }
    }

    fn clamped(mut self) -> Self {
        self.completeness = self.completeness.clamp(0.0, 100.0);
        self.quality = self.quality.clamp(0.0, 100.0);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemplateKind {
    StudyPlan,
    FinancialPlan,
    #[default]
    #[serde(other)]
    Full,
}

/// Drafted application material; letters fill a single key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_of_purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financial_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_letter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_checklist: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tips: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullTemplateReply {
    statement_of_purpose: String,
    resume_template: String,
    #[serde(default)]
    cover_letter: String,
    #[serde(default)]
    document_checklist: Vec<String>,
    #[serde(default)]
    tips: Vec<String>,
}

impl From<FullTemplateReply> for ApplicationTemplate {
    fn from(reply: FullTemplateReply) -> Self {
        Self {
            statement_of_purpose: Some(reply.statement_of_purpose),
            financial_plan: None,
            resume_template: Some(reply.resume_template),
            cover_letter: Some(reply.cover_letter),
            document_checklist: Some(reply.document_checklist),
            tips: Some(reply.tips),
        }
    }
}

impl ApplicationTemplate {
    pub fn fallback(subject: &TemplateSubject) -> Self {
        let program = &subject.program;
        let institution = &subject.institution;
        let background = subject
            .background
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or("academic studies");
        let goals = subject
            .goals
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or("advancing my knowledge and skills in this field");

        Self {
            statement_of_purpose: Some(format!(
                "I am writing to express my strong interest in pursuing {program} at {institution}. \
                 With my background in {background}, I am excited about the opportunity to further my \
                 education in Canada and contribute to the academic community at {institution}. My career \
                 goals include {goals}, and I believe this program will provide the right foundation for \
                 achieving these objectives."
            )),
            financial_plan: None,
            resume_template: Some(
                "EDUCATION\n[Your Degree] - [Your University]\n[Graduation Year]\n\nEXPERIENCE\n[Relevant Experience]\n\nSKILLS\n[Relevant Skills]\n\nPROJECTS\n[Academic/Professional Projects]"
                    .to_string(),
            ),
            cover_letter: Some(format!(
                "Dear Admissions Committee,\n\nI am writing to express my interest in the {program} at {institution}..."
            )),
            document_checklist: Some(to_strings(&[
                "Valid passport",
                "Letter of acceptance from institution",
                "Proof of financial support",
                "Academic transcripts",
                "English language test results",
                "Statement of purpose",
                "Resume/CV",
                "Passport photos",
            ])),
            tips: Some(to_strings(&[
                "Start your application at least 6 months before your intended start date",
                "Ensure all documents are properly translated and notarized",
                "Demonstrate strong ties to your home country",
                "Provide clear evidence of financial capacity",
                "Write a compelling statement of purpose",
                "Submit a complete and organized application package",
            ])),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewReply {
    #[serde(default)]
    incomplete_documents: Vec<String>,
}

/// Consultant-style conversations and drafting on top of the reasoning service.
#[derive(Clone)]
pub struct Assistant {
    reasoning: Arc<dyn ReasoningService>,
    deadline: Duration,
}

impl Assistant {
    pub fn new(reasoning: Arc<dyn ReasoningService>, deadline: Duration) -> Self {
        Self {
            reasoning,
            deadline,
        }
    }

    async fn ask(&self, prompt: String, max_tokens: u32) -> Result<String, ReasoningError> {
        complete_within(
            self.reasoning.as_ref(),
            ReasoningRequest::new(prompt, max_tokens),
            self.deadline,
        )
        .await
    }

    pub async fn chat(&self, message: &str) -> Result<String, ReasoningError> {
        self.ask(prompts::chat(message), prompts::CHAT_MAX_TOKENS)
            .await
    }

    /// Falls back to a generic assessment when the model fails or replies off-format.
    pub async fn analyze_documents(&self, documents: &[DocumentRecord]) -> DocumentAnalysis {
        let summary: Vec<_> = documents
            .iter()
            .map(|document| {
                json!({
                    "type": document.doc_type,
                    "filename": document.original_name,
                    "size": document.size,
                    "uploaded_at": document.created_at,
                })
            })
            .collect();
        let summary = serde_json::to_string_pretty(&summary).unwrap_or_default();

        match self
            .ask(prompts::document_analysis(&summary), prompts::ANALYSIS_MAX_TOKENS)
            .await
        {
            Ok(reply) => match parse_embedded_json::<DocumentAnalysis>(&reply) {
                Some(analysis) => analysis.clamped(),
                None => {
                    warn!("document analysis reply unparseable; using fallback");
                    DocumentAnalysis::fallback()
                }
            },
            Err(err) => {
                warn!(error = %err, "document analysis request failed; using fallback");
                DocumentAnalysis::fallback()
            }
        }
    }

    /// Letters surface reasoning failures; the full template degrades to a fixed draft.
    pub async fn draft(
        &self,
        kind: TemplateKind,
        subject: &TemplateSubject,
    ) -> Result<ApplicationTemplate, ReasoningError> {
        match kind {
            TemplateKind::StudyPlan => {
                let letter = self
                    .ask(prompts::study_plan(subject), prompts::TEMPLATE_MAX_TOKENS)
                    .await?;
                Ok(ApplicationTemplate {
                    statement_of_purpose: Some(letter.trim().to_string()),
                    ..ApplicationTemplate::default()
                })
            }
            TemplateKind::FinancialPlan => {
                let letter = self
                    .ask(prompts::financial_plan(subject), prompts::TEMPLATE_MAX_TOKENS)
                    .await?;
                Ok(ApplicationTemplate {
                    financial_plan: Some(letter.trim().to_string()),
                    ..ApplicationTemplate::default()
                })
            }
            TemplateKind::Full => {
                let reply = self
                    .ask(prompts::full_template(subject), prompts::TEMPLATE_MAX_TOKENS)
                    .await;
                let parsed = match reply {
                    Ok(reply) => parse_embedded_json::<FullTemplateReply>(&reply),
                    Err(err) => {
                        warn!(error = %err, "template request failed; using fallback");
                        None
                    }
                };
                Ok(parsed
                    .map(ApplicationTemplate::from)
                    .unwrap_or_else(|| ApplicationTemplate::fallback(subject)))
            }
        }
    }

    /// Best-effort list of present documents that need attention; empty on any failure.
    pub async fn review_present_documents(
        &self,
        uploaded_tags: &[String],
        required: &[String],
    ) -> Vec<String> {
        if uploaded_tags.is_empty() {
            return Vec::new();
        }
        match self
            .ask(
                prompts::completeness_review(uploaded_tags, required),
                prompts::REVIEW_MAX_TOKENS,
            )
            .await
        {
            Ok(reply) => {
                let flagged = parse_embedded_json::<ReviewReply>(&reply)
                    .map(|review| review.incomplete_documents)
                    .unwrap_or_default();
                info!(flagged = flagged.len(), "completeness review finished");
                flagged
            }
            Err(err) => {
                warn!(error = %err, "completeness review unavailable");
                Vec::new()
            }
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

//! Prompt text sent to the reasoning service.

pub const CHAT_MAX_TOKENS: u32 = 1000;
pub const ANALYSIS_MAX_TOKENS: u32 = 1500;
pub const EXTRACTION_MAX_TOKENS: u32 = 2000;
pub const REVIEW_MAX_TOKENS: u32 = 1500;
pub const TEMPLATE_MAX_TOKENS: u32 = 2000;

const NOT_SPECIFIED: &str = "Not specified";

pub fn chat(message: &str) -> String {
    format!(
        r#"You are an expert Canadian student visa consultant with years of experience helping international students. You provide accurate, helpful, and encouraging advice about Canadian student visa applications.

Your expertise includes:
- Document requirements and preparation
- Application timelines and processes
- Financial requirements and proof of funds
- Common rejection reasons and how to avoid them
- Tips for strengthening applications
- Post-arrival guidance
- Study permit conditions and compliance

Current user question: "{message}"

Please provide a helpful response that:
1. Directly addresses their question
2. Provides specific, actionable advice
3. Is encouraging and supportive
4. Includes relevant examples when helpful
5. Mentions important deadlines or requirements if relevant
6. Suggests next steps when appropriate

Keep your response conversational, informative, and under 300 words unless more detail is specifically requested."#
    )
}

/// `summary` is a JSON listing of type, filename, size and upload time per document.
pub fn document_analysis(summary: &str) -> String {
    format!(
        r#"You are an expert Canadian student visa document analyst. Analyze the following uploaded documents and provide an assessment.

Uploaded Documents:
{summary}

Respond with ONLY a JSON object with the following structure:

{{
  "documentType": "string (overall document category)",
  "completeness": number (0-100, how complete the document set is),
  "quality": number (0-100, overall quality score),
  "issues": ["array of specific issues found"],
  "recommendations": ["array of actionable recommendations"],
  "validity": boolean (whether documents are valid for visa application),
  "expiryDate": "string (if any documents have expiry dates)",
  "nextSteps": ["array of next steps to take"]
}}

Consider:
- Document completeness for Canadian student visa requirements
- Common issues that lead to visa rejections
- Missing critical documents
- Timeline considerations for document validity

Provide realistic scores and specific, actionable feedback."#
    )
}

pub fn field_extraction(corpus: &str) -> String {
    format!(
        r#"You are an expert Canadian student visa application assistant. Extract the following information from the provided text (from uploaded documents):

- School name
- Program name
- Program duration
- Program start date
- Annual tuition (CAD)
- City
- Full name
- Nationality
- Passport expiry date
- Average bank balance (CAD)
- Monthly income (CAD)

For each field, provide:
- value (string or number)
- confidence (0-100, how certain you are about the value)

Return ONLY a valid JSON object with this exact structure. Do not include any explanation or additional text:

{{
  "school": {{ "value": "", "confidence": 0 }},
  "program": {{ "value": "", "confidence": 0 }},
  "duration": {{ "value": "", "confidence": 0 }},
  "startDate": {{ "value": "", "confidence": 0 }},
  "annualTuition": {{ "value": 0, "confidence": 0 }},
  "city": {{ "value": "", "confidence": 0 }},
  "fullName": {{ "value": "", "confidence": 0 }},
  "nationality": {{ "value": "", "confidence": 0 }},
  "passportExpiry": {{ "value": "", "confidence": 0 }},
  "averageBalance": {{ "value": 0, "confidence": 0 }},
  "monthlyIncome": {{ "value": 0, "confidence": 0 }}
}}

Fill in the actual values and confidence scores based on the text below. If a field is missing, leave value as empty string or 0 and confidence as 0.

Text to analyze:
"""
{corpus}
""""#
    )
}

pub fn completeness_review(uploaded_tags: &[String], required: &[String]) -> String {
    let uploaded = uploaded_tags
        .iter()
        .map(|tag| format!("- {tag}"))
        .collect::<Vec<_>>()
        .join("\n");
    let required = required
        .iter()
        .enumerate()
        .map(|(index, name)| format!("{}. {name}", index + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an expert in Canadian student visa requirements. Review the following uploaded documents for a student visa application.

UPLOADED DOCUMENTS:
{uploaded}

REQUIRED DOCUMENTS FOR CANADIAN STUDENT VISA:
{required}

List the uploaded documents that may be incomplete or need attention. Respond with ONLY a JSON object:
{{
  "incompleteDocuments": ["doc1", "doc2"]
}}"#
    )
}

/// Applicant details interpolated into drafting prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSubject {
    pub program: String,
    pub institution: String,
    pub country: Option<String>,
    pub background: Option<String>,
    pub goals: Option<String>,
}

impl TemplateSubject {
    fn profile_block(&self) -> String {
        format!(
            "Student Profile:\n- Program: {}\n- Institution: {}\n- Country of Origin: {}\n- Background: {}\n- Career Goals: {}",
            self.program,
            self.institution,
            or_unspecified(&self.country),
            or_unspecified(&self.background),
            or_unspecified(&self.goals),
        )
    }
}

fn or_unspecified(value: &Option<String>) -> &str {
    value
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(NOT_SPECIFIED)
}

pub fn study_plan(subject: &TemplateSubject) -> String {
    format!(
        "You are an expert Canadian student visa consultant. Write a compelling, personalized Study Plan Letter for a student applying to study in Canada.\n\n{}\n\nThe letter should be 2-3 paragraphs, specific to their situation, and highlight their academic preparation, motivation, financial situation, and intent to return home. Respond with only the letter text.",
        subject.profile_block()
    )
}

pub fn financial_plan(subject: &TemplateSubject) -> String {
    format!(
        "You are an expert Canadian student visa consultant. Write a detailed Financial Plan Letter for a student applying to study in Canada.\n\n{}\n\nThe letter should clearly explain the student's funding sources, amounts, and ability to pay for tuition and living expenses. Respond with only the letter text.",
        subject.profile_block()
    )
}

pub fn full_template(subject: &TemplateSubject) -> String {
    format!(
        r#"You are an expert Canadian student visa consultant. Generate a personalized application template for a student applying to study in Canada.

{}

Generate the following components:

1. Statement of Purpose (2-3 paragraphs, specific to their situation)
2. Resume Template (structured format with relevant sections)
3. Cover Letter (if applicable for their program)
4. Document Checklist (specific to their program and country)
5. Application Tips (5-7 specific, actionable tips)

Respond with ONLY a valid JSON object with these keys:
- statementOfPurpose: string
- resumeTemplate: string
- coverLetter: string
- documentChecklist: string[]
- tips: string[]

Make the content specific to their program, institution, and background."#,
        subject.profile_block()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_prompt_embeds_corpus_and_all_fields() {
        let prompt = field_extraction("Passport No. X123");
        assert!(prompt.contains("\"\"\"\nPassport No. X123\n\"\"\""));
        for key in ["school", "startDate", "passportExpiry", "monthlyIncome"] {
            assert!(prompt.contains(&format!("\"{key}\"")), "missing {key}");
        }
    }

    #[test]
    fn unspecified_profile_fields_are_labelled() {
        let subject = TemplateSubject {
            program: "Computer Science".to_string(),
            institution: "University of Waterloo".to_string(),
            country: Some("  ".to_string()),
            ..TemplateSubject::default()
        };
        let prompt = study_plan(&subject);
        assert!(prompt.contains("- Program: Computer Science"));
        assert!(prompt.contains("- Country of Origin: Not specified"));
        assert!(prompt.contains("- Career Goals: Not specified"));
    }

    #[test]
    fn review_prompt_numbers_required_documents() {
        let prompt = completeness_review(
            &["Passport".to_string()],
            &["Letter of Acceptance (LOA)".to_string(), "Passport".to_string()],
        );
        assert!(prompt.contains("- Passport"));
        assert!(prompt.contains("1. Letter of Acceptance (LOA)\n2. Passport"));
    }
}

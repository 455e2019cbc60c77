use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::prompts;
use super::reasoning::{complete_within, extract_json_object, ReasoningRequest, ReasoningService};

/// A field value as the model reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub value: FieldValue,
    /// Certainty in `0..=100`.
    pub confidence: u8,
}

impl FieldEntry {
    fn empty_text() -> Self {
        Self {
            value: FieldValue::Text(String::new()),
            confidence: 0,
        }
    }

    fn empty_number() -> Self {
        Self {
            value: FieldValue::Number(0.0),
            confidence: 0,
        }
    }
}

/// The eleven review fields pre-filled from uploaded documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMap {
    pub school: FieldEntry,
    pub program: FieldEntry,
    pub duration: FieldEntry,
    pub start_date: FieldEntry,
    pub annual_tuition: FieldEntry,
    pub city: FieldEntry,
    pub full_name: FieldEntry,
    pub nationality: FieldEntry,
    pub passport_expiry: FieldEntry,
    pub average_balance: FieldEntry,
    pub monthly_income: FieldEntry,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            school: FieldEntry::empty_text(),
            program: FieldEntry::empty_text(),
            duration: FieldEntry::empty_text(),
            start_date: FieldEntry::empty_text(),
            annual_tuition: FieldEntry::empty_number(),
            city: FieldEntry::empty_text(),
            full_name: FieldEntry::empty_text(),
            nationality: FieldEntry::empty_text(),
            passport_expiry: FieldEntry::empty_text(),
            average_balance: FieldEntry::empty_number(),
            monthly_income: FieldEntry::empty_number(),
        }
    }
}

impl FieldMap {
    /// Reads a model reply field by field; anything missing or malformed keeps its default.
    pub fn from_reply(reply: &str) -> Option<Self> {
        let object = extract_json_object(reply)?;
        let parsed: Value = serde_json::from_str(object).ok()?;
        let fields = parsed.as_object()?;

        let mut map = Self::default();
        for (key, slot) in map.slots_mut() {
            if let Some(entry) = fields.get(key).and_then(Value::as_object) {
                read_entry(entry, slot);
            }
        }
        Some(map)
    }

    /// Number of fields the model filled with any confidence.
    pub fn filled(&self) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.confidence > 0)
            .count()
    }

    fn entries(&self) -> [&FieldEntry; 11] {
        [
            &self.school,
            &self.program,
            &self.duration,
            &self.start_date,
            &self.annual_tuition,
            &self.city,
            &self.full_name,
            &self.nationality,
            &self.passport_expiry,
            &self.average_balance,
            &self.monthly_income,
        ]
    }

    fn slots_mut(&mut self) -> [(&'static str, &mut FieldEntry); 11] {
        [
            ("school", &mut self.school),
            ("program", &mut self.program),
            ("duration", &mut self.duration),
            ("startDate", &mut self.start_date),
            ("annualTuition", &mut self.annual_tuition),
            ("city", &mut self.city),
            ("fullName", &mut self.full_name),
            ("nationality", &mut self.nationality),
            ("passportExpiry", &mut self.passport_expiry),
            ("averageBalance", &mut self.average_balance),
            ("monthlyIncome", &mut self.monthly_income),
        ]
    }
}

fn read_entry(entry: &Map<String, Value>, slot: &mut FieldEntry) {
    match entry.get("value") {
        Some(Value::String(text)) => slot.value = FieldValue::Text(text.clone()),
        Some(Value::Number(number)) => {
            if let Some(number) = number.as_f64() {
                slot.value = FieldValue::Number(number);
            }
        }
        _ => {}
    }

    let confidence = match entry.get("confidence") {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().trim_end_matches('%').parse().unwrap_or(0.0),
        _ => 0.0,
    };
    slot.confidence = confidence.round().clamp(0.0, 100.0) as u8;
}

/// Pulls the review fields out of aggregated document text.
#[derive(Clone)]
pub struct FieldExtractor {
    reasoning: Arc<dyn ReasoningService>,
    deadline: Duration,
}

impl FieldExtractor {
    pub fn new(reasoning: Arc<dyn ReasoningService>, deadline: Duration) -> Self {
        Self {
            reasoning,
            deadline,
        }
    }

    /// Never fails; every error path yields the default map.
    pub async fn extract(&self, corpus: &str) -> FieldMap {
        if corpus.trim().is_empty() {
            info!("no extracted text available; returning empty field map");
            return FieldMap::default();
        }

        let request = ReasoningRequest::new(
            prompts::field_extraction(corpus),
            prompts::EXTRACTION_MAX_TOKENS,
        );
        let reply = match complete_within(self.reasoning.as_ref(), request, self.deadline).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "field extraction request failed");
                return FieldMap::default();
            }
        };

        match FieldMap::from_reply(&reply) {
            Some(map) => {
                info!(filled = map.filled(), "field extraction complete");
                map
            }
            None => {
                warn!(reply_chars = reply.len(), "field extraction reply was not a JSON object");
                FieldMap::default()
            }
        }
    }
}

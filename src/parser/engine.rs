use std::fmt;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, warn};

use super::catalog::{Profile, RuleSet};
use super::record::{ExtractedRecord, FieldValue, Sex};
use crate::error::CatalogError;

pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Field extraction over the plain text of one document page.
///
/// Holds no mutable state: every call depends only on the text and the rule
/// set, so one engine can be shared across worker threads.
#[derive(Debug)]
pub struct Engine {
    rules: RuleSet,
}

impl Engine {
    pub fn new(rules: RuleSet) -> Self {
        Engine { rules }
    }

    pub fn with_profile(profile: Profile) -> Result<Self, CatalogError> {
        Ok(Engine::new(RuleSet::load(profile)?))
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Extract using the current local time as the processing timestamp.
    pub fn extract(&self, text: &str, source: &str) -> ExtractedRecord {
        self.extract_at(text, source, Local::now().naive_local())
    }

    pub fn extract_at(&self, text: &str, source: &str, at: NaiveDateTime) -> ExtractedRecord {
        let fields = self
            .rules
            .rules()
            .iter()
            .map(|rule| {
                let value = match rule.pattern.capture(text) {
                    Some(raw) => FieldValue::Found(self.clean(raw)),
                    None => {
                        debug!("{}: no match for '{}'", source, rule.field);
                        FieldValue::NotFound
                    }
                };
                (rule.field.clone(), value)
            })
            .collect();

        let sex = self.rules.infers_sex().then(|| match infer_sex(text) {
            Some(s) => FieldValue::Found(s.as_str().to_string()),
            None => FieldValue::NotFound,
        });

        ExtractedRecord::Extracted {
            processed_at: at.format(TIMESTAMP_FORMAT).to_string(),
            source: source.to_string(),
            fields,
            sex,
        }
    }

    /// Obtain the text with `read` and extract from it. A failed read yields a
    /// degraded record instead of an error, so a batch always gets one record
    /// per document.
    pub fn extract_with<F, E>(&self, source: &str, read: F) -> ExtractedRecord
    where
        F: FnOnce() -> Result<String, E>,
        E: fmt::Display,
    {
        match read() {
            Ok(text) => self.extract(&text, source),
            Err(e) => {
                warn!("{}: text unavailable: {}", source, e);
                ExtractedRecord::degraded(source, e)
            }
        }
    }

    fn clean(&self, raw: &str) -> String {
        let value = raw.trim();
        match self.rules.cleanup() {
            Some(markers) => markers.truncate(value).trim().to_string(),
            None => value.to_string(),
        }
    }
}

/// Substring test on the case-folded text. "feminino" is checked first, so a
/// text holding both words is classified feminino.
pub fn infer_sex(text: &str) -> Option<Sex> {
    let folded = text.to_lowercase();
    if folded.contains("feminino") {
        Some(Sex::Feminino)
    } else if folded.contains("masculino") {
        Some(Sex::Masculino)
    } else {
        None
    }
}

// ── Tests ──

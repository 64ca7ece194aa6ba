use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Deserialize;

use super::pattern::{FieldPattern, RegexPattern, TruncationMarkers};
use crate::error::CatalogError;

const CATALOG_JSON: &str = include_str!("../../catalog.json");

#[derive(Deserialize)]
struct CatalogFile {
    version: u32,
    rules: Vec<RuleDef>,
    #[serde(default)]
    truncation_markers: Vec<String>,
    profiles: HashMap<String, ProfileDef>,
}

#[derive(Deserialize)]
struct RuleDef {
    field: String,
    pattern: String,
}

#[derive(Deserialize)]
struct ProfileDef {
    fields: Vec<String>,
    #[serde(default)]
    cleanup: bool,
    #[serde(default)]
    infer_sex: bool,
}

/// Catalog profile selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// All thirteen fields, value cleanup and sex inference
    Full,
    /// Unidade, Nome, CPF and Valor Total only
    Minimal,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Full => "full",
            Profile::Minimal => "minimal",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named extraction rule.
#[derive(Debug)]
pub struct FieldRule {
    pub field: String,
    pub pattern: Box<dyn FieldPattern>,
}

impl FieldRule {
    pub fn new(field: impl Into<String>, pattern: impl FieldPattern + 'static) -> Self {
        FieldRule {
            field: field.into(),
            pattern: Box::new(pattern),
        }
    }
}

/// Ordered, immutable rule set for one profile. Rule order is output column order.
#[derive(Debug)]
pub struct RuleSet {
    name: String,
    version: u32,
    rules: Vec<FieldRule>,
    cleanup: Option<TruncationMarkers>,
    infer_sex: bool,
}

impl RuleSet {
    /// Built-in catalog.
    pub fn load(profile: Profile) -> Result<Self, CatalogError> {
        Self::from_json(CATALOG_JSON, profile.as_str())
    }

    /// Parse and validate a whole catalog document, then select one profile.
    /// Every rule and every profile is checked, not only the selected one.
    pub fn from_json(json: &str, profile: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;

        let mut seen = HashSet::new();
        let mut compiled: HashMap<String, RegexPattern> = HashMap::new();
        for rule in &file.rules {
            if !seen.insert(rule.field.as_str()) {
                return Err(CatalogError::DuplicateField(rule.field.clone()));
            }
            let pattern = RegexPattern::compile(&rule.field, &rule.pattern)?;
            compiled.insert(rule.field.clone(), pattern);
        }

        for (name, def) in &file.profiles {
            if def.fields.is_empty() {
                return Err(CatalogError::EmptyProfile(name.clone()));
            }
            let mut listed = HashSet::new();
            for field in &def.fields {
                if !compiled.contains_key(field) {
                    return Err(CatalogError::UnknownField {
                        profile: name.clone(),
                        field: field.clone(),
                    });
                }
                if !listed.insert(field.as_str()) {
                    return Err(CatalogError::RepeatedProfileField {
                        profile: name.clone(),
                        field: field.clone(),
                    });
                }
            }
        }

        let def = file
            .profiles
            .get(profile)
            .ok_or_else(|| CatalogError::UnknownProfile(profile.to_string()))?;

        let rules = def
            .fields
            .iter()
            .filter_map(|field| {
                compiled
                    .remove(field)
                    .map(|pattern| FieldRule::new(field.clone(), pattern))
            })
            .collect();

        let cleanup = if def.cleanup {
            Some(TruncationMarkers::new(&file.truncation_markers)?)
        } else {
            None
        };

        Ok(RuleSet {
            name: profile.to_string(),
            version: file.version,
            rules,
            cleanup,
            infer_sex: def.infer_sex,
        })
    }

    /// Assemble a rule set from already-compiled rules, e.g. another matching backend.
    #[cfg(test)]
    pub fn from_rules(
        name: impl Into<String>,
        rules: Vec<FieldRule>,
        cleanup: Option<TruncationMarkers>,
        infer_sex: bool,
    ) -> Result<Self, CatalogError> {
        let name = name.into();
        if rules.is_empty() {
            return Err(CatalogError::EmptyProfile(name));
        }
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.field.as_str()) {
                return Err(CatalogError::DuplicateField(rule.field.clone()));
            }
        }
        Ok(RuleSet {
            name,
            version: 0,
            rules,
            cleanup,
            infer_sex,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.field.as_str())
    }

    pub fn cleanup(&self) -> Option<&TruncationMarkers> {
        self.cleanup.as_ref()
    }

    pub fn infers_sex(&self) -> bool {
        self.infer_sex
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_profile_order() {
        let set = RuleSet::load(Profile::Full).unwrap();
        let fields: Vec<&str> = set.fields().collect();
        assert_eq!(
            fields,
            vec![
                "Unidade",
                "Nome",
                "Data de Nascimento",
                "Estado Civil",
                "Nacionalidade",
                "CPF",
                "Endereço Residencial",
                "Bairro",
                "Cidade",
                "UF",
                "CEP",
                "E-mail",
                "Valor Total",
            ]
        );
        assert!(set.infers_sex());
        assert!(set.cleanup().is_some());
    }

    #[test]
    fn minimal_profile() {
        let set = RuleSet::load(Profile::Minimal).unwrap();
        let fields: Vec<&str> = set.fields().collect();
        assert_eq!(fields, vec!["Unidade", "Nome", "CPF", "Valor Total"]);
        assert!(!set.infers_sex());
        assert!(set.cleanup().is_none());
    }

    #[test]
    fn builtin_markers() {
        let set = RuleSet::load(Profile::Full).unwrap();
        let markers = set.cleanup().unwrap().markers();
        assert!(markers.iter().any(|m| m == "Telefone"));
        assert!(markers.iter().any(|m| m == "TIPO:"));
    }

    #[test]
    fn pattern_without_group_fails_fast() {
        let json = r#"{
            "version": 1,
            "rules": [{ "field": "CPF", "pattern": "CPF:\\s*\\d+" }],
            "profiles": { "p": { "fields": ["CPF"] } }
        }"#;
        let err = RuleSet::from_json(json, "p").unwrap_err();
        assert!(matches!(err, CatalogError::CaptureGroups { .. }));
    }

    #[test]
    fn invalid_rule_outside_selected_profile_still_fails() {
        let json = r#"{
            "version": 1,
            "rules": [
                { "field": "CPF", "pattern": "CPF:\\s*(\\d+)" },
                { "field": "CEP", "pattern": "CEP:\\s*\\d+" }
            ],
            "profiles": { "p": { "fields": ["CPF"] } }
        }"#;
        assert!(RuleSet::from_json(json, "p").is_err());
    }

    #[test]
    fn duplicate_field_rejected() {
        let json = r#"{
            "version": 1,
            "rules": [
                { "field": "CPF", "pattern": "CPF:\\s*(\\d+)" },
                { "field": "CPF", "pattern": "cpf\\s*(\\d+)" }
            ],
            "profiles": { "p": { "fields": ["CPF"] } }
        }"#;
        let err = RuleSet::from_json(json, "p").unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateField(f) if f == "CPF"));
    }

    #[test]
    fn profile_with_unknown_field_rejected() {
        let json = r#"{
            "version": 1,
            "rules": [{ "field": "CPF", "pattern": "CPF:\\s*(\\d+)" }],
            "profiles": { "p": { "fields": ["CPF", "RG"] } }
        }"#;
        let err = RuleSet::from_json(json, "p").unwrap_err();
        assert!(matches!(err, CatalogError::UnknownField { .. }));
    }

    #[test]
    fn unknown_and_empty_profiles_rejected() {
        let json = r#"{
            "version": 1,
            "rules": [{ "field": "CPF", "pattern": "CPF:\\s*(\\d+)" }],
            "profiles": { "p": { "fields": ["CPF"] } }
        }"#;
        assert!(matches!(
            RuleSet::from_json(json, "other").unwrap_err(),
            CatalogError::UnknownProfile(_)
        ));

        let empty = r#"{
            "version": 1,
            "rules": [{ "field": "CPF", "pattern": "CPF:\\s*(\\d+)" }],
            "profiles": { "p": { "fields": [] } }
        }"#;
        assert!(matches!(
            RuleSet::from_json(empty, "p").unwrap_err(),
            CatalogError::EmptyProfile(_)
        ));
    }

    #[test]
    fn malformed_json_rejected() {
        assert!(matches!(
            RuleSet::from_json("{ not json", "full").unwrap_err(),
            CatalogError::Parse(_)
        ));
    }

    #[test]
    fn from_rules_rejects_duplicates() {
        let rules = vec![
            FieldRule::new("CPF", RegexPattern::compile("CPF", r"CPF:\s*(\d+)").unwrap()),
            FieldRule::new("CPF", RegexPattern::compile("CPF", r"cpf\s*(\d+)").unwrap()),
        ];
        assert!(RuleSet::from_rules("custom", rules, None, false).is_err());
    }
}

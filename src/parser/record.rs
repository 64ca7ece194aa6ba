use serde::ser::{Serialize, SerializeMap, Serializer};

use super::catalog::RuleSet;

/// Rendered value of a field the engine could not find.
pub const NOT_FOUND: &str = "Não encontrado";

pub const COL_PROCESSED_AT: &str = "Data Processamento";
pub const COL_SOURCE: &str = "Arquivo";
pub const COL_SEX: &str = "Sexo";
pub const COL_ERROR: &str = "Erro";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Found(String),
    NotFound,
}

impl FieldValue {
    pub fn as_str(&self) -> &str {
        match self {
            FieldValue::Found(v) => v,
            FieldValue::NotFound => NOT_FOUND,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Feminino,
    Masculino,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Feminino => "feminino",
            Sex::Masculino => "masculino",
        }
    }
}

/// One record per document. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedRecord {
    Extracted {
        processed_at: String,
        source: String,
        fields: Vec<(String, FieldValue)>,
        /// `None` when the profile does not infer sex.
        sex: Option<FieldValue>,
    },
    /// Text could not be obtained. Carries only the source and the error text.
    Degraded { source: String, error: String },
}

impl ExtractedRecord {
    pub fn degraded(source: impl Into<String>, error: impl ToString) -> Self {
        ExtractedRecord::Degraded {
            source: source.into(),
            error: error.to_string(),
        }
    }

    pub fn source(&self) -> &str {
        match self {
            ExtractedRecord::Extracted { source, .. } | ExtractedRecord::Degraded { source, .. } => {
                source
            }
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ExtractedRecord::Degraded { .. })
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        match self {
            ExtractedRecord::Extracted { fields, .. } => {
                fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
            }
            ExtractedRecord::Degraded { .. } => None,
        }
    }

    /// Value under a table column, `None` when the record has no such key.
    pub fn get(&self, column: &str) -> Option<&str> {
        match self {
            ExtractedRecord::Extracted {
                processed_at,
                source,
                sex,
                ..
            } => match column {
                COL_PROCESSED_AT => Some(processed_at),
                COL_SOURCE => Some(source),
                COL_SEX => sex.as_ref().map(|s| s.as_str()),
                _ => self.field(column).map(|v| v.as_str()),
            },
            ExtractedRecord::Degraded { source, error } => match column {
                COL_SOURCE => Some(source),
                COL_ERROR => Some(error),
                _ => None,
            },
        }
    }

    /// Key/value pairs in output order.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        match self {
            ExtractedRecord::Extracted {
                processed_at,
                source,
                fields,
                sex,
            } => {
                let mut out = Vec::with_capacity(fields.len() + 3);
                out.push((COL_PROCESSED_AT, processed_at.as_str()));
                out.push((COL_SOURCE, source.as_str()));
                out.extend(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                if let Some(s) = sex {
                    out.push((COL_SEX, s.as_str()));
                }
                out
            }
            ExtractedRecord::Degraded { source, error } => {
                vec![(COL_SOURCE, source.as_str()), (COL_ERROR, error.as_str())]
            }
        }
    }
}

impl Serialize for ExtractedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries = self.entries();
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (k, v) in entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Records of one upload, in upload order.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    fields: Vec<String>,
    infers_sex: bool,
    records: Vec<ExtractedRecord>,
}

impl RecordBatch {
    pub fn new(rules: &RuleSet) -> Self {
        RecordBatch {
            fields: rules.fields().map(str::to_string).collect(),
            infers_sex: rules.infers_sex(),
            records: Vec::new(),
        }
    }

    pub fn from_records(rules: &RuleSet, records: Vec<ExtractedRecord>) -> Self {
        RecordBatch {
            records,
            ..Self::new(rules)
        }
    }

    #[cfg(test)]
    pub fn push(&mut self, record: ExtractedRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ExtractedRecord] {
        &self.records
    }

    pub fn degraded_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_degraded()).count()
    }

    /// Union of every key the batch can produce: metadata, catalog fields in
    /// profile order, `Sexo` when inferred, `Erro` when any record is degraded.
    pub fn columns(&self) -> Vec<&str> {
        let mut cols = Vec::with_capacity(self.fields.len() + 4);
        cols.push(COL_PROCESSED_AT);
        cols.push(COL_SOURCE);
        cols.extend(self.fields.iter().map(String::as_str));
        if self.infers_sex {
            cols.push(COL_SEX);
        }
        if self.records.iter().any(|r| r.is_degraded()) {
            cols.push(COL_ERROR);
        }
        cols
    }

    /// One row per record; keys a record lacks become empty cells.
    pub fn rows(&self) -> Vec<Vec<&str>> {
        let columns = self.columns();
        self.records
            .iter()
            .map(|r| columns.iter().map(|c| r.get(c).unwrap_or("")).collect())
            .collect()
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::catalog::Profile;

    fn extracted(source: &str) -> ExtractedRecord {
        ExtractedRecord::Extracted {
            processed_at: "01/02/2024 10:00:00".to_string(),
            source: source.to_string(),
            fields: vec![
                ("Unidade".to_string(), FieldValue::Found("12".to_string())),
                ("Nome".to_string(), FieldValue::NotFound),
                ("CPF".to_string(), FieldValue::Found("111.222.333-44".to_string())),
                ("Valor Total".to_string(), FieldValue::NotFound),
            ],
            sex: None,
        }
    }

    #[test]
    fn not_found_renders_sentinel() {
        let r = extracted("a.pdf");
        assert_eq!(r.get("Nome"), Some(NOT_FOUND));
        assert_eq!(r.get("Unidade"), Some("12"));
        assert_eq!(r.get(COL_SOURCE), Some("a.pdf"));
        assert_eq!(r.get(COL_SEX), None);
        assert_eq!(r.get(COL_ERROR), None);
    }

    #[test]
    fn degraded_has_only_source_and_error() {
        let r = ExtractedRecord::degraded("bad.pdf", "document has no pages");
        let keys: Vec<&str> = r.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![COL_SOURCE, COL_ERROR]);
        assert_eq!(r.get("CPF"), None);
        assert_eq!(r.get(COL_PROCESSED_AT), None);
    }

    #[test]
    fn serializes_in_column_order() {
        let json = serde_json::to_string(&extracted("a.pdf")).unwrap();
        let processed = json.find("Data Processamento").unwrap();
        let unidade = json.find("Unidade").unwrap();
        let valor = json.find("Valor Total").unwrap();
        assert!(processed < unidade && unidade < valor);
        assert!(json.contains("\"Nome\":\"Não encontrado\""));
    }

    #[test]
    fn batch_columns_and_rows() {
        let rules = RuleSet::load(Profile::Minimal).unwrap();
        let mut batch = RecordBatch::new(&rules);
        batch.push(extracted("a.pdf"));
        assert_eq!(
            batch.columns(),
            vec![COL_PROCESSED_AT, COL_SOURCE, "Unidade", "Nome", "CPF", "Valor Total"]
        );

        batch.push(ExtractedRecord::degraded("b.pdf", "boom"));
        let cols = batch.columns();
        assert_eq!(cols.last(), Some(&COL_ERROR));

        let rows = batch.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].last(), Some(&""));
        assert_eq!(rows[1], vec!["", "b.pdf", "", "", "", "", "boom"]);
        assert_eq!(batch.degraded_count(), 1);
    }

    #[test]
    fn full_profile_has_sex_column() {
        let rules = RuleSet::load(Profile::Full).unwrap();
        let batch = RecordBatch::new(&rules);
        assert!(batch.columns().contains(&COL_SEX));
        assert!(batch.is_empty());
    }
}

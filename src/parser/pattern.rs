use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::error::CatalogError;

/// A compiled field pattern: finds the first match in a text and yields the
/// text of its single capture group.
pub trait FieldPattern: fmt::Debug + Send + Sync {
    fn capture<'t>(&self, text: &'t str) -> Option<&'t str>;

    /// Source form of the pattern, for listings.
    fn source(&self) -> &str;
}

/// `regex` backend. Always case-insensitive.
#[derive(Debug, Clone)]
pub struct RegexPattern {
    re: Regex,
}

impl RegexPattern {
    pub fn compile(field: &str, pattern: &str) -> Result<Self, CatalogError> {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| CatalogError::InvalidPattern {
                field: field.to_string(),
                source,
            })?;

        // captures_len includes the implicit group 0
        let found = re.captures_len() - 1;
        if found != 1 {
            return Err(CatalogError::CaptureGroups {
                field: field.to_string(),
                found,
            });
        }
        Ok(RegexPattern { re })
    }
}

impl FieldPattern for RegexPattern {
    fn capture<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.re.captures(text)?.get(1).map(|m| m.as_str())
    }

    fn source(&self) -> &str {
        self.re.as_str()
    }
}

/// Label keywords of neighbouring fields. A captured value is cut at the
/// first one it contains, compared case-insensitively.
#[derive(Debug, Clone)]
pub struct TruncationMarkers {
    re: Option<Regex>,
    markers: Vec<String>,
}

impl TruncationMarkers {
    pub fn new(markers: &[String]) -> Result<Self, CatalogError> {
        let alternatives: Vec<String> = markers
            .iter()
            .filter(|m| !m.is_empty())
            .map(|m| regex::escape(m))
            .collect();
        let re = if alternatives.is_empty() {
            None
        } else {
            Some(
                RegexBuilder::new(&alternatives.join("|"))
                    .case_insensitive(true)
                    .build()
                    .map_err(CatalogError::Markers)?,
            )
        };
        Ok(TruncationMarkers {
            re,
            markers: markers.to_vec(),
        })
    }

    pub fn truncate<'a>(&self, value: &'a str) -> &'a str {
        match self.re.as_ref().and_then(|re| re.find(value)) {
            Some(m) => &value[..m.start()],
            None => value,
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }
}

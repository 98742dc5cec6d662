use crate::core::{EngineKind, Severity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Location {
    pub line: usize,
    pub column: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            line,
            column,
            snippet: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

/// A single reported issue. Findings are immutable once an engine has
/// produced them; the report-level `id` is assigned during aggregation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(rename = "type")]
    pub finding_type: String,

    pub severity: Severity,

    #[serde(rename = "tool")]
    pub engine: EngineKind,

    pub title: String,

    pub description: String,

    pub locations: Vec<Location>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl Finding {
    pub fn new(
        engine: EngineKind,
        finding_type: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            finding_type: finding_type.into(),
            severity,
            engine,
            title: title.into(),
            description: description.into(),
            locations: Vec::new(),
            remediation: None,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    /// Key used when merging findings across engines: two findings of the
    /// same type, from the same engine, at the same first location are
    /// considered duplicates.
    pub fn dedup_key(&self) -> String {
        let mut key = format!("{}:{}", self.engine, self.finding_type);
        if let Some(loc) = self.locations.first() {
            key.push_str(&format!(":{}:{}", loc.line, loc.column));
        }
        key
    }
}

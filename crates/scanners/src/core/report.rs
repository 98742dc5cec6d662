use crate::core::{EngineKind, EngineResult, Finding, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cap on the merged finding list carried by a report. `summary.total`
/// keeps the true count so truncation is observable, never silent.
pub const MAX_REPORT_FINDINGS: usize = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanMeta {
    pub scan_id: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeverityBreakdown {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl SeverityBreakdown {
    pub fn count(findings: &[Finding]) -> Self {
        let mut breakdown = Self::default();
        for finding in findings {
            match finding.severity {
                Severity::Critical => breakdown.critical += 1,
                Severity::High => breakdown.high += 1,
                Severity::Medium => breakdown.medium += 1,
                Severity::Low => breakdown.low += 1,
                Severity::Info => breakdown.info += 1,
            }
        }
        breakdown
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    /// True merged finding count before the report cap.
    pub total: usize,
    pub by_severity: SeverityBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreCard {
    #[serde(rename = "static")]
    pub static_score: u8,
    pub dynamic: u8,
    pub quality: u8,

    /// Absent when no AI scorer was configured; zero when it was configured
    /// but failed. The two cases carry different confidence penalties.
    pub ai: Option<u8>,

    /// Weighted composite, higher = fewer/lesser issues found.
    pub overall: u8,

    /// How much of the pipeline actually executed successfully, distinct
    /// from the risk score.
    pub confidence: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub meta: ScanMeta,
    pub summary: ScanSummary,

    /// Merged across engines, deduplicated, ordered by severity then
    /// discovery order, capped at [`MAX_REPORT_FINDINGS`].
    pub findings: Vec<Finding>,

    pub scores: ScoreCard,

    pub engine_results: BTreeMap<EngineKind, EngineResult>,

    /// Recovered engine/AI failures, formatted `"engine: message"`.
    pub errors: Vec<String>,
}

impl ScanReport {
    pub fn engine_result(&self, kind: EngineKind) -> Option<&EngineResult> {
        self.engine_results.get(&kind)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

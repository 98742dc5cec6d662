use crate::core::Finding;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hard cap on the findings carried by a single engine result. The true
/// detector count is kept in `total_findings` so truncation stays
/// observable.
pub const MAX_ENGINE_FINDINGS: usize = 20;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Static,
    Dynamic,
    Quality,
    Ai,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Dynamic => write!(f, "dynamic"),
            Self::Quality => write!(f, "quality"),
            Self::Ai => write!(f, "ai"),
        }
    }
}

impl EngineKind {
    pub const ALL: [EngineKind; 4] = [Self::Static, Self::Dynamic, Self::Quality, Self::Ai];

    /// Weight of this engine's score in the composite. The values are
    /// preserved as-is from the calibration the scoring model shipped with.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Static => 0.35,
            Self::Dynamic => 0.35,
            Self::Quality => 0.20,
            Self::Ai => 0.10,
        }
    }

    /// Confidence penalty when the engine was never dispatched (no input
    /// for it, disabled, or no endpoint configured).
    pub fn missing_penalty(&self) -> u32 {
        match self {
            Self::Static => 25,
            Self::Dynamic => 25,
            Self::Quality => 15,
            Self::Ai => 10,
        }
    }

    /// Confidence penalty when the engine was dispatched but failed.
    pub fn error_penalty(&self) -> u32 {
        match self {
            Self::Static => 20,
            Self::Dynamic => 20,
            Self::Quality => 10,
            Self::Ai => 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineResult {
    pub engine: EngineKind,

    /// 0..=100, higher means fewer/lesser issues.
    pub score: u8,

    /// Capped at [`MAX_ENGINE_FINDINGS`].
    pub findings: Vec<Finding>,

    /// True detector count before the cap.
    pub total_findings: usize,

    /// Engine-specific measurements, shape varies per engine.
    pub metrics: serde_json::Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: u64,
}

impl EngineResult {
    pub fn completed(
        engine: EngineKind,
        score: u8,
        mut findings: Vec<Finding>,
        metrics: serde_json::Value,
    ) -> Self {
        let total_findings = findings.len();
        findings.truncate(MAX_ENGINE_FINDINGS);
        Self {
            engine,
            score: score.min(100),
            findings,
            total_findings,
            metrics,
            error: None,
            duration_ms: 0,
        }
    }

    /// A result for an engine that threw. Scores zero and carries the
    /// error; the orchestrator folds it into the report instead of failing
    /// the request.
    pub fn failed(engine: EngineKind, error: impl Into<String>) -> Self {
        Self {
            engine,
            score: 0,
            findings: Vec::new(),
            total_findings: 0,
            metrics: serde_json::Value::Null,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn truncated(&self) -> bool {
        self.total_findings > self.findings.len()
    }
}

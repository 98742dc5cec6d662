//! Core data model and error taxonomy shared by every engine and the
//! orchestrator.
//!
//! Everything here is created per request and dropped with the report;
//! persistence, if a deployment wants it, lives behind the
//! [`ScanCache`] seam and belongs to the hosting service.

pub mod engine_result;
pub mod error;
pub mod finding;
pub mod interfaces;
pub mod report;
pub mod request;
pub mod severity;

pub use engine_result::{EngineKind, EngineResult, MAX_ENGINE_FINDINGS};
pub use error::{ScanError, ValidationError};
pub use finding::{Finding, Location};
pub use interfaces::{MemoryScanCache, ScanCache};
pub use report::{
    ScanMeta, ScanReport, ScanSummary, ScoreCard, SeverityBreakdown, MAX_REPORT_FINDINGS,
};
pub use request::ScanRequest;
pub use severity::Severity;

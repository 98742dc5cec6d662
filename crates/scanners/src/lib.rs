//! Kensa Scanners - Multi-Engine Contract Security Analysis
//!
//! This crate runs several independent analyzers concurrently over one
//! smart-contract artifact, merges their findings, and computes a weighted
//! composite risk score plus a confidence measure. No single analyzer's
//! failure ever aborts an analysis: engines degrade into scored-zero
//! results and the confidence figure records how much of the pipeline
//! actually ran.
//!
//! ## Engines
//!
//! - **Static**: pattern- and heuristic-based checks over source code.
//! - **Dynamic**: opcode/structure heuristics over a bytecode hex string —
//!   explicitly not a disassembler.
//! - **Quality**: complexity, documentation, naming, structure and
//!   best-practice metrics over source code.
//! - **AI**: an external HTTP scoring endpoint, consumed last with a
//!   bounded payload.

pub mod ai;
pub mod config;
pub mod core;
pub mod engines;
pub mod orchestrator;

pub use ai::{AiScore, AiScoreRequest, AiScorer, AiScorerError, HttpAiScorer};
pub use config::OrchestratorConfig;
pub use engines::{DetectorPattern, DynamicEngine, Engine, QualityEngine, StaticEngine};
pub use orchestrator::Orchestrator;
pub use self::core::{
    EngineKind, EngineResult, Finding, Location, MemoryScanCache, ScanCache, ScanError,
    ScanReport, ScanRequest, ScoreCard, Severity, ValidationError,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

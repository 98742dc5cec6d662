//! The three local analysis engines.
//!
//! Engines are independent detectors behind one trait: each consumes its
//! own read-only view of the request (source text or bytecode hex), shares
//! no mutable state with its siblings, and can therefore be dispatched
//! concurrently without locking. An engine that cannot complete returns an
//! error; converting that error into a degraded `EngineResult` is the
//! orchestrator's job, never the engine's.

pub mod dynamic_engine;
pub mod quality_engine;
pub mod static_engine;

use crate::core::{EngineKind, EngineResult, ScanRequest};
use anyhow::Result;

pub trait Engine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Whether the request carries the input this engine analyzes.
    fn applicable(&self, request: &ScanRequest) -> bool;

    fn analyze(&self, request: &ScanRequest) -> Result<EngineResult>;
}

pub use dynamic_engine::DynamicEngine;
pub use quality_engine::QualityEngine;
pub use static_engine::{DetectorPattern, StaticEngine};

//! Request lifecycle: validate, dispatch, join, score, assemble.
//!
//! The three local engines run as parallel blocking tasks over read-only
//! views of the request; the join barrier always waits for every dispatched
//! task to settle and converts failures into degraded `EngineResult`s. The
//! AI scorer runs strictly after the barrier because its payload carries
//! the local findings as context. The only hard-failure exit is validation,
//! before anything is dispatched.

pub mod aggregate;

use crate::ai::{AiContext, AiFindingDigest, AiScoreRequest, AiScorer, HttpAiScorer};
use crate::config::OrchestratorConfig;
use crate::core::{
    EngineKind, EngineResult, ScanError, ScanMeta, ScanReport, ScanRequest, ScanSummary, ScoreCard,
};
use crate::engines::{DynamicEngine, Engine, QualityEngine, StaticEngine};
use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct Orchestrator {
    engines: Vec<Arc<dyn Engine>>,
    scorer: Option<Arc<dyn AiScorer>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Build the standard pipeline: the three local engines, plus an HTTP
    /// scorer when the config names an endpoint.
    pub fn from_config(config: OrchestratorConfig) -> Result<Self> {
        let scorer: Option<Arc<dyn AiScorer>> = match &config.ai_endpoint {
            Some(url) => Some(Arc::new(HttpAiScorer::new(url.clone(), config.ai_timeout)?)),
            None => None,
        };

        Ok(Self {
            engines: vec![
                Arc::new(StaticEngine::new()),
                Arc::new(DynamicEngine::new()),
                Arc::new(QualityEngine::new()),
            ],
            scorer,
            config,
        })
    }

    pub fn new() -> Self {
        Self {
            engines: vec![
                Arc::new(StaticEngine::new()),
                Arc::new(DynamicEngine::new()),
                Arc::new(QualityEngine::new()),
            ],
            scorer: None,
            config: OrchestratorConfig::default(),
        }
    }

    /// Replace the engine set. Test seam; production uses `from_config`.
    pub fn with_engines(mut self, engines: Vec<Arc<dyn Engine>>) -> Self {
        self.engines = engines;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn AiScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the full pipeline for one request. Never fails for a
    /// structurally valid request: engine and AI errors degrade the report
    /// instead of aborting it.
    pub async fn analyze(&self, request: ScanRequest) -> Result<ScanReport, ScanError> {
        request.validate(self.config.max_code_bytes)?;

        let scan_id = Uuid::new_v4().to_string();
        let timestamp = Utc::now();
        let started = Instant::now();
        info!(%scan_id, address = %request.contract_address, "analysis dispatched");

        let request = Arc::new(request);
        let mut tasks = Vec::new();
        for engine in &self.engines {
            let kind = engine.kind();
            if !self.config.engine_enabled(kind) {
                debug!(%kind, "engine disabled by configuration");
                continue;
            }
            if !engine.applicable(&request) {
                debug!(%kind, "engine not applicable to this request");
                continue;
            }

            let engine = Arc::clone(engine);
            let request = Arc::clone(&request);
            tasks.push(async move {
                let task_started = Instant::now();
                let joined = tokio::task::spawn_blocking(move || engine.analyze(&request)).await;
                (kind, joined, task_started.elapsed())
            });
        }

        // Join barrier: every dispatched task settles, success or failure,
        // before anything downstream runs.
        let mut engine_results: BTreeMap<EngineKind, EngineResult> = BTreeMap::new();
        for (kind, joined, elapsed) in join_all(tasks).await {
            let result = match joined {
                Ok(Ok(result)) => result,
                Ok(Err(error)) => {
                    warn!(%kind, %error, "engine failed, degrading");
                    EngineResult::failed(kind, error.to_string())
                }
                Err(join_error) => {
                    warn!(%kind, %join_error, "engine task aborted, degrading");
                    EngineResult::failed(kind, format!("engine task aborted: {join_error}"))
                }
            };
            engine_results.insert(kind, result.with_duration_ms(elapsed.as_millis() as u64));
        }
        debug!(engines = engine_results.len(), "local engines joined");

        if let Some(scorer) = &self.scorer {
            let ai_request = self.build_ai_request(&request, &engine_results);
            let ai_started = Instant::now();
            let result = match scorer.score(&ai_request).await {
                Ok(ai) => EngineResult::completed(
                    EngineKind::Ai,
                    ai.score,
                    Vec::new(),
                    json!({ "raw": ai.raw }),
                ),
                Err(error) => {
                    warn!(%error, "AI scorer failed, degrading");
                    EngineResult::failed(EngineKind::Ai, error.to_string())
                }
            };
            engine_results.insert(
                EngineKind::Ai,
                result.with_duration_ms(ai_started.elapsed().as_millis() as u64),
            );
        }

        let merged = aggregate::merge_findings(&engine_results);
        let scores = ScoreCard {
            static_score: engine_results
                .get(&EngineKind::Static)
                .map_or(0, |r| r.score),
            dynamic: engine_results
                .get(&EngineKind::Dynamic)
                .map_or(0, |r| r.score),
            quality: engine_results
                .get(&EngineKind::Quality)
                .map_or(0, |r| r.score),
            ai: engine_results.get(&EngineKind::Ai).map(|r| r.score),
            overall: aggregate::overall_score(&engine_results),
            confidence: aggregate::confidence(&engine_results),
        };

        let errors: Vec<String> = engine_results
            .values()
            .filter_map(|result| {
                result
                    .error
                    .as_ref()
                    .map(|error| format!("{}: {error}", result.engine))
            })
            .collect();

        info!(
            %scan_id,
            overall = scores.overall,
            confidence = scores.confidence,
            findings = merged.total,
            "analysis completed"
        );

        Ok(ScanReport {
            meta: ScanMeta {
                scan_id,
                timestamp,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            summary: ScanSummary {
                total: merged.total,
                by_severity: merged.by_severity,
            },
            findings: merged.findings,
            scores,
            engine_results,
            errors,
        })
    }

    fn build_ai_request(
        &self,
        request: &ScanRequest,
        engine_results: &BTreeMap<EngineKind, EngineResult>,
    ) -> AiScoreRequest {
        let findings = [EngineKind::Static, EngineKind::Dynamic]
            .iter()
            .filter_map(|kind| engine_results.get(kind))
            .flat_map(|result| result.findings.iter())
            .take(self.config.ai_context_findings)
            .map(|finding| AiFindingDigest {
                engine: finding.engine.to_string(),
                finding_type: finding.finding_type.clone(),
                severity: finding.severity.to_string().to_lowercase(),
                title: finding.title.clone(),
            })
            .collect();

        AiScoreRequest {
            source_code_excerpt: truncate_utf8(
                request.source_code.as_deref().unwrap_or(""),
                self.config.ai_source_excerpt_bytes,
            ),
            bytecode_excerpt: truncate_utf8(
                request.bytecode.as_deref().unwrap_or(""),
                self.config.ai_bytecode_excerpt_bytes,
            ),
            context: AiContext {
                contract_address: request.contract_address.clone(),
                code_hash: request.code_hash.clone(),
                findings,
            },
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_utf8(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

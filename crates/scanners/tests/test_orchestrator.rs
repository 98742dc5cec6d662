use anyhow::{anyhow, Result};
use async_trait::async_trait;
use kensa_scanners::{
    AiScore, AiScoreRequest, AiScorer, AiScorerError, Engine, EngineKind, EngineResult,
    Finding, HttpAiScorer, MemoryScanCache, Orchestrator, OrchestratorConfig, ScanCache,
    ScanError, ScanRequest, Severity,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SOURCE: &str = r#"
contract Treasury {
    address public owner;
    uint256 public balance;

    constructor() {
        owner = msg.sender;
        balance = 0;
    }

    function withdraw(uint256 amount) public {
        require(msg.sender == owner, "not owner");
        (bool ok, ) = msg.sender.call{value: amount}("");
        require(ok, "transfer failed");
        balance -= amount;
    }
}
"#;

fn full_request() -> ScanRequest {
    ScanRequest::new("0x3333333333333333333333333333333333333333", "codehash")
        .with_source(SOURCE)
        .with_bytecode(format!("6080604052{}", "60".repeat(60)))
}

/// An address that refuses connections immediately: bind an ephemeral port,
/// then drop the listener before anyone dials it.
fn refused_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/score")
}

struct FixedEngine {
    kind: EngineKind,
    score: u8,
}

impl Engine for FixedEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }
    fn applicable(&self, _request: &ScanRequest) -> bool {
        true
    }
    fn analyze(&self, _request: &ScanRequest) -> Result<EngineResult> {
        Ok(EngineResult::completed(
            self.kind,
            self.score,
            Vec::new(),
            serde_json::Value::Null,
        ))
    }
}

struct FailingEngine {
    kind: EngineKind,
}

impl Engine for FailingEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }
    fn applicable(&self, _request: &ScanRequest) -> bool {
        true
    }
    fn analyze(&self, _request: &ScanRequest) -> Result<EngineResult> {
        Err(anyhow!("engine exploded"))
    }
}

struct PanickingEngine;

impl Engine for PanickingEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Static
    }
    fn applicable(&self, _request: &ScanRequest) -> bool {
        true
    }
    fn analyze(&self, _request: &ScanRequest) -> Result<EngineResult> {
        panic!("engine panicked mid-scan");
    }
}

struct CountingEngine {
    kind: EngineKind,
    dispatched: Arc<AtomicUsize>,
}

impl Engine for CountingEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }
    fn applicable(&self, request: &ScanRequest) -> bool {
        request.has_source()
    }
    fn analyze(&self, _request: &ScanRequest) -> Result<EngineResult> {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        Ok(EngineResult::completed(
            self.kind,
            100,
            Vec::new(),
            serde_json::Value::Null,
        ))
    }
}

struct SpamEngine {
    count: usize,
}

impl Engine for SpamEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Static
    }
    fn applicable(&self, _request: &ScanRequest) -> bool {
        true
    }
    fn analyze(&self, _request: &ScanRequest) -> Result<EngineResult> {
        let findings = (0..self.count)
            .map(|i| {
                Finding::new(
                    EngineKind::Static,
                    format!("issue_{i}"),
                    Severity::Medium,
                    format!("issue {i}"),
                    "spam",
                )
            })
            .collect();
        Ok(EngineResult::completed(
            EngineKind::Static,
            0,
            findings,
            serde_json::Value::Null,
        ))
    }
}

struct FixedAiScorer {
    score: u8,
}

#[async_trait]
impl AiScorer for FixedAiScorer {
    async fn score(&self, _request: &AiScoreRequest) -> Result<AiScore, AiScorerError> {
        Ok(AiScore {
            score: self.score,
            raw: None,
        })
    }
    fn endpoint(&self) -> &str {
        "fixed://test"
    }
}

fn fixed_local_engines(score: u8) -> Vec<Arc<dyn Engine>> {
    vec![
        Arc::new(FixedEngine {
            kind: EngineKind::Static,
            score,
        }),
        Arc::new(FixedEngine {
            kind: EngineKind::Dynamic,
            score,
        }),
        Arc::new(FixedEngine {
            kind: EngineKind::Quality,
            score,
        }),
    ]
}

#[tokio::test]
async fn missing_code_raises_code_required_without_dispatch() {
    let dispatched = Arc::new(AtomicUsize::new(0));
    let orchestrator = Orchestrator::new().with_engines(vec![Arc::new(CountingEngine {
        kind: EngineKind::Static,
        dispatched: Arc::clone(&dispatched),
    }) as Arc<dyn Engine>]);

    let request = ScanRequest::new("0xabc", "codehash");
    let err = orchestrator.analyze(request).await.unwrap_err();

    assert_eq!(err.code(), "CODE_REQUIRED");
    assert_eq!(dispatched.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oversized_payload_raises_code_too_large() {
    let orchestrator = Orchestrator::new();
    let request = ScanRequest::new("0xabc", "codehash").with_source("x".repeat(200 * 1024));

    let err = orchestrator.analyze(request).await.unwrap_err();
    assert_eq!(err.code(), "CODE_TOO_LARGE");
}

#[tokio::test]
async fn all_engines_at_100_give_overall_100() {
    let orchestrator = Orchestrator::new()
        .with_engines(fixed_local_engines(100))
        .with_scorer(Arc::new(FixedAiScorer { score: 100 }));

    let report = orchestrator.analyze(full_request()).await.unwrap();
    assert_eq!(report.scores.overall, 100);
    assert_eq!(report.scores.confidence, 100);
    assert_eq!(report.scores.ai, Some(100));
}

#[tokio::test]
async fn all_engines_at_0_give_overall_0_with_full_confidence() {
    let orchestrator = Orchestrator::new()
        .with_engines(fixed_local_engines(0))
        .with_scorer(Arc::new(FixedAiScorer { score: 0 }));

    let report = orchestrator.analyze(full_request()).await.unwrap();
    assert_eq!(report.scores.overall, 0);
    // Risk and confidence are distinct: everything ran, nothing is trusted
    // less for it.
    assert_eq!(report.scores.confidence, 100);
}

#[tokio::test]
async fn missing_ai_caps_overall_at_90() {
    let orchestrator = Orchestrator::new().with_engines(fixed_local_engines(100));

    let report = orchestrator.analyze(full_request()).await.unwrap();
    assert_eq!(report.scores.overall, 90);
    assert_eq!(report.scores.ai, None);
    assert_eq!(report.scores.confidence, 90); // AI missing: -10
}

#[tokio::test]
async fn every_engine_erroring_still_returns_a_report() {
    let orchestrator = Orchestrator::new()
        .with_engines(vec![
            Arc::new(FailingEngine {
                kind: EngineKind::Static,
            }) as Arc<dyn Engine>,
            Arc::new(FailingEngine {
                kind: EngineKind::Dynamic,
            }),
            Arc::new(FailingEngine {
                kind: EngineKind::Quality,
            }),
        ])
        .with_scorer(Arc::new(
            HttpAiScorer::new(refused_endpoint(), Duration::from_secs(2)).unwrap(),
        ));

    let report = orchestrator.analyze(full_request()).await.unwrap();

    assert_eq!(report.scores.overall, 0);
    assert_eq!(report.scores.confidence, 0);
    assert_eq!(report.errors.len(), 4);
    assert!(report
        .engine_results
        .values()
        .all(|result| result.error.is_some() && result.score == 0));
}

#[tokio::test]
async fn panicking_engine_degrades_instead_of_aborting() {
    let orchestrator = Orchestrator::new().with_engines(vec![
        Arc::new(PanickingEngine) as Arc<dyn Engine>,
        Arc::new(FixedEngine {
            kind: EngineKind::Dynamic,
            score: 80,
        }),
        Arc::new(FixedEngine {
            kind: EngineKind::Quality,
            score: 80,
        }),
    ]);

    let report = orchestrator.analyze(full_request()).await.unwrap();

    let static_result = report.engine_result(EngineKind::Static).unwrap();
    assert_eq!(static_result.score, 0);
    assert!(static_result.error.as_deref().unwrap().contains("aborted"));
    // The siblings were never cancelled.
    assert_eq!(report.engine_result(EngineKind::Dynamic).unwrap().score, 80);
}

#[tokio::test]
async fn failing_ai_endpoint_costs_5_confidence_where_disabled_costs_10() {
    let with_failing_ai = Orchestrator::new()
        .with_engines(fixed_local_engines(100))
        .with_scorer(Arc::new(
            HttpAiScorer::new(refused_endpoint(), Duration::from_secs(2)).unwrap(),
        ));
    let without_ai = Orchestrator::new().with_engines(fixed_local_engines(100));

    let failing = with_failing_ai.analyze(full_request()).await.unwrap();
    let disabled = without_ai.analyze(full_request()).await.unwrap();

    assert_eq!(failing.scores.confidence, 95);
    assert_eq!(disabled.scores.confidence, 90);
    assert_eq!(failing.scores.confidence - disabled.scores.confidence, 5);

    // Configured-but-failing is observable: the AI result exists, scored
    // zero, with its error recorded.
    assert_eq!(failing.scores.ai, Some(0));
    assert!(failing.errors.iter().any(|e| e.starts_with("ai:")));
    assert_eq!(disabled.scores.ai, None);
}

#[tokio::test]
async fn disabling_an_engine_reduces_confidence_by_its_missing_penalty() {
    let config = OrchestratorConfig::default().without_engine(EngineKind::Dynamic);
    let orchestrator = Orchestrator::from_config(config).unwrap();

    let report = orchestrator.analyze(full_request()).await.unwrap();

    assert!(report.engine_result(EngineKind::Dynamic).is_none());
    // Dynamic missing: -25, AI missing: -10.
    assert_eq!(report.scores.confidence, 65);
}

#[tokio::test]
async fn merged_findings_are_capped_with_true_total_preserved() {
    let orchestrator = Orchestrator::new().with_engines(vec![
        Arc::new(SpamEngine { count: 30 }) as Arc<dyn Engine>,
    ]);

    let report = orchestrator.analyze(full_request()).await.unwrap();

    assert_eq!(report.findings.len(), 15);
    assert_eq!(report.summary.total, 30);
    assert_eq!(report.summary.by_severity.medium, 20); // engine cap
    assert!(report.findings.iter().all(|f| !f.id.is_empty()));
}

#[tokio::test]
async fn identical_requests_produce_identical_scores_and_findings() {
    let orchestrator = Orchestrator::new();

    let first = orchestrator.analyze(full_request()).await.unwrap();
    let second = orchestrator.analyze(full_request()).await.unwrap();

    assert_eq!(first.scores, second.scores);
    assert_eq!(first.findings, second.findings);
    assert_eq!(first.summary.total, second.summary.total);
    assert_ne!(first.meta.scan_id, second.meta.scan_id);
}

#[tokio::test]
async fn real_engines_run_end_to_end_over_source_and_bytecode() {
    let orchestrator = Orchestrator::new();
    let report = orchestrator.analyze(full_request()).await.unwrap();

    assert!(report.engine_result(EngineKind::Static).is_some());
    assert!(report.engine_result(EngineKind::Dynamic).is_some());
    assert!(report.engine_result(EngineKind::Quality).is_some());
    assert!(report.engine_result(EngineKind::Ai).is_none());

    let static_result = report.engine_result(EngineKind::Static).unwrap();
    assert!(static_result
        .findings
        .iter()
        .any(|f| f.finding_type == "reentrancy"));
    assert!(report.scores.overall <= 100);
    assert_eq!(report.errors.len(), 0);
}

#[tokio::test]
async fn source_only_request_skips_dynamic_engine() {
    let orchestrator = Orchestrator::new();
    let request =
        ScanRequest::new("0xabc", "codehash").with_source("contract A { function f() public {} }");

    let report = orchestrator.analyze(request).await.unwrap();

    assert!(report.engine_result(EngineKind::Dynamic).is_none());
    assert!(report.engine_result(EngineKind::Static).is_some());
    // Dynamic missing -25, AI missing -10.
    assert_eq!(report.scores.confidence, 65);
}

#[tokio::test]
async fn report_serializes_to_the_wire_shape() {
    let orchestrator = Orchestrator::new();
    let report = orchestrator.analyze(full_request()).await.unwrap();

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert!(json["meta"]["scanId"].is_string());
    assert!(json["meta"]["durationMs"].is_number());
    assert!(json["summary"]["total"].is_number());
    assert!(json["summary"]["bySeverity"]["high"].is_number());
    assert!(json["scores"]["static"].is_number());
    assert!(json["scores"]["overall"].is_number());
    assert!(json["scores"]["confidence"].is_number());
    assert!(json["engineResults"]["static"]["score"].is_number());

    let finding = &json["findings"][0];
    assert!(finding["id"].is_string());
    assert!(finding["tool"].is_string());
    assert!(finding["type"].is_string());
    assert!(finding["severity"].is_string());
}

#[tokio::test]
async fn hosting_services_can_cache_reports_by_code_hash() {
    let orchestrator = Orchestrator::new();
    let cache = MemoryScanCache::new();

    let request = full_request();
    let code_hash = request.code_hash.clone();
    let report = orchestrator.analyze(request).await.unwrap();

    cache.set(&code_hash, report.clone());
    let cached = cache.get(&code_hash).unwrap();
    assert_eq!(cached.meta.scan_id, report.meta.scan_id);
    assert!(cache.get("unseen-hash").is_none());
}

#[test]
fn admission_control_errors_expose_wire_codes() {
    assert_eq!(ScanError::RateLimited.code(), "RATE_LIMITED");
    assert_eq!(ScanError::ScannerBusy.code(), "SCANNER_BUSY");
}

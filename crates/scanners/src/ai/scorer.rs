use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum AiScorerError {
    #[error("AI endpoint timed out after {0} seconds")]
    Timeout(u64),

    #[error("AI endpoint returned status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response payload: {0}")]
    InvalidResponse(String),
}

/// Bounded payload sent to the scoring endpoint. Excerpts are truncated by
/// the orchestrator before this struct is built; the endpoint never sees
/// the full artifact.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiScoreRequest {
    pub source_code_excerpt: String,
    pub bytecode_excerpt: String,
    pub context: AiContext,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiContext {
    pub contract_address: String,
    pub code_hash: String,
    pub findings: Vec<AiFindingDigest>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiFindingDigest {
    pub engine: String,
    pub finding_type: String,
    pub severity: String,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
struct AiScoreResponse {
    score: f64,
    #[serde(default)]
    raw: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct AiScore {
    /// Clamped to 0..=100 regardless of what the endpoint returned.
    pub score: u8,
    pub raw: Option<serde_json::Value>,
}

#[async_trait]
pub trait AiScorer: Send + Sync {
    async fn score(&self, request: &AiScoreRequest) -> Result<AiScore, AiScorerError>;

    fn endpoint(&self) -> &str;
}

/// HTTP adapter for the scoring endpoint: one POST, fixed timeout, no
/// retries. The timeout is owned by the client itself so it holds even if
/// the caller abandons the request.
pub struct HttpAiScorer {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpAiScorer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AiScorerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiScorerError::Network(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }
}

#[async_trait]
impl AiScorer for HttpAiScorer {
    async fn score(&self, request: &AiScoreRequest) -> Result<AiScore, AiScorerError> {
        debug!(endpoint = %self.endpoint, "requesting AI score");

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiScorerError::Timeout(self.timeout.as_secs())
                } else {
                    AiScorerError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "AI endpoint rejected request");
            return Err(AiScorerError::Status(status.as_u16()));
        }

        let body: AiScoreResponse = response
            .json()
            .await
            .map_err(|e| AiScorerError::InvalidResponse(e.to_string()))?;

        let score = body.score.clamp(0.0, 100.0).round() as u8;
        debug!(score, "AI score received");

        Ok(AiScore {
            score,
            raw: body.raw,
        })
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

use crate::core::EngineKind;
use std::time::Duration;

/// Pipeline configuration: per-engine enable flags, the optional AI scoring
/// endpoint, and the payload ceilings. Everything is settable in code; the
/// `from_env` constructor exists for deployments that configure through the
/// environment.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub static_enabled: bool,
    pub dynamic_enabled: bool,
    pub quality_enabled: bool,

    /// URL of the external AI scoring endpoint. `None` disables the AI step
    /// entirely, which is scored differently from a configured-but-failing
    /// endpoint.
    pub ai_endpoint: Option<String>,

    pub ai_timeout: Duration,

    /// Ceiling on `sourceCode` + `bytecode` accepted per request.
    pub max_code_bytes: usize,

    /// Excerpt ceilings for the AI payload.
    pub ai_source_excerpt_bytes: usize,
    pub ai_bytecode_excerpt_bytes: usize,

    /// How many findings are passed to the AI scorer as context.
    pub ai_context_findings: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            static_enabled: true,
            dynamic_enabled: true,
            quality_enabled: true,
            ai_endpoint: None,
            ai_timeout: Duration::from_secs(30),
            max_code_bytes: 100 * 1024,
            ai_source_excerpt_bytes: 4096,
            ai_bytecode_excerpt_bytes: 2048,
            ai_context_findings: 10,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("KENSA_STATIC_ENABLED") {
            config.static_enabled = parse_flag(&value);
        }
        if let Ok(value) = std::env::var("KENSA_DYNAMIC_ENABLED") {
            config.dynamic_enabled = parse_flag(&value);
        }
        if let Ok(value) = std::env::var("KENSA_QUALITY_ENABLED") {
            config.quality_enabled = parse_flag(&value);
        }
        if let Ok(url) = std::env::var("KENSA_AI_ENDPOINT") {
            if !url.trim().is_empty() {
                config.ai_endpoint = Some(url.trim().to_string());
            }
        }
        if let Ok(secs) = std::env::var("KENSA_AI_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.ai_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(bytes) = std::env::var("KENSA_MAX_CODE_BYTES") {
            if let Ok(bytes) = bytes.parse::<usize>() {
                config.max_code_bytes = bytes;
            }
        }

        config
    }

    pub fn with_ai_endpoint(mut self, url: impl Into<String>) -> Self {
        self.ai_endpoint = Some(url.into());
        self
    }

    pub fn without_engine(mut self, kind: EngineKind) -> Self {
        match kind {
            EngineKind::Static => self.static_enabled = false,
            EngineKind::Dynamic => self.dynamic_enabled = false,
            EngineKind::Quality => self.quality_enabled = false,
            EngineKind::Ai => self.ai_endpoint = None,
        }
        self
    }

    pub fn engine_enabled(&self, kind: EngineKind) -> bool {
        match kind {
            EngineKind::Static => self.static_enabled,
            EngineKind::Dynamic => self.dynamic_enabled,
            EngineKind::Quality => self.quality_enabled,
            EngineKind::Ai => self.ai_endpoint.is_some(),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

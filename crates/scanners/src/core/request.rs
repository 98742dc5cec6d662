use crate::core::ValidationError;
use serde::{Deserialize, Serialize};

/// One analysis request. Engines receive read-only references; nothing in
/// the pipeline mutates it after validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub contract_address: String,

    /// Content hash of the submitted artifact, used by hosting services for
    /// correlation and caching.
    pub code_hash: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,

    /// Hex string, optionally `0x`-prefixed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytecode: Option<String>,
}

impl ScanRequest {
    pub fn new(contract_address: impl Into<String>, code_hash: impl Into<String>) -> Self {
        Self {
            contract_address: contract_address.into(),
            code_hash: code_hash.into(),
            source_code: None,
            bytecode: None,
        }
    }

    pub fn with_source(mut self, source_code: impl Into<String>) -> Self {
        self.source_code = Some(source_code.into());
        self
    }

    pub fn with_bytecode(mut self, bytecode: impl Into<String>) -> Self {
        self.bytecode = Some(bytecode.into());
        self
    }

    pub fn has_source(&self) -> bool {
        self.source_code.is_some()
    }

    pub fn has_bytecode(&self) -> bool {
        self.bytecode.is_some()
    }

    /// Bytecode with whitespace and any `0x` prefix stripped, lowercased.
    pub fn normalized_bytecode(&self) -> Option<String> {
        self.bytecode.as_deref().map(|raw| {
            let trimmed = raw.trim();
            let stripped = trimmed
                .strip_prefix("0x")
                .or_else(|| trimmed.strip_prefix("0X"))
                .unwrap_or(trimmed);
            stripped.to_ascii_lowercase()
        })
    }

    /// Synchronous pre-dispatch validation. Fails fast before any engine
    /// runs.
    pub fn validate(&self, max_code_bytes: usize) -> Result<(), ValidationError> {
        if self.contract_address.trim().is_empty() {
            return Err(ValidationError::MissingField("contractAddress"));
        }
        if self.code_hash.trim().is_empty() {
            return Err(ValidationError::MissingField("codeHash"));
        }
        if self.source_code.is_none() && self.bytecode.is_none() {
            return Err(ValidationError::CodeRequired);
        }

        if let Some(hex) = self.normalized_bytecode() {
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(ValidationError::InvalidBytecode);
            }
        }

        let payload = self.source_code.as_deref().map_or(0, str::len)
            + self.bytecode.as_deref().map_or(0, str::len);
        if payload > max_code_bytes {
            return Err(ValidationError::CodeTooLarge {
                limit: max_code_bytes,
            });
        }

        Ok(())
    }
}

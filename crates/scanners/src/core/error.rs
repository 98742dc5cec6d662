use thiserror::Error;

/// Request-level failures. Engine and AI failures never surface here; they
/// degrade into `EngineResult { error, score: 0 }` instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Admission-control rejection issued by the hosting service. The core
    /// defines the type but never raises it itself.
    #[error("too many analysis requests, slow down")]
    RateLimited,

    /// Concurrency-cap rejection issued by the hosting service.
    #[error("scanner is at capacity, try again later")]
    ScannerBusy,
}

impl ScanError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.code(),
            Self::RateLimited => "RATE_LIMITED",
            Self::ScannerBusy => "SCANNER_BUSY",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("either sourceCode or bytecode must be provided")]
    CodeRequired,

    #[error("required field `{0}` is missing or blank")]
    MissingField(&'static str),

    #[error("bytecode is not a valid hex string")]
    InvalidBytecode,

    #[error("submitted code exceeds the {limit} byte ceiling")]
    CodeTooLarge { limit: usize },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CodeRequired => "CODE_REQUIRED",
            // A request without its identifying fields is structurally
            // invalid in the same way malformed code is; the wire protocol
            // has no dedicated code for it.
            Self::MissingField(_) => "INVALID_CODE",
            Self::InvalidBytecode => "INVALID_CODE",
            Self::CodeTooLarge { .. } => "CODE_TOO_LARGE",
        }
    }
}

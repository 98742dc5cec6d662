//! External AI scoring collaborator.
//!
//! The orchestrator consumes this interface last, strictly after the local
//! engines have settled, because the payload carries their findings as
//! context. Any failure here degrades the report the same way a failed
//! engine does; it never fails the request.

pub mod scorer;

pub use scorer::{
    AiContext, AiFindingDigest, AiScore, AiScoreRequest, AiScorer, AiScorerError, HttpAiScorer,
};

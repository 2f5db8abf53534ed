//! Coordinator services

pub mod orchestrator;
pub mod pacing;
pub mod progress;

pub use orchestrator::{
    BatchHandle, BatchOrchestrator, ConnectionCheck, FoundCheck, OrchestratorSettings,
    RequeueOutcome, MAX_ATTEMPTS,
};
pub use pacing::PacingGate;
pub use progress::ProgressPublisher;

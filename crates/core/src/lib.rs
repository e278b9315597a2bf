//! Node-health arbitration: decides which nodes of a session hold a recent
//! enough copy of chain state to keep serving relays.

pub mod altruist;
pub mod config;
pub mod orchestrator;
pub mod payload;
pub mod sync_checker;

// Re-export commonly used types
pub use altruist::{AltruistClient, HttpAltruist};
pub use config::{OrchestratorConfig, SyncCheckConfig};
pub use orchestrator::{
    plan_targets, BatchReport, CheckOrchestrator, CheckTarget, PairFailure, PairOutcome,
};
pub use sync_checker::{SyncCheckRequest, SyncChecker};

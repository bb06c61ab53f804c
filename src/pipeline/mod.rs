//! Cartridge execution pipelines.
//!
//! Three tiers, outermost first:
//! 1. `PipelineRunner` — fans out to every enabled domain concurrently,
//!    then to every member's personal pipeline. Single entry point for the
//!    upstream system pipeline.
//! 2. `DomainPipeline` — one domain's dependency-ordered levels, each level
//!    executed concurrently under the autonomy policy.
//! 3. `PersonalPipeline` — one member's flat, leaf-only cartridge set.
//!
//! Cartridge failures (including timeouts) are isolated per invocation and
//! surface only as observability records; they never cross a pipeline
//! boundary.

pub mod domain;
pub mod personal;
pub mod runner;

pub use domain::DomainPipeline;
pub use personal::PersonalPipeline;
pub use runner::{PipelineRunner, PipelineSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::autonomy::AutonomyLevel;
use crate::envelope::EventEnvelope;

// ── Observability records ───────────────────────────────────────────

/// Outcome of one cartridge invocation.
#[derive(Debug, Clone)]
pub enum CartridgeStatus {
    /// The cartridge ran to completion.
    Completed {
        produced_output: bool,
        notified: bool,
    },
    /// The cartridge was not run, with the reason (e.g. `autonomy=manual`).
    Skipped { reason: String },
    /// The invocation failed or timed out. Isolated — siblings unaffected.
    Failed { error: String },
}

/// One cartridge invocation, for observability.
#[derive(Debug, Clone)]
pub struct CartridgeRecord {
    pub domain: String,
    pub cartridge_id: String,
    /// Effective autonomy level; `None` in the personal tier, which the
    /// matrix does not govern.
    pub autonomy: Option<AutonomyLevel>,
    pub status: CartridgeStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Result of one domain pipeline run.
#[derive(Debug, Clone)]
pub struct DomainRunReport {
    pub domain: String,
    pub records: Vec<CartridgeRecord>,
    /// Last non-empty envelope produced across all cartridges that ran.
    pub output: Option<EventEnvelope>,
}

/// Result of one personal pipeline run.
#[derive(Debug, Clone)]
pub struct PersonalRunReport {
    pub member: String,
    pub records: Vec<CartridgeRecord>,
}

/// Full fan-out result for one event. Observability only: the upstream
/// pipeline's own result is already finalized and is never touched.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    /// Pipeline-set generation the run executed against.
    pub generation: u64,
    pub domains: Vec<DomainRunReport>,
    pub personal: Vec<PersonalRunReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Total number of cartridge invocations recorded (all tiers).
    pub fn record_count(&self) -> usize {
        self.domains.iter().map(|d| d.records.len()).sum::<usize>()
            + self.personal.iter().map(|p| p.records.len()).sum::<usize>()
    }
}

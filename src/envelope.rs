//! Event envelope and the cartridge invocation seam.
//!
//! The envelope arrives already classified and enriched by the shared
//! ingestion pipeline. This layer treats its payload as opaque: cartridges
//! may read it, and may return an updated copy, but the engine itself never
//! interprets it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CartridgeError;

// ── Event envelope ──────────────────────────────────────────────────

/// A classified event handed down from the shared ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event id.
    pub id: Uuid,
    /// Dotted event type, e.g. "build.complete" or "ticket.opened".
    pub event_type: String,
    /// Where the event originated (channel, service, probe).
    pub source: String,
    /// The person this event concerns, if any. Drives the personal tier.
    pub member: Option<String>,
    /// Opaque classified payload. Cartridges own its semantics.
    pub payload: serde_json::Value,
    /// When the event occurred upstream.
    pub occurred_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// Build a new envelope for an event type and source.
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            source: source.into(),
            member: None,
            payload,
            occurred_at: Utc::now(),
        }
    }

    /// Attach the member the event concerns.
    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }
}

// ── Cartridge context ───────────────────────────────────────────────

/// Per-invocation context handed to a cartridge alongside the envelope.
#[derive(Debug, Clone)]
pub struct CartridgeContext {
    /// Domain the cartridge is running in ("personal" for the personal tier).
    pub domain: String,
    /// Member the pipeline belongs to, for personal-tier invocations.
    pub member: Option<String>,
    /// When the invocation started.
    pub invoked_at: DateTime<Utc>,
}

impl CartridgeContext {
    /// Context for a domain-tier invocation.
    pub fn for_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            member: None,
            invoked_at: Utc::now(),
        }
    }

    /// Context for a personal-tier invocation.
    pub fn for_member(member: impl Into<String>) -> Self {
        Self {
            domain: "personal".to_string(),
            member: Some(member.into()),
            invoked_at: Utc::now(),
        }
    }
}

// ── Cartridge trait ─────────────────────────────────────────────────

/// The executable unit a manifest's `entry_point` binds to.
///
/// One method: take the envelope and a context, return an updated envelope
/// (`Some`), nothing (`None`), or a failure. Failures are isolated at the
/// call site — they never cross the pipeline boundary.
#[async_trait]
pub trait Cartridge: Send + Sync {
    async fn process(
        &self,
        event: &EventEnvelope,
        ctx: &CartridgeContext,
    ) -> Result<Option<EventEnvelope>, CartridgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_construction() {
        let env = EventEnvelope::new("build.complete", "ci", serde_json::json!({"ok": true}))
            .with_member("alice");
        assert_eq!(env.event_type, "build.complete");
        assert_eq!(env.source, "ci");
        assert_eq!(env.member.as_deref(), Some("alice"));
        assert_eq!(env.payload["ok"], true);
    }

    #[test]
    fn context_scopes() {
        let d = CartridgeContext::for_domain("ops");
        assert_eq!(d.domain, "ops");
        assert!(d.member.is_none());

        let p = CartridgeContext::for_member("alice");
        assert_eq!(p.domain, "personal");
        assert_eq!(p.member.as_deref(), Some("alice"));
    }

    #[test]
    fn envelope_serialization_round_trip() {
        let env = EventEnvelope::new("ticket.opened", "helpdesk", serde_json::json!({}));
        let json = serde_json::to_string(&env).unwrap();
        let back: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, env.id);
        assert_eq!(back.event_type, "ticket.opened");
    }
}

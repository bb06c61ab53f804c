//! Personal pipeline — one member's leaf-only cartridges.
//!
//! Leaves have no dependencies among themselves by construction (the loader
//! rejects anything else), so there are no levels and no ordering to
//! preserve. Runs concurrently with the same per-invocation isolation and
//! timeout as the domain tier. The autonomy matrix does not govern this
//! tier.

use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{error, warn};

use crate::envelope::{CartridgeContext, EventEnvelope};
use crate::error::CartridgeError;
use crate::loader::LoadedCartridge;
use crate::pipeline::{CartridgeRecord, CartridgeStatus, PersonalRunReport};

/// Flat leaf-cartridge pipeline for exactly one member.
pub struct PersonalPipeline {
    member: String,
    cartridges: Vec<LoadedCartridge>,
    invoke_timeout: Duration,
}

impl PersonalPipeline {
    pub fn new(
        member: impl Into<String>,
        cartridges: Vec<LoadedCartridge>,
        invoke_timeout: Duration,
    ) -> Self {
        Self {
            member: member.into(),
            cartridges,
            invoke_timeout,
        }
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn cartridge_count(&self) -> usize {
        self.cartridges.len()
    }

    /// Run all of the member's cartridges against one event.
    pub async fn run(&self, event: &EventEnvelope) -> PersonalRunReport {
        let invocations = self.cartridges.iter().map(|c| self.invoke(c, event));
        let records = join_all(invocations).await;
        PersonalRunReport {
            member: self.member.clone(),
            records,
        }
    }

    async fn invoke(&self, cartridge: &LoadedCartridge, event: &EventEnvelope) -> CartridgeRecord {
        let started_at = Utc::now();
        let ctx = CartridgeContext::for_member(&self.member);
        let result = tokio::time::timeout(
            self.invoke_timeout,
            cartridge.callable.process(event, &ctx),
        )
        .await;

        let status = match result {
            Ok(Ok(output)) => CartridgeStatus::Completed {
                produced_output: output.is_some(),
                notified: false,
            },
            Ok(Err(e)) => {
                error!(
                    member = %self.member,
                    cartridge = %cartridge.id(),
                    error = %e,
                    "Personal cartridge invocation failed"
                );
                CartridgeStatus::Failed { error: e.to_string() }
            }
            Err(_) => {
                warn!(
                    member = %self.member,
                    cartridge = %cartridge.id(),
                    timeout = ?self.invoke_timeout,
                    "Personal cartridge invocation timed out"
                );
                let e = CartridgeError::Timeout {
                    timeout: self.invoke_timeout,
                };
                CartridgeStatus::Failed { error: e.to_string() }
            }
        };

        CartridgeRecord {
            domain: "personal".to_string(),
            cartridge_id: cartridge.id().to_string(),
            autonomy: None,
            status,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

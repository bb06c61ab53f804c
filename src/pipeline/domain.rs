//! Domain pipeline — one domain's ordered cartridge levels.
//!
//! Per cartridge the autonomy matrix decides whether and how it runs:
//! `manual` skips it, `notify` runs and always notifies, `auto_notify` runs
//! and notifies only on a non-empty result, `autonomous` runs silently.
//! Level members execute concurrently; each invocation is bounded by a
//! timeout and failure-isolated.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error, warn};

use crate::autonomy::{AutonomyLevel, AutonomyMatrix};
use crate::envelope::{CartridgeContext, EventEnvelope};
use crate::error::CartridgeError;
use crate::loader::LoadedCartridge;
use crate::notify::{Notification, Notifier};
use crate::pipeline::{CartridgeRecord, CartridgeStatus, DomainRunReport};

/// One domain's executable pipeline: precomputed levels plus policy.
pub struct DomainPipeline {
    domain: String,
    levels: Vec<Vec<LoadedCartridge>>,
    autonomy: AutonomyMatrix,
    notifier: Arc<dyn Notifier>,
    invoke_timeout: Duration,
}

impl DomainPipeline {
    pub fn new(
        domain: impl Into<String>,
        levels: Vec<Vec<LoadedCartridge>>,
        autonomy: AutonomyMatrix,
        notifier: Arc<dyn Notifier>,
        invoke_timeout: Duration,
    ) -> Self {
        Self {
            domain: domain.into(),
            levels,
            autonomy,
            notifier,
            invoke_timeout,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Number of cartridges across all levels.
    pub fn cartridge_count(&self) -> usize {
        self.levels.iter().map(|l| l.len()).sum()
    }

    /// Execute the pipeline against one event.
    ///
    /// Levels run strictly in dependency order; cartridges within a level
    /// run concurrently against the latest envelope. The report's `output`
    /// is the last non-empty envelope any cartridge produced, and no
    /// cartridge failure ever escapes this method.
    pub async fn run(&self, event: &EventEnvelope) -> DomainRunReport {
        let mut records = Vec::new();
        let mut current = event.clone();
        let mut last_output: Option<EventEnvelope> = None;

        for level in &self.levels {
            let invocations = level.iter().map(|c| self.invoke(c, &current));
            let outcomes = join_all(invocations).await;

            for (record, output) in outcomes {
                if let Some(envelope) = output {
                    last_output = Some(envelope);
                }
                records.push(record);
            }
            // Later levels see the most recent enrichment.
            if let Some(ref envelope) = last_output {
                current = envelope.clone();
            }
        }

        DomainRunReport {
            domain: self.domain.clone(),
            records,
            output: last_output,
        }
    }

    /// Invoke one cartridge under policy, isolation, and timeout.
    async fn invoke(
        &self,
        cartridge: &LoadedCartridge,
        event: &EventEnvelope,
    ) -> (CartridgeRecord, Option<EventEnvelope>) {
        let id = cartridge.id().to_string();
        let level = self.autonomy.resolve(&self.domain, &id, &event.event_type);
        let started_at = Utc::now();

        if level == AutonomyLevel::Manual {
            debug!(
                domain = %self.domain,
                cartridge = %id,
                "Skipping cartridge (autonomy=manual)"
            );
            let record = CartridgeRecord {
                domain: self.domain.clone(),
                cartridge_id: id,
                autonomy: Some(level),
                status: CartridgeStatus::Skipped {
                    reason: format!("autonomy={}", level.label()),
                },
                started_at,
                finished_at: Utc::now(),
            };
            return (record, None);
        }

        let ctx = CartridgeContext::for_domain(&self.domain);
        let result = tokio::time::timeout(
            self.invoke_timeout,
            cartridge.callable.process(event, &ctx),
        )
        .await;

        let (status, output) = match result {
            Ok(Ok(output)) => {
                let produced_output = output.is_some();
                let notified = match level {
                    AutonomyLevel::Notify => true,
                    AutonomyLevel::AutoNotify => produced_output,
                    _ => false,
                };
                if notified {
                    self.notifier
                        .notify(Notification::new(
                            &self.domain,
                            &id,
                            &event.event_type,
                            self.summary_for(cartridge, event),
                        ))
                        .await;
                }
                (
                    CartridgeStatus::Completed {
                        produced_output,
                        notified,
                    },
                    output,
                )
            }
            Ok(Err(e)) => {
                error!(
                    domain = %self.domain,
                    cartridge = %id,
                    error = %e,
                    "Cartridge invocation failed"
                );
                (CartridgeStatus::Failed { error: e.to_string() }, None)
            }
            Err(_) => {
                warn!(
                    domain = %self.domain,
                    cartridge = %id,
                    timeout = ?self.invoke_timeout,
                    "Cartridge invocation timed out"
                );
                let e = CartridgeError::Timeout {
                    timeout: self.invoke_timeout,
                };
                (CartridgeStatus::Failed { error: e.to_string() }, None)
            }
        };

        let record = CartridgeRecord {
            domain: self.domain.clone(),
            cartridge_id: id,
            autonomy: Some(level),
            status,
            started_at,
            finished_at: Utc::now(),
        };
        (record, output)
    }

    fn summary_for(&self, cartridge: &LoadedCartridge, event: &EventEnvelope) -> String {
        if cartridge.manifest.description.is_empty() {
            format!("{} processed {}", cartridge.id(), event.event_type)
        } else {
            cartridge.manifest.description.clone()
        }
    }
}

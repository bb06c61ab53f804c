//! Pipeline runner — the single entry point the upstream system calls.
//!
//! Owns one immutable `PipelineSet` generation behind an `RwLock<Arc<..>>`.
//! `run()` clones the current generation's Arc and executes against it, so
//! a `reload()` mid-run never mixes old and new cartridges: in-flight runs
//! finish on the generation they started with, and the swap is a single
//! reference replacement.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

use crate::envelope::EventEnvelope;
use crate::loader::{CartridgeBinder, LoadedCartridge, Loader};
use crate::notify::Notifier;
use crate::pipeline::{DomainPipeline, PersonalPipeline, RunReport};
use crate::registry::DomainRegistry;
use crate::resolver;

/// One fully-built, immutable generation of pipelines.
pub struct PipelineSet {
    pub generation: u64,
    pub domains: Vec<DomainPipeline>,
    pub personal: Vec<PersonalPipeline>,
    /// Domains disabled by structural errors (cycle, dependency, scope),
    /// with the reason. Everything else proceeds unaffected.
    pub disabled_domains: Vec<(String, String)>,
    /// Cartridge directories that failed discovery this generation.
    pub load_failure_count: usize,
}

impl PipelineSet {
    fn empty() -> Self {
        Self {
            generation: 0,
            domains: Vec::new(),
            personal: Vec::new(),
            disabled_domains: Vec::new(),
            load_failure_count: 0,
        }
    }
}

/// Orchestrates the domain fan-out and the personal fan-out for each event.
pub struct PipelineRunner {
    loader: Loader,
    notifier: Arc<dyn Notifier>,
    registry: RwLock<Arc<DomainRegistry>>,
    set: RwLock<Arc<PipelineSet>>,
    generation: AtomicU64,
}

impl PipelineRunner {
    /// Build a runner and its initial pipeline set from disk.
    pub async fn new(
        registry: Arc<DomainRegistry>,
        binder: Arc<dyn CartridgeBinder>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let runner = Self {
            loader: Loader::new(binder),
            notifier,
            registry: RwLock::new(registry),
            set: RwLock::new(Arc::new(PipelineSet::empty())),
            generation: AtomicU64::new(0),
        };
        runner.reload().await;
        runner
    }

    /// Current pipeline-set generation (for introspection and logs).
    pub async fn current(&self) -> Arc<PipelineSet> {
        self.set.read().await.clone()
    }

    /// Current domain registry snapshot.
    pub async fn registry(&self) -> Arc<DomainRegistry> {
        self.registry.read().await.clone()
    }

    /// Run one event through every enabled domain pipeline concurrently,
    /// then through every member's personal pipeline concurrently.
    ///
    /// Fire-and-forget with respect to the caller's own result: only the
    /// observability report comes back, and no failure propagates.
    pub async fn run(&self, event: &EventEnvelope) -> RunReport {
        let set = self.current().await;
        let started_at = Utc::now();

        let domains = join_all(set.domains.iter().map(|d| d.run(event))).await;
        let personal = join_all(set.personal.iter().map(|p| p.run(event))).await;

        let report = RunReport {
            run_id: Uuid::new_v4(),
            event_id: event.id,
            event_type: event.event_type.clone(),
            generation: set.generation,
            domains,
            personal,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            event = %event.id,
            event_type = %event.event_type,
            generation = set.generation,
            records = report.record_count(),
            "Pipeline run complete"
        );
        report
    }

    /// Rebuild the pipeline set from current on-disk cartridges and the
    /// current registry, then swap it in atomically.
    pub async fn reload(&self) {
        let registry = self.registry().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let set = self.build_set(&registry, generation).await;
        info!(
            generation,
            domains = set.domains.len(),
            disabled = set.disabled_domains.len(),
            personal = set.personal.len(),
            load_failures = set.load_failure_count,
            "Installed new pipeline set"
        );
        *self.set.write().await = Arc::new(set);
    }

    /// Replace the registry wholesale (config reload) and rebuild.
    pub async fn replace_registry(&self, registry: Arc<DomainRegistry>) {
        *self.registry.write().await = registry;
        self.reload().await;
    }

    async fn build_set(&self, registry: &DomainRegistry, generation: u64) -> PipelineSet {
        let mut domains = Vec::new();
        let mut disabled_domains = Vec::new();
        let mut load_failure_count = 0;

        // Platform-scoped cartridges are shared across domains, gated by
        // each cartridge's own domain affinity.
        let (platform_cartridges, platform_failures) = self
            .loader
            .discover_domain(&registry.platform_cartridge_path())
            .await;
        load_failure_count += platform_failures.len();

        for domain in registry.enabled_domains() {
            let (mut cartridges, failures) =
                self.loader.discover_domain(&domain.cartridge_path).await;
            load_failure_count += failures.len();

            merge_platform(&mut cartridges, &platform_cartridges, &domain.name);

            match resolver::resolve(&domain.name, cartridges) {
                Ok(levels) => {
                    domains.push(DomainPipeline::new(
                        &domain.name,
                        levels,
                        domain.autonomy.clone(),
                        self.notifier.clone(),
                        registry.invoke_timeout(),
                    ));
                }
                Err(e) => {
                    // Fatal to this domain only.
                    error!(
                        domain = %domain.name,
                        error = %e,
                        "Disabling domain pipeline after resolution failure"
                    );
                    disabled_domains.push((domain.name.clone(), e.to_string()));
                }
            }
        }

        let mut personal = Vec::new();
        for member in registry.members() {
            let (cartridges, failures) = self
                .loader
                .discover_personal(&registry.member_cartridge_path(member))
                .await;
            load_failure_count += failures.len();
            personal.push(PersonalPipeline::new(
                member,
                cartridges,
                registry.invoke_timeout(),
            ));
        }

        PipelineSet {
            generation,
            domains,
            personal,
            disabled_domains,
            load_failure_count,
        }
    }
}

/// Merge platform cartridges into a domain's set. Affinity gates inclusion
/// and a domain-local cartridge shadows a platform one with the same id.
fn merge_platform(
    cartridges: &mut Vec<LoadedCartridge>,
    platform: &[LoadedCartridge],
    domain: &str,
) {
    for cartridge in platform {
        if !cartridge.manifest.runs_in(domain) {
            continue;
        }
        if cartridges.iter().any(|c| c.id() == cartridge.id()) {
            tracing::debug!(
                domain = %domain,
                cartridge = %cartridge.id(),
                "Domain-local cartridge shadows platform cartridge"
            );
            continue;
        }
        cartridges.push(cartridge.clone());
    }
    cartridges.sort_by(|a, b| a.manifest.id.cmp(&b.manifest.id));
}

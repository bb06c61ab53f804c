//! Domain registry — resolved per-domain configuration.
//!
//! Built wholesale from the `event_domains` config record. Read-heavy: the
//! runner holds one `Arc<DomainRegistry>` per generation and replaces it on
//! reload, never mutating it in place while a run is in flight.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::autonomy::AutonomyMatrix;
use crate::config::EventDomainsConfig;

/// Resolved configuration for one domain.
#[derive(Debug, Clone)]
pub struct DomainConfig {
    pub name: String,
    pub enabled: bool,
    /// Discovery root for this domain's cartridges.
    pub cartridge_path: PathBuf,
    pub autonomy: AutonomyMatrix,
    /// Guardian advisory settings, passed through uninterpreted.
    pub guardian: serde_json::Value,
}

/// All per-domain configuration for one generation.
#[derive(Debug, Clone)]
pub struct DomainRegistry {
    domains: HashMap<String, DomainConfig>,
    members: Vec<String>,
    personal_base_path: PathBuf,
    platform_cartridge_path: PathBuf,
    invoke_timeout: Duration,
}

impl DomainRegistry {
    /// Build a registry from the `event_domains` config record.
    pub fn from_config(cfg: &EventDomainsConfig) -> Self {
        let domains = cfg
            .domains
            .iter()
            .map(|(name, entry)| {
                (
                    name.clone(),
                    DomainConfig {
                        name: name.clone(),
                        enabled: entry.enabled,
                        cartridge_path: cfg.domain_cartridge_path(name),
                        autonomy: entry.autonomy.clone(),
                        guardian: entry.guardian.clone(),
                    },
                )
            })
            .collect();

        Self {
            domains,
            members: cfg.members.clone(),
            personal_base_path: cfg.personal_base_path.clone(),
            platform_cartridge_path: cfg.platform_cartridge_path(),
            invoke_timeout: cfg.invoke_timeout(),
        }
    }

    /// Look up one domain by name.
    pub fn get(&self, name: &str) -> Option<&DomainConfig> {
        self.domains.get(name)
    }

    /// All enabled domains, sorted by name for deterministic logs.
    pub fn enabled_domains(&self) -> Vec<&DomainConfig> {
        let mut enabled: Vec<_> = self.domains.values().filter(|d| d.enabled).collect();
        enabled.sort_by(|a, b| a.name.cmp(&b.name));
        enabled
    }

    /// Members with a personal pipeline.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Personal cartridge root for one member.
    pub fn member_cartridge_path(&self, member: &str) -> PathBuf {
        self.personal_base_path
            .join("members")
            .join(member)
            .join("cartridges")
    }

    /// Platform-scoped cartridge root.
    pub fn platform_cartridge_path(&self) -> PathBuf {
        self.platform_cartridge_path.clone()
    }

    /// Per-invocation timeout.
    pub fn invoke_timeout(&self) -> Duration {
        self.invoke_timeout
    }
}

//! Structured configuration records for the `event_domains` namespace.
//!
//! Persistence is external: callers hand us a parsed document (or the
//! platform's full config value) and we pick out the `event_domains`
//! section. All paths are configurable roots; defaults follow the
//! platform's filesystem layout convention.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::autonomy::AutonomyMatrix;
use crate::error::ConfigError;

/// Default bound on a single cartridge invocation.
pub const DEFAULT_INVOKE_TIMEOUT_SECS: u64 = 30;

fn default_true() -> bool {
    true
}

fn default_base_path() -> PathBuf {
    PathBuf::from("./data/platform")
}

fn default_personal_base_path() -> PathBuf {
    PathBuf::from("./data/personal")
}

fn default_helpdesk_path() -> PathBuf {
    PathBuf::from("./data/helpdesk")
}

fn default_invoke_timeout() -> u64 {
    DEFAULT_INVOKE_TIMEOUT_SECS
}

/// Per-domain configuration entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEntry {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Override for the domain's cartridge discovery root.
    #[serde(default)]
    pub cartridge_path: Option<PathBuf>,
    /// Guardian advisory settings, passed through uninterpreted.
    #[serde(default)]
    pub guardian: serde_json::Value,
    #[serde(default)]
    pub autonomy: AutonomyMatrix,
}

impl Default for DomainEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            cartridge_path: None,
            guardian: serde_json::Value::Null,
            autonomy: AutonomyMatrix::default(),
        }
    }
}

/// The `event_domains` configuration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDomainsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    #[serde(default = "default_personal_base_path")]
    pub personal_base_path: PathBuf,
    #[serde(default = "default_helpdesk_path")]
    pub helpdesk_path: PathBuf,
    /// Members whose personal pipelines the runner builds.
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default = "default_invoke_timeout")]
    pub invoke_timeout_secs: u64,
    #[serde(default)]
    pub domains: HashMap<String, DomainEntry>,
}

impl Default for EventDomainsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_path: default_base_path(),
            personal_base_path: default_personal_base_path(),
            helpdesk_path: default_helpdesk_path(),
            members: Vec::new(),
            invoke_timeout_secs: default_invoke_timeout(),
            domains: HashMap::new(),
        }
    }
}

impl EventDomainsConfig {
    /// Extract the `event_domains` section from the platform's config document.
    pub fn from_value(platform_config: serde_json::Value) -> Result<Self, ConfigError> {
        let section = platform_config
            .get("event_domains")
            .cloned()
            .ok_or_else(|| ConfigError::MissingSection("event_domains".to_string()))?;
        let config: Self = serde_json::from_value(section)?;
        if config.invoke_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "invoke_timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(config)
    }

    /// Per-invocation timeout as a `Duration`.
    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_secs)
    }

    /// Discovery root for a domain's cartridges.
    ///
    /// Uses the per-domain override when present, otherwise the
    /// `{base_path}/domains/{name}/cartridges` convention.
    pub fn domain_cartridge_path(&self, name: &str) -> PathBuf {
        self.domains
            .get(name)
            .and_then(|d| d.cartridge_path.clone())
            .unwrap_or_else(|| {
                self.base_path
                    .join("domains")
                    .join(name)
                    .join("cartridges")
            })
    }

    /// Discovery root for a member's personal cartridges:
    /// `{personal_base_path}/members/{member}/cartridges`.
    pub fn member_cartridge_path(&self, member: &str) -> PathBuf {
        self.personal_base_path
            .join("members")
            .join(member)
            .join("cartridges")
    }

    /// Root for platform-scoped cartridges: `{base_path}/platform/cartridges`.
    pub fn platform_cartridge_path(&self) -> PathBuf {
        self.base_path.join("platform").join("cartridges")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autonomy::AutonomyLevel;

    #[test]
    fn from_value_reads_namespace() {
        let doc = serde_json::json!({
            "unrelated": {"domain": "something else entirely"},
            "event_domains": {
                "base_path": "/srv/platform",
                "members": ["alice", "bob"],
                "domains": {
                    "ops": {"enabled": true},
                    "dev": {
                        "enabled": false,
                        "cartridge_path": "/srv/dev-cartridges",
                        "autonomy": {"global_default": "autonomous"}
                    }
                }
            }
        });
        let cfg = EventDomainsConfig::from_value(doc).unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.members, vec!["alice", "bob"]);
        assert_eq!(cfg.invoke_timeout_secs, DEFAULT_INVOKE_TIMEOUT_SECS);
        assert!(!cfg.domains["dev"].enabled);
        assert_eq!(
            cfg.domains["dev"].autonomy.resolve("dev", "x", "y"),
            AutonomyLevel::Autonomous
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let doc = serde_json::json!({"event_domains": {"invoke_timeout_secs": 0}});
        assert!(matches!(
            EventDomainsConfig::from_value(doc),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn missing_namespace_is_error() {
        let doc = serde_json::json!({"other": {}});
        assert!(matches!(
            EventDomainsConfig::from_value(doc),
            Err(ConfigError::MissingSection(_))
        ));
    }

    #[test]
    fn path_conventions() {
        let mut cfg = EventDomainsConfig::default();
        cfg.base_path = PathBuf::from("/srv/platform");
        cfg.personal_base_path = PathBuf::from("/srv/personal");

        assert_eq!(
            cfg.domain_cartridge_path("ops"),
            PathBuf::from("/srv/platform/domains/ops/cartridges")
        );
        assert_eq!(
            cfg.member_cartridge_path("alice"),
            PathBuf::from("/srv/personal/members/alice/cartridges")
        );
        assert_eq!(
            cfg.platform_cartridge_path(),
            PathBuf::from("/srv/platform/platform/cartridges")
        );
    }

    #[test]
    fn domain_path_override_wins() {
        let mut cfg = EventDomainsConfig::default();
        cfg.domains.insert(
            "dev".to_string(),
            DomainEntry {
                cartridge_path: Some(PathBuf::from("/custom/dev")),
                ..Default::default()
            },
        );
        assert_eq!(cfg.domain_cartridge_path("dev"), PathBuf::from("/custom/dev"));
    }
}

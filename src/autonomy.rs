//! Autonomy policy matrix.
//!
//! Four override maps resolve the effective execution policy for a
//! (domain, cartridge, event-type) triple. Resolution is total: every
//! triple falls back through event-type → cartridge → domain →
//! `global_default`, which itself defaults to `notify` when unset.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How a cartridge is allowed to act on an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Do not run the cartridge at all.
    Manual,
    /// Run the cartridge and always emit a notification.
    Notify,
    /// Run the cartridge and notify only if it produced a non-empty result.
    AutoNotify,
    /// Run the cartridge with no notification side effect.
    Autonomous,
}

impl AutonomyLevel {
    /// Short label for logging and observability records.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Notify => "notify",
            Self::AutoNotify => "auto_notify",
            Self::Autonomous => "autonomous",
        }
    }
}

/// Policy matrix for one domain registry generation.
///
/// Keys follow the config convention: `by_cartridge` is keyed by
/// `<domain>/<cartridge_id>` and `by_event_type` by `<domain>/<event_type>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutonomyMatrix {
    #[serde(default)]
    pub global_default: Option<AutonomyLevel>,
    #[serde(default)]
    pub by_domain: HashMap<String, AutonomyLevel>,
    #[serde(default)]
    pub by_cartridge: HashMap<String, AutonomyLevel>,
    #[serde(default)]
    pub by_event_type: HashMap<String, AutonomyLevel>,
}

impl AutonomyMatrix {
    /// Matrix with only a global default set.
    pub fn with_global(level: AutonomyLevel) -> Self {
        Self {
            global_default: Some(level),
            ..Default::default()
        }
    }

    /// Resolve the effective level for a (domain, cartridge, event-type) triple.
    ///
    /// Priority: event-type > cartridge > domain > global default.
    pub fn resolve(&self, domain: &str, cartridge_id: &str, event_type: &str) -> AutonomyLevel {
        if let Some(level) = self.by_event_type.get(&format!("{domain}/{event_type}")) {
            return *level;
        }
        if let Some(level) = self.by_cartridge.get(&format!("{domain}/{cartridge_id}")) {
            return *level;
        }
        if let Some(level) = self.by_domain.get(domain) {
            return *level;
        }
        self.global_default.unwrap_or(AutonomyLevel::Notify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_matrix_defaults_to_notify() {
        let m = AutonomyMatrix::default();
        assert_eq!(m.resolve("ops", "triage", "x.y"), AutonomyLevel::Notify);
    }

    #[test]
    fn global_default_applies() {
        let m = AutonomyMatrix::with_global(AutonomyLevel::Autonomous);
        assert_eq!(m.resolve("ops", "triage", "x.y"), AutonomyLevel::Autonomous);
    }

    #[test]
    fn resolution_priority_chain() {
        // The worked example: global=notify, dev domain=autonomous,
        // dev/build.complete=manual.
        let mut m = AutonomyMatrix::with_global(AutonomyLevel::Notify);
        m.by_domain
            .insert("dev".to_string(), AutonomyLevel::Autonomous);
        m.by_event_type
            .insert("dev/build.complete".to_string(), AutonomyLevel::Manual);

        assert_eq!(
            m.resolve("dev", "any-cartridge", "build.complete"),
            AutonomyLevel::Manual
        );
        assert_eq!(
            m.resolve("dev", "any-cartridge", "deploy.started"),
            AutonomyLevel::Autonomous
        );
        assert_eq!(
            m.resolve("ops", "any-cartridge", "build.complete"),
            AutonomyLevel::Notify
        );
    }

    #[test]
    fn cartridge_beats_domain_and_event_type_beats_cartridge() {
        let mut m = AutonomyMatrix::with_global(AutonomyLevel::Manual);
        m.by_domain
            .insert("ops".to_string(), AutonomyLevel::Notify);
        m.by_cartridge
            .insert("ops/pager".to_string(), AutonomyLevel::AutoNotify);
        m.by_event_type
            .insert("ops/alert.fired".to_string(), AutonomyLevel::Autonomous);

        // by_cartridge overrides by_domain.
        assert_eq!(m.resolve("ops", "pager", "ticket.opened"), AutonomyLevel::AutoNotify);
        // by_event_type overrides by_cartridge.
        assert_eq!(m.resolve("ops", "pager", "alert.fired"), AutonomyLevel::Autonomous);
        // Unrelated cartridge falls back to by_domain.
        assert_eq!(m.resolve("ops", "other", "ticket.opened"), AutonomyLevel::Notify);
    }

    #[test]
    fn levels_deserialize_from_config_strings() {
        let m: AutonomyMatrix = serde_json::from_str(
            r#"{
                "global_default": "auto_notify",
                "by_domain": {"dev": "autonomous"},
                "by_event_type": {"dev/build.complete": "manual"}
            }"#,
        )
        .unwrap();
        assert_eq!(m.global_default, Some(AutonomyLevel::AutoNotify));
        assert_eq!(m.resolve("dev", "x", "build.complete"), AutonomyLevel::Manual);
    }
}

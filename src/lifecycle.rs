//! Cartridge lifecycle — install, remove, promote, list.
//!
//! The only writer of the cartridge filesystem tree. Every operation takes
//! the caller's role explicitly, gates permissions before touching disk,
//! and triggers a runner reload after any successful mutation so the next
//! run sees the change. Failures never leave a partial mutation behind.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::LifecycleError;
use crate::manifest::{CartridgeManifest, MANIFEST_FILE};
use crate::pipeline::PipelineRunner;

/// Content scope. Ordering `personal < domain < platform` defines the only
/// legal promotion direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleScope {
    Personal,
    Domain,
    Platform,
}

impl LifecycleScope {
    /// Only single-step forward transitions are legal.
    pub fn can_promote_to(self, to: LifecycleScope) -> bool {
        matches!(
            (self, to),
            (Self::Personal, Self::Domain) | (Self::Domain, Self::Platform)
        )
    }

    /// Whether operations on this scope require the admin role.
    pub fn requires_admin(self) -> bool {
        !matches!(self, Self::Personal)
    }
}

impl fmt::Display for LifecycleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Personal => "personal",
            Self::Domain => "domain",
            Self::Platform => "platform",
        };
        f.write_str(s)
    }
}

/// Structured success payload for a lifecycle mutation.
#[derive(Debug, Clone)]
pub struct LifecycleReceipt {
    pub operation: String,
    pub cartridge_id: String,
    pub scope: LifecycleScope,
    pub path: PathBuf,
    /// Whether the runner was reloaded as part of the operation.
    pub reloaded: bool,
}

/// One installed cartridge, as returned by `list`.
#[derive(Debug, Clone)]
pub struct InstalledCartridge {
    pub id: String,
    pub version: String,
    pub description: String,
    pub scope: LifecycleScope,
    /// Domain name for domain-scoped entries.
    pub domain: Option<String>,
    /// Member id for personal entries.
    pub member: Option<String>,
    pub path: PathBuf,
}

/// State machine over cartridge scopes, bound to a runner it reloads after
/// every successful mutation.
pub struct LifecycleManager {
    runner: Arc<PipelineRunner>,
}

impl LifecycleManager {
    pub fn new(runner: Arc<PipelineRunner>) -> Self {
        Self { runner }
    }

    /// Install a cartridge directory into a scope.
    ///
    /// `target` names the member for `personal` scope and the domain for
    /// `domain` scope; it is ignored for `platform`. The manifest is
    /// validated before anything is copied.
    pub async fn install(
        &self,
        source: &Path,
        scope: LifecycleScope,
        target: &str,
        is_admin: bool,
    ) -> Result<LifecycleReceipt, LifecycleError> {
        self.check_role("install", scope, is_admin)?;

        let manifest = CartridgeManifest::from_dir(source)
            .await
            .map_err(|e| LifecycleError::InvalidManifest {
                reason: e.to_string(),
            })?;
        if scope == LifecycleScope::Personal && !manifest.personal {
            return Err(LifecycleError::InvalidManifest {
                reason: format!("cartridge {} is not marked personal", manifest.id),
            });
        }
        if scope != LifecycleScope::Personal && manifest.personal {
            return Err(LifecycleError::InvalidManifest {
                reason: format!(
                    "personal cartridge {} cannot be installed at {scope} scope",
                    manifest.id
                ),
            });
        }

        let dest = self.scope_path(scope, target).await?.join(&manifest.id);
        // A reinstall replaces the previous contents wholesale; files removed
        // in the new version must not linger from the old one.
        if dest.is_dir() {
            tokio::fs::remove_dir_all(&dest).await?;
        }
        copy_dir(source, &dest).await?;
        self.runner.reload().await;

        info!(
            cartridge = %manifest.id,
            scope = %scope,
            target = %target,
            dest = %dest.display(),
            "Installed cartridge"
        );
        Ok(LifecycleReceipt {
            operation: "install".to_string(),
            cartridge_id: manifest.id,
            scope,
            path: dest,
            reloaded: true,
        })
    }

    /// Remove an installed cartridge. A missing cartridge is a not-found
    /// error, never a silent no-op.
    pub async fn remove(
        &self,
        id: &str,
        scope: LifecycleScope,
        target: &str,
        is_admin: bool,
    ) -> Result<LifecycleReceipt, LifecycleError> {
        self.check_role("remove", scope, is_admin)?;

        let dir = self.scope_path(scope, target).await?.join(id);
        if !dir.is_dir() {
            return Err(LifecycleError::NotFound {
                id: id.to_string(),
                scope: scope.to_string(),
                path: dir,
            });
        }
        tokio::fs::remove_dir_all(&dir).await?;
        self.runner.reload().await;

        info!(cartridge = %id, scope = %scope, "Removed cartridge");
        Ok(LifecycleReceipt {
            operation: "remove".to_string(),
            cartridge_id: id.to_string(),
            scope,
            path: dir,
            reloaded: true,
        })
    }

    /// Promote a cartridge one scope forward.
    ///
    /// Copy-then-delete-source: if anything fails mid-operation the
    /// cartridge is still present in exactly one location.
    pub async fn promote(
        &self,
        id: &str,
        from: LifecycleScope,
        to: LifecycleScope,
        domain: &str,
        is_admin: bool,
    ) -> Result<LifecycleReceipt, LifecycleError> {
        if !from.can_promote_to(to) {
            return Err(LifecycleError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        if !is_admin {
            return Err(LifecycleError::Permission {
                operation: "promote".to_string(),
                scope: to.to_string(),
            });
        }

        let source = self.locate(id, from, domain).await?;
        let dest = self.scope_path(to, domain).await?.join(id);

        copy_dir(&source, &dest).await?;
        // Leaving the personal tier: the promoted copy becomes an ordinary
        // domain cartridge, so the flag is cleared on the destination.
        if from == LifecycleScope::Personal {
            clear_personal_flag(&dest).await?;
        }
        tokio::fs::remove_dir_all(&source).await?;
        self.runner.reload().await;

        info!(
            cartridge = %id,
            from = %from,
            to = %to,
            dest = %dest.display(),
            "Promoted cartridge"
        );
        Ok(LifecycleReceipt {
            operation: "promote".to_string(),
            cartridge_id: id.to_string(),
            scope: to,
            path: dest,
            reloaded: true,
        })
    }

    /// List installed cartridges, optionally filtered by domain or member.
    ///
    /// With no filters, lists every domain in the registry, every member,
    /// and the platform scope.
    pub async fn list(
        &self,
        domain: Option<&str>,
        member: Option<&str>,
    ) -> Result<Vec<InstalledCartridge>, LifecycleError> {
        let registry = self.runner.registry().await;
        let mut entries = Vec::new();

        let domain_names: Vec<String> = match domain {
            Some(name) => {
                if registry.get(name).is_none() {
                    return Err(LifecycleError::UnknownDomain(name.to_string()));
                }
                vec![name.to_string()]
            }
            None if member.is_some() => Vec::new(),
            None => registry
                .enabled_domains()
                .iter()
                .map(|d| d.name.clone())
                .collect(),
        };
        for name in &domain_names {
            let root = registry
                .get(name)
                .map(|d| d.cartridge_path.clone())
                .unwrap_or_default();
            scan_scope(&root, LifecycleScope::Domain, Some(name.as_str()), None, &mut entries)
                .await;
        }

        let members: Vec<String> = match member {
            Some(m) => vec![m.to_string()],
            None if domain.is_some() => Vec::new(),
            None => registry.members().to_vec(),
        };
        for m in &members {
            scan_scope(
                &registry.member_cartridge_path(m),
                LifecycleScope::Personal,
                None,
                Some(m.as_str()),
                &mut entries,
            )
            .await;
        }

        if domain.is_none() && member.is_none() {
            scan_scope(
                &registry.platform_cartridge_path(),
                LifecycleScope::Platform,
                None,
                None,
                &mut entries,
            )
            .await;
        }

        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }

    fn check_role(
        &self,
        operation: &str,
        scope: LifecycleScope,
        is_admin: bool,
    ) -> Result<(), LifecycleError> {
        if scope.requires_admin() && !is_admin {
            return Err(LifecycleError::Permission {
                operation: operation.to_string(),
                scope: scope.to_string(),
            });
        }
        Ok(())
    }

    /// Resolve the cartridge root for a scope/target pair.
    async fn scope_path(
        &self,
        scope: LifecycleScope,
        target: &str,
    ) -> Result<PathBuf, LifecycleError> {
        let registry = self.runner.registry().await;
        match scope {
            LifecycleScope::Personal => Ok(registry.member_cartridge_path(target)),
            LifecycleScope::Domain => registry
                .get(target)
                .map(|d| d.cartridge_path.clone())
                .ok_or_else(|| LifecycleError::UnknownDomain(target.to_string())),
            LifecycleScope::Platform => Ok(registry.platform_cartridge_path()),
        }
    }

    /// Find a cartridge's directory in a source scope.
    ///
    /// For the personal scope the owning member is not part of the promote
    /// interface, so every configured member's tree is searched.
    async fn locate(
        &self,
        id: &str,
        scope: LifecycleScope,
        domain: &str,
    ) -> Result<PathBuf, LifecycleError> {
        let registry = self.runner.registry().await;
        let candidates: Vec<PathBuf> = match scope {
            LifecycleScope::Personal => registry
                .members()
                .iter()
                .map(|m| registry.member_cartridge_path(m).join(id))
                .collect(),
            LifecycleScope::Domain => registry
                .get(domain)
                .map(|d| vec![d.cartridge_path.join(id)])
                .ok_or_else(|| LifecycleError::UnknownDomain(domain.to_string()))?,
            LifecycleScope::Platform => vec![registry.platform_cartridge_path().join(id)],
        };

        candidates
            .into_iter()
            .find(|p| p.is_dir())
            .ok_or_else(|| LifecycleError::NotFound {
                id: id.to_string(),
                scope: scope.to_string(),
                path: Default::default(),
            })
    }
}

/// Scan one cartridge root and append the manifests that parse.
async fn scan_scope(
    root: &Path,
    scope: LifecycleScope,
    domain: Option<&str>,
    member: Option<&str>,
    entries: &mut Vec<InstalledCartridge>,
) {
    let mut dir = match tokio::fs::read_dir(root).await {
        Ok(dir) => dir,
        Err(_) => return,
    };
    while let Ok(Some(entry)) = dir.next_entry().await {
        let path = entry.path();
        if !path.join(MANIFEST_FILE).is_file() {
            continue;
        }
        if let Ok(manifest) = CartridgeManifest::from_dir(&path).await {
            entries.push(InstalledCartridge {
                id: manifest.id,
                version: manifest.version,
                description: manifest.description,
                scope,
                domain: domain.map(|s| s.to_string()),
                member: member.map(|s| s.to_string()),
                path,
            });
        }
    }
}

/// Rewrite a promoted cartridge's manifest with `personal = false`.
async fn clear_personal_flag(dir: &Path) -> Result<(), LifecycleError> {
    let path = dir.join(MANIFEST_FILE);
    let raw = tokio::fs::read_to_string(&path).await?;
    let mut manifest =
        CartridgeManifest::from_json(&raw).map_err(|e| LifecycleError::InvalidManifest {
            reason: e.to_string(),
        })?;
    manifest.personal = false;
    let raw = serde_json::to_string_pretty(&manifest).map_err(|e| {
        LifecycleError::InvalidManifest {
            reason: e.to_string(),
        }
    })?;
    tokio::fs::write(&path, raw).await?;
    Ok(())
}

/// Recursively copy a cartridge directory.
async fn copy_dir(source: &Path, dest: &Path) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(dest).await?;
    let mut stack = vec![(source.to_path_buf(), dest.to_path_buf())];
    while let Some((src, dst)) = stack.pop() {
        let mut dir = tokio::fs::read_dir(&src).await?;
        while let Some(entry) = dir.next_entry().await? {
            let from = entry.path();
            let to = dst.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                tokio::fs::create_dir_all(&to).await?;
                stack.push((from, to));
            } else {
                tokio::fs::copy(&from, &to).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autonomy::{AutonomyLevel, AutonomyMatrix};
    use crate::config::{DomainEntry, EventDomainsConfig};
    use crate::envelope::{Cartridge, CartridgeContext, EventEnvelope};
    use crate::error::CartridgeError;
    use crate::loader::RegistryBinder;
    use crate::notify::LogNotifier;
    use crate::registry::DomainRegistry;
    use async_trait::async_trait;

    struct NoopCartridge;

    #[async_trait]
    impl Cartridge for NoopCartridge {
        async fn process(
            &self,
            _event: &EventEnvelope,
            _ctx: &CartridgeContext,
        ) -> Result<Option<EventEnvelope>, CartridgeError> {
            Ok(None)
        }
    }

    async fn setup(root: &Path) -> (LifecycleManager, Arc<PipelineRunner>, EventDomainsConfig) {
        let mut cfg = EventDomainsConfig::default();
        cfg.base_path = root.join("platform");
        cfg.personal_base_path = root.join("personal");
        cfg.members = vec!["alice".to_string()];
        cfg.domains.insert(
            "ops".to_string(),
            DomainEntry {
                autonomy: AutonomyMatrix::with_global(AutonomyLevel::Autonomous),
                ..Default::default()
            },
        );

        let mut binder = RegistryBinder::new();
        binder.register("cartridge", Arc::new(NoopCartridge));

        let runner = Arc::new(
            PipelineRunner::new(
                Arc::new(DomainRegistry::from_config(&cfg)),
                Arc::new(binder),
                Arc::new(LogNotifier),
            )
            .await,
        );
        (LifecycleManager::new(runner.clone()), runner, cfg)
    }

    async fn stage_cartridge(dir: &Path, manifest: serde_json::Value) {
        tokio::fs::create_dir_all(dir).await.unwrap();
        tokio::fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest).unwrap(),
        )
        .await
        .unwrap();
        tokio::fs::write(dir.join("notes.txt"), "cartridge body")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn install_personal_requires_no_role() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, _, cfg) = setup(tmp.path()).await;

        let staging = tmp.path().join("staging/digest");
        stage_cartridge(&staging, serde_json::json!({"id": "digest", "personal": true})).await;

        let receipt = mgr
            .install(&staging, LifecycleScope::Personal, "alice", false)
            .await
            .unwrap();
        assert_eq!(receipt.cartridge_id, "digest");
        assert!(receipt.reloaded);
        assert!(
            cfg.member_cartridge_path("alice")
                .join("digest")
                .join(MANIFEST_FILE)
                .is_file()
        );
        // Nested content copied too.
        assert!(
            cfg.member_cartridge_path("alice")
                .join("digest/notes.txt")
                .is_file()
        );
    }

    #[tokio::test]
    async fn install_domain_without_admin_is_permission_error_and_no_write() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, _, cfg) = setup(tmp.path()).await;

        let staging = tmp.path().join("staging/triage");
        stage_cartridge(&staging, serde_json::json!({"id": "triage"})).await;

        let err = mgr
            .install(&staging, LifecycleScope::Domain, "ops", false)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Permission { .. }));
        assert!(!cfg.domain_cartridge_path("ops").join("triage").exists());
    }

    #[tokio::test]
    async fn install_validates_manifest_before_copying() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, _, cfg) = setup(tmp.path()).await;

        let staging = tmp.path().join("staging/broken");
        tokio::fs::create_dir_all(&staging).await.unwrap();
        tokio::fs::write(staging.join(MANIFEST_FILE), "{bad json")
            .await
            .unwrap();

        let err = mgr
            .install(&staging, LifecycleScope::Domain, "ops", true)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidManifest { .. }));
        assert!(!cfg.domain_cartridge_path("ops").join("broken").exists());
    }

    #[tokio::test]
    async fn install_personal_cartridge_at_domain_scope_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, _, cfg) = setup(tmp.path()).await;

        let staging = tmp.path().join("staging/digest");
        stage_cartridge(&staging, serde_json::json!({"id": "digest", "personal": true})).await;

        let err = mgr
            .install(&staging, LifecycleScope::Domain, "ops", true)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidManifest { .. }));
        assert!(!cfg.domain_cartridge_path("ops").join("digest").exists());
    }

    #[tokio::test]
    async fn install_reloads_runner() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, runner, _) = setup(tmp.path()).await;
        let before = runner.current().await.generation;

        let staging = tmp.path().join("staging/triage");
        stage_cartridge(&staging, serde_json::json!({"id": "triage"})).await;
        mgr.install(&staging, LifecycleScope::Domain, "ops", true)
            .await
            .unwrap();

        let set = runner.current().await;
        assert_eq!(set.generation, before + 1);
        assert_eq!(set.domains[0].cartridge_count(), 1);
    }

    #[tokio::test]
    async fn reinstall_replaces_previous_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, _, cfg) = setup(tmp.path()).await;

        let staging = tmp.path().join("staging/triage");
        stage_cartridge(&staging, serde_json::json!({"id": "triage"})).await;
        tokio::fs::write(staging.join("legacy.txt"), "old")
            .await
            .unwrap();
        mgr.install(&staging, LifecycleScope::Domain, "ops", true)
            .await
            .unwrap();

        // The upgraded version no longer ships legacy.txt.
        tokio::fs::remove_file(staging.join("legacy.txt"))
            .await
            .unwrap();
        mgr.install(&staging, LifecycleScope::Domain, "ops", true)
            .await
            .unwrap();

        let installed = cfg.domain_cartridge_path("ops").join("triage");
        assert!(installed.join("notes.txt").is_file());
        assert!(!installed.join("legacy.txt").exists());
    }

    #[tokio::test]
    async fn remove_missing_cartridge_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, _, _) = setup(tmp.path()).await;

        let err = mgr
            .remove("phantom", LifecycleScope::Domain, "ops", true)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound { ref id, .. } if id == "phantom"));
    }

    #[tokio::test]
    async fn remove_deletes_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, _, cfg) = setup(tmp.path()).await;

        let staging = tmp.path().join("staging/triage");
        stage_cartridge(&staging, serde_json::json!({"id": "triage"})).await;
        mgr.install(&staging, LifecycleScope::Domain, "ops", true)
            .await
            .unwrap();

        mgr.remove("triage", LifecycleScope::Domain, "ops", true)
            .await
            .unwrap();
        assert!(!cfg.domain_cartridge_path("ops").join("triage").exists());
    }

    #[tokio::test]
    async fn promote_skipping_a_scope_is_illegal() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, _, _) = setup(tmp.path()).await;

        let err = mgr
            .promote(
                "x",
                LifecycleScope::Personal,
                LifecycleScope::Platform,
                "ops",
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn promote_backward_is_illegal() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, _, _) = setup(tmp.path()).await;

        let err = mgr
            .promote(
                "x",
                LifecycleScope::Platform,
                LifecycleScope::Domain,
                "ops",
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn promote_requires_admin() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, _, _) = setup(tmp.path()).await;

        let err = mgr
            .promote(
                "x",
                LifecycleScope::Personal,
                LifecycleScope::Domain,
                "ops",
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Permission { .. }));
    }

    #[tokio::test]
    async fn promote_moves_cartridge_to_exactly_one_location() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, _, cfg) = setup(tmp.path()).await;

        let source = cfg.member_cartridge_path("alice").join("digest");
        stage_cartridge(&source, serde_json::json!({"id": "digest", "personal": true})).await;

        let receipt = mgr
            .promote(
                "digest",
                LifecycleScope::Personal,
                LifecycleScope::Domain,
                "ops",
                true,
            )
            .await
            .unwrap();
        assert_eq!(receipt.scope, LifecycleScope::Domain);
        assert!(!source.exists());
        let promoted = cfg.domain_cartridge_path("ops").join("digest");
        assert!(promoted.join(MANIFEST_FILE).is_file());

        // The promoted copy is an ordinary domain cartridge now.
        let manifest = CartridgeManifest::from_dir(&promoted).await.unwrap();
        assert!(!manifest.personal);
    }

    #[tokio::test]
    async fn promote_missing_cartridge_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, _, _) = setup(tmp.path()).await;

        let err = mgr
            .promote(
                "phantom",
                LifecycleScope::Domain,
                LifecycleScope::Platform,
                "ops",
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_spans_scopes_and_filters() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, _, cfg) = setup(tmp.path()).await;

        stage_cartridge(
            &cfg.domain_cartridge_path("ops").join("triage"),
            serde_json::json!({"id": "triage"}),
        )
        .await;
        stage_cartridge(
            &cfg.member_cartridge_path("alice").join("digest"),
            serde_json::json!({"id": "digest", "personal": true}),
        )
        .await;
        stage_cartridge(
            &cfg.platform_cartridge_path().join("audit"),
            serde_json::json!({"id": "audit"}),
        )
        .await;

        let all = mgr.list(None, None).await.unwrap();
        let ids: Vec<_> = all.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec!["audit", "digest", "triage"]);

        let ops_only = mgr.list(Some("ops"), None).await.unwrap();
        assert_eq!(ops_only.len(), 1);
        assert_eq!(ops_only[0].id, "triage");
        assert_eq!(ops_only[0].domain.as_deref(), Some("ops"));

        let alice_only = mgr.list(None, Some("alice")).await.unwrap();
        assert_eq!(alice_only.len(), 1);
        assert_eq!(alice_only[0].member.as_deref(), Some("alice"));

        assert!(matches!(
            mgr.list(Some("nonexistent"), None).await,
            Err(LifecycleError::UnknownDomain(_))
        ));
    }
}

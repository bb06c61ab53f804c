use std::sync::Arc;

use cartridge_engine::config::EventDomainsConfig;
use cartridge_engine::loader::RegistryBinder;
use cartridge_engine::notify::LogNotifier;
use cartridge_engine::pipeline::PipelineRunner;
use cartridge_engine::registry::DomainRegistry;

/// Startup glue: load the platform config, build the pipeline set once,
/// and report what was loaded. The embedding platform registers its
/// cartridge entry points on the binder and feeds events to the runner.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config_path = std::env::var("CARTRIDGE_ENGINE_CONFIG")
        .unwrap_or_else(|_| "./config/platform.json".to_string());
    let raw = tokio::fs::read_to_string(&config_path).await?;
    let doc: serde_json::Value = serde_json::from_str(&raw)?;
    let config = EventDomainsConfig::from_value(doc)?;

    if !config.enabled {
        tracing::warn!("event_domains is disabled in config, exiting");
        return Ok(());
    }

    let registry = Arc::new(DomainRegistry::from_config(&config));
    let binder = Arc::new(RegistryBinder::new());
    let runner = PipelineRunner::new(registry, binder, Arc::new(LogNotifier)).await;

    let set = runner.current().await;
    tracing::info!(
        generation = set.generation,
        domains = set.domains.len(),
        personal = set.personal.len(),
        "Cartridge engine ready"
    );
    for (domain, reason) in &set.disabled_domains {
        tracing::warn!(domain = %domain, reason = %reason, "Domain disabled");
    }

    Ok(())
}

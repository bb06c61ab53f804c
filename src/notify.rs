//! Notification seam.
//!
//! Delivery (UI, chat, email) lives outside this layer. Pipelines emit
//! through the `Notifier` trait; the default implementation just logs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

/// A notification emitted by a pipeline on behalf of a cartridge.
#[derive(Debug, Clone)]
pub struct Notification {
    pub domain: String,
    pub cartridge_id: String,
    pub event_type: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        domain: impl Into<String>,
        cartridge_id: impl Into<String>,
        event_type: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            cartridge_id: cartridge_id.into(),
            event_type: event_type.into(),
            summary: summary.into(),
            created_at: Utc::now(),
        }
    }
}

/// Outbound notification delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Default notifier — structured log line, no delivery.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) {
        info!(
            domain = %notification.domain,
            cartridge = %notification.cartridge_id,
            event_type = %notification.event_type,
            summary = %notification.summary,
            "Cartridge notification"
        );
    }
}

//! Notification hub — the injected connection registry.
//!
//! Handlers call [`NotificationHub::notify`]; delivery fans out two ways:
//!
//! - An in-process broadcast bus the daemon bridges to SSE subscribers.
//! - An optional outbound webhook, dispatched fire-and-forget on a spawned
//!   task with a bounded timeout.
//!
//! Neither path may fail or delay the ledger transaction that triggered the
//! notification: bus sends with no subscribers are fine, webhook errors are
//! swallowed and logged. The hub is constructed once at boot and injected —
//! no module-global connection registry, no post-construction wiring.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use fxd_schemas::EntityRef;

// ---------------------------------------------------------------------------
// Notification payload
// ---------------------------------------------------------------------------

/// One notification event, broadcast to subscribers and webhook targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Users this notification addresses (empty = broadcast to all).
    pub recipients: Vec<Uuid>,
    /// Machine tag, e.g. "approval_requested", "approval_approved".
    pub kind: String,
    pub title: String,
    pub message: String,
    pub entity: EntityRef,
    pub ts_utc: DateTime<Utc>,
}

/// A notification prepared inside a database transaction but not yet sent.
///
/// Workflow code builds `Notice`s while the transaction is open and the
/// HTTP layer dispatches them after commit — outbound fan-out can never
/// fail or delay the ledger transaction, and a rollback sends nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub recipients: Vec<Uuid>,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub entity: EntityRef,
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// Outbound webhook target. Timeout is deliberately short: the call rides
/// on a spawned task, but a hung remote must not pile up tasks either.
#[derive(Debug, Clone)]
pub struct WebhookTarget {
    pub url: String,
    pub timeout: Duration,
}

impl WebhookTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(3),
        }
    }
}

/// Cloneable notification fan-out handle.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    bus: broadcast::Sender<Notification>,
    webhook: Option<WebhookTarget>,
    client: reqwest::Client,
}

impl NotificationHub {
    pub fn new(webhook: Option<WebhookTarget>) -> Self {
        let (bus, _rx) = broadcast::channel::<Notification>(1024);
        Self {
            bus,
            webhook,
            client: reqwest::Client::new(),
        }
    }

    /// Subscribe to the in-process stream (SSE bridge, tests).
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.bus.subscribe()
    }

    /// Dispatch a prepared [`Notice`].
    pub fn send_notice(&self, notice: Notice) {
        self.notify(
            notice.recipients,
            &notice.kind,
            &notice.title,
            &notice.message,
            notice.entity,
        );
    }

    /// Fan a notification out. Never fails; never blocks on the network.
    pub fn notify(
        &self,
        recipients: Vec<Uuid>,
        kind: &str,
        title: &str,
        message: &str,
        entity: EntityRef,
    ) {
        let notification = Notification {
            recipients,
            kind: kind.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            entity,
            ts_utc: Utc::now(),
        };

        // No subscribers is not an error.
        let _ = self.bus.send(notification.clone());

        if let Some(target) = &self.webhook {
            let client = self.client.clone();
            let target = target.clone();
            tokio::spawn(async move {
                let send = client
                    .post(&target.url)
                    .timeout(target.timeout)
                    .json(&notification)
                    .send();
                match send.await {
                    Ok(resp) if resp.status().is_success() => {
                        debug!(kind = %notification.kind, "webhook delivered");
                    }
                    Ok(resp) => {
                        warn!(status = %resp.status(), "webhook rejected (ignored)");
                    }
                    Err(err) => {
                        warn!(%err, "webhook dispatch failed (ignored)");
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxd_schemas::EntityType;

    #[tokio::test]
    async fn bus_delivers_to_subscribers() {
        let hub = NotificationHub::new(None);
        let mut rx = hub.subscribe();

        let user = Uuid::new_v4();
        hub.notify(
            vec![user],
            "approval_requested",
            "Edit requested",
            "Order #1 has a pending edit request",
            EntityRef {
                entity_type: EntityType::Order,
                entity_id: Uuid::new_v4(),
            },
        );

        let got = rx.recv().await.unwrap();
        assert_eq!(got.kind, "approval_requested");
        assert_eq!(got.recipients, vec![user]);
    }

    #[tokio::test]
    async fn notify_without_subscribers_does_not_panic() {
        let hub = NotificationHub::new(None);
        hub.notify(
            vec![],
            "noop",
            "t",
            "m",
            EntityRef {
                entity_type: EntityType::Expense,
                entity_id: Uuid::new_v4(),
            },
        );
    }
}

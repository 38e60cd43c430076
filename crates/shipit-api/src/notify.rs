// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Matrix notifications through the Taskcluster notify service.

use std::sync::Arc;
use tracing::{error, info};

use crate::config::NotifyConfig;
use crate::taskcluster::Taskcluster;

/// Sends release events to the Matrix rooms configured per product.
pub struct Notifier {
    config: NotifyConfig,
    taskcluster: Arc<dyn Taskcluster>,
}

impl Notifier {
    pub fn new(config: NotifyConfig, taskcluster: Arc<dyn Taskcluster>) -> Self {
        Self {
            config,
            taskcluster,
        }
    }

    fn lookup<'a>(
        section: &'a std::collections::HashMap<String, Vec<String>>,
        product: &str,
    ) -> Option<&'a [String]> {
        section
            .get(product)
            .or_else(|| section.get("default"))
            .map(Vec::as_slice)
            .filter(|entries| !entries.is_empty())
    }

    /// Mention the product owners in every room of the product.
    ///
    /// Never fails: delivery errors are logged.
    pub async fn notify_via_matrix(&self, product: &str, message: &str) {
        if self.config.disabled {
            return;
        }
        let owners = Self::lookup(&self.config.owners_per_product, product);
        let rooms = Self::lookup(&self.config.rooms_per_product, product);
        let (Some(owners), Some(rooms)) = (owners, rooms) else {
            info!(product = %product, "Matrix notifications are not configured");
            return;
        };

        let body = format!("{}: {}", owners.join(": "), message);
        for room_id in rooms {
            if let Err(e) = self.taskcluster.send_matrix(room_id, &body).await {
                error!(room_id = %room_id, error = %e, "Failed to send Matrix notification");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taskcluster::MockTaskcluster;
    use std::collections::HashMap;

    fn config() -> NotifyConfig {
        NotifyConfig {
            disabled: false,
            owners_per_product: HashMap::from([
                ("default".to_string(), vec!["@releng".to_string()]),
                (
                    "firefox".to_string(),
                    vec!["@alice".to_string(), "@bob".to_string()],
                ),
            ]),
            rooms_per_product: HashMap::from([(
                "default".to_string(),
                vec!["!room1".to_string(), "!room2".to_string()],
            )]),
        }
    }

    #[tokio::test]
    async fn test_notify_uses_product_owners_and_default_rooms() {
        let tc = Arc::new(MockTaskcluster::new());
        let notifier = Notifier::new(config(), tc.clone());
        notifier
            .notify_via_matrix("firefox", "New release created")
            .await;

        let messages = tc.matrix_messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0, "!room1");
        assert_eq!(messages[0].1, "@alice: @bob: New release created");

        notifier.notify_via_matrix("thunderbird", "x").await;
        assert_eq!(tc.matrix_messages().await[2].1, "@releng: x");
    }

    #[tokio::test]
    async fn test_notify_disabled_or_unconfigured() {
        let tc = Arc::new(MockTaskcluster::new());
        let mut disabled = config();
        disabled.disabled = true;
        Notifier::new(disabled, tc.clone())
            .notify_via_matrix("firefox", "x")
            .await;
        Notifier::new(NotifyConfig::default(), tc.clone())
            .notify_via_matrix("firefox", "x")
            .await;
        assert!(tc.matrix_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_notify_failure_is_swallowed() {
        let tc = Arc::new(MockTaskcluster::failing_notify());
        Notifier::new(config(), tc.clone())
            .notify_via_matrix("firefox", "x")
            .await;
        assert!(tc.matrix_messages().await.is_empty());
    }
}

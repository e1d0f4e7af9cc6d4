// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status messages for the external dashboard.
//!
//! Reconcilers and the plugin lifecycle publish human-readable text tagged with a
//! box name onto one shared channel. Delivery is best-effort: a full channel
//! applies backpressure to the publisher, a closed one drops the message.

use crate::entry::Entry;
use chrono::{DateTime, Utc};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use tokio::sync::mpsc;
use tracing::debug;

/// One message for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    /// Dashboard box the message belongs to
    pub box_name: String,
    /// Rendered text
    pub text: String,
    /// When the message was published
    pub published_at: DateTime<Utc>,
}

/// Sending half of the status channel.
pub type StatusSender = mpsc::Sender<StatusMessage>;

/// Receiving half of the status channel.
pub type StatusReceiver = mpsc::Receiver<StatusMessage>;

/// Create a status channel holding at most `capacity` pending messages.
#[must_use]
pub fn status_channel(capacity: usize) -> (StatusSender, StatusReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Publishes messages under a fixed box name.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    box_name: String,
    sender: StatusSender,
}

impl StatusPublisher {
    /// Create a publisher for `box_name`.
    pub fn new(box_name: impl Into<String>, sender: StatusSender) -> Self {
        Self {
            box_name: box_name.into(),
            sender,
        }
    }

    /// The box this publisher writes to.
    #[must_use]
    pub fn box_name(&self) -> &str {
        &self.box_name
    }

    /// Publish `text`. Waits while the channel is full.
    pub async fn publish(&self, text: impl Into<String>) {
        let message = StatusMessage {
            box_name: self.box_name.clone(),
            text: text.into(),
            published_at: Utc::now(),
        };
        if self.sender.send(message).await.is_err() {
            debug!(box_name = %self.box_name, "Status channel closed; dropping message");
        }
    }
}

/// Render tracked entries as a table.
///
/// Entries are rendered in the order given.
#[must_use]
pub fn render_entries_table<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = &'a Entry>,
{
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec![
            "Name",
            "Namespace",
            "Kind",
            "Hosts",
            "Target IPs",
            "Target Hosts",
        ]);

    for entry in entries {
        table.add_row(vec![
            entry.name.clone(),
            entry.namespace.clone(),
            entry.kind.to_string(),
            entry
                .host_names
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join("\n"),
            entry.target_ips.join("\n"),
            entry.target_hosts.join("\n"),
        ]);
    }

    table.to_string()
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;

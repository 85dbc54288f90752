// SPDX-License-Identifier: MIT

use crate::domain::proposal::Proposal;
use alloy::primitives::Address;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

/// Emitted by the lifecycle after each state transition. Consumed
/// asynchronously; a dropped or failed notification never rolls back the
/// transition that produced it.
#[derive(Clone, Debug)]
pub enum ProposalEvent {
    Created(Proposal),
    Confirmed {
        id: String,
        owner: Address,
        count: usize,
        quorum: usize,
    },
    Approved {
        id: String,
    },
    Executed {
        id: String,
        tx_hash: String,
    },
    Failed {
        id: String,
        reason: String,
    },
    RebalanceNeeded {
        symbol: String,
        current_bps: u64,
        target_bps: u64,
        deviation_bps: u64,
    },
    SystemError {
        context: String,
        message: String,
    },
}

const COLOR_BLUE: u32 = 0x3498db;
const COLOR_GREEN: u32 = 0x00ff00;
const COLOR_ORANGE: u32 = 0xffaa00;
const COLOR_RED: u32 = 0xff0000;

/// Best-effort delivery of lifecycle events to Discord and Telegram.
pub struct Notifier {
    client: reqwest::Client,
    discord_webhook_url: Option<String>,
    telegram_bot_token: Option<String>,
    telegram_chat_id: Option<String>,
}

impl Notifier {
    pub fn new(
        discord_webhook_url: Option<String>,
        telegram_bot_token: Option<String>,
        telegram_chat_id: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            discord_webhook_url,
            telegram_bot_token,
            telegram_chat_id,
        }
    }

    pub async fn run(&self, mut events: UnboundedReceiver<ProposalEvent>, shutdown: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => return,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => return,
                },
            };
            self.dispatch(&event).await;
        }
    }

    async fn dispatch(&self, event: &ProposalEvent) {
        let (title, description, color) = describe(event);
        tracing::info!(target: "notifier", title = %title, description = %description, "Lifecycle event");

        self.send_discord(&title, &description, color).await;
        self.send_telegram(&format!("*{title}*\n\n{description}")).await;
    }

    async fn send_discord(&self, title: &str, description: &str, color: u32) {
        let Some(url) = &self.discord_webhook_url else {
            return;
        };
        let payload = json!({
            "embeds": [{
                "title": title,
                "description": description,
                "color": color,
            }]
        });
        if let Err(e) = self.client.post(url).json(&payload).send().await {
            tracing::warn!(target: "notifier", error = %e, "Discord notification failed");
        }
    }

    async fn send_telegram(&self, text: &str) {
        let (Some(token), Some(chat_id)) = (&self.telegram_bot_token, &self.telegram_chat_id)
        else {
            return;
        };
        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Err(e) = self.client.post(&url).json(&payload).send().await {
            tracing::warn!(target: "notifier", error = %e, "Telegram notification failed");
        }
    }
}

fn describe(event: &ProposalEvent) -> (String, String, u32) {
    match event {
        ProposalEvent::Created(p) => (
            "New proposal created".to_string(),
            format!(
                "Proposal {} ({}) for {} of token {}: {}",
                p.id, p.kind, p.amount, p.token, p.reason
            ),
            COLOR_BLUE,
        ),
        ProposalEvent::Confirmed {
            id,
            owner,
            count,
            quorum,
        } => (
            "Proposal confirmed".to_string(),
            format!("Proposal {id} confirmed by {owner} ({count}/{quorum} for quorum)"),
            COLOR_BLUE,
        ),
        ProposalEvent::Approved { id } => (
            "Proposal approved".to_string(),
            format!("Proposal {id} reached quorum and is ready to execute"),
            COLOR_GREEN,
        ),
        ProposalEvent::Executed { id, tx_hash } => (
            "Proposal executed".to_string(),
            format!("Proposal {id} executed in transaction {tx_hash}"),
            COLOR_GREEN,
        ),
        ProposalEvent::Failed { id, reason } => (
            "Proposal failed".to_string(),
            format!("Proposal {id} failed: {reason}"),
            COLOR_RED,
        ),
        ProposalEvent::RebalanceNeeded {
            symbol,
            current_bps,
            target_bps,
            deviation_bps,
        } => (
            "Rebalance needed".to_string(),
            format!(
                "{symbol} at {current_bps}bp vs target {target_bps}bp (deviation {deviation_bps}bp)"
            ),
            COLOR_ORANGE,
        ),
        ProposalEvent::SystemError { context, message } => (
            "System error".to_string(),
            format!("{context}: {message}"),
            COLOR_RED,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_render_stable_titles() {
        let (title, body, color) = describe(&ProposalEvent::Failed {
            id: "p-1".to_string(),
            reason: "reverted".to_string(),
        });
        assert_eq!(title, "Proposal failed");
        assert!(body.contains("p-1"));
        assert_eq!(color, COLOR_RED);
    }

    #[tokio::test]
    async fn unconfigured_channels_drop_events_silently() {
        let notifier = Notifier::new(None, None, None);
        notifier
            .dispatch(&ProposalEvent::Approved {
                id: "p-1".to_string(),
            })
            .await;
    }
}

//! Best-effort webhook notifications.
//!
//! Subscribes to engine events and posts Discord-webhook-shaped JSON
//! (`{"content": ...}`) for each one. Strictly fire-and-forget: a failed or
//! slow send is logged and dropped, never propagated back into the engine —
//! state is already committed by the time an event reaches us.

use glyphmine_engine::grumble::Resolution;
use glyphmine_engine::EngineEvent;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub struct Notifier {
    client: reqwest::Client,
    webhook_url: String,
    role_id: Option<String>,
}

impl Notifier {
    pub fn new(webhook_url: String, role_id: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
            role_id,
        }
    }

    /// Consume events until the engine shuts down.
    pub async fn run(self, mut events: broadcast::Receiver<EngineEvent>) {
        info!(url = %self.webhook_url, "webhook notifier started");
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(content) = self.render(&event) {
                        self.send(content).await;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notifier lagged behind engine events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("engine event stream closed, notifier stopping");
                    return;
                }
            }
        }
    }

    fn mention(&self) -> String {
        match &self.role_id {
            Some(role) => format!("<@&{role}> "),
            None => String::new(),
        }
    }

    fn render(&self, event: &EngineEvent) -> Option<String> {
        let mention = self.mention();
        match event {
            EngineEvent::BlockAdvanced { block, system_choice } => Some(format!(
                "{mention}Block {block} started. The bot picked: {system_choice}"
            )),
            EngineEvent::GrumbleResolved(Resolution::NoBets { .. }) => Some(format!(
                "{mention}No one joined the grumble. Prize pool is returned."
            )),
            EngineEvent::GrumbleResolved(Resolution::Paid {
                system_choice,
                prize_pool,
                prize_per_winner,
                winners,
                ..
            }) => {
                if winners.len() == 1 {
                    let (user, _) = &winners[0];
                    Some(format!(
                        "{mention}<@{user}> wins the grumble and takes {prize_pool} GLYPHS! Bot chose: {system_choice}"
                    ))
                } else {
                    let mentions: Vec<String> =
                        winners.iter().map(|(user, _)| format!("<@{user}>")).collect();
                    Some(format!(
                        "{mention}TIE! {} all win the grumble! Bot chose: {system_choice}. Each winner gets {prize_per_winner} GLYPHS.",
                        mentions.join(", ")
                    ))
                }
            }
            EngineEvent::GrumbleReopened { preserved_pool } => Some(format!(
                "{mention}The grumble winner has left! Starting the next session with the preserved {preserved_pool} GLYPHS prize pool."
            )),
            EngineEvent::AuctionEnded(settlement) => {
                let winners: Vec<String> = settlement
                    .winners
                    .iter()
                    .map(|(user, amount)| format!("<@{user}> ({amount})"))
                    .collect();
                Some(format!(
                    "{mention}Auction ended. Winners: {}",
                    if winners.is_empty() {
                        "none".to_string()
                    } else {
                        winners.join(", ")
                    }
                ))
            }
            EngineEvent::AutorunFinished => Some(format!("{mention}Block run is over.")),
        }
    }

    async fn send(&self, content: String) {
        let body = serde_json::json!({ "content": content });
        match self.client.post(&self.webhook_url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("notification delivered");
            }
            Ok(response) => {
                warn!(status = %response.status(), "webhook rejected notification");
            }
            Err(err) => {
                warn!(%err, "failed to deliver notification");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> Notifier {
        Notifier::new("http://localhost/hook".to_string(), Some("role-1".to_string()))
    }

    #[test]
    fn test_block_advanced_message() {
        let message = notifier()
            .render(&EngineEvent::BlockAdvanced {
                block: 7,
                system_choice: glyphmine_types::Symbol::from_index(0).unwrap(),
            })
            .unwrap();
        assert!(message.starts_with("<@&role-1> "));
        assert!(message.contains("Block 7 started"));
    }

    #[test]
    fn test_grumble_tie_message_lists_all_winners() {
        let message = notifier()
            .render(&EngineEvent::GrumbleResolved(Resolution::Paid {
                system_choice: glyphmine_types::Symbol::from_index(3).unwrap(),
                min_distance: 1,
                prize_pool: 101,
                prize_per_winner: 50,
                winners: vec![("a".to_string(), 50), ("b".to_string(), 50)],
                retained_remainder: 1,
            }))
            .unwrap();
        assert!(message.contains("TIE!"));
        assert!(message.contains("<@a>"));
        assert!(message.contains("<@b>"));
    }

    #[test]
    fn test_no_role_means_no_mention() {
        let notifier = Notifier::new("http://localhost/hook".to_string(), None);
        let message = notifier
            .render(&EngineEvent::AutorunFinished)
            .unwrap();
        assert_eq!(message, "Block run is over.");
    }
}

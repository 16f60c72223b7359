use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Result};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::agent::Agent;
use crate::config::SimTuning;
use crate::generator::ContentGenerator;
use crate::social::{AgentMessage, MessageContext, MessageType};
use crate::store::Repository;

/// One utterance of the bounded two-round protocol, in generation order.
#[derive(Debug, Clone, Serialize)]
pub struct DiscussionMessage {
    pub agent_id: String,
    pub agent_name: String,
    pub message: String,
    pub round: u8,
}

/// Runs a synchronous two-round discussion: every agent gives an opinion,
/// then up to two high-conflict agents react to the aggregated transcript.
/// Strictly sequential so the transcript order is deterministic.
pub struct DiscussionOrchestrator {
    store: Arc<dyn Repository>,
    generator: Arc<ContentGenerator>,
    tuning: SimTuning,
}

impl DiscussionOrchestrator {
    pub fn new(
        store: Arc<dyn Repository>,
        generator: Arc<ContentGenerator>,
        tuning: SimTuning,
    ) -> Self {
        DiscussionOrchestrator {
            store,
            generator,
            tuning,
        }
    }

    pub async fn run(
        &self,
        symbol: &str,
        price: f64,
        price_change: f64,
    ) -> Result<Vec<DiscussionMessage>> {
        let agents = self.store.active_agents()?;
        ensure!(!agents.is_empty(), "no agents available for discussion");

        info!(symbol, agents = agents.len(), "starting discussion");
        let mut messages: Vec<DiscussionMessage> = Vec::new();

        // Round 1: independent opinions, fixed enumeration order.
        for agent in &agents {
            match self
                .generator
                .opinion_text(agent, symbol, price, price_change)
                .await
            {
                Ok(text) => {
                    self.persist(agent, &text, MessageType::Analysis, symbol, Some(price), Some(price_change), 1)?;
                    messages.push(DiscussionMessage {
                        agent_id: agent.agent_id.clone(),
                        agent_name: agent.name.clone(),
                        message: text,
                        round: 1,
                    });
                    self.pace(self.tuning.round_one_delay_secs).await;
                }
                Err(error) => {
                    warn!(agent = %agent.agent_id, %error, "skipping opinion after generation failure");
                }
            }
        }

        // Round 2: the argumentative subset reacts to everything said so far.
        let transcript = round_one_transcript(&messages);
        let reacting: Vec<Agent> = select_reacting_agents(&agents, 2)
            .into_iter()
            .cloned()
            .collect();

        for agent in &reacting {
            match self
                .generator
                .reaction_text(agent, symbol, &transcript)
                .await
            {
                Ok(text) => {
                    self.persist(agent, &text, MessageType::Reaction, symbol, None, None, 2)?;
                    messages.push(DiscussionMessage {
                        agent_id: agent.agent_id.clone(),
                        agent_name: agent.name.clone(),
                        message: text,
                        round: 2,
                    });
                    self.pace(self.tuning.round_two_delay_secs).await;
                }
                Err(error) => {
                    warn!(agent = %agent.agent_id, %error, "skipping reaction after generation failure");
                }
            }
        }

        info!(messages = messages.len(), "discussion complete");
        Ok(messages)
    }

    #[allow(clippy::too_many_arguments)]
    fn persist(
        &self,
        agent: &Agent,
        text: &str,
        message_type: MessageType,
        symbol: &str,
        price: Option<f64>,
        price_change: Option<f64>,
        round: u8,
    ) -> Result<()> {
        self.store.insert_message(AgentMessage::new(
            &agent.agent_id,
            text,
            message_type,
            MessageContext {
                crypto_symbol: Some(symbol.to_string()),
                price,
                price_change,
            },
            Some(round),
        ))
    }

    /// Human-feeling delay between utterances. Pacing only; not a rate
    /// limit.
    async fn pace(&self, (min_secs, max_secs): (f64, f64)) {
        let secs = if max_secs > min_secs {
            let mut rng = SmallRng::from_entropy();
            rng.gen_range(min_secs..max_secs)
        } else {
            min_secs
        };

        if secs > 0.0 {
            sleep(Duration::from_secs_f64(secs)).await;
        }
    }
}

fn round_one_transcript(messages: &[DiscussionMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.round == 1)
        .map(|m| format!("{}: \"{}\"", m.agent_name, m.message))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Prefer agents who like to argue; pad with the remaining agents in
/// enumeration order when fewer than `cap` qualify.
pub fn select_reacting_agents(agents: &[Agent], cap: usize) -> Vec<&Agent> {
    let mut chosen: Vec<&Agent> = agents
        .iter()
        .filter(|a| a.personality.conflict_tendency > 0.5)
        .take(cap)
        .collect();

    if chosen.len() < cap {
        for agent in agents {
            if chosen.len() >= cap {
                break;
            }
            if !chosen.iter().any(|c| c.agent_id == agent.agent_id) {
                chosen.push(agent);
            }
        }
    }

    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::seed_roster;

    #[test]
    fn reacting_agents_prefer_conflict() {
        let agents = seed_roster();
        let chosen = select_reacting_agents(&agents, 2);

        assert_eq!(chosen.len(), 2);
        // gamma (0.6) and delta (0.8) are the argumentative ones.
        assert!(chosen.iter().all(|a| a.personality.conflict_tendency > 0.5));
    }

    #[test]
    fn reacting_agents_pad_when_few_qualify() {
        let mut agents = seed_roster();
        for agent in &mut agents {
            agent.personality.conflict_tendency = 0.1;
        }
        agents[3].personality.conflict_tendency = 0.9;

        let chosen = select_reacting_agents(&agents, 2);
        assert_eq!(chosen.len(), 2);
        assert_eq!(chosen[0].agent_id, agents[3].agent_id);
        // Padding keeps enumeration order.
        assert_eq!(chosen[1].agent_id, agents[0].agent_id);
    }

    #[test]
    fn reacting_agents_with_tiny_roster() {
        let agents: Vec<Agent> = seed_roster().into_iter().take(1).collect();
        let chosen = select_reacting_agents(&agents, 2);
        assert_eq!(chosen.len(), 1);
    }

    #[test]
    fn transcript_only_quotes_round_one() {
        let messages = vec![
            DiscussionMessage {
                agent_id: "alpha".to_string(),
                agent_name: "Alpha".to_string(),
                message: "hold".to_string(),
                round: 1,
            },
            DiscussionMessage {
                agent_id: "delta".to_string(),
                agent_name: "Delta".to_string(),
                message: "wrong, buy".to_string(),
                round: 2,
            },
        ];

        let transcript = round_one_transcript(&messages);
        assert!(transcript.contains("Alpha: \"hold\""));
        assert!(!transcript.contains("wrong, buy"));
    }
}

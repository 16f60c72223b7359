use serde::{Deserialize, Serialize};

use crate::emotion::EmotionVector;

/// Structured behavior modifiers. Emotion scaling reads these flags, never
/// the free-text trait list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitFlags {
    #[serde(default)]
    pub cautious: bool,
    #[serde(default)]
    pub aggressive: bool,
    #[serde(default)]
    pub analytical: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Personality {
    pub description: String,
    /// Presentation-only trait labels shown in prompts and status output.
    pub traits: Vec<String>,
    pub communication_style: String,
    /// Likelihood of being picked to argue in round two of a discussion.
    pub conflict_tendency: f64,
    #[serde(default)]
    pub flags: TraitFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub name: String,
    pub role: String,
    pub personality: Personality,
    pub risk_tolerance: f64,
    #[serde(default)]
    pub current_mood: EmotionVector,
    pub is_active: bool,
    /// Symbols this agent likes to post about. Empty means "pick from the
    /// configured universe".
    #[serde(default)]
    pub preferred_symbols: Vec<String>,
    // Presentation bookkeeping, not part of the behavior model.
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub trade_count: u32,
}

impl Agent {
    pub fn new(agent_id: &str, name: &str, role: &str, personality: Personality) -> Self {
        Agent {
            agent_id: agent_id.to_string(),
            name: name.to_string(),
            role: role.to_string(),
            personality,
            risk_tolerance: 0.5,
            current_mood: EmotionVector::baseline(),
            is_active: true,
            preferred_symbols: Vec::new(),
            balance: 10_000.0,
            trade_count: 0,
        }
    }
}

/// The default five-analyst desk. Idempotent seeding is the store's job;
/// this just describes the roster.
pub fn seed_roster() -> Vec<Agent> {
    let mut alpha = Agent::new(
        "alpha",
        "Alpha",
        "technical analyst",
        Personality {
            description: "Chart purist. Trusts levels, distrusts narratives.".to_string(),
            traits: vec!["methodical".to_string(), "analytical".to_string()],
            communication_style: "precise, numbers first".to_string(),
            conflict_tendency: 0.4,
            flags: TraitFlags {
                analytical: true,
                ..TraitFlags::default()
            },
        },
    );
    alpha.risk_tolerance = 0.5;
    alpha.preferred_symbols = vec!["BTC".to_string(), "ETH".to_string()];

    let mut beta = Agent::new(
        "beta",
        "Beta",
        "macro analyst",
        Personality {
            description: "Reads every market through rates and liquidity.".to_string(),
            traits: vec!["big picture".to_string(), "patient".to_string()],
            communication_style: "measured, essay-like".to_string(),
            conflict_tendency: 0.1,
            flags: TraitFlags::default(),
        },
    );
    beta.risk_tolerance = 0.4;
    beta.preferred_symbols = vec!["BTC".to_string(), "ETH".to_string(), "SOL".to_string()];

    let mut gamma = Agent::new(
        "gamma",
        "Gamma",
        "risk manager",
        Personality {
            description: "Assumes every rally is a trap until proven otherwise.".to_string(),
            traits: vec!["cautious".to_string(), "skeptical".to_string()],
            communication_style: "terse warnings".to_string(),
            conflict_tendency: 0.6,
            flags: TraitFlags {
                cautious: true,
                analytical: true,
                ..TraitFlags::default()
            },
        },
    );
    gamma.risk_tolerance = 0.2;
    gamma.preferred_symbols = vec!["BTC".to_string(), "ETH".to_string()];

    let mut delta = Agent::new(
        "delta",
        "Delta",
        "speculator",
        Personality {
            description: "Momentum chaser. Loud in wins, louder in losses.".to_string(),
            traits: vec!["impulsive".to_string(), "aggressive".to_string()],
            communication_style: "emotional, all caps when it moves".to_string(),
            conflict_tendency: 0.8,
            flags: TraitFlags {
                aggressive: true,
                ..TraitFlags::default()
            },
        },
    );
    delta.risk_tolerance = 0.9;
    delta.preferred_symbols = vec!["SOL".to_string(), "AVAX".to_string(), "MATIC".to_string()];

    let mut omega = Agent::new(
        "omega",
        "Omega",
        "arbitrageur",
        Personality {
            description: "Hunts spreads and inefficiencies across venues.".to_string(),
            traits: vec!["opportunistic".to_string(), "quantitative".to_string()],
            communication_style: "dry, basis points".to_string(),
            conflict_tendency: 0.3,
            flags: TraitFlags {
                analytical: true,
                ..TraitFlags::default()
            },
        },
    );
    omega.risk_tolerance = 0.6;
    omega.preferred_symbols = vec!["ETH".to_string(), "LINK".to_string(), "DOT".to_string()];

    vec![alpha, beta, gamma, delta, omega]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_ids_are_unique_and_active() {
        let roster = seed_roster();
        assert_eq!(roster.len(), 5);

        let mut ids: Vec<_> = roster.iter().map(|a| a.agent_id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);
        assert!(roster.iter().all(|a| a.is_active));
        assert!(roster.iter().all(|a| !a.preferred_symbols.is_empty()));
    }

    #[test]
    fn roster_moods_start_at_baseline() {
        for agent in seed_roster() {
            assert_eq!(agent.current_mood, EmotionVector::baseline());
        }
    }
}

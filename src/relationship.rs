use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Directed edge between two agents. `(a, b)` and `(b, a)` are distinct
/// edges and are never mirrored automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub agent_id_1: String,
    pub agent_id_2: String,
    pub trust: f64,
    pub sympathy: f64,
    pub respect: f64,
    pub interaction_count: u32,
    pub last_interaction_at: Option<DateTime<Utc>>,
}

impl Relationship {
    /// Neutral edge, the state every pair starts from.
    pub fn new(from: &str, to: &str) -> Self {
        Relationship {
            agent_id_1: from.to_string(),
            agent_id_2: to.to_string(),
            trust: 0.5,
            sympathy: 0.5,
            respect: 0.5,
            interaction_count: 0,
            last_interaction_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strength {
    Weak,
    Normal,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Significance {
    Minor,
    Normal,
    Major,
}

/// Closed set of interactions the relationship engine scores. `Other` is
/// the explicit zero-delta branch.
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    Agreement { strength: Strength },
    Disagreement { severity: Strength, respectful: bool },
    Help { significance: Significance, high_cost: bool },
    Collaboration,
    Betrayal,
    Praise,
    Criticism,
    Support,
    Ignore,
    Other(String),
}

impl Interaction {
    /// Log tag for the interaction family.
    pub fn name(&self) -> &str {
        match self {
            Interaction::Agreement { .. } => "agreement",
            Interaction::Disagreement { .. } => "disagreement",
            Interaction::Help { .. } => "help",
            Interaction::Collaboration => "collaboration",
            Interaction::Betrayal => "betrayal",
            Interaction::Praise => "praise",
            Interaction::Criticism => "criticism",
            Interaction::Support => "support",
            Interaction::Ignore => "ignore",
            Interaction::Other(tag) => tag,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RelationshipDelta {
    pub trust: f64,
    pub sympathy: f64,
    pub respect: f64,
}

/// Score one interaction against the current edge state. Feedback
/// amplification reads the pre-interaction trust value.
pub fn interaction_delta(rel: &Relationship, interaction: &Interaction) -> RelationshipDelta {
    let mut d = RelationshipDelta::default();

    match interaction {
        Interaction::Agreement { strength } => {
            match strength {
                Strength::Strong => {
                    d.trust += 0.08;
                    d.sympathy += 0.1;
                    d.respect += 0.05;
                }
                Strength::Weak => {
                    d.trust += 0.02;
                    d.sympathy += 0.03;
                    d.respect += 0.01;
                }
                Strength::Normal => {
                    d.trust += 0.05;
                    d.sympathy += 0.06;
                    d.respect += 0.03;
                }
            }
            // Positive feedback: established trust amplifies agreement.
            if rel.trust > 0.7 {
                d.trust *= 1.2;
                d.sympathy *= 1.2;
            }
        }
        Interaction::Disagreement {
            severity,
            respectful,
        } => {
            match severity {
                Strength::Strong => {
                    d.trust -= 0.1;
                    d.sympathy -= 0.12;
                    d.respect -= if *respectful { 0.02 } else { 0.08 };
                }
                Strength::Weak => {
                    d.trust -= 0.02;
                    d.sympathy -= 0.03;
                    d.respect += if *respectful { 0.01 } else { -0.02 };
                }
                Strength::Normal => {
                    d.trust -= 0.05;
                    d.sympathy -= 0.06;
                    d.respect -= if *respectful { 0.0 } else { 0.04 };
                }
            }
            // Arguing well earns respect, unless the fight got heated.
            if *respectful && *severity != Strength::Strong {
                d.respect += 0.03;
            }
            // Negative feedback: low trust makes disagreements spiral.
            if rel.trust < 0.3 {
                d.trust *= 1.5;
                d.sympathy *= 1.5;
            }
        }
        Interaction::Help {
            significance,
            high_cost,
        } => {
            match significance {
                Significance::Major => {
                    d.trust += 0.15;
                    d.sympathy += 0.12;
                    d.respect += 0.1;
                }
                Significance::Minor => {
                    d.trust += 0.03;
                    d.sympathy += 0.04;
                    d.respect += 0.02;
                }
                Significance::Normal => {
                    d.trust += 0.08;
                    d.sympathy += 0.07;
                    d.respect += 0.05;
                }
            }
            // Sacrifice counts extra.
            if *high_cost {
                d.trust += 0.05;
                d.respect += 0.08;
            }
        }
        Interaction::Collaboration => {
            d.trust += 0.08;
            d.sympathy += 0.05;
            d.respect += 0.06;
        }
        Interaction::Betrayal => {
            d.trust -= 0.25;
            d.sympathy -= 0.15;
            d.respect -= 0.1;
        }
        Interaction::Praise => {
            d.sympathy += 0.08;
            d.respect += 0.05;
        }
        Interaction::Criticism => {
            d.sympathy -= 0.05;
            d.respect -= 0.03;
        }
        Interaction::Support => {
            d.trust += 0.05;
            d.sympathy += 0.07;
        }
        Interaction::Ignore => {
            d.sympathy -= 0.03;
        }
        Interaction::Other(tag) => {
            warn!(interaction = %tag, "unknown interaction type, no relationship change");
        }
    }

    d
}

/// Apply an interaction: additive deltas clamped to [0, 1] per channel,
/// interaction counter bumped, timestamp refreshed.
pub fn apply_interaction(rel: &Relationship, interaction: &Interaction) -> Relationship {
    let d = interaction_delta(rel, interaction);

    Relationship {
        agent_id_1: rel.agent_id_1.clone(),
        agent_id_2: rel.agent_id_2.clone(),
        trust: clamp01(rel.trust + d.trust),
        sympathy: clamp01(rel.sympathy + d.sympathy),
        respect: clamp01(rel.respect + d.respect),
        interaction_count: rel.interaction_count + 1,
        last_interaction_at: Some(Utc::now()),
    }
}

/// Drift every channel one `rate`-sized step toward neutral 0.5. Counters
/// and timestamps are untouched.
pub fn decay(rel: &Relationship, rate: f64) -> Relationship {
    Relationship {
        trust: move_towards(rel.trust, 0.5, rate),
        sympathy: move_towards(rel.sympathy, 0.5, rate),
        respect: move_towards(rel.respect, 0.5, rate),
        ..rel.clone()
    }
}

/// Overall edge strength: mean of the three channels.
pub fn strength(rel: &Relationship) -> f64 {
    (rel.trust + rel.sympathy + rel.respect) / 3.0
}

pub fn strength_color(rel: &Relationship) -> &'static str {
    let s = strength(rel);
    if s > 0.8 {
        "#16a34a"
    } else if s > 0.6 {
        "#84cc16"
    } else if s > 0.4 {
        "#eab308"
    } else if s > 0.2 {
        "#f97316"
    } else {
        "#dc2626"
    }
}

pub fn strength_label(rel: &Relationship) -> &'static str {
    let s = strength(rel);
    if s > 0.8 {
        "excellent"
    } else if s > 0.6 {
        "good"
    } else if s > 0.4 {
        "neutral"
    } else if s > 0.2 {
        "strained"
    } else {
        "bad"
    }
}

/// Neutral edges in both directions between a new agent and every
/// existing one.
pub fn init_pairs(new_agent: &str, existing: &[String]) -> Vec<Relationship> {
    let mut edges = Vec::with_capacity(existing.len() * 2);
    for other in existing {
        if other == new_agent {
            continue;
        }
        edges.push(Relationship::new(new_agent, other));
        edges.push(Relationship::new(other, new_agent));
    }
    edges
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn move_towards(current: f64, target: f64, step: f64) -> f64 {
    if current < target {
        (current + step).min(target)
    } else if current > target {
        (current - step).max(target)
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_agreement_from_neutral() {
        let rel = Relationship::new("alpha", "beta");
        let updated = apply_interaction(
            &rel,
            &Interaction::Agreement {
                strength: Strength::Normal,
            },
        );

        assert!((updated.trust - 0.55).abs() < 1e-9);
        assert!((updated.sympathy - 0.56).abs() < 1e-9);
        assert!((updated.respect - 0.53).abs() < 1e-9);
        assert_eq!(updated.interaction_count, 1);
        assert!(updated.last_interaction_at.is_some());
    }

    #[test]
    fn disrespectful_normal_disagreement_from_neutral() {
        let rel = Relationship::new("alpha", "beta");
        let updated = apply_interaction(
            &rel,
            &Interaction::Disagreement {
                severity: Strength::Normal,
                respectful: false,
            },
        );

        assert!((updated.trust - 0.45).abs() < 1e-9);
        assert!((updated.sympathy - 0.44).abs() < 1e-9);
        assert!((updated.respect - 0.46).abs() < 1e-9);
    }

    #[test]
    fn respectful_weak_disagreement_gains_respect() {
        let rel = Relationship::new("alpha", "beta");
        let updated = apply_interaction(
            &rel,
            &Interaction::Disagreement {
                severity: Strength::Weak,
                respectful: true,
            },
        );

        // +0.01 base gain plus the +0.03 respectful bonus.
        assert!((updated.respect - 0.54).abs() < 1e-9);
        assert!(updated.trust < 0.5);
    }

    #[test]
    fn high_trust_amplifies_agreement() {
        let mut rel = Relationship::new("alpha", "beta");
        rel.trust = 0.8;

        let updated = apply_interaction(
            &rel,
            &Interaction::Agreement {
                strength: Strength::Normal,
            },
        );
        assert!((updated.trust - (0.8 + 0.05 * 1.2)).abs() < 1e-9);
        assert!((updated.sympathy - (0.5 + 0.06 * 1.2)).abs() < 1e-9);
    }

    #[test]
    fn low_trust_spirals_on_disagreement() {
        let mut rel = Relationship::new("alpha", "beta");
        rel.trust = 0.2;

        let updated = apply_interaction(
            &rel,
            &Interaction::Disagreement {
                severity: Strength::Normal,
                respectful: true,
            },
        );
        assert!((updated.trust - (0.2 - 0.05 * 1.5)).abs() < 1e-9);
        assert!((updated.sympathy - (0.5 - 0.06 * 1.5)).abs() < 1e-9);
    }

    #[test]
    fn high_cost_help_bonus() {
        let rel = Relationship::new("alpha", "beta");
        let updated = apply_interaction(
            &rel,
            &Interaction::Help {
                significance: Significance::Major,
                high_cost: true,
            },
        );
        assert!((updated.trust - (0.5 + 0.15 + 0.05)).abs() < 1e-9);
        assert!((updated.respect - (0.5 + 0.1 + 0.08)).abs() < 1e-9);
    }

    #[test]
    fn channels_stay_clamped() {
        let mut rel = Relationship::new("alpha", "beta");
        for _ in 0..20 {
            rel = apply_interaction(&rel, &Interaction::Betrayal);
        }
        assert!((rel.trust - 0.0).abs() < 1e-9);
        assert!((rel.sympathy - 0.0).abs() < 1e-9);
        assert!((rel.respect - 0.0).abs() < 1e-9);
        assert_eq!(rel.interaction_count, 20);

        for _ in 0..50 {
            rel = apply_interaction(
                &rel,
                &Interaction::Help {
                    significance: Significance::Major,
                    high_cost: true,
                },
            );
        }
        assert!((rel.trust - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_interaction_only_counts() {
        let rel = Relationship::new("alpha", "beta");
        let updated = apply_interaction(&rel, &Interaction::Other("handshake".to_string()));

        assert!((updated.trust - 0.5).abs() < 1e-9);
        assert!((updated.sympathy - 0.5).abs() < 1e-9);
        assert!((updated.respect - 0.5).abs() < 1e-9);
        assert_eq!(updated.interaction_count, 1);
    }

    #[test]
    fn decay_drifts_to_neutral_and_holds() {
        let mut rel = Relationship::new("alpha", "beta");
        rel.trust = 0.95;
        rel.sympathy = 0.1;
        rel.respect = 0.5;

        for _ in 0..30 {
            let next = decay(&rel, 0.02);
            assert!((next.trust - 0.5).abs() <= (rel.trust - 0.5).abs());
            assert!((next.sympathy - 0.5).abs() <= (rel.sympathy - 0.5).abs());
            rel = next;
        }

        assert!((rel.trust - 0.5).abs() < 1e-9);
        assert!((rel.sympathy - 0.5).abs() < 1e-9);
        let settled = decay(&rel, 0.02);
        assert!((settled.trust - 0.5).abs() < 1e-9);
    }

    #[test]
    fn strength_bands() {
        let mut rel = Relationship::new("alpha", "beta");
        rel.trust = 0.9;
        rel.sympathy = 0.9;
        rel.respect = 0.9;
        assert_eq!(strength_label(&rel), "excellent");
        assert_eq!(strength_color(&rel), "#16a34a");

        rel.trust = 0.1;
        rel.sympathy = 0.1;
        rel.respect = 0.1;
        assert_eq!(strength_label(&rel), "bad");
    }

    #[test]
    fn init_pairs_are_bidirectional_and_neutral() {
        let existing = vec!["alpha".to_string(), "beta".to_string()];
        let edges = init_pairs("gamma", &existing);

        assert_eq!(edges.len(), 4);
        assert!(edges
            .iter()
            .any(|e| e.agent_id_1 == "gamma" && e.agent_id_2 == "alpha"));
        assert!(edges
            .iter()
            .any(|e| e.agent_id_1 == "alpha" && e.agent_id_2 == "gamma"));
        assert!(edges
            .iter()
            .all(|e| e.trust == 0.5 && e.interaction_count == 0));
    }
}

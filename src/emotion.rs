use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::agent::TraitFlags;

/// Four independent affect channels, each clamped to [0, 1].
/// There is no normalization across channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionVector {
    pub fear: f64,
    pub confidence: f64,
    pub euphoria: f64,
    pub irritation: f64,
}

impl EmotionVector {
    /// Resting state every agent starts from and decays back toward.
    pub fn baseline() -> Self {
        EmotionVector {
            fear: 0.3,
            confidence: 0.5,
            euphoria: 0.3,
            irritation: 0.2,
        }
    }
}

impl Default for EmotionVector {
    fn default() -> Self {
        Self::baseline()
    }
}

/// Closed set of events the emotion engine reacts to. `Other` is the
/// explicit no-op branch for tags the engine does not model.
#[derive(Debug, Clone, PartialEq)]
pub enum EmotionEvent {
    Profit { percent: f64 },
    Loss { percent: f64 },
    Agreement,
    Disagreement,
    Contradiction,
    HelpReceived,
    HelpGiven,
    PostCreated,
    CommentReceived,
    Ignored,
    Other(String),
}

#[derive(Debug, Clone, Copy, Default)]
struct EmotionDelta {
    fear: f64,
    confidence: f64,
    euphoria: f64,
    irritation: f64,
}

/// Apply one event to a mood. Deltas are additive, then each channel is
/// clamped to [0, 1]; the clamp is the only nonlinearity.
pub fn apply_event(mood: &EmotionVector, event: &EmotionEvent, flags: &TraitFlags) -> EmotionVector {
    let delta = event_delta(event, flags);

    EmotionVector {
        fear: clamp01(mood.fear + delta.fear),
        confidence: clamp01(mood.confidence + delta.confidence),
        euphoria: clamp01(mood.euphoria + delta.euphoria),
        irritation: clamp01(mood.irritation + delta.irritation),
    }
}

fn event_delta(event: &EmotionEvent, flags: &TraitFlags) -> EmotionDelta {
    let mut d = EmotionDelta::default();

    match event {
        EmotionEvent::Profit { percent } => return profit_delta(*percent, flags),
        EmotionEvent::Loss { percent } => return loss_delta(*percent, flags),
        EmotionEvent::Agreement => {
            d.confidence += 0.05;
            d.euphoria += 0.03;
            d.irritation -= 0.02;
        }
        EmotionEvent::Disagreement => {
            d.confidence -= 0.03;
            d.irritation += 0.08;
            d.fear += 0.02;
        }
        EmotionEvent::Contradiction => {
            d.irritation += 0.15;
            d.confidence -= 0.05;
        }
        EmotionEvent::HelpReceived => {
            d.confidence += 0.04;
            d.euphoria += 0.02;
            d.fear -= 0.03;
        }
        EmotionEvent::HelpGiven => {
            d.confidence += 0.03;
            d.euphoria += 0.02;
        }
        EmotionEvent::PostCreated => {
            d.confidence += 0.02;
        }
        EmotionEvent::CommentReceived => {
            d.confidence += 0.01;
            d.euphoria += 0.01;
        }
        EmotionEvent::Ignored => {
            d.confidence -= 0.02;
            d.irritation += 0.03;
        }
        EmotionEvent::Other(tag) => {
            warn!(event = %tag, "unknown emotion event, no mood change");
        }
    }

    d
}

/// Profit deltas in three severity tiers, then personality scaling.
fn profit_delta(percent: f64, flags: &TraitFlags) -> EmotionDelta {
    let mut d = EmotionDelta::default();

    if percent > 10.0 {
        d.euphoria += 0.2;
        d.confidence += 0.15;
        d.fear -= 0.1;
    } else if percent > 5.0 {
        d.euphoria += 0.1;
        d.confidence += 0.08;
        d.fear -= 0.05;
    } else if percent > 0.0 {
        d.euphoria += 0.05;
        d.confidence += 0.03;
    }

    if flags.cautious {
        d.euphoria *= 0.7;
        d.confidence *= 0.8;
    }
    if flags.aggressive {
        d.euphoria *= 1.3;
        d.confidence *= 1.2;
    }

    d
}

fn loss_delta(percent: f64, flags: &TraitFlags) -> EmotionDelta {
    let mut d = EmotionDelta::default();

    if percent > 10.0 {
        d.fear += 0.25;
        d.confidence -= 0.2;
        d.irritation += 0.15;
        d.euphoria -= 0.1;
    } else if percent > 5.0 {
        d.fear += 0.15;
        d.confidence -= 0.1;
        d.irritation += 0.08;
        d.euphoria -= 0.05;
    } else if percent > 0.0 {
        d.fear += 0.08;
        d.confidence -= 0.05;
        d.irritation += 0.03;
    }

    if flags.cautious {
        d.fear *= 1.3;
        d.irritation *= 0.8;
    }
    if flags.aggressive {
        d.fear *= 0.7;
        d.irritation *= 1.5;
    }
    if flags.analytical {
        d.fear *= 0.8;
        d.confidence *= 0.8;
    }

    d
}

/// Move every channel one `rate`-sized step toward baseline without
/// overshooting. Repeated application converges and then holds.
pub fn decay(mood: &EmotionVector, rate: f64) -> EmotionVector {
    let base = EmotionVector::baseline();

    EmotionVector {
        fear: move_towards(mood.fear, base.fear, rate),
        confidence: move_towards(mood.confidence, base.confidence, rate),
        euphoria: move_towards(mood.euphoria, base.euphoria, rate),
        irritation: move_towards(mood.irritation, base.irritation, rate),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Fear,
    Confidence,
    Euphoria,
    Irritation,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Fear => write!(f, "fear"),
            Channel::Confidence => write!(f, "confidence"),
            Channel::Euphoria => write!(f, "euphoria"),
            Channel::Irritation => write!(f, "irritation"),
        }
    }
}

/// Highest-value channel. Ties resolve in a fixed channel order, so the
/// result is deterministic.
pub fn dominant_emotion(mood: &EmotionVector) -> (Channel, f64) {
    let channels = [
        (Channel::Fear, mood.fear),
        (Channel::Confidence, mood.confidence),
        (Channel::Euphoria, mood.euphoria),
        (Channel::Irritation, mood.irritation),
    ];

    let mut best = channels[0];
    for c in &channels[1..] {
        if c.1 > best.1 {
            best = *c;
        }
    }
    best
}

/// Presentation color for the dominant emotion, neutral green below 0.6.
pub fn mood_color(mood: &EmotionVector) -> &'static str {
    let (channel, value) = dominant_emotion(mood);
    if value <= 0.6 {
        return "#4a6741";
    }
    match channel {
        Channel::Euphoria => "#16a34a",
        Channel::Fear => "#dc2626",
        Channel::Confidence => "#2563eb",
        Channel::Irritation => "#ea580c",
    }
}

pub fn mood_emoji(mood: &EmotionVector) -> &'static str {
    let (channel, value) = dominant_emotion(mood);
    if value <= 0.6 {
        return "😐";
    }
    match channel {
        Channel::Euphoria => "🚀",
        Channel::Fear => "😰",
        Channel::Confidence => "😎",
        Channel::Irritation => "😤",
    }
}

pub fn mood_label(mood: &EmotionVector) -> String {
    let (channel, value) = dominant_emotion(mood);
    if value > 0.7 {
        format!("strong {}", channel)
    } else if value > 0.5 {
        channel.to_string()
    } else {
        "calm".to_string()
    }
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

    fn in_bounds(mood: &EmotionVector) -> bool {
        [mood.fear, mood.confidence, mood.euphoria, mood.irritation]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }

    #[test]
    fn agreement_deltas() {
        let mood = EmotionVector::baseline();
        let updated = apply_event(&mood, &EmotionEvent::Agreement, &TraitFlags::default());

        assert!((updated.confidence - 0.55).abs() < 1e-9);
        assert!((updated.euphoria - 0.33).abs() < 1e-9);
        assert!((updated.irritation - 0.18).abs() < 1e-9);
        assert!((updated.fear - 0.3).abs() < 1e-9);
    }

    #[test]
    fn clamp_holds_under_repeated_events() {
        let mut mood = EmotionVector::baseline();
        let flags = TraitFlags::default();

        for _ in 0..100 {
            mood = apply_event(&mood, &EmotionEvent::Contradiction, &flags);
        }
        assert!(in_bounds(&mood));
        assert!((mood.irritation - 1.0).abs() < 1e-9);

        for _ in 0..100 {
            mood = apply_event(&mood, &EmotionEvent::Profit { percent: 15.0 }, &flags);
        }
        assert!(in_bounds(&mood));
        assert!((mood.fear - 0.0).abs() < 1e-9);
    }

    #[test]
    fn profit_tiers() {
        let flags = TraitFlags::default();
        let mood = EmotionVector {
            fear: 0.5,
            confidence: 0.5,
            euphoria: 0.5,
            irritation: 0.5,
        };

        let big = apply_event(&mood, &EmotionEvent::Profit { percent: 12.0 }, &flags);
        assert!((big.euphoria - 0.7).abs() < 1e-9);
        assert!((big.confidence - 0.65).abs() < 1e-9);
        assert!((big.fear - 0.4).abs() < 1e-9);

        let small = apply_event(&mood, &EmotionEvent::Profit { percent: 1.0 }, &flags);
        assert!((small.euphoria - 0.55).abs() < 1e-9);
        assert!((small.fear - 0.5).abs() < 1e-9);
    }

    #[test]
    fn cautious_dampens_profit_and_amplifies_loss_fear() {
        let cautious = TraitFlags {
            cautious: true,
            ..TraitFlags::default()
        };
        let mood = EmotionVector::baseline();

        let profit = apply_event(&mood, &EmotionEvent::Profit { percent: 12.0 }, &cautious);
        // euphoria gain 0.2 * 0.7, confidence gain 0.15 * 0.8
        assert!((profit.euphoria - (0.3 + 0.14)).abs() < 1e-9);
        assert!((profit.confidence - (0.5 + 0.12)).abs() < 1e-9);

        let loss = apply_event(&mood, &EmotionEvent::Loss { percent: 12.0 }, &cautious);
        // fear gain 0.25 * 1.3
        assert!((loss.fear - (0.3 + 0.325)).abs() < 1e-9);
    }

    #[test]
    fn aggressive_loss_irritation() {
        let aggressive = TraitFlags {
            aggressive: true,
            ..TraitFlags::default()
        };
        let mood = EmotionVector::baseline();
        let loss = apply_event(&mood, &EmotionEvent::Loss { percent: 7.0 }, &aggressive);

        // irritation gain 0.08 * 1.5, fear gain 0.15 * 0.7
        assert!((loss.irritation - (0.2 + 0.12)).abs() < 1e-9);
        assert!((loss.fear - (0.3 + 0.105)).abs() < 1e-9);
    }

    #[test]
    fn unknown_event_is_a_no_op() {
        let mood = EmotionVector {
            fear: 0.4,
            confidence: 0.6,
            euphoria: 0.2,
            irritation: 0.7,
        };
        let updated = apply_event(
            &mood,
            &EmotionEvent::Other("solar_flare".to_string()),
            &TraitFlags::default(),
        );
        assert_eq!(mood, updated);
    }

    #[test]
    fn decay_converges_to_baseline_and_holds() {
        let mut mood = EmotionVector {
            fear: 1.0,
            confidence: 0.0,
            euphoria: 0.9,
            irritation: 0.05,
        };

        for _ in 0..40 {
            let next = decay(&mood, 0.05);
            // Each step moves toward baseline, never past it.
            assert!((next.fear - 0.3).abs() <= (mood.fear - 0.3).abs());
            assert!((next.confidence - 0.5).abs() <= (mood.confidence - 0.5).abs());
            mood = next;
        }

        assert_eq!(mood, EmotionVector::baseline());
        assert_eq!(decay(&mood, 0.05), EmotionVector::baseline());
    }

    #[test]
    fn dominant_emotion_threshold() {
        let excited = EmotionVector {
            fear: 0.1,
            confidence: 0.3,
            euphoria: 0.9,
            irritation: 0.1,
        };
        assert_eq!(dominant_emotion(&excited).0, Channel::Euphoria);
        assert_eq!(mood_color(&excited), "#16a34a");
        assert_eq!(mood_emoji(&excited), "🚀");
        assert_eq!(mood_label(&excited), "strong euphoria");

        let flat = EmotionVector {
            fear: 0.3,
            confidence: 0.5,
            euphoria: 0.3,
            irritation: 0.2,
        };
        assert_eq!(mood_color(&flat), "#4a6741");
        assert_eq!(mood_emoji(&flat), "😐");
        assert_eq!(mood_label(&flat), "calm");
    }
}

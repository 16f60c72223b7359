use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::emotion::EmotionEvent;

/// Closed set of event tags the core writes and reads. Tags from outside
/// the set survive round-trips as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    PostCreated,
    CommentCreated,
    CommentReceived,
    Agreement,
    Disagreement,
    Contradiction,
    RelationshipUpdated,
    GoalExecuted,
    Other(String),
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::PostCreated => write!(f, "post_created"),
            EventKind::CommentCreated => write!(f, "comment_created"),
            EventKind::CommentReceived => write!(f, "comment_received"),
            EventKind::Agreement => write!(f, "agreement"),
            EventKind::Disagreement => write!(f, "disagreement"),
            EventKind::Contradiction => write!(f, "contradiction"),
            EventKind::RelationshipUpdated => write!(f, "relationship_updated"),
            EventKind::GoalExecuted => write!(f, "goal_executed"),
            EventKind::Other(tag) => write!(f, "{}", tag),
        }
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "post_created" => EventKind::PostCreated,
            "comment_created" => EventKind::CommentCreated,
            "comment_received" => EventKind::CommentReceived,
            "agreement" => EventKind::Agreement,
            "disagreement" => EventKind::Disagreement,
            "contradiction" => EventKind::Contradiction,
            "relationship_updated" => EventKind::RelationshipUpdated,
            "goal_executed" => EventKind::GoalExecuted,
            _ => EventKind::Other(s),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.to_string()
    }
}

impl EventKind {
    /// Map an event tag to the emotion engine's input, for the tags that
    /// carry an emotional charge. The rest do not move the mood.
    pub fn emotion_event(&self) -> Option<EmotionEvent> {
        match self {
            EventKind::PostCreated => Some(EmotionEvent::PostCreated),
            EventKind::CommentReceived => Some(EmotionEvent::CommentReceived),
            EventKind::Agreement => Some(EmotionEvent::Agreement),
            EventKind::Disagreement => Some(EmotionEvent::Disagreement),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub event_type: EventKind,
    pub agent_id: String,
    pub related_agent_id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub event_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(event_type: EventKind, agent_id: &str, description: &str) -> Self {
        EventRecord {
            id: Uuid::new_v4(),
            event_type,
            agent_id: agent_id.to_string(),
            related_agent_id: None,
            description: description.to_string(),
            event_data: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_related(mut self, related_agent_id: &str) -> Self {
        self.related_agent_id = Some(related_agent_id.to_string());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.event_data = data;
        self
    }
}

/// Filter for event-log queries.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub agent_id: Option<String>,
    pub event_type: Option<EventKind>,
    pub related_agent_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub ascending: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventStats {
    pub total_count: usize,
    pub by_type: HashMap<String, usize>,
    pub events_per_hour: f64,
}

/// Aggregate counts over events already filtered to the timeframe.
pub fn event_stats(events: &[EventRecord], timeframe_hours: f64) -> EventStats {
    let mut by_type = HashMap::new();
    for event in events {
        *by_type.entry(event.event_type.to_string()).or_insert(0) += 1;
    }

    let events_per_hour = if timeframe_hours > 0.0 {
        events.len() as f64 / timeframe_hours
    } else {
        0.0
    };

    EventStats {
        total_count: events.len(),
        by_type,
        events_per_hour,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineBucket {
    pub timestamp: String,
    pub count: usize,
    pub by_type: HashMap<String, usize>,
}

/// Group events into per-hour buckets, oldest first.
pub fn event_timeline(events: &[EventRecord]) -> Vec<TimelineBucket> {
    let mut buckets: HashMap<String, TimelineBucket> = HashMap::new();

    for event in events {
        let hour = event.created_at.format("%Y-%m-%dT%H:00:00").to_string();
        let bucket = buckets.entry(hour.clone()).or_insert_with(|| TimelineBucket {
            timestamp: hour,
            count: 0,
            by_type: HashMap::new(),
        });
        bucket.count += 1;
        *bucket
            .by_type
            .entry(event.event_type.to_string())
            .or_insert(0) += 1;
    }

    let mut timeline: Vec<_> = buckets.into_values().collect();
    timeline.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    timeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn kind_round_trips_through_strings() {
        let known = EventKind::from("post_created".to_string());
        assert_eq!(known, EventKind::PostCreated);
        assert_eq!(known.to_string(), "post_created");

        let unknown = EventKind::from("lunar_eclipse".to_string());
        assert_eq!(unknown, EventKind::Other("lunar_eclipse".to_string()));
        assert_eq!(unknown.to_string(), "lunar_eclipse");
    }

    #[test]
    fn kind_serde_uses_the_string_form() {
        let json = serde_json::to_string(&EventKind::CommentCreated).unwrap();
        assert_eq!(json, "\"comment_created\"");

        let back: EventKind = serde_json::from_str("\"agreement\"").unwrap();
        assert_eq!(back, EventKind::Agreement);
    }

    #[test]
    fn emotion_mapping_covers_the_relevant_tags() {
        assert!(EventKind::Agreement.emotion_event().is_some());
        assert!(EventKind::Disagreement.emotion_event().is_some());
        assert!(EventKind::PostCreated.emotion_event().is_some());
        assert!(EventKind::CommentReceived.emotion_event().is_some());
        assert!(EventKind::RelationshipUpdated.emotion_event().is_none());
        assert!(EventKind::GoalExecuted.emotion_event().is_none());
    }

    #[test]
    fn stats_count_by_type() {
        let events = vec![
            EventRecord::new(EventKind::PostCreated, "alpha", "posted"),
            EventRecord::new(EventKind::PostCreated, "beta", "posted"),
            EventRecord::new(EventKind::CommentCreated, "alpha", "commented"),
        ];

        let stats = event_stats(&events, 24.0);
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.by_type["post_created"], 2);
        assert_eq!(stats.by_type["comment_created"], 1);
        assert!((stats.events_per_hour - 3.0 / 24.0).abs() < 1e-9);
    }

    #[test]
    fn timeline_buckets_by_hour_ascending() {
        let mut early = EventRecord::new(EventKind::PostCreated, "alpha", "posted");
        early.created_at = Utc::now() - Duration::hours(2);
        let mut mid = EventRecord::new(EventKind::CommentCreated, "beta", "commented");
        mid.created_at = Utc::now() - Duration::hours(1);
        let late = EventRecord::new(EventKind::PostCreated, "alpha", "posted again");

        let timeline = event_timeline(&[late, early, mid]);
        assert_eq!(timeline.len(), 3);
        assert!(timeline[0].timestamp < timeline[1].timestamp);
        assert!(timeline[1].timestamp < timeline[2].timestamp);
        assert_eq!(timeline[0].by_type["post_created"], 1);
    }
}

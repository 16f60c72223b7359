use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::agent::Agent;
use crate::config::Config;
use crate::emotion::EmotionVector;
use crate::events::{EventQuery, EventRecord};
use crate::lifecycle::LifecycleState;
use crate::memory::{MemoryOrder, MemoryQuery, MemoryRecord};
use crate::relationship::Relationship;
use crate::social::{AgentMessage, Comment, Post};

/// Filter for feed queries.
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub limit: Option<usize>,
    pub offset: usize,
    pub hashtag: Option<String>,
    pub exclude_agent: Option<String>,
}

/// The narrow persistence interface the core reads and writes through.
/// Everything cross-agent flows over these methods.
pub trait Repository: Send + Sync {
    // agents
    fn upsert_agent(&self, agent: Agent) -> Result<()>;
    fn agent(&self, agent_id: &str) -> Result<Option<Agent>>;
    fn active_agents(&self) -> Result<Vec<Agent>>;
    fn update_mood(&self, agent_id: &str, mood: EmotionVector) -> Result<()>;

    // relationships
    fn relationship(&self, from: &str, to: &str) -> Result<Option<Relationship>>;
    fn upsert_relationship(&self, rel: Relationship) -> Result<()>;
    fn agent_relationships(&self, agent_id: &str) -> Result<Vec<Relationship>>;
    fn all_relationships(&self) -> Result<Vec<Relationship>>;

    // events
    fn log_event(&self, event: EventRecord) -> Result<()>;
    fn events(&self, query: &EventQuery) -> Result<Vec<EventRecord>>;
    fn interaction_events(
        &self,
        agent_a: &str,
        agent_b: &str,
        limit: usize,
    ) -> Result<Vec<EventRecord>>;
    fn prune_events_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
    fn subscribe_events(&self) -> broadcast::Receiver<EventRecord>;

    // memories
    fn store_memory(&self, memory: MemoryRecord) -> Result<()>;
    fn memories(&self, agent_id: &str, query: &MemoryQuery) -> Result<Vec<MemoryRecord>>;
    fn prune_memories(
        &self,
        agent_id: &str,
        cutoff: DateTime<Utc>,
        min_importance_to_keep: f64,
    ) -> Result<usize>;

    // posts and comments
    fn insert_post(&self, post: Post) -> Result<()>;
    fn post(&self, id: Uuid) -> Result<Option<Post>>;
    fn posts(&self, query: &PostQuery) -> Result<Vec<Post>>;
    fn agent_posts_since(&self, agent_id: &str, since: DateTime<Utc>) -> Result<usize>;
    fn insert_comment(&self, comment: Comment) -> Result<()>;
    fn comments(&self, post_id: Uuid) -> Result<Vec<Comment>>;
    fn has_commented(&self, post_id: Uuid, agent_id: &str) -> Result<bool>;
    fn subscribe_posts(&self) -> broadcast::Receiver<Post>;

    // discussion messages
    fn insert_message(&self, message: AgentMessage) -> Result<()>;
    fn recent_messages(&self, limit: usize) -> Result<Vec<AgentMessage>>;

    // lifecycle state
    fn lifecycle_state(&self, agent_id: &str) -> Result<Option<LifecycleState>>;
    fn upsert_lifecycle_state(&self, state: LifecycleState) -> Result<()>;
    fn active_lifecycle_states(&self) -> Result<Vec<LifecycleState>>;
    fn set_time_speed(&self, multiplier: f64) -> Result<usize>;
}

#[derive(Default)]
struct Inner {
    agents: HashMap<String, Agent>,
    relationships: HashMap<(String, String), Relationship>,
    events: Vec<EventRecord>,
    memories: Vec<MemoryRecord>,
    posts: Vec<Post>,
    comments: Vec<Comment>,
    messages: Vec<AgentMessage>,
    lifecycle: HashMap<String, LifecycleState>,
}

struct StorePaths {
    agents: PathBuf,
    relationships: PathBuf,
    events: PathBuf,
    memories: PathBuf,
    posts: PathBuf,
    comments: PathBuf,
    messages: PathBuf,
    lifecycle: PathBuf,
}

/// In-memory store with JSON file persistence under the data directory.
/// Stands in for the hosted database the surrounding application uses.
pub struct JsonStore {
    inner: Mutex<Inner>,
    paths: Option<StorePaths>,
    event_tx: broadcast::Sender<EventRecord>,
    post_tx: broadcast::Sender<Post>,
}

impl JsonStore {
    pub fn open(config: &Config) -> Result<Self> {
        let paths = StorePaths {
            agents: config.agents_file(),
            relationships: config.relationships_file(),
            events: config.events_file(),
            memories: config.memories_file(),
            posts: config.posts_file(),
            comments: config.comments_file(),
            messages: config.messages_file(),
            lifecycle: config.lifecycle_file(),
        };

        let agents: Vec<Agent> = read_json(&paths.agents)?;
        let relationships: Vec<Relationship> = read_json(&paths.relationships)?;
        let lifecycle: Vec<LifecycleState> = read_json(&paths.lifecycle)?;

        let inner = Inner {
            agents: agents.into_iter().map(|a| (a.agent_id.clone(), a)).collect(),
            relationships: relationships
                .into_iter()
                .map(|r| ((r.agent_id_1.clone(), r.agent_id_2.clone()), r))
                .collect(),
            events: read_json(&paths.events)?,
            memories: read_json(&paths.memories)?,
            posts: read_json(&paths.posts)?,
            comments: read_json(&paths.comments)?,
            messages: read_json(&paths.messages)?,
            lifecycle: lifecycle
                .into_iter()
                .map(|s| (s.agent_id.clone(), s))
                .collect(),
        };

        let (event_tx, _) = broadcast::channel(256);
        let (post_tx, _) = broadcast::channel(256);

        Ok(JsonStore {
            inner: Mutex::new(inner),
            paths: Some(paths),
            event_tx,
            post_tx,
        })
    }

    /// Volatile store, nothing touches the filesystem. Used by tests.
    pub fn in_memory() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let (post_tx, _) = broadcast::channel(256);

        JsonStore {
            inner: Mutex::new(Inner::default()),
            paths: None,
            event_tx,
            post_tx,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| anyhow!("store mutex poisoned"))
    }

    fn save_agents(&self, inner: &Inner) -> Result<()> {
        if let Some(paths) = &self.paths {
            let mut agents: Vec<&Agent> = inner.agents.values().collect();
            agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
            write_json(&paths.agents, &agents)?;
        }
        Ok(())
    }

    fn save_relationships(&self, inner: &Inner) -> Result<()> {
        if let Some(paths) = &self.paths {
            let edges: Vec<&Relationship> = inner.relationships.values().collect();
            write_json(&paths.relationships, &edges)?;
        }
        Ok(())
    }

    fn save_events(&self, inner: &Inner) -> Result<()> {
        if let Some(paths) = &self.paths {
            write_json(&paths.events, &inner.events)?;
        }
        Ok(())
    }

    fn save_memories(&self, inner: &Inner) -> Result<()> {
        if let Some(paths) = &self.paths {
            write_json(&paths.memories, &inner.memories)?;
        }
        Ok(())
    }

    fn save_posts(&self, inner: &Inner) -> Result<()> {
        if let Some(paths) = &self.paths {
            write_json(&paths.posts, &inner.posts)?;
        }
        Ok(())
    }

    fn save_comments(&self, inner: &Inner) -> Result<()> {
        if let Some(paths) = &self.paths {
            write_json(&paths.comments, &inner.comments)?;
        }
        Ok(())
    }

    fn save_messages(&self, inner: &Inner) -> Result<()> {
        if let Some(paths) = &self.paths {
            write_json(&paths.messages, &inner.messages)?;
        }
        Ok(())
    }

    fn save_lifecycle(&self, inner: &Inner) -> Result<()> {
        if let Some(paths) = &self.paths {
            let states: Vec<&LifecycleState> = inner.lifecycle.values().collect();
            write_json(&paths.lifecycle, &states)?;
        }
        Ok(())
    }
}

impl Repository for JsonStore {
    fn upsert_agent(&self, agent: Agent) -> Result<()> {
        let mut inner = self.lock()?;
        inner.agents.insert(agent.agent_id.clone(), agent);
        self.save_agents(&inner)
    }

    fn agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        let inner = self.lock()?;
        Ok(inner.agents.get(agent_id).cloned())
    }

    fn active_agents(&self) -> Result<Vec<Agent>> {
        let inner = self.lock()?;
        let mut agents: Vec<Agent> = inner
            .agents
            .values()
            .filter(|a| a.is_active)
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }

    fn update_mood(&self, agent_id: &str, mood: EmotionVector) -> Result<()> {
        let mut inner = self.lock()?;
        match inner.agents.get_mut(agent_id) {
            Some(agent) => agent.current_mood = mood,
            None => bail!("agent not found: {}", agent_id),
        }
        self.save_agents(&inner)
    }

    fn relationship(&self, from: &str, to: &str) -> Result<Option<Relationship>> {
        let inner = self.lock()?;
        Ok(inner
            .relationships
            .get(&(from.to_string(), to.to_string()))
            .cloned())
    }

    fn upsert_relationship(&self, rel: Relationship) -> Result<()> {
        let mut inner = self.lock()?;
        inner
            .relationships
            .insert((rel.agent_id_1.clone(), rel.agent_id_2.clone()), rel);
        self.save_relationships(&inner)
    }

    fn agent_relationships(&self, agent_id: &str) -> Result<Vec<Relationship>> {
        let inner = self.lock()?;
        let mut edges: Vec<Relationship> = inner
            .relationships
            .values()
            .filter(|r| r.agent_id_1 == agent_id || r.agent_id_2 == agent_id)
            .cloned()
            .collect();
        edges.sort_by(|a, b| b.last_interaction_at.cmp(&a.last_interaction_at));
        Ok(edges)
    }

    fn all_relationships(&self) -> Result<Vec<Relationship>> {
        let inner = self.lock()?;
        let mut edges: Vec<Relationship> = inner.relationships.values().cloned().collect();
        edges.sort_by(|a, b| b.last_interaction_at.cmp(&a.last_interaction_at));
        Ok(edges)
    }

    fn log_event(&self, event: EventRecord) -> Result<()> {
        let mut inner = self.lock()?;
        inner.events.push(event.clone());
        self.save_events(&inner)?;
        drop(inner);
        // Nobody listening is fine.
        let _ = self.event_tx.send(event);
        Ok(())
    }

    fn events(&self, query: &EventQuery) -> Result<Vec<EventRecord>> {
        let inner = self.lock()?;
        let mut events: Vec<EventRecord> = inner
            .events
            .iter()
            .filter(|e| {
                query
                    .agent_id
                    .as_ref()
                    .map_or(true, |id| &e.agent_id == id)
            })
            .filter(|e| {
                query
                    .event_type
                    .as_ref()
                    .map_or(true, |t| &e.event_type == t)
            })
            .filter(|e| {
                query
                    .related_agent_id
                    .as_ref()
                    .map_or(true, |id| e.related_agent_id.as_ref() == Some(id))
            })
            .filter(|e| query.since.map_or(true, |since| e.created_at >= since))
            .cloned()
            .collect();

        if query.ascending {
            events.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        } else {
            events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }

        Ok(events
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(50))
            .collect())
    }

    fn interaction_events(
        &self,
        agent_a: &str,
        agent_b: &str,
        limit: usize,
    ) -> Result<Vec<EventRecord>> {
        let inner = self.lock()?;
        let mut events: Vec<EventRecord> = inner
            .events
            .iter()
            .filter(|e| {
                (e.agent_id == agent_a && e.related_agent_id.as_deref() == Some(agent_b))
                    || (e.agent_id == agent_b && e.related_agent_id.as_deref() == Some(agent_a))
            })
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.truncate(limit);
        Ok(events)
    }

    fn prune_events_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.lock()?;
        let before = inner.events.len();
        inner.events.retain(|e| e.created_at >= cutoff);
        let removed = before - inner.events.len();
        self.save_events(&inner)?;
        Ok(removed)
    }

    fn subscribe_events(&self) -> broadcast::Receiver<EventRecord> {
        self.event_tx.subscribe()
    }

    fn store_memory(&self, memory: MemoryRecord) -> Result<()> {
        let mut inner = self.lock()?;
        inner.memories.push(memory);
        self.save_memories(&inner)
    }

    fn memories(&self, agent_id: &str, query: &MemoryQuery) -> Result<Vec<MemoryRecord>> {
        let inner = self.lock()?;
        let mut memories: Vec<MemoryRecord> = inner
            .memories
            .iter()
            .filter(|m| m.agent_id == agent_id)
            .filter(|m| m.importance >= query.min_importance)
            .filter(|m| {
                query
                    .memory_type
                    .as_ref()
                    .map_or(true, |t| &m.memory_type == t)
            })
            .filter(|m| {
                query
                    .related_agent
                    .as_ref()
                    .map_or(true, |id| m.related_agents.contains(id))
            })
            .filter(|m| {
                query
                    .related_crypto
                    .as_ref()
                    .map_or(true, |s| m.related_crypto.as_ref() == Some(s))
            })
            .cloned()
            .collect();

        match query.order {
            MemoryOrder::Recency => memories.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            MemoryOrder::Importance => memories.sort_by(|a, b| {
                b.importance
                    .partial_cmp(&a.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
        }

        memories.truncate(query.limit);
        Ok(memories)
    }

    fn prune_memories(
        &self,
        agent_id: &str,
        cutoff: DateTime<Utc>,
        min_importance_to_keep: f64,
    ) -> Result<usize> {
        let mut inner = self.lock()?;
        let before = inner.memories.len();
        inner.memories.retain(|m| {
            m.agent_id != agent_id
                || m.created_at >= cutoff
                || m.importance >= min_importance_to_keep
        });
        let removed = before - inner.memories.len();
        self.save_memories(&inner)?;
        Ok(removed)
    }

    fn insert_post(&self, post: Post) -> Result<()> {
        let mut inner = self.lock()?;
        inner.posts.push(post.clone());
        self.save_posts(&inner)?;
        drop(inner);
        let _ = self.post_tx.send(post);
        Ok(())
    }

    fn post(&self, id: Uuid) -> Result<Option<Post>> {
        let inner = self.lock()?;
        Ok(inner.posts.iter().find(|p| p.id == id).cloned())
    }

    fn posts(&self, query: &PostQuery) -> Result<Vec<Post>> {
        let inner = self.lock()?;
        let mut posts: Vec<Post> = inner
            .posts
            .iter()
            .filter(|p| {
                query
                    .exclude_agent
                    .as_ref()
                    .map_or(true, |id| p.agent_id.as_ref() != Some(id))
            })
            .filter(|p| {
                query
                    .hashtag
                    .as_ref()
                    .map_or(true, |tag| p.hashtags.contains(tag))
            })
            .cloned()
            .collect();

        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(posts
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(20))
            .collect())
    }

    fn agent_posts_since(&self, agent_id: &str, since: DateTime<Utc>) -> Result<usize> {
        let inner = self.lock()?;
        Ok(inner
            .posts
            .iter()
            .filter(|p| p.agent_id.as_deref() == Some(agent_id) && p.created_at >= since)
            .count())
    }

    fn insert_comment(&self, comment: Comment) -> Result<()> {
        let mut inner = self.lock()?;
        let post_id = comment.post_id;
        inner.comments.push(comment);
        if let Some(post) = inner.posts.iter_mut().find(|p| p.id == post_id) {
            post.comment_count += 1;
        }
        self.save_comments(&inner)?;
        self.save_posts(&inner)
    }

    fn comments(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        let inner = self.lock()?;
        let mut comments: Vec<Comment> = inner
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    fn has_commented(&self, post_id: Uuid, agent_id: &str) -> Result<bool> {
        let inner = self.lock()?;
        Ok(inner
            .comments
            .iter()
            .any(|c| c.post_id == post_id && c.agent_id.as_deref() == Some(agent_id)))
    }

    fn subscribe_posts(&self) -> broadcast::Receiver<Post> {
        self.post_tx.subscribe()
    }

    fn insert_message(&self, message: AgentMessage) -> Result<()> {
        let mut inner = self.lock()?;
        inner.messages.push(message);
        self.save_messages(&inner)
    }

    fn recent_messages(&self, limit: usize) -> Result<Vec<AgentMessage>> {
        let inner = self.lock()?;
        let mut messages: Vec<AgentMessage> = inner.messages.clone();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages.truncate(limit);
        Ok(messages)
    }

    fn lifecycle_state(&self, agent_id: &str) -> Result<Option<LifecycleState>> {
        let inner = self.lock()?;
        Ok(inner.lifecycle.get(agent_id).cloned())
    }

    fn upsert_lifecycle_state(&self, state: LifecycleState) -> Result<()> {
        let mut inner = self.lock()?;
        inner.lifecycle.insert(state.agent_id.clone(), state);
        self.save_lifecycle(&inner)
    }

    fn active_lifecycle_states(&self) -> Result<Vec<LifecycleState>> {
        let inner = self.lock()?;
        let mut states: Vec<LifecycleState> = inner
            .lifecycle
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect();
        states.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(states)
    }

    fn set_time_speed(&self, multiplier: f64) -> Result<usize> {
        let mut inner = self.lock()?;
        let mut updated = 0;
        for state in inner.lifecycle.values_mut().filter(|s| s.is_active) {
            state.time_speed_multiplier = multiplier;
            updated += 1;
        }
        self.save_lifecycle(&inner)?;
        Ok(updated)
    }
}

fn read_json<T: DeserializeOwned + Default>(path: &PathBuf) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &PathBuf, value: &T) -> Result<()> {
    let content =
        serde_json::to_string_pretty(value).context("Failed to serialize store data")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

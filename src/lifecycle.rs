use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration as TimeDelta, Utc};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::config::SimTuning;
use crate::emotion;
use crate::events::{EventKind, EventQuery, EventRecord};
use crate::generator::ContentGenerator;
use crate::memory::MemoryQuery;
use crate::social;
use crate::store::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Reflection,
    GoalSetting,
    Action,
    Waiting,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Reflection => write!(f, "reflection"),
            Phase::GoalSetting => write!(f, "goal_setting"),
            Phase::Action => write!(f, "action"),
            Phase::Waiting => write!(f, "waiting"),
        }
    }
}

/// What the agent decided to do this cycle. Serialized into the lifecycle
/// row so observers can see the current intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Goal {
    CreatePost { crypto: String, reason: String },
    CreateComment { reason: String },
}

impl Goal {
    pub fn name(&self) -> &'static str {
        match self {
            Goal::CreatePost { .. } => "create_post",
            Goal::CreateComment { .. } => "create_comment",
        }
    }
}

fn default_multiplier() -> f64 {
    1.0
}

/// One row per agent, upserted on every phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleState {
    pub agent_id: String,
    pub current_phase: Phase,
    pub current_goal: Option<String>,
    pub last_action_at: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default = "default_multiplier")]
    pub time_speed_multiplier: f64,
    pub updated_at: DateTime<Utc>,
}

impl LifecycleState {
    pub fn new(agent_id: &str) -> Self {
        let now = Utc::now();
        LifecycleState {
            agent_id: agent_id.to_string(),
            current_phase: Phase::Waiting,
            current_goal: None,
            last_action_at: now,
            is_active: false,
            time_speed_multiplier: 1.0,
            updated_at: now,
        }
    }
}

/// Owns the set of running agent loops. Each loop is an independent task
/// cycling reflection -> goal -> action -> waiting until stopped.
/// Cancellation is cooperative: a loop checks its membership before every
/// cycle and a removed agent simply never schedules another one.
#[derive(Clone)]
pub struct LifecycleScheduler {
    store: Arc<dyn Repository>,
    generator: Arc<ContentGenerator>,
    tuning: SimTuning,
    active: Arc<Mutex<HashSet<String>>>,
}

impl LifecycleScheduler {
    pub fn new(
        store: Arc<dyn Repository>,
        generator: Arc<ContentGenerator>,
        tuning: SimTuning,
    ) -> Self {
        LifecycleScheduler {
            store,
            generator,
            tuning,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn is_running(&self, agent_id: &str) -> bool {
        self.active
            .lock()
            .map(|active| active.contains(agent_id))
            .unwrap_or(false)
    }

    pub fn running_count(&self) -> usize {
        self.active.lock().map(|active| active.len()).unwrap_or(0)
    }

    /// Begin the loop for one agent. Idempotent: a second call while the
    /// loop is running does nothing and returns false.
    pub fn start(&self, agent_id: &str) -> bool {
        {
            let Ok(mut active) = self.active.lock() else {
                return false;
            };
            if !active.insert(agent_id.to_string()) {
                info!(agent = agent_id, "lifecycle loop already running");
                return false;
            }
        }

        info!(agent = agent_id, "starting lifecycle loop");
        let scheduler = self.clone();
        let id = agent_id.to_string();
        tokio::spawn(async move {
            scheduler.run_loop(id).await;
        });
        true
    }

    /// Remove the agent from the active set. An in-flight cycle finishes;
    /// no new one is scheduled.
    pub fn stop(&self, agent_id: &str) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(agent_id);
        }
        info!(agent = agent_id, "stopping lifecycle loop");
        self.mark_inactive(agent_id);
    }

    /// Start every active agent, staggered so they do not hit the content
    /// generator in one burst.
    pub async fn start_all(&self) -> Result<usize> {
        let agents = self.store.active_agents()?;

        for agent in &agents {
            let delay = if self.tuning.stagger_max_secs > 0.0 {
                let mut rng = SmallRng::from_entropy();
                rng.gen_range(0.0..self.tuning.stagger_max_secs)
            } else {
                0.0
            };

            let scheduler = self.clone();
            let id = agent.agent_id.clone();
            tokio::spawn(async move {
                if delay > 0.0 {
                    sleep(Duration::from_secs_f64(delay)).await;
                }
                scheduler.start(&id);
            });
        }

        info!(count = agents.len(), "scheduled agent loops");
        Ok(agents.len())
    }

    /// Clear the active set. Running loops notice at their next membership
    /// check and wind down on their own.
    pub fn stop_all(&self) {
        if let Ok(mut active) = self.active.lock() {
            active.clear();
        }
        info!("stopping all agent loops");
    }

    /// Change the wait scaling for every active agent and bounce the loops
    /// so the new speed takes effect immediately.
    pub async fn set_time_speed(&self, multiplier: f64) -> Result<()> {
        info!(multiplier, "setting time speed");
        self.store.set_time_speed(multiplier)?;

        self.stop_all();
        sleep(Duration::from_secs(1)).await;
        self.start_all().await?;
        Ok(())
    }

    async fn run_loop(&self, agent_id: String) {
        loop {
            if !self.is_running(&agent_id) {
                info!(agent = %agent_id, "lifecycle loop stopped");
                self.mark_inactive(&agent_id);
                return;
            }

            let wait = match self.run_cycle(&agent_id).await {
                Ok(wait) => wait,
                Err(error) => {
                    warn!(agent = %agent_id, %error, "cycle failed, retrying after backoff");
                    Duration::from_secs_f64(self.tuning.error_backoff_secs)
                }
            };

            sleep(wait).await;
        }
    }

    async fn run_cycle(&self, agent_id: &str) -> Result<Duration> {
        debug!(agent = agent_id, "starting cycle");

        self.set_phase(agent_id, Phase::Reflection, None)?;
        self.reflect(agent_id)?;

        self.set_phase(agent_id, Phase::GoalSetting, None)?;
        let goal = self.set_goal(agent_id)?;
        self.set_phase(agent_id, Phase::GoalSetting, Some(&goal))?;

        self.set_phase(agent_id, Phase::Action, Some(&goal))?;
        self.execute(agent_id, &goal).await?;

        self.set_phase(agent_id, Phase::Waiting, Some(&goal))?;

        let wait_secs = {
            let mut rng = SmallRng::from_entropy();
            if self.tuning.wait_max_secs > self.tuning.wait_min_secs {
                rng.gen_range(self.tuning.wait_min_secs..self.tuning.wait_max_secs)
            } else {
                self.tuning.wait_min_secs
            }
        };
        let multiplier = self
            .store
            .lifecycle_state(agent_id)?
            .map(|s| s.time_speed_multiplier)
            .unwrap_or(1.0);
        let scaled = if multiplier > 0.0 {
            wait_secs / multiplier
        } else {
            wait_secs
        };

        debug!(agent = agent_id, wait_secs = scaled, "cycle complete, waiting");
        Ok(Duration::from_secs_f64(scaled.max(0.001)))
    }

    /// Step 1: feed the emotionally relevant recent events through the
    /// emotion engine and persist the new mood.
    fn reflect(&self, agent_id: &str) -> Result<()> {
        let Some(agent) = self.store.agent(agent_id)? else {
            return Ok(());
        };

        let since = Utc::now() - TimeDelta::hours(self.tuning.reflection_window_hours);
        let events = self.store.events(&EventQuery {
            agent_id: Some(agent_id.to_string()),
            since: Some(since),
            limit: Some(10),
            ..EventQuery::default()
        })?;
        let memories = self
            .store
            .memories(agent_id, &MemoryQuery { limit: 5, ..MemoryQuery::default() })?;
        debug!(
            agent = agent_id,
            events = events.len(),
            memories = memories.len(),
            "reflection context loaded"
        );

        let flags = agent.personality.flags;
        let mut mood = agent.current_mood;
        let mut moved = false;
        for event in &events {
            if let Some(emotion_event) = event.event_type.emotion_event() {
                mood = emotion::apply_event(&mood, &emotion_event, &flags);
                moved = true;
            }
        }

        if moved {
            self.store.update_mood(agent_id, mood)?;
            debug!(agent = agent_id, "mood updated after reflection");
        }
        Ok(())
    }

    /// Step 2: decide between posting and commenting.
    fn set_goal(&self, agent_id: &str) -> Result<Goal> {
        let agent = self
            .store
            .agent(agent_id)?
            .ok_or_else(|| anyhow!("agent not found: {}", agent_id))?;

        let window = Utc::now() - TimeDelta::minutes(self.tuning.recent_post_window_mins);
        let recent_posts = self.store.agent_posts_since(agent_id, window)?;

        let mut rng = SmallRng::from_entropy();
        let should_post = recent_posts == 0 && rng.gen::<f64>() < self.tuning.post_probability;

        let goal = if should_post {
            Goal::CreatePost {
                crypto: select_crypto_topic(&agent, &self.tuning.coin_universe, &mut rng),
                reason: "Share analysis with community".to_string(),
            }
        } else {
            Goal::CreateComment {
                reason: "Engage with community".to_string(),
            }
        };

        debug!(agent = agent_id, goal = goal.name(), "goal set");
        Ok(goal)
    }

    /// Step 3: act on the goal and leave a lifecycle event behind.
    async fn execute(&self, agent_id: &str, goal: &Goal) -> Result<()> {
        match goal {
            Goal::CreatePost { crypto, .. } => {
                social::agent_create_post(self.store.as_ref(), &self.generator, agent_id, crypto)
                    .await?;
            }
            Goal::CreateComment { .. } => {
                social::agent_create_comment(self.store.as_ref(), &self.generator, agent_id)
                    .await?;
            }
        }

        self.store.log_event(
            EventRecord::new(
                EventKind::GoalExecuted,
                agent_id,
                &format!("{} executed {}", agent_id, goal.name()),
            )
            .with_data(serde_json::to_value(goal)?),
        )?;

        Ok(())
    }

    fn set_phase(&self, agent_id: &str, phase: Phase, goal: Option<&Goal>) -> Result<()> {
        let mut state = self
            .store
            .lifecycle_state(agent_id)?
            .unwrap_or_else(|| LifecycleState::new(agent_id));

        state.current_phase = phase;
        if let Some(goal) = goal {
            state.current_goal = Some(serde_json::to_string(goal)?);
        }
        state.is_active = true;
        state.last_action_at = Utc::now();
        state.updated_at = Utc::now();

        self.store.upsert_lifecycle_state(state)
    }

    fn mark_inactive(&self, agent_id: &str) {
        let mut state = self
            .store
            .lifecycle_state(agent_id)
            .ok()
            .flatten()
            .unwrap_or_else(|| LifecycleState::new(agent_id));
        state.is_active = false;
        state.updated_at = Utc::now();

        if let Err(error) = self.store.upsert_lifecycle_state(state) {
            warn!(agent = agent_id, %error, "failed to mark lifecycle state inactive");
        }
    }
}

/// Preferred symbols when the agent has them, the shared universe
/// otherwise.
pub fn select_crypto_topic(agent: &Agent, universe: &[String], rng: &mut impl Rng) -> String {
    let pool = if agent.preferred_symbols.is_empty() {
        universe
    } else {
        &agent.preferred_symbols
    };

    if pool.is_empty() {
        return "BTC".to_string();
    }
    pool[rng.gen_range(0..pool.len())].clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::seed_roster;

    #[test]
    fn phase_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Phase::GoalSetting).unwrap(),
            "\"goal_setting\""
        );
        assert_eq!(Phase::Waiting.to_string(), "waiting");
    }

    #[test]
    fn goal_round_trips_with_type_tag() {
        let goal = Goal::CreatePost {
            crypto: "BTC".to_string(),
            reason: "Share analysis with community".to_string(),
        };
        let json = serde_json::to_string(&goal).unwrap();
        assert!(json.contains("\"type\":\"create_post\""));

        let back: Goal = serde_json::from_str(&json).unwrap();
        assert_eq!(back, goal);
    }

    #[test]
    fn topic_selection_respects_preferences() {
        let agents = seed_roster();
        let delta = agents.iter().find(|a| a.agent_id == "delta").unwrap();
        let universe = vec!["BTC".to_string()];

        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..50 {
            let topic = select_crypto_topic(delta, &universe, &mut rng);
            assert!(delta.preferred_symbols.contains(&topic));
        }
    }

    #[test]
    fn topic_selection_falls_back_to_universe() {
        let mut agent = seed_roster().remove(0);
        agent.preferred_symbols.clear();
        let universe = vec!["ADA".to_string(), "DOT".to_string()];

        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..50 {
            let topic = select_crypto_topic(&agent, &universe, &mut rng);
            assert!(universe.contains(&topic));
        }
    }

    #[test]
    fn fresh_lifecycle_state_defaults() {
        let state = LifecycleState::new("alpha");
        assert_eq!(state.current_phase, Phase::Waiting);
        assert!(!state.is_active);
        assert!((state.time_speed_multiplier - 1.0).abs() < f64::EPSILON);
        assert!(state.current_goal.is_none());
    }
}

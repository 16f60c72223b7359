use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use chrono::{Duration as TimeDelta, Utc};
use clap::{Parser, Subcommand};
use colored::*;

use crate::agent::seed_roster;
use crate::config::Config;
use crate::discussion::DiscussionOrchestrator;
use crate::emotion;
use crate::events::{self, EventQuery};
use crate::generator::ContentGenerator;
use crate::lifecycle::LifecycleScheduler;
use crate::memory::{self, MemoryQuery};
use crate::provider::CompletionClient;
use crate::relationship;
use crate::social::{AgentMessage, MessageContext, MessageType};
use crate::store::{JsonStore, PostQuery, Repository};

#[derive(Parser)]
#[command(name = "tradetalk", about = "Autonomous crypto-analyst personas", version)]
pub struct Args {
    /// Data directory override
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Seed the default analyst roster and their relationships
    Seed,
    /// Run the autonomous agent loops until interrupted
    Run,
    /// Hold a two-round agent discussion about a symbol
    Discuss {
        symbol: String,
        #[arg(long)]
        price: f64,
        /// 24h change in percent
        #[arg(long, allow_negative_numbers = true)]
        change: f64,
    },
    /// Ask a single agent for a one-shot opinion
    Ask {
        agent_id: String,
        symbol: String,
        #[arg(long)]
        price: f64,
        /// 24h change in percent
        #[arg(long, allow_negative_numbers = true)]
        change: f64,
    },
    /// Show agent moods and lifecycle states
    Status { agent_id: Option<String> },
    /// Show the latest feed posts
    Feed {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        hashtag: Option<String>,
    },
    /// Show relationship edges
    Relationships { agent_id: Option<String> },
    /// Drift moods and relationships back toward baseline
    Decay,
    /// Prune old events and stale low-importance memories
    Cleanup {
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
}

fn open_store(data_dir: Option<PathBuf>) -> Result<(Config, Arc<JsonStore>)> {
    let config = Config::new(data_dir)?;
    let store = Arc::new(JsonStore::open(&config)?);
    Ok((config, store))
}

fn build_generator(config: &Config) -> Result<Arc<ContentGenerator>> {
    let client = CompletionClient::new(&config.provider)?;
    Ok(Arc::new(ContentGenerator::new(Arc::new(client))))
}

pub async fn handle_seed(data_dir: Option<PathBuf>) -> Result<()> {
    let (_config, store) = open_store(data_dir)?;

    let mut existing: Vec<String> = store
        .active_agents()?
        .iter()
        .map(|a| a.agent_id.clone())
        .collect();
    let mut created = 0;

    for agent in seed_roster() {
        if store.agent(&agent.agent_id)?.is_some() {
            continue;
        }

        let agent_id = agent.agent_id.clone();
        store.upsert_agent(agent)?;
        for edge in relationship::init_pairs(&agent_id, &existing) {
            store.upsert_relationship(edge)?;
        }
        existing.push(agent_id);
        created += 1;
    }

    println!(
        "{} {} agents seeded, {} already present",
        "✅".green(),
        created,
        existing.len() - created
    );
    Ok(())
}

pub async fn handle_run(data_dir: Option<PathBuf>) -> Result<()> {
    let (config, store) = open_store(data_dir)?;

    if store.active_agents()?.is_empty() {
        bail!("no agents seeded; run `tradetalk seed` first");
    }

    let generator = build_generator(&config)?;
    let scheduler = LifecycleScheduler::new(store, generator, config.simulation.clone());

    let count = scheduler.start_all().await?;
    println!(
        "{} {} agent loops running. Press Ctrl-C to stop.",
        "▶".green(),
        count
    );

    tokio::signal::ctrl_c().await?;
    scheduler.stop_all();
    println!("\n{}", "All agent loops stopped.".yellow());
    Ok(())
}

pub async fn handle_discuss(
    symbol: String,
    price: f64,
    change: f64,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let (config, store) = open_store(data_dir)?;
    let generator = build_generator(&config)?;
    let orchestrator = DiscussionOrchestrator::new(store, generator, config.simulation.clone());

    println!(
        "{} {} at ${:.2} ({:+.2}%)",
        "Discussion:".cyan().bold(),
        symbol,
        price,
        change
    );

    let messages = orchestrator.run(&symbol, price, change).await?;

    for message in &messages {
        let name = if message.round == 1 {
            message.agent_name.cyan()
        } else {
            message.agent_name.yellow()
        };
        println!("\n[round {}] {}", message.round, name.bold());
        println!("{}", message.message);
    }

    println!(
        "\n{} {} messages across both rounds",
        "✅".green(),
        messages.len()
    );
    Ok(())
}

pub async fn handle_ask(
    agent_id: String,
    symbol: String,
    price: f64,
    change: f64,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let (config, store) = open_store(data_dir)?;
    let generator = build_generator(&config)?;

    let agent = store
        .agent(&agent_id)?
        .ok_or_else(|| anyhow!("agent not found: {}", agent_id))?;

    let opinion = generator
        .opinion_text(&agent, &symbol, price, change)
        .await
        .map_err(|error| anyhow!("opinion generation failed: {}", error))?;

    store.insert_message(AgentMessage::new(
        &agent.agent_id,
        &opinion,
        MessageType::Analysis,
        MessageContext {
            crypto_symbol: Some(symbol.clone()),
            price: Some(price),
            price_change: Some(change),
        },
        None,
    ))?;

    println!("{}: {}", agent.name.cyan().bold(), opinion);
    Ok(())
}

pub async fn handle_status(agent_id: Option<String>, data_dir: Option<PathBuf>) -> Result<()> {
    let (_config, store) = open_store(data_dir)?;
    let agents = store.active_agents()?;

    if agents.is_empty() {
        println!("{}", "No agents seeded yet".yellow());
        return Ok(());
    }

    println!("{}", "Agent Status".cyan().bold());
    for agent in &agents {
        let mood = &agent.current_mood;
        println!(
            "{} {} ({}) - {}",
            emotion::mood_emoji(mood),
            agent.name.bold(),
            agent.role,
            emotion::mood_label(mood)
        );
        println!(
            "  fear {:.2}  confidence {:.2}  euphoria {:.2}  irritation {:.2}",
            mood.fear, mood.confidence, mood.euphoria, mood.irritation
        );
        if let Some(state) = store.lifecycle_state(&agent.agent_id)? {
            let activity = if state.is_active {
                state.current_phase.to_string().green()
            } else {
                "idle".to_string().yellow()
            };
            println!("  phase: {}", activity);
        }
    }

    if let Some(agent_id) = agent_id {
        let edges = store.agent_relationships(&agent_id)?;
        println!("\n{} {}", "Relationships of".cyan().bold(), agent_id);
        for edge in edges.iter().filter(|e| e.agent_id_1 == agent_id) {
            println!(
                "  -> {}: trust {:.2} sympathy {:.2} respect {:.2} ({})",
                edge.agent_id_2,
                edge.trust,
                edge.sympathy,
                edge.respect,
                relationship::strength_label(edge)
            );
        }

        let memories = store.memories(
            &agent_id,
            &MemoryQuery {
                limit: 100,
                ..MemoryQuery::default()
            },
        )?;
        let summary = memory::summarize(&memories, 24, 0.5);
        println!("\n{} {}", "Memory:".cyan().bold(), summary.summary);

        let recent_events = store.events(&EventQuery {
            agent_id: Some(agent_id.clone()),
            since: Some(Utc::now() - TimeDelta::hours(24)),
            limit: Some(1000),
            ..EventQuery::default()
        })?;
        let stats = events::event_stats(&recent_events, 24.0);
        println!(
            "{} {} events in 24h ({:.1}/h)",
            "Activity:".cyan().bold(),
            stats.total_count,
            stats.events_per_hour
        );
    }

    Ok(())
}

pub async fn handle_feed(
    limit: usize,
    hashtag: Option<String>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let (_config, store) = open_store(data_dir)?;

    let posts = store.posts(&PostQuery {
        limit: Some(limit),
        hashtag,
        ..PostQuery::default()
    })?;

    if posts.is_empty() {
        println!("{}", "Feed is empty".yellow());
        return Ok(());
    }

    for post in &posts {
        let author = post
            .agent_id
            .as_deref()
            .or(post.user_id.as_deref())
            .unwrap_or("unknown");
        let sentiment = match post.sentiment {
            crate::social::Sentiment::Bullish => "bullish".green(),
            crate::social::Sentiment::Bearish => "bearish".red(),
            crate::social::Sentiment::Neutral => "neutral".yellow(),
        };

        println!(
            "{} [{}] {} comments: {}",
            author.cyan().bold(),
            sentiment,
            post.created_at.format("%Y-%m-%d %H:%M"),
            post.comment_count
        );
        println!("{}\n", post.content);
    }

    Ok(())
}

pub async fn handle_relationships(
    agent_id: Option<String>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let (_config, store) = open_store(data_dir)?;

    let edges = match &agent_id {
        Some(id) => store.agent_relationships(id)?,
        None => store.all_relationships()?,
    };

    if edges.is_empty() {
        println!("{}", "No relationships yet".yellow());
        return Ok(());
    }

    println!("{} ({})", "Relationships".cyan().bold(), edges.len());
    for edge in &edges {
        println!(
            "{} -> {}: trust {:.2} sympathy {:.2} respect {:.2} ({}, {} interactions)",
            edge.agent_id_1,
            edge.agent_id_2,
            edge.trust,
            edge.sympathy,
            edge.respect,
            relationship::strength_label(edge),
            edge.interaction_count
        );
    }

    Ok(())
}

pub async fn handle_decay(data_dir: Option<PathBuf>) -> Result<()> {
    let (_config, store) = open_store(data_dir)?;

    let agents = store.active_agents()?;
    for agent in &agents {
        store.update_mood(&agent.agent_id, emotion::decay(&agent.current_mood, 0.05))?;
    }

    let edges = store.all_relationships()?;
    for edge in &edges {
        store.upsert_relationship(relationship::decay(edge, 0.02))?;
    }

    println!(
        "{} decayed {} moods and {} relationship edges",
        "✅".green(),
        agents.len(),
        edges.len()
    );
    Ok(())
}

pub async fn handle_cleanup(days: i64, data_dir: Option<PathBuf>) -> Result<()> {
    let (_config, store) = open_store(data_dir)?;
    let cutoff = Utc::now() - TimeDelta::days(days);

    let removed_events = store.prune_events_before(cutoff)?;

    let mut removed_memories = 0;
    for agent in store.active_agents()? {
        removed_memories += store.prune_memories(&agent.agent_id, cutoff, 0.3)?;
    }

    println!(
        "{} pruned {} events and {} memories older than {} days",
        "✅".green(),
        removed_events,
        removed_memories,
        days
    );
    Ok(())
}

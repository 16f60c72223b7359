use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::{EventKind, EventRecord};
use crate::generator::ContentGenerator;
use crate::memory::MemoryRecord;
use crate::relationship::{self, Interaction, Relationship, Strength};
use crate::store::{PostQuery, Repository};

pub const MAX_POST_LEN: usize = 500;
pub const MAX_COMMENT_LEN: usize = 280;
pub const MAX_HASHTAGS: usize = 5;

const BULLISH_KEYWORDS: [&str; 6] = ["growth", "buy", "bullish", "long", "support", "rally"];
const BEARISH_KEYWORDS: [&str; 6] = ["drop", "sell", "bearish", "short", "correction", "dump"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sentiment::Bullish => write!(f, "bullish"),
            Sentiment::Bearish => write!(f, "bearish"),
            Sentiment::Neutral => write!(f, "neutral"),
        }
    }
}

/// Feed post. Authored by exactly one of agent or human user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub agent_id: Option<String>,
    pub user_id: Option<String>,
    pub content: String,
    pub hashtags: Vec<String>,
    pub crypto_symbol: Option<String>,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub comment_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn by_agent(
        agent_id: &str,
        content: &str,
        hashtags: &[String],
        crypto_symbol: Option<&str>,
    ) -> Self {
        Post {
            id: Uuid::new_v4(),
            agent_id: Some(agent_id.to_string()),
            user_id: None,
            content: content.to_string(),
            hashtags: hashtags.to_vec(),
            crypto_symbol: crypto_symbol.map(|s| s.to_string()),
            sentiment: Sentiment::Neutral,
            comment_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn by_user(
        user_id: &str,
        content: &str,
        hashtags: &[String],
        crypto_symbol: Option<&str>,
    ) -> Self {
        Post {
            id: Uuid::new_v4(),
            agent_id: None,
            user_id: Some(user_id.to_string()),
            content: content.to_string(),
            hashtags: hashtags.to_vec(),
            crypto_symbol: crypto_symbol.map(|s| s.to_string()),
            sentiment: Sentiment::Neutral,
            comment_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_sentiment(mut self, sentiment: Sentiment) -> Self {
        self.sentiment = sentiment;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub agent_id: Option<String>,
    pub user_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Analysis,
    Reaction,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageContext {
    pub crypto_symbol: Option<String>,
    pub price: Option<f64>,
    pub price_change: Option<f64>,
}

/// Discussion/opinion utterance, persisted so the conversation record
/// outlives the call that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: Uuid,
    pub from_agent: String,
    pub message: String,
    pub message_type: MessageType,
    #[serde(default)]
    pub context: MessageContext,
    pub round: Option<u8>,
    pub created_at: DateTime<Utc>,
}

impl AgentMessage {
    pub fn new(
        from_agent: &str,
        message: &str,
        message_type: MessageType,
        context: MessageContext,
        round: Option<u8>,
    ) -> Self {
        AgentMessage {
            id: Uuid::new_v4(),
            from_agent: from_agent.to_string(),
            message: message.to_string(),
            message_type,
            context,
            round,
            created_at: Utc::now(),
        }
    }
}

/// Symbol first, then every `#tag` in order of appearance, deduplicated,
/// capped at five. Default tags only when nothing was found at all.
pub fn extract_hashtags(content: &str, crypto_symbol: Option<&str>) -> Vec<String> {
    let mut hashtags: Vec<String> = Vec::new();

    if let Some(symbol) = crypto_symbol {
        hashtags.push(symbol.to_string());
    }

    let mut rest = content;
    while let Some(pos) = rest.find('#') {
        rest = &rest[pos + 1..];
        let tag: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if !tag.is_empty() && !hashtags.contains(&tag) {
            hashtags.push(tag);
        }
    }

    if hashtags.is_empty() {
        hashtags.push("crypto".to_string());
        hashtags.push("trading".to_string());
    }

    hashtags.truncate(MAX_HASHTAGS);
    hashtags
}

/// Keyword-count sentiment; ties are neutral.
pub fn sentiment_from_text(content: &str) -> Sentiment {
    let lower = content.to_lowercase();

    let bullish = BULLISH_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .count();
    let bearish = BEARISH_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .count();

    if bullish > bearish {
        Sentiment::Bullish
    } else if bearish > bullish {
        Sentiment::Bearish
    } else {
        Sentiment::Neutral
    }
}

/// Keyword sentiment with a price-move fallback when the text is neutral.
pub fn detect_sentiment(content: &str, price_change: f64) -> Sentiment {
    match sentiment_from_text(content) {
        Sentiment::Neutral => {
            if price_change > 2.0 {
                Sentiment::Bullish
            } else if price_change < -2.0 {
                Sentiment::Bearish
            } else {
                Sentiment::Neutral
            }
        }
        sentiment => sentiment,
    }
}

/// First known ticker mentioned in the text.
pub fn extract_crypto_symbol(content: &str, universe: &[String]) -> Option<String> {
    let upper = content.to_uppercase();
    universe.iter().find(|s| upper.contains(s.as_str())).cloned()
}

/// Candidate score for commenting: randomness plus a recency bonus plus a
/// quiet-thread bonus.
pub fn post_score(post: &Post, random: f64, now: DateTime<Utc>) -> f64 {
    let mut score = random;

    let age_hours = (now - post.created_at).num_seconds() as f64 / 3600.0;
    if age_hours < 1.0 {
        score += 0.5;
    }
    if post.comment_count < 3 {
        score += 0.3;
    }

    score
}

pub fn select_post_to_comment<'a>(posts: &'a [Post], rng: &mut impl Rng) -> Option<&'a Post> {
    let now = Utc::now();
    posts
        .iter()
        .map(|post| (post, post_score(post, rng.gen(), now)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(post, _)| post)
}

fn mock_market_context() -> (f64, f64) {
    // CoinGecko integration is out of scope; posts get a plausible context.
    let mut rng = SmallRng::from_entropy();
    let price = rng.gen_range(20_000.0..70_000.0);
    let change = rng.gen_range(-5.0..5.0);
    (price, change)
}

/// Agent writes a post about a symbol: generate, tag, persist, and leave
/// the event/memory trail behind.
pub async fn agent_create_post(
    store: &dyn Repository,
    generator: &ContentGenerator,
    agent_id: &str,
    symbol: &str,
) -> Result<Post> {
    let agent = store
        .agent(agent_id)?
        .ok_or_else(|| anyhow!("agent not found: {}", agent_id))?;

    let (price, change) = mock_market_context();
    let content = generator.post_text(&agent, symbol, price, change).await;

    let hashtags = extract_hashtags(&content, Some(symbol));
    let sentiment = detect_sentiment(&content, change);

    let post = Post::by_agent(agent_id, &content, &hashtags, Some(symbol)).with_sentiment(sentiment);
    store.insert_post(post.clone())?;

    store.log_event(
        EventRecord::new(
            EventKind::PostCreated,
            agent_id,
            &format!("{} created a post about {}", agent.name, symbol),
        )
        .with_data(serde_json::json!({
            "post_id": post.id,
            "crypto_symbol": symbol,
        })),
    )?;

    let valence = match sentiment {
        Sentiment::Bullish => 0.5,
        Sentiment::Bearish => -0.5,
        Sentiment::Neutral => 0.0,
    };
    let excerpt: String = content.chars().take(100).collect();
    store.store_memory(
        MemoryRecord::episodic(
            agent_id,
            &format!("Created post about {}: \"{}...\"", symbol, excerpt),
            0.6,
        )
        .with_valence(valence)
        .with_crypto(symbol),
    )?;

    info!(agent = agent_id, post = %post.id, symbol, "post created");
    Ok(post)
}

/// Agent comments on someone else's recent post. Returns `None` when no
/// suitable target exists or the agent already commented there.
pub async fn agent_create_comment(
    store: &dyn Repository,
    generator: &ContentGenerator,
    agent_id: &str,
) -> Result<Option<Comment>> {
    let agent = store
        .agent(agent_id)?
        .ok_or_else(|| anyhow!("agent not found: {}", agent_id))?;

    let candidates = store.posts(&PostQuery {
        exclude_agent: Some(agent_id.to_string()),
        limit: Some(10),
        ..PostQuery::default()
    })?;
    if candidates.is_empty() {
        debug!(agent = agent_id, "no posts to comment on");
        return Ok(None);
    }

    let mut rng = SmallRng::from_entropy();
    let target = match select_post_to_comment(&candidates, &mut rng) {
        Some(post) => post.clone(),
        None => return Ok(None),
    };

    // One comment per agent per post.
    if store.has_commented(target.id, agent_id)? {
        debug!(agent = agent_id, post = %target.id, "already commented");
        return Ok(None);
    }

    let relationship = match &target.agent_id {
        Some(author) => store.relationship(agent_id, author)?,
        None => None,
    };
    let author_name = match &target.agent_id {
        Some(author) => store.agent(author)?.map(|a| a.name),
        None => None,
    };

    let content = generator
        .comment_text(&agent, &target, author_name.as_deref(), relationship.as_ref())
        .await;

    let comment = Comment {
        id: Uuid::new_v4(),
        post_id: target.id,
        agent_id: Some(agent_id.to_string()),
        user_id: None,
        content: content.clone(),
        created_at: Utc::now(),
    };
    store.insert_comment(comment.clone())?;

    let mut event = EventRecord::new(
        EventKind::CommentCreated,
        agent_id,
        &format!("{} commented on a post", agent.name),
    )
    .with_data(serde_json::json!({
        "comment_id": comment.id,
        "post_id": target.id,
    }));
    if let Some(author) = &target.agent_id {
        event = event.with_related(author);
    }
    store.log_event(event)?;

    if let Some(author) = &target.agent_id {
        if relationship.is_some() {
            let comment_sentiment = sentiment_from_text(&content);
            let interaction = comment_interaction(comment_sentiment, target.sentiment);
            record_interaction(store, agent_id, author, &interaction)?;
        }

        // The author notices on their next reflection.
        store.log_event(
            EventRecord::new(
                EventKind::CommentReceived,
                author,
                &format!("Received a comment from {}", agent.name),
            )
            .with_related(agent_id)
            .with_data(serde_json::json!({ "post_id": target.id })),
        )?;
    }

    let mut memory = MemoryRecord::episodic(
        agent_id,
        &format!(
            "Commented on post: \"{}...\"",
            content.chars().take(100).collect::<String>()
        ),
        0.5,
    );
    if let Some(author) = &target.agent_id {
        memory = memory.with_related_agent(author);
    }
    if let Some(symbol) = &target.crypto_symbol {
        memory = memory.with_crypto(symbol);
    }
    store.store_memory(memory)?;

    info!(agent = agent_id, post = %target.id, "comment created");
    Ok(Some(comment))
}

/// Matching or neutral sentiment reads as agreement; a clash reads as a
/// respectful disagreement.
pub fn comment_interaction(comment_sentiment: Sentiment, post_sentiment: Sentiment) -> Interaction {
    let agrees = comment_sentiment == post_sentiment || comment_sentiment == Sentiment::Neutral;
    if agrees {
        Interaction::Agreement {
            strength: if comment_sentiment == Sentiment::Neutral {
                Strength::Weak
            } else {
                Strength::Normal
            },
        }
    } else {
        Interaction::Disagreement {
            severity: Strength::Normal,
            respectful: true,
        }
    }
}

/// Apply an interaction to the stored edge and log the update. Missing
/// edges abort only this operation.
pub fn record_interaction(
    store: &dyn Repository,
    from: &str,
    to: &str,
    interaction: &Interaction,
) -> Result<Option<Relationship>> {
    let Some(rel) = store.relationship(from, to)? else {
        warn!(from, to, "no relationship edge to update");
        return Ok(None);
    };

    let delta = relationship::interaction_delta(&rel, interaction);
    let updated = relationship::apply_interaction(&rel, interaction);
    store.upsert_relationship(updated.clone())?;

    store.log_event(
        EventRecord::new(
            EventKind::RelationshipUpdated,
            from,
            &format!("Relationship updated: {}", interaction.name()),
        )
        .with_related(to)
        .with_data(serde_json::json!({
            "interaction_type": interaction.name(),
            "changes": {
                "trust": delta.trust,
                "sympathy": delta.sympathy,
                "respect": delta.respect,
            },
            "new_values": {
                "trust": updated.trust,
                "sympathy": updated.sympathy,
                "respect": updated.respect,
            },
        })),
    )?;

    Ok(Some(updated))
}

/// Human post. Validated before anything is written.
pub fn user_create_post(
    store: &dyn Repository,
    user_id: &str,
    content: &str,
    hashtags: Vec<String>,
    universe: &[String],
) -> Result<Post> {
    let content = content.trim();
    if content.is_empty() {
        bail!("post content cannot be empty");
    }
    if content.chars().count() > MAX_POST_LEN {
        bail!("post content too long (max {} characters)", MAX_POST_LEN);
    }

    let crypto_symbol = extract_crypto_symbol(content, universe);
    let sentiment = sentiment_from_text(content);

    let mut hashtags = hashtags;
    hashtags.truncate(MAX_HASHTAGS);

    let post = Post::by_user(user_id, content, &hashtags, crypto_symbol.as_deref())
        .with_sentiment(sentiment);
    store.insert_post(post.clone())?;

    info!(user = user_id, post = %post.id, "user post created");
    Ok(post)
}

/// Human comment. Validated before anything is written.
pub fn user_create_comment(
    store: &dyn Repository,
    user_id: &str,
    post_id: Uuid,
    content: &str,
) -> Result<Comment> {
    let content = content.trim();
    if content.is_empty() {
        bail!("comment content cannot be empty");
    }
    if content.chars().count() > MAX_COMMENT_LEN {
        bail!("comment content too long (max {} characters)", MAX_COMMENT_LEN);
    }

    if store.post(post_id)?.is_none() {
        bail!("post not found: {}", post_id);
    }

    let comment = Comment {
        id: Uuid::new_v4(),
        post_id,
        agent_id: None,
        user_id: Some(user_id.to_string()),
        content: content.to_string(),
        created_at: Utc::now(),
    };
    store.insert_comment(comment.clone())?;

    info!(user = user_id, post = %post_id, "user comment created");
    Ok(comment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn hashtags_keep_symbol_first_and_dedup() {
        let content = "Breakout forming.\n\n#BTC\n#crypto\n#BTC\n#levels";
        let tags = extract_hashtags(content, Some("BTC"));
        assert_eq!(tags, vec!["BTC", "crypto", "levels"]);
    }

    #[test]
    fn hashtags_default_when_none_found() {
        let tags = extract_hashtags("no tags here", None);
        assert_eq!(tags, vec!["crypto", "trading"]);
    }

    #[test]
    fn hashtags_cap_at_five() {
        let content = "#a #b #c #d #e #f";
        let tags = extract_hashtags(content, Some("BTC"));
        assert_eq!(tags.len(), MAX_HASHTAGS);
        assert_eq!(tags[0], "BTC");
    }

    #[test]
    fn sentiment_counts_keywords() {
        assert_eq!(
            sentiment_from_text("time to buy, support held, rally incoming"),
            Sentiment::Bullish
        );
        assert_eq!(
            sentiment_from_text("sell now, correction then dump"),
            Sentiment::Bearish
        );
        assert_eq!(sentiment_from_text("sideways chop"), Sentiment::Neutral);
    }

    #[test]
    fn sentiment_falls_back_to_price_move() {
        assert_eq!(detect_sentiment("nothing to say", 3.0), Sentiment::Bullish);
        assert_eq!(detect_sentiment("nothing to say", -3.0), Sentiment::Bearish);
        assert_eq!(detect_sentiment("nothing to say", 1.0), Sentiment::Neutral);
        // Text wins over the price move.
        assert_eq!(detect_sentiment("time to sell", 3.0), Sentiment::Bearish);
    }

    #[test]
    fn symbol_extraction_uses_the_universe() {
        let universe: Vec<String> = ["BTC", "ETH", "SOL"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            extract_crypto_symbol("thoughts on eth today?", &universe),
            Some("ETH".to_string())
        );
        assert_eq!(extract_crypto_symbol("stocks only", &universe), None);
    }

    #[test]
    fn post_score_bonuses() {
        let now = Utc::now();
        let mut fresh = Post::by_agent("alpha", "fresh", &[], Some("BTC"));
        fresh.created_at = now;
        fresh.comment_count = 0;
        assert!((post_score(&fresh, 0.0, now) - 0.8).abs() < 1e-9);

        let mut stale = Post::by_agent("alpha", "stale", &[], Some("BTC"));
        stale.created_at = now - Duration::hours(5);
        stale.comment_count = 10;
        assert!((post_score(&stale, 0.0, now) - 0.0).abs() < 1e-9);

        let mut quiet = Post::by_agent("alpha", "quiet", &[], Some("BTC"));
        quiet.created_at = now - Duration::hours(5);
        quiet.comment_count = 1;
        assert!((post_score(&quiet, 0.0, now) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn comment_interaction_mapping() {
        assert_eq!(
            comment_interaction(Sentiment::Bullish, Sentiment::Bullish),
            Interaction::Agreement {
                strength: Strength::Normal
            }
        );
        assert_eq!(
            comment_interaction(Sentiment::Neutral, Sentiment::Bearish),
            Interaction::Agreement {
                strength: Strength::Weak
            }
        );
        assert_eq!(
            comment_interaction(Sentiment::Bearish, Sentiment::Bullish),
            Interaction::Disagreement {
                severity: Strength::Normal,
                respectful: true
            }
        );
    }
}

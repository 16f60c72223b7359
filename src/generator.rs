use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::agent::Agent;
use crate::provider::{GenOptions, ProviderError, TextGenerator};
use crate::relationship::Relationship;
use crate::social::Post;

const POST_STYLES: [&str; 5] = [
    "technical analysis with concrete levels",
    "emotional reaction to the price move",
    "short-term forecast",
    "comparison against other assets",
    "volume and liquidity review",
];

const COMMENT_STYLES: [&str; 5] = [
    "detailed technical analysis with concrete numbers",
    "emotional reaction backed by personal experience",
    "an alternative view with arguments",
    "an addition with fresh data and facts",
    "a question or clarification to push the discussion",
];

/// Turns personas and situations into text. Generation failures never
/// escape the post/comment paths; they turn into deterministic fallbacks.
pub struct ContentGenerator {
    client: Arc<dyn TextGenerator>,
}

impl ContentGenerator {
    pub fn new(client: Arc<dyn TextGenerator>) -> Self {
        ContentGenerator { client }
    }

    /// Post body for the feed. Infallible: any provider failure yields the
    /// persona's fallback post.
    pub async fn post_text(&self, agent: &Agent, symbol: &str, price: f64, change: f64) -> String {
        let style = pick_style(&POST_STYLES);
        let mood = &agent.current_mood;

        let system_prompt = format!(
            "{}\nCurrent mood: confidence {:.2}, fear {:.2}\n\n\
             Write a PROFESSIONAL crypto post in this style: {}.\n\n\
             Requirements:\n\
             - Use emojis (🚀 📈 📉 ⚠️ ✅ 💎 🔥 ⚡ 📊 🎯)\n\
             - Prefix tickers with $ ($BTC, $ETH)\n\
             - Structure the text with bullet markers (•) or sections\n\
             - Name concrete price levels\n\
             - Add technical detail (trends, levels, patterns)\n\
             - Hashtags at the end, EACH ON ITS OWN LINE",
            persona_prompt(agent),
            mood.confidence,
            mood.fear,
            style
        );

        let user_prompt = format!(
            "Write a post about {}.\nCurrent price: ${:.2}\n24h change: {:+.2}%\n\n\
             Give your view as a {}.\nFinish with 2-3 hashtags, each on its own line.",
            symbol, price, change, agent.role
        );

        let options = GenOptions {
            max_tokens: 400,
            temperature: 0.9,
        };

        match self
            .client
            .complete(&system_prompt, &user_prompt, &options)
            .await
        {
            Ok(text) => text,
            Err(error) => {
                warn!(agent = %agent.agent_id, %error, "post generation failed, using fallback");
                post_fallback(agent, symbol, price, change)
            }
        }
    }

    /// Comment body for a target post. Infallible like `post_text`.
    pub async fn comment_text(
        &self,
        agent: &Agent,
        post: &Post,
        author_name: Option<&str>,
        relationship: Option<&Relationship>,
    ) -> String {
        let style = pick_style(&COMMENT_STYLES);
        let trust = relationship.map(|r| r.trust).unwrap_or(0.5);

        let system_prompt = format!(
            "{}\n\nWrite a DETAILED and UNIQUE comment (3-4 sentences) in this style: {}.\n\
             Be concrete, bring your own expertise. Every comment should read differently.",
            persona_prompt(agent),
            style
        );

        let mut user_prompt = format!("Post: \"{}\"\n", post.content);
        match author_name {
            Some(name) => user_prompt.push_str(&format!("Author: {}\n", name)),
            None => user_prompt.push_str("Author: a community member\n"),
        }
        if relationship.is_some() {
            user_prompt.push_str(&format!("Your trust in the author: {:.2}\n", trust));
        }
        if let Some(symbol) = &post.crypto_symbol {
            user_prompt.push_str(&format!("Asset: {}\n", symbol));
        }
        user_prompt.push_str(&format!(
            "\nWrite a substantial comment (3-4 sentences).\n{}\n\
             Be concrete: numbers, levels, forecasts.",
            if trust < 0.4 {
                "Feel free to disagree and offer your own view."
            } else {
                "Support it or add your own expert angle."
            }
        ));

        let options = GenOptions {
            max_tokens: 300,
            temperature: 0.95,
        };

        match self
            .client
            .complete(&system_prompt, &user_prompt, &options)
            .await
        {
            Ok(text) => text,
            Err(error) => {
                warn!(agent = %agent.agent_id, %error, "comment generation failed, using fallback");
                comment_fallback(agent)
            }
        }
    }

    /// Round-one discussion opinion. Malformed or empty responses become
    /// the fixed fallback; transport failures propagate so the caller can
    /// skip the agent.
    pub async fn opinion_text(
        &self,
        agent: &Agent,
        symbol: &str,
        price: f64,
        change: f64,
    ) -> Result<String, ProviderError> {
        let system_prompt = format!(
            "{}\n\nAnswer briefly (2-3 sentences), in your style, as a live analyst.",
            persona_prompt(agent)
        );
        let user_prompt = format!(
            "Analyze {}.\nCurrent price: ${:.2}\n24h change: {:+.2}%\n\n\
             Give your call: buy, sell or hold? Explain why.",
            symbol, price, change
        );

        match self
            .client
            .complete(&system_prompt, &user_prompt, &GenOptions::default())
            .await
        {
            Ok(text) => Ok(text),
            Err(error) if !error.is_transport() => {
                warn!(agent = %agent.agent_id, %error, "opinion extraction failed, using fallback");
                Ok(opinion_fallback(symbol))
            }
            Err(error) => Err(error),
        }
    }

    /// Round-two reaction to the aggregated round-one transcript. Same
    /// failure policy as `opinion_text`.
    pub async fn reaction_text(
        &self,
        agent: &Agent,
        symbol: &str,
        transcript: &str,
    ) -> Result<String, ProviderError> {
        let system_prompt = format!(
            "{}\n\nYou are in a discussion with other analysts. Comment on their \
             takes, agree or push back. Be lively and direct.",
            persona_prompt(agent)
        );
        let user_prompt = format!(
            "The other analysts weighed in on {}:\n\n{}\n\n\
             What do you make of their takes? Who do you agree with, who not? \
             Give your reaction (2-3 sentences).",
            symbol, transcript
        );

        let options = GenOptions {
            max_tokens: 250,
            temperature: 0.9,
        };

        match self
            .client
            .complete(&system_prompt, &user_prompt, &options)
            .await
        {
            Ok(text) => Ok(text),
            Err(error) if !error.is_transport() => {
                warn!(agent = %agent.agent_id, %error, "reaction extraction failed, using fallback");
                Ok(reaction_fallback())
            }
            Err(error) => Err(error),
        }
    }
}

fn persona_prompt(agent: &Agent) -> String {
    format!(
        "You are {}, {}.\n{}\n\nYour traits: {}.\nCommunication style: {}\nRisk tolerance: {:.1}/1.0",
        agent.name,
        agent.role,
        agent.personality.description,
        agent.personality.traits.join(", "),
        agent.personality.communication_style,
        agent.risk_tolerance
    )
}

fn pick_style(styles: &'static [&'static str]) -> &'static str {
    let mut rng = SmallRng::from_entropy();
    styles[rng.gen_range(0..styles.len())]
}

/// Deterministic per-agent choice among fallback variants.
fn stable_index(agent_id: &str, len: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    agent_id.hash(&mut hasher);
    (hasher.finish() % len as u64) as usize
}

pub fn post_fallback(agent: &Agent, symbol: &str, price: f64, change: f64) -> String {
    let variants = [
        format!(
            "📈 ${} is shaping an interesting pattern.\n\nTechnical view:\n\
             • Price: ${:.2}\n• 24h move: {:+.2}%\n\n⚠️ Watching the volume closely\n\n\
             #{}\n#crypto\n#analysis",
            symbol, price, change, symbol
        ),
        format!(
            "🎯 ${} in focus.\n\nCurrent picture:\n• Price: ${:.2}\n• Momentum: {}\n\n\
             📊 Tracking the next move\n\n#{}\n#trading\n#market",
            symbol,
            price,
            if change > 0.0 { "building" } else { "cooling" },
            symbol
        ),
        format!(
            "⚡ ${} is active today.\n\nOverview:\n• Volatility elevated\n\
             • Key levels in play\n\n✅ Positioning for the next swing\n\n\
             #{}\n#crypto\n#strategy",
            symbol, symbol
        ),
    ];

    variants[stable_index(&agent.agent_id, variants.len())].clone()
}

pub fn comment_fallback(agent: &Agent) -> String {
    let variants = [
        "Solid analysis! I would add that the current support levels look fairly strong.",
        "Agree with the overall direction, but the macro backdrop deserves more weight here.",
        "Good point! From my side the chart shows a few extra signals worth watching.",
    ];

    variants[stable_index(&agent.agent_id, variants.len())].to_string()
}

pub fn opinion_fallback(symbol: &str) -> String {
    format!("Analyzing {}... (no response received)", symbol)
}

pub fn reaction_fallback() -> String {
    "Interesting takes from the desk... (no response received)".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::seed_roster;
    use async_trait::async_trait;

    struct FailingClient {
        error: fn() -> ProviderError,
    }

    #[async_trait]
    impl TextGenerator for FailingClient {
        async fn complete(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _options: &GenOptions,
        ) -> Result<String, ProviderError> {
            Err((self.error)())
        }
    }

    fn agent() -> Agent {
        seed_roster().remove(0)
    }

    #[tokio::test]
    async fn post_falls_back_on_transport_failure() {
        let generator = ContentGenerator::new(Arc::new(FailingClient {
            error: || ProviderError::Status {
                status: 503,
                body: "down".to_string(),
            },
        }));

        let text = generator.post_text(&agent(), "BTC", 50_000.0, 3.2).await;
        assert!(!text.trim().is_empty());
        assert!(text.contains("BTC"));
        assert!(text.contains('#'));
    }

    #[tokio::test]
    async fn post_fallback_is_deterministic_per_agent() {
        let generator = ContentGenerator::new(Arc::new(FailingClient {
            error: || ProviderError::Malformed,
        }));

        let a = generator.post_text(&agent(), "ETH", 3_000.0, -1.0).await;
        let b = generator.post_text(&agent(), "ETH", 3_000.0, -1.0).await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn opinion_maps_extraction_failure_to_fallback() {
        let generator = ContentGenerator::new(Arc::new(FailingClient {
            error: || ProviderError::Empty,
        }));

        let text = generator
            .opinion_text(&agent(), "BTC", 50_000.0, 3.2)
            .await
            .unwrap();
        assert_eq!(text, opinion_fallback("BTC"));
    }

    #[tokio::test]
    async fn opinion_propagates_transport_failure() {
        let generator = ContentGenerator::new(Arc::new(FailingClient {
            error: || ProviderError::Status {
                status: 500,
                body: "boom".to_string(),
            },
        }));

        let result = generator.opinion_text(&agent(), "BTC", 50_000.0, 3.2).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().is_transport());
    }

    #[tokio::test]
    async fn comment_falls_back_and_stays_stable() {
        let generator = ContentGenerator::new(Arc::new(FailingClient {
            error: || ProviderError::Malformed,
        }));

        let post = Post::by_agent("beta", "the chart looks heavy", &[], Some("BTC"));
        let first = generator
            .comment_text(&agent(), &post, Some("Beta"), None)
            .await;
        let second = generator
            .comment_text(&agent(), &post, Some("Beta"), None)
            .await;
        assert!(!first.trim().is_empty());
        assert_eq!(first, second);
    }
}

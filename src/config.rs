use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub data_dir: PathBuf,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub simulation: SimTuning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Hard ceiling on a single completion call. A hung endpoint must not
    /// stall an agent's cycle forever.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ProviderSettings {
    fn default() -> Self {
        ProviderSettings {
            endpoint: "http://localhost:11434/v1/chat/completions".to_string(),
            model: "qwen2.5".to_string(),
            api_key: std::env::var("TRADETALK_API_KEY").ok(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Timing and probability knobs for the simulation. Defaults match the
/// production cadence; tests shrink them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimTuning {
    pub wait_min_secs: f64,
    pub wait_max_secs: f64,
    pub error_backoff_secs: f64,
    pub stagger_max_secs: f64,
    pub post_probability: f64,
    pub recent_post_window_mins: i64,
    pub reflection_window_hours: i64,
    pub round_one_delay_secs: (f64, f64),
    pub round_two_delay_secs: (f64, f64),
    pub coin_universe: Vec<String>,
}

impl Default for SimTuning {
    fn default() -> Self {
        SimTuning {
            wait_min_secs: 10.0,
            wait_max_secs: 30.0,
            error_backoff_secs: 60.0,
            stagger_max_secs: 5.0,
            post_probability: 0.5,
            recent_post_window_mins: 30,
            reflection_window_hours: 24,
            round_one_delay_secs: (2.0, 3.0),
            round_two_delay_secs: (2.0, 4.0),
            coin_universe: [
                "BTC", "ETH", "SOL", "ADA", "DOT", "AVAX", "MATIC", "LINK",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Config {
    pub fn new(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tradetalk")
        });

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        let config_path = data_dir.join("config.json");

        if config_path.exists() {
            let config_str =
                std::fs::read_to_string(&config_path).context("Failed to read config.json")?;
            let mut config: Config =
                serde_json::from_str(&config_str).context("Failed to parse config.json")?;
            config.data_dir = data_dir;
            // Environment wins over an empty key in the file.
            if config
                .provider
                .api_key
                .as_ref()
                .map_or(true, |key| key.is_empty())
            {
                config.provider.api_key = std::env::var("TRADETALK_API_KEY").ok();
            }
            return Ok(config);
        }

        let config = Config {
            data_dir,
            provider: ProviderSettings::default(),
            simulation: SimTuning::default(),
        };
        config.save()?;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = self.data_dir.join("config.json");
        let json_str = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, json_str).context("Failed to write config.json")?;
        Ok(())
    }

    pub fn agents_file(&self) -> PathBuf {
        self.data_dir.join("agents.json")
    }

    pub fn relationships_file(&self) -> PathBuf {
        self.data_dir.join("relationships.json")
    }

    pub fn events_file(&self) -> PathBuf {
        self.data_dir.join("events.json")
    }

    pub fn memories_file(&self) -> PathBuf {
        self.data_dir.join("memories.json")
    }

    pub fn posts_file(&self) -> PathBuf {
        self.data_dir.join("posts.json")
    }

    pub fn comments_file(&self) -> PathBuf {
        self.data_dir.join("comments.json")
    }

    pub fn messages_file(&self) -> PathBuf {
        self.data_dir.join("messages.json")
    }

    pub fn lifecycle_file(&self) -> PathBuf {
        self.data_dir.join("lifecycle.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuning_defaults_match_production_cadence() {
        let tuning = SimTuning::default();
        assert!((tuning.wait_min_secs - 10.0).abs() < f64::EPSILON);
        assert!((tuning.wait_max_secs - 30.0).abs() < f64::EPSILON);
        assert!((tuning.error_backoff_secs - 60.0).abs() < f64::EPSILON);
        assert_eq!(tuning.coin_universe.len(), 8);
    }

    #[test]
    fn tuning_survives_serde() {
        let tuning = SimTuning::default();
        let json = serde_json::to_string(&tuning).unwrap();
        let back: SimTuning = serde_json::from_str(&json).unwrap();
        assert_eq!(back.coin_universe, tuning.coin_universe);
        assert!((back.round_two_delay_secs.1 - 4.0).abs() < f64::EPSILON);
    }
}

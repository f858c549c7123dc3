//! Configuration loading and validation.

use crate::error::Result;
use anyhow::Context as _;
use serde::Deserialize;
use std::path::Path;

/// Top-level disruptor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// User-Agent sent with outbound fetches unless a source overrides it.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Streak length required before a disruption fires.
    #[serde(default = "default_min_monologue_size")]
    pub min_monologue_size: u32,
    /// Gap (seconds) after which a monologue is considered over.
    #[serde(default = "default_max_monologue_delay")]
    pub max_monologue_delay: f64,
    /// Minimum seconds between disruptions in the same room.
    #[serde(default = "default_disrupt_cooldown")]
    pub disrupt_cooldown: f64,
    /// Root of the content source tree.
    pub source: SourceConfig,
    /// Token bucket applied per user to the manual trigger.
    #[serde(default = "RateLimitConfig::user_default")]
    pub user_ratelimit: RateLimitConfig,
    /// Token bucket applied per room to the manual trigger.
    #[serde(default = "RateLimitConfig::room_default")]
    pub room_ratelimit: RateLimitConfig,
    /// Webhook transport listener.
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// One node of the source tree: a registered type name plus its own config.
/// Combinator configs nest further `SourceConfig` values inside `config`.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Token bucket parameters for one manual-trigger scope.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub rate: f64,
    pub per: f64,
    #[serde(default = "default_ratelimit_message")]
    pub message: String,
}

impl RateLimitConfig {
    fn user_default() -> Self {
        Self {
            rate: 3.0,
            per: 3600.0,
            message: default_ratelimit_message(),
        }
    }

    fn room_default() -> Self {
        Self {
            rate: 5.0,
            per: 3600.0,
            message: "This room has been disrupted enough recently".into(),
        }
    }
}

/// Webhook transport listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_bind")]
    pub bind: String,
    #[serde(default = "default_webhook_port")]
    pub port: u16,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind: default_webhook_bind(),
            port: default_webhook_port(),
        }
    }
}

fn default_user_agent() -> String {
    "disruptor".into()
}

fn default_min_monologue_size() -> u32 {
    5
}

fn default_max_monologue_delay() -> f64 {
    120.0
}

fn default_disrupt_cooldown() -> f64 {
    900.0
}

fn default_ratelimit_message() -> String {
    "You're doing that too often, try again later".into()
}

fn default_webhook_bind() -> String {
    "127.0.0.1".into()
}

fn default_webhook_port() -> u16 {
    29418
}

impl Config {
    /// Load and validate a config file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.min_monologue_size >= 1,
            "min_monologue_size must be at least 1"
        );
        anyhow::ensure!(
            self.max_monologue_delay > 0.0,
            "max_monologue_delay must be positive"
        );
        anyhow::ensure!(
            self.disrupt_cooldown >= 0.0,
            "disrupt_cooldown must not be negative"
        );
        for (name, limit) in [
            ("user_ratelimit", &self.user_ratelimit),
            ("room_ratelimit", &self.room_ratelimit),
        ] {
            anyhow::ensure!(limit.rate >= 1.0, "{name}.rate must be at least 1");
            anyhow::ensure!(limit.per > 0.0, "{name}.per must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_source_tree() {
        let content = indoc::indoc! {r#"
            min_monologue_size = 3
            max_monologue_delay = 60
            disrupt_cooldown = 120

            [user_ratelimit]
            rate = 2
            per = 600
            message = "slow down"

            [room_ratelimit]
            rate = 4
            per = 600
            message = "room is busy"

            [source]
            type = "cache"

            [source.config]
            size = 5
            type = "reddit"

            [source.config.config]
            subreddit = "cats"
        "#};

        let config: Config = toml::from_str(content).unwrap();
        config.validate().unwrap();

        assert_eq!(config.min_monologue_size, 3);
        assert_eq!(config.source.kind, "cache");
        assert_eq!(config.source.config["size"], 5);
        assert_eq!(config.source.config["type"], "reddit");
        assert_eq!(config.source.config["config"]["subreddit"], "cats");
        assert_eq!(config.user_ratelimit.message, "slow down");
    }

    #[test]
    fn applies_defaults() {
        let content = indoc::indoc! {r#"
            [source]
            type = "url"

            [source.config]
            url = "https://example.com/cat.png"
        "#};

        let config: Config = toml::from_str(content).unwrap();
        config.validate().unwrap();

        assert_eq!(config.min_monologue_size, 5);
        assert_eq!(config.user_agent, "disruptor");
        assert_eq!(config.user_ratelimit.rate, 3.0);
        assert_eq!(config.webhook.port, 29418);
    }

    #[test]
    fn rejects_zero_monologue_size() {
        let content = indoc::indoc! {r#"
            min_monologue_size = 0

            [source]
            type = "url"
        "#};

        let config: Config = toml::from_str(content).unwrap();
        assert!(config.validate().is_err());
    }
}

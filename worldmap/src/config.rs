use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_KOBOLD_ENDPOINT: &'static str = "http://127.0.0.1:5001/api";
const DEFAULT_START_PROMPT: &'static str =
    "simple medieval village surrounded by farmlands, with a forest nearby";

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GameConfig {
    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub game: GameSettings,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ConnectionSettings {
    pub kobold_endpoint: String,

    /// Backend for corrective and resolution calls. Same as the
    /// primary if unset.
    pub secondary_endpoint: Option<String>,

    pub streaming: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            kobold_endpoint: DEFAULT_KOBOLD_ENDPOINT.to_string(),
            secondary_endpoint: None,
            streaming: true,
        }
    }
}

impl ConnectionSettings {
    pub fn secondary_endpoint(&self) -> &str {
        self.secondary_endpoint
            .as_deref()
            .unwrap_or(&self.kobold_endpoint)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    pub backend_timeout_secs: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub corrective_fallback: bool,
    pub use_grammar: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            backend_timeout_secs: 180,
            backoff_base_ms: 500,
            backoff_max_ms: 8000,
            corrective_fallback: true,
            use_grammar: true,
        }
    }
}

impl PipelineSettings {
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    /// Delay before retrying after the given number of consecutive
    /// backend failures: base * 2^(n-1), capped.
    pub fn backoff(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let factor = 1u64.checked_shl(consecutive_failures - 1).unwrap_or(u64::MAX);
        let delay = self.backoff_base_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.backoff_max_ms))
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GameSettings {
    pub start_prompt: String,
}

impl Default for GameSettings {
    fn default() -> Self {
        GameSettings {
            start_prompt: DEFAULT_START_PROMPT.to_string(),
        }
    }
}

/// config.toml (optional) overlaid by WORLDMAP__SECTION__KEY
/// environment variables.
pub fn load_config() -> Result<GameConfig> {
    let settings = Config::builder()
        .add_source(File::with_name("config.toml").required(false))
        .add_source(
            Environment::with_prefix("WORLDMAP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn backoff_doubles_and_caps() {
        let settings = PipelineSettings::default();

        assert_eq!(settings.backoff(0), Duration::ZERO);
        assert_eq!(settings.backoff(1), Duration::from_millis(500));
        assert_eq!(settings.backoff(2), Duration::from_millis(1000));
        assert_eq!(settings.backoff(4), Duration::from_millis(4000));
        assert_eq!(settings.backoff(5), Duration::from_millis(8000));
        assert_eq!(settings.backoff(70), Duration::from_millis(8000));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml = r#"
            [connection]
            kobold_endpoint = "http://gpu-box:5001/api"

            [pipeline]
            backoff_base_ms = 0
        "#;

        let config: GameConfig = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("config should load");

        assert_eq!(config.connection.kobold_endpoint, "http://gpu-box:5001/api");
        assert_eq!(config.connection.secondary_endpoint(), "http://gpu-box:5001/api");
        assert!(config.connection.streaming);
        assert_eq!(config.pipeline.backoff_base_ms, 0);
        assert_eq!(config.pipeline.backend_timeout_secs, 180);
        assert_eq!(config.game.start_prompt, DEFAULT_START_PROMPT);
    }
}

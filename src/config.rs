use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::engine::managers::DEFAULT_CACHE_TTL;
use crate::engine::systems::{ PlayerError, TickInterval };

pub const DEFAULT_BASE_URL: &str = "http://localhost:5173/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base URL {url:?}: {message}")]
    InvalidBaseUrl {
        url: String,
        message: String,
    },
    #[error(transparent)]
    TickInterval(#[from] PlayerError),
}

/// Settings shared by the asset manager, the episode source and the player.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    /// Root that `data/...` paths and relative model paths resolve against.
    pub base_url: Url,
    pub tick_interval: TickInterval,
    pub cache_ttl: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).unwrap_or_else(|_| unreachable!()),
            tick_interval: TickInterval::default(),
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl ViewerConfig {
    pub fn new(base_url: &str, tick_ms: u64, cache_ttl: Duration) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidBaseUrl {
            url: base_url.to_string(),
            message,
        };
        let base_url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("URL cannot be used as a base".to_string()));
        }

        Ok(Self {
            base_url,
            tick_interval: TickInterval::from_millis(tick_ms)?,
            cache_ttl,
        })
    }
}

use std::time::Duration;

use crate::error::ConfigError;

/// Timing and limits for one synchronized document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Fixed delay before re-sending a submission that failed without a
    /// conflict or network error.
    pub send_retry_delay: Duration,
    /// Rollbacks tolerated before the document is fully resynchronized.
    pub rollback_ceiling: u32,
    /// Delay passed to the transport when forcing a reconnect.
    pub reconnect_delay: Duration,
    pub undo: UndoConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoConfig {
    /// Edits recorded within this window of the previous one share an entry.
    pub coalesce_delay: Duration,
    pub max_depth: usize,
}

impl SyncConfig {
    pub const DEFAULT_SEND_RETRY_MS: u64 = 1000;
    pub const DEFAULT_ROLLBACK_CEILING: u32 = 3;
    pub const DEFAULT_RECONNECT_MS: u64 = 1000;

    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset.
    ///
    /// - `WEAVER_OT_SEND_RETRY_MS`
    /// - `WEAVER_OT_ROLLBACK_CEILING`
    /// - `WEAVER_OT_RECONNECT_MS`
    /// - `WEAVER_OT_UNDO_DELAY_MS`
    /// - `WEAVER_OT_UNDO_MAX_DEPTH`
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            send_retry_delay: env_millis("WEAVER_OT_SEND_RETRY_MS")?
                .unwrap_or(defaults.send_retry_delay),
            rollback_ceiling: env_parse("WEAVER_OT_ROLLBACK_CEILING")?
                .unwrap_or(defaults.rollback_ceiling),
            reconnect_delay: env_millis("WEAVER_OT_RECONNECT_MS")?
                .unwrap_or(defaults.reconnect_delay),
            undo: UndoConfig {
                coalesce_delay: env_millis("WEAVER_OT_UNDO_DELAY_MS")?
                    .unwrap_or(defaults.undo.coalesce_delay),
                max_depth: env_parse("WEAVER_OT_UNDO_MAX_DEPTH")?
                    .unwrap_or(defaults.undo.max_depth),
            },
        })
    }

    pub fn with_send_retry_delay(mut self, delay: Duration) -> Self {
        self.send_retry_delay = delay;
        self
    }

    pub fn with_rollback_ceiling(mut self, ceiling: u32) -> Self {
        self.rollback_ceiling = ceiling;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_undo(mut self, undo: UndoConfig) -> Self {
        self.undo = undo;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            send_retry_delay: Duration::from_millis(Self::DEFAULT_SEND_RETRY_MS),
            rollback_ceiling: Self::DEFAULT_ROLLBACK_CEILING,
            reconnect_delay: Duration::from_millis(Self::DEFAULT_RECONNECT_MS),
            undo: UndoConfig::default(),
        }
    }
}

impl UndoConfig {
    pub const DEFAULT_COALESCE_MS: u64 = 1000;
    pub const DEFAULT_MAX_DEPTH: usize = 100;

    pub fn with_coalesce_delay(mut self, delay: Duration) -> Self {
        self.coalesce_delay = delay;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            coalesce_delay: Duration::from_millis(Self::DEFAULT_COALESCE_MS),
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
        Err(_) => Ok(None),
    }
}

fn env_millis(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(env_parse::<u64>(var)?.map(Duration::from_millis))
}

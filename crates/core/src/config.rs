//! Game rules and timing configuration
//!
//! Every field has a default, so a partial TOML table is enough:
//!
//! ```toml
//! win_score = 5
//! submit_secs = 45
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Rules and timings shared by every room in the process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Cards dealt to each player per round
    pub hand_size: usize,
    pub max_players: usize,
    pub min_players: usize,
    /// First score to reach this wins
    pub win_score: u32,
    /// Submission countdown
    pub submit_secs: u32,
    /// Voting countdown
    pub vote_secs: u32,
    /// Time each submission stays on screen during reveal
    pub reveal_interval_ms: u64,
    /// Pause between the last reveal and voting
    pub voting_pause_ms: u64,
    /// Pause before re-dealing when nobody submitted
    pub empty_round_pause_ms: u64,
    /// Results display time before the next round
    pub results_pause_ms: u64,
    /// How long a disconnected host may take to come back
    pub host_grace_ms: u64,
    /// Display time of the host-left notice before the room closes
    pub host_close_delay_ms: u64,
    pub sweep_interval_secs: u64,
    /// Idle rooms older than this are reaped
    pub stale_after_secs: u64,
    /// Stored rooms older than this are treated as gone
    pub retention_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            hand_size: 6,
            max_players: 8,
            min_players: 3,
            win_score: 7,
            submit_secs: 30,
            vote_secs: 20,
            reveal_interval_ms: 5_000,
            voting_pause_ms: 1_500,
            empty_round_pause_ms: 2_000,
            results_pause_ms: 5_000,
            host_grace_ms: 8_000,
            host_close_delay_ms: 3_000,
            sweep_interval_secs: 10 * 60,
            stale_after_secs: 30 * 60,
            retention_secs: 24 * 60 * 60,
        }
    }
}

impl GameConfig {
    /// Parse from a TOML table, filling gaps with defaults
    pub fn from_toml(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hand_size == 0 {
            return Err(Error::Config("hand_size must be at least 1".into()));
        }
        if self.min_players == 0 || self.min_players > self.max_players {
            return Err(Error::Config(format!(
                "min_players ({}) must be between 1 and max_players ({})",
                self.min_players, self.max_players
            )));
        }
        if self.win_score == 0 {
            return Err(Error::Config("win_score must be at least 1".into()));
        }
        if self.submit_secs == 0 || self.vote_secs == 0 {
            return Err(Error::Config("phase countdowns must be at least 1 second".into()));
        }
        let intervals = [
            ("reveal_interval_ms", self.reveal_interval_ms),
            ("host_grace_ms", self.host_grace_ms),
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("stale_after_secs", self.stale_after_secs),
            ("retention_secs", self.retention_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(Error::Config(format!("{name} must be greater than zero")));
        }
        Ok(())
    }

    pub fn reveal_interval(&self) -> Duration {
        Duration::from_millis(self.reveal_interval_ms)
    }

    pub fn voting_pause(&self) -> Duration {
        Duration::from_millis(self.voting_pause_ms)
    }

    pub fn empty_round_pause(&self) -> Duration {
        Duration::from_millis(self.empty_round_pause_ms)
    }

    pub fn results_pause(&self) -> Duration {
        Duration::from_millis(self.results_pause_ms)
    }

    pub fn host_grace(&self) -> Duration {
        Duration::from_millis(self.host_grace_ms)
    }

    pub fn host_close_delay(&self) -> Duration {
        Duration::from_millis(self.host_close_delay_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_secs as i64)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retention_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GameConfig::default();
        assert_eq!(config.hand_size, 6);
        assert_eq!(config.max_players, 8);
        assert_eq!(config.win_score, 7);
        assert_eq!(config.host_grace(), Duration::from_secs(8));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = GameConfig::from_toml("win_score = 3\nsubmit_secs = 10\n").unwrap();
        assert_eq!(config.win_score, 3);
        assert_eq!(config.submit_secs, 10);
        assert_eq!(config.vote_secs, 20);
    }

    #[test]
    fn test_invalid_rejected() {
        assert!(GameConfig::from_toml("min_players = 9").is_err());
        assert!(GameConfig::from_toml("hand_size = 0").is_err());
        assert!(GameConfig::from_toml("win_score = \"seven\"").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        for field in [
            "reveal_interval_ms",
            "host_grace_ms",
            "sweep_interval_secs",
            "stale_after_secs",
            "retention_secs",
        ] {
            let err = GameConfig::from_toml(&format!("{field} = 0")).unwrap_err();
            assert!(err.to_string().contains(field), "{field}: {err}");
        }

        // Pauses between phases may be zero
        let config = GameConfig::from_toml("voting_pause_ms = 0\nresults_pause_ms = 0").unwrap();
        assert_eq!(config.voting_pause_ms, 0);
    }
}

use std::{env, time::Duration};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Timing of the presence and spin protocol.
///
/// Every client in a room should use the same values, otherwise they will
/// disagree about which rooms and players are active.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// A room is active while any player has a heartbeat younger than this
    pub freshness_window: Duration,
    /// Players whose heartbeat is older than this are pruned from the room
    pub stale_after: Duration,
    /// How often a joined client refreshes its heartbeat
    pub heartbeat_interval: Duration,
    /// How long a client waits after joining before writing its first heartbeat
    pub settle_delay: Duration,
    /// Rooms younger than this are never deleted for being empty
    pub creation_grace: Duration,
    /// Full turns added to every spin animation
    pub spin_turns: u32,
    /// How long a spin animation lasts
    pub spin_duration: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{variable} must be a whole number, got {value:?}")]
    NotANumber {
        variable: &'static str,
        value: String,
    },
    #[error("{variable} is too large, got {value}")]
    TooLarge { variable: &'static str, value: u64 },
}

impl Config {
    /// Reads overrides from `WHEELSYNC_*` environment variables, falling back
    /// to the defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            freshness_window: read_duration("WHEELSYNC_FRESHNESS_SECS", Duration::from_secs)?
                .unwrap_or(defaults.freshness_window),
            stale_after: read_duration("WHEELSYNC_STALE_SECS", Duration::from_secs)?
                .unwrap_or(defaults.stale_after),
            heartbeat_interval: read_duration("WHEELSYNC_HEARTBEAT_SECS", Duration::from_secs)?
                .unwrap_or(defaults.heartbeat_interval),
            settle_delay: read_duration("WHEELSYNC_SETTLE_MS", Duration::from_millis)?
                .unwrap_or(defaults.settle_delay),
            creation_grace: read_duration("WHEELSYNC_CREATION_GRACE_MS", Duration::from_millis)?
                .unwrap_or(defaults.creation_grace),
            spin_turns: read_number("WHEELSYNC_SPIN_TURNS")?
                .map(|turns| narrow("WHEELSYNC_SPIN_TURNS", turns))
                .transpose()?
                .unwrap_or(defaults.spin_turns),
            spin_duration: read_duration("WHEELSYNC_SPIN_MS", Duration::from_millis)?
                .unwrap_or(defaults.spin_duration),
        })
    }

    /// Returns true if a heartbeat still counts as presence
    pub fn is_fresh(&self, heartbeat: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        elapsed(heartbeat, now) < self.freshness_window
    }

    /// Returns true if a heartbeat is old enough to be pruned
    pub fn is_stale(&self, heartbeat: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        elapsed(heartbeat, now) > self.stale_after
    }

    /// Returns true if a room created at `created_at` is past its grace period
    pub fn is_settled(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        elapsed(created_at, now) > self.creation_grace
    }

    /// The angle a spin animation starts its final approach from
    pub fn spin_offset(&self) -> f64 {
        self.spin_turns as f64 * 360.
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_secs(30 * 60),
            stale_after: Duration::from_secs(10 * 60),
            heartbeat_interval: Duration::from_secs(5 * 60),
            settle_delay: Duration::from_millis(500),
            creation_grace: Duration::from_secs(1),
            spin_turns: 10,
            spin_duration: Duration::from_secs(2),
        }
    }
}

/// Time between two instants. Timestamps from the future count as zero.
pub fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or_default()
}

fn read_number(variable: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(variable) {
        Err(_) => Ok(None),
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::NotANumber { variable, value }),
    }
}

fn narrow(variable: &'static str, value: u64) -> Result<u32, ConfigError> {
    u32::try_from(value).map_err(|_| ConfigError::TooLarge { variable, value })
}

fn read_duration(
    variable: &'static str,
    unit: fn(u64) -> Duration,
) -> Result<Option<Duration>, ConfigError> {
    Ok(read_number(variable)?.map(unit))
}

#[cfg(test)]
mod tests {
    use chrono::Duration as TimeDelta;

    use super::*;

    #[test]
    fn freshness_boundaries() {
        let config = Config::default();
        let now = Utc::now();

        assert!(config.is_fresh(now - TimeDelta::minutes(29), now));
        assert!(!config.is_fresh(now - TimeDelta::minutes(30), now));
        assert!(config.is_fresh(now + TimeDelta::minutes(1), now));

        assert!(!config.is_stale(now - TimeDelta::minutes(10), now));
        assert!(config.is_stale(now - TimeDelta::minutes(11), now));

        assert!(!config.is_settled(now - TimeDelta::milliseconds(1000), now));
        assert!(config.is_settled(now - TimeDelta::milliseconds(1001), now));
    }

    #[test]
    fn oversized_turns_are_rejected() {
        assert_eq!(narrow("WHEELSYNC_SPIN_TURNS", 12).unwrap(), 12);
        assert!(matches!(
            narrow("WHEELSYNC_SPIN_TURNS", u32::MAX as u64 + 1),
            Err(ConfigError::TooLarge { value, .. }) if value == 4_294_967_296
        ));
    }

    #[test]
    fn reads_overrides_from_env() {
        env::set_var("WHEELSYNC_HEARTBEAT_SECS", "60");
        let config = Config::from_env().unwrap();
        env::remove_var("WHEELSYNC_HEARTBEAT_SECS");

        assert_eq!(config.heartbeat_interval, Duration::from_secs(60));
        assert_eq!(config.stale_after, Config::default().stale_after);
    }
}

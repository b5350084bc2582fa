use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use crate::platform::ScanRequest;
use crate::resolution::ResolutionPolicy;
use crate::resolution_manager::Schedule;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanConfig {
    #[serde(flatten)]
    pub request: ScanRequest,
    /// Restrict mDNS to one interface
    pub interface: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolutionConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// 0 frees the slot as soon as a terminal event arrives
    #[serde(default)]
    pub finalize_delay_ms: u64,
    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_watchdog_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold_secs: u64,
    #[serde(default = "default_true")]
    pub restart_on_stall: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackfillConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_backfill_interval")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_tick_interval() -> u64 {
    500
}

fn default_resolve_timeout() -> u64 {
    5000
}

fn default_watchdog_interval() -> u64 {
    10
}

fn default_stall_threshold() -> u64 {
    20
}

fn default_backfill_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_listen() -> String {
    "[::]:8054".to_string()
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            finalize_delay_ms: 0,
            resolve_timeout_ms: default_resolve_timeout(),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_watchdog_interval(),
            stall_threshold_secs: default_stall_threshold(),
            restart_on_stall: true,
        }
    }
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_backfill_interval(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.resolution.tick_interval_ms == 0 {
            bail!("resolution.tick_interval_ms must be greater than zero");
        }
        if self.resolution.resolve_timeout_ms == 0 {
            bail!("resolution.resolve_timeout_ms must be greater than zero");
        }
        if self.watchdog.interval_secs == 0 {
            bail!("watchdog.interval_secs must be greater than zero");
        }
        if self.backfill.enabled && self.backfill.interval_secs == 0 {
            bail!("backfill.interval_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn policy(&self) -> ResolutionPolicy {
        ResolutionPolicy {
            finalize_delay: Duration::from_millis(self.resolution.finalize_delay_ms),
            stall_threshold: Duration::from_secs(self.watchdog.stall_threshold_secs),
        }
    }

    pub fn schedule(&self) -> Schedule {
        Schedule {
            resolve_tick: Duration::from_millis(self.resolution.tick_interval_ms),
            watchdog_tick: Duration::from_secs(self.watchdog.interval_secs),
            backfill_tick: self
                .backfill
                .enabled
                .then(|| Duration::from_secs(self.backfill.interval_secs)),
        }
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolution.resolve_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.scan.request, ScanRequest::default());
        assert!(config.scan.interface.is_none());
        assert_eq!(config.api.listen, "[::]:8054");

        let schedule = config.schedule();
        assert_eq!(schedule.resolve_tick, Duration::from_millis(500));
        assert_eq!(schedule.watchdog_tick, Duration::from_secs(10));
        assert_eq!(schedule.backfill_tick, Some(Duration::from_secs(60)));
        assert_eq!(config.policy(), ResolutionPolicy::default());
        assert!(config.watchdog.restart_on_stall);
    }

    #[test]
    fn test_full_file() {
        let config = Config::parse(
            r#"
            [scan]
            type = "mqtt"
            protocol = "tcp"
            domain = "local."
            interface = "eth0"

            [resolution]
            tick_interval_ms = 1000
            finalize_delay_ms = 1000

            [watchdog]
            stall_threshold_secs = 30
            restart_on_stall = false

            [backfill]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.scan.request.to_service_string(), "_mqtt._tcp.local.");
        assert_eq!(config.scan.interface.as_deref(), Some("eth0"));
        assert_eq!(config.policy().finalize_delay, Duration::from_secs(1));
        assert_eq!(config.policy().stall_threshold, Duration::from_secs(30));
        assert!(!config.watchdog.restart_on_stall);
        assert!(config.schedule().backfill_tick.is_none());
    }

    #[test]
    fn test_zero_tick_rejected() {
        let err = Config::parse("[resolution]\ntick_interval_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("tick_interval_ms"));
    }

    #[test]
    fn test_zero_backfill_allowed_when_disabled() {
        assert!(Config::parse("[backfill]\nenabled = false\ninterval_secs = 0\n").is_ok());
        assert!(Config::parse("[backfill]\ninterval_secs = 0\n").is_err());
    }
}

//! Configuration inputs for a primary/secondary pair, loaded from a TOML
//! file the way `ferrex-server` loads its own config: `serde` for the
//! shape, `toml` for the format, one `Config::load` entry point.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;

/// `secondary_delay` is a grace interval in seconds, with one special
/// value: `-1` means "start active immediately."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryDelay {
    Seconds(u64),
    StartActiveImmediately,
}

impl SecondaryDelay {
    fn from_raw(raw: i64) -> Result<SecondaryDelay, Error> {
        match raw {
            -1 => Ok(SecondaryDelay::StartActiveImmediately),
            n if n >= 0 => Ok(SecondaryDelay::Seconds(n as u64)),
            n => Err(Error::fatal(format!(
                "secondary_delay must be -1 or non-negative, got {n}"
            ))),
        }
    }

    pub fn as_duration(self) -> Option<std::time::Duration> {
        match self {
            SecondaryDelay::Seconds(s) => Some(std::time::Duration::from_secs(s)),
            SecondaryDelay::StartActiveImmediately => None,
        }
    }
}

/// Operator policy for clean primary shutdown: whether the primary tells
/// the secondary to go down entirely or just go passive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    Shutdown,
    GoInactive,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    pbs_primary: String,
    pbs_secondary: String,
    secondary_delay: i64,
    auth_method: String,
    pbs_home_path: PathBuf,
    #[serde(default = "default_port")]
    pbs_server_port_dis: u16,
    #[serde(default = "default_shutdown_policy")]
    shutdown_policy: ShutdownPolicy,
}

fn default_port() -> u16 {
    crate::DEFAULT_FAILOVER_PORT
}

fn default_shutdown_policy() -> ShutdownPolicy {
    ShutdownPolicy::Shutdown
}

/// The core configuration inputs for a primary/secondary pair, plus
/// `shutdown_policy`, the operator's policy for clean primary shutdown.
#[derive(Debug, Clone)]
pub struct Config {
    pub pbs_primary: String,
    pub pbs_secondary: String,
    pub secondary_delay: SecondaryDelay,
    pub auth_method: String,
    pub pbs_home_path: PathBuf,
    pub pbs_server_port_dis: u16,
    pub shutdown_policy: ShutdownPolicy,
}

impl Config {
    /// Loads and validates configuration from a TOML file. Any I/O or
    /// parse failure is a fatal misconfiguration.
    pub async fn load(path: impl AsRef<Path>) -> Result<Config, Error> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::fatal(format!("cannot read config {}: {e}", path.display())))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Config, Error> {
        let raw: RawConfig =
            toml::from_str(text).map_err(|e| Error::fatal(format!("invalid config: {e}")))?;

        Ok(Config {
            pbs_primary: raw.pbs_primary,
            pbs_secondary: raw.pbs_secondary,
            secondary_delay: SecondaryDelay::from_raw(raw.secondary_delay)?,
            auth_method: raw.auth_method,
            pbs_home_path: raw.pbs_home_path,
            pbs_server_port_dis: raw.pbs_server_port_dis,
            shutdown_policy: raw.shutdown_policy,
        })
    }

    /// `<priv>` is `$pbs_home_path/server_priv`, matching the filesystem
    /// surface's `<priv>/...` paths.
    pub fn priv_dir(&self) -> PathBuf {
        self.pbs_home_path.join("server_priv")
    }

    pub fn primary_addr(&self) -> String {
        format!("{}:{}", self.pbs_primary, self.pbs_server_port_dis)
    }

    pub fn secondary_addr(&self) -> String {
        format!("{}:{}", self.pbs_secondary, self.pbs_server_port_dis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let cfg = Config::parse(
            r#"
            pbs_primary = "sched-a"
            pbs_secondary = "sched-b"
            secondary_delay = 30
            auth_method = "munge"
            pbs_home_path = "/var/spool/pbs"
            pbs_server_port_dis = 15001
            "#,
        )
        .unwrap();
        assert_eq!(cfg.secondary_delay, SecondaryDelay::Seconds(30));
        assert_eq!(cfg.shutdown_policy, ShutdownPolicy::Shutdown);
        assert_eq!(cfg.priv_dir(), PathBuf::from("/var/spool/pbs/server_priv"));
    }

    #[test]
    fn secondary_delay_of_negative_one_means_start_active() {
        let cfg = Config::parse(
            r#"
            pbs_primary = "sched-a"
            pbs_secondary = "sched-b"
            secondary_delay = -1
            auth_method = "munge"
            pbs_home_path = "/var/spool/pbs"
            pbs_server_port_dis = 15001
            "#,
        )
        .unwrap();
        assert_eq!(cfg.secondary_delay, SecondaryDelay::StartActiveImmediately);
        assert!(cfg.secondary_delay.as_duration().is_none());
    }

    #[test]
    fn secondary_delay_below_negative_one_is_fatal() {
        let err = SecondaryDelay::from_raw(-2).unwrap_err();
        assert!(matches!(err, Error::Fatal(_)));
    }

    #[test]
    fn missing_port_falls_back_to_default() {
        let cfg = Config::parse(
            r#"
            pbs_primary = "sched-a"
            pbs_secondary = "sched-b"
            secondary_delay = 30
            auth_method = "munge"
            pbs_home_path = "/var/spool/pbs"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.pbs_server_port_dis, crate::DEFAULT_FAILOVER_PORT);
    }
}

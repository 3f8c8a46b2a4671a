//! Configuration for the agent.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use drover_reconcile::config::{DEFAULT_HOST_PROBE_TIMEOUT, DEFAULT_SCHEDULER_THREADS};
use drover_reconcile::ScannerSettings;

/// Scanners that can be enabled through `DROVER_SCANNERS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScannerKind {
    Status,
    Deploy,
    Kill,
    Remove,
}

impl std::str::FromStr for ScannerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "status" => Ok(Self::Status),
            "deploy" | "auto-deploy" => Ok(Self::Deploy),
            "kill" | "auto-kill" => Ok(Self::Kill),
            "remove" | "auto-remove" => Ok(Self::Remove),
            other => bail!("unknown scanner '{other}'"),
        }
    }
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the managed application.
    pub application: String,

    /// Command that starts one instance of the application.
    pub launch_command: String,

    /// Number of local instances to manage.
    pub instances: usize,

    /// Scanners to start enabled.
    pub scanners: Vec<ScannerKind>,

    /// Worker threads for the scheduler runtime.
    pub scheduler_threads: usize,

    pub status: ScannerSettings,
    pub deploy: ScannerSettings,
    pub kill: ScannerSettings,
    pub remove: ScannerSettings,

    /// Bound on the status scanner's host round trip.
    pub host_probe_timeout: Duration,

    /// Stop after this long instead of waiting for Ctrl-C.
    pub run_for: Option<Duration>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let application = lookup("DROVER_APPLICATION").unwrap_or_else(|| "app".to_string());

        let launch_command =
            lookup("DROVER_LAUNCH_COMMAND").unwrap_or_else(|| "sleep 3600".to_string());
        if launch_command.trim().is_empty() {
            bail!("DROVER_LAUNCH_COMMAND must not be empty");
        }

        let instances = parse_or(&lookup, "DROVER_INSTANCES", 1usize)?;

        let scanners = match lookup("DROVER_SCANNERS") {
            Some(list) => list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse)
                .collect::<Result<Vec<_>>>()
                .context("invalid DROVER_SCANNERS")?,
            None => vec![ScannerKind::Status, ScannerKind::Deploy, ScannerKind::Remove],
        };

        let scheduler_threads =
            parse_or(&lookup, "DROVER_SCHEDULER_THREADS", DEFAULT_SCHEDULER_THREADS)?.max(1);

        let scan_timeout = parse_opt::<u64, _>(&lookup, "DROVER_SCAN_TIMEOUT_SECS")?
            .map(Duration::from_secs);
        let settings = |base: ScannerSettings, delay_key: &str| -> Result<ScannerSettings> {
            let mut settings = base;
            if let Some(ms) = parse_opt::<u64, _>(&lookup, delay_key)? {
                settings = settings.with_cycle_delay(Duration::from_millis(ms));
            }
            if let Some(timeout) = scan_timeout {
                settings = settings.with_scan_timeout(timeout);
            }
            Ok(settings)
        };

        let status = settings(ScannerSettings::status(), "DROVER_STATUS_INTERVAL_MS")?;
        let deploy = settings(ScannerSettings::auto_deploy(), "DROVER_DEPLOY_INTERVAL_MS")?;
        let kill = settings(ScannerSettings::auto_kill(), "DROVER_KILL_INTERVAL_MS")?;
        let remove = settings(ScannerSettings::auto_remove(), "DROVER_REMOVE_INTERVAL_MS")?;

        let host_probe_timeout = parse_opt::<u64, _>(&lookup, "DROVER_HOST_PROBE_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HOST_PROBE_TIMEOUT);

        let run_for = parse_opt::<u64, _>(&lookup, "DROVER_RUN_SECS")?.map(Duration::from_secs);

        let log_level = lookup("DROVER_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            application,
            launch_command,
            instances,
            scanners,
            scheduler_threads,
            status,
            deploy,
            kill,
            remove,
            host_probe_timeout,
            run_for,
            log_level,
        })
    }

    /// True if `kind` is in `DROVER_SCANNERS`.
    pub fn scanner_enabled(&self, kind: ScannerKind) -> bool {
        self.scanners.contains(&kind)
    }
}

fn parse_opt<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("invalid {key}: '{raw}'")))
        .transpose()
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.application, "app");
        assert_eq!(config.instances, 1);
        assert_eq!(config.scheduler_threads, DEFAULT_SCHEDULER_THREADS);
        assert!(config.scanner_enabled(ScannerKind::Status));
        assert!(config.scanner_enabled(ScannerKind::Deploy));
        assert!(!config.scanner_enabled(ScannerKind::Kill));
        assert_eq!(config.status, ScannerSettings::status());
        assert!(config.run_for.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DROVER_INSTANCES", "3"),
            ("DROVER_SCANNERS", "status, auto-kill"),
            ("DROVER_STATUS_INTERVAL_MS", "250"),
            ("DROVER_SCAN_TIMEOUT_SECS", "7"),
            ("DROVER_RUN_SECS", "30"),
        ])
        .unwrap();

        assert_eq!(config.instances, 3);
        assert_eq!(config.scanners, vec![ScannerKind::Status, ScannerKind::Kill]);
        assert_eq!(config.status.cycle_delay, Duration::from_millis(250));
        assert_eq!(config.kill.scan_timeout, Duration::from_secs(7));
        assert_eq!(config.deploy.cycle_delay, ScannerSettings::auto_deploy().cycle_delay);
        assert_eq!(config.run_for, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&[("DROVER_INSTANCES", "many")]).is_err());
        assert!(load(&[("DROVER_SCANNERS", "status,teleport")]).is_err());
        assert!(load(&[("DROVER_LAUNCH_COMMAND", "  ")]).is_err());
    }
}

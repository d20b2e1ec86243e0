use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::controller::ControllerConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub workers: usize,
    pub resync_interval: Duration,
    pub manifest_dir: Option<PathBuf>,
    pub namespace: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let log_level = lookup("STATICPAGE_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let workers: usize = lookup("STATICPAGE_WORKERS")
            .unwrap_or_else(|| "2".to_string())
            .parse()
            .context("STATICPAGE_WORKERS must be a positive integer")?;
        if workers == 0 {
            bail!("STATICPAGE_WORKERS must be at least 1");
        }

        let resync_secs: u64 = lookup("STATICPAGE_RESYNC_INTERVAL_SECS")
            .unwrap_or_else(|| "30".to_string())
            .parse()
            .context("STATICPAGE_RESYNC_INTERVAL_SECS must be a number of seconds")?;
        if resync_secs == 0 {
            bail!("STATICPAGE_RESYNC_INTERVAL_SECS must be at least 1");
        }

        let manifest_dir = lookup("STATICPAGE_MANIFEST_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let namespace = lookup("STATICPAGE_NAMESPACE").unwrap_or_else(|| "default".to_string());

        Ok(Self {
            log_level,
            workers,
            resync_interval: Duration::from_secs(resync_secs),
            manifest_dir,
            namespace,
        })
    }

    pub fn controller(&self) -> ControllerConfig {
        ControllerConfig {
            workers: self.workers,
            resync_interval: self.resync_interval,
            ..ControllerConfig::default()
        }
    }
}

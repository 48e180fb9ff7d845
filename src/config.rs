// Runtime configuration from the environment

use anyhow::{anyhow, bail, Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::seed_data::SeedData;

pub const ENV_DATABASE_URL: &str = "DASHBOARD_DATABASE_URL";
pub const ENV_SERVICE_KEY: &str = "DASHBOARD_SERVICE_KEY";
pub const ENV_ANON_KEY: &str = "DASHBOARD_ANON_KEY";
pub const ENV_BIND_ADDR: &str = "DASHBOARD_BIND_ADDR";
pub const ENV_SEED_DIR: &str = "DASHBOARD_SEED_DIR";
pub const ENV_TRANSACTIONAL: &str = "DASHBOARD_TRANSACTIONAL";
pub const ENV_SEED_TIMEOUT: &str = "DASHBOARD_SEED_TIMEOUT_SECS";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_SEED_TIMEOUT_SECS: u64 = 30;

/// Access credential for the data store.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Service(String),
    Anon(String),
}

impl Credential {
    pub fn role(&self) -> &'static str {
        match self {
            Credential::Service(_) => "service",
            Credential::Anon(_) => "anon",
        }
    }
}

// Keys must not leak into logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential::{}(***)", self.role())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub credential: Credential,
    pub bind_addr: String,
    pub seed_dir: Option<PathBuf>,
    pub transactional: bool,
    pub seed_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get(ENV_DATABASE_URL)
            .ok_or_else(|| anyhow!("{} must be set", ENV_DATABASE_URL))?;

        let credential = match (get(ENV_SERVICE_KEY), get(ENV_ANON_KEY)) {
            (Some(key), _) => Credential::Service(key),
            (None, Some(key)) => Credential::Anon(key),
            (None, None) => bail!("one of {} or {} must be set", ENV_SERVICE_KEY, ENV_ANON_KEY),
        };

        let transactional = match get(ENV_TRANSACTIONAL) {
            None => true,
            Some(raw) => parse_bool(&raw)
                .with_context(|| format!("{} must be true or false, got `{}`", ENV_TRANSACTIONAL, raw))?,
        };

        let seed_timeout = match get(ENV_SEED_TIMEOUT) {
            None => Duration::from_secs(DEFAULT_SEED_TIMEOUT_SECS),
            Some(raw) => Duration::from_secs(
                raw.parse()
                    .with_context(|| format!("{} must be whole seconds, got `{}`", ENV_SEED_TIMEOUT, raw))?,
            ),
        };

        Ok(Config {
            database_url,
            credential,
            bind_addr: get(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            seed_dir: get(ENV_SEED_DIR).map(PathBuf::from),
            transactional,
            seed_timeout,
        })
    }

    /// Seed datasets: CSV files when a seed directory is configured,
    /// otherwise the built-in demo set.
    pub fn seed_data(&self) -> Result<SeedData> {
        match &self.seed_dir {
            Some(dir) => SeedData::from_csv_dir(dir),
            None => Ok(SeedData::builtin()),
        }
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("not a boolean"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[(ENV_DATABASE_URL, "sqlite::memory:"), (ENV_ANON_KEY, "anon")]).unwrap();

        assert_eq!(cfg.bind_addr, "0.0.0.0:3000");
        assert!(cfg.transactional);
        assert_eq!(cfg.seed_timeout, Duration::from_secs(30));
        assert_eq!(cfg.seed_dir, None);
        assert_eq!(cfg.credential, Credential::Anon("anon".into()));
    }

    #[test]
    fn test_service_key_takes_precedence() {
        let cfg = config(&[
            (ENV_DATABASE_URL, "sqlite::memory:"),
            (ENV_ANON_KEY, "anon"),
            (ENV_SERVICE_KEY, "service"),
        ])
        .unwrap();

        assert_eq!(cfg.credential, Credential::Service("service".into()));
    }

    #[test]
    fn test_blank_service_key_falls_back_to_anon() {
        let cfg = config(&[
            (ENV_DATABASE_URL, "sqlite::memory:"),
            (ENV_SERVICE_KEY, "  "),
            (ENV_ANON_KEY, "anon"),
        ])
        .unwrap();
        assert_eq!(cfg.credential.role(), "anon");
    }

    #[test]
    fn test_missing_url_or_credential() {
        let err = config(&[(ENV_ANON_KEY, "anon")]).unwrap_err();
        assert!(err.to_string().contains(ENV_DATABASE_URL));

        let err = config(&[(ENV_DATABASE_URL, "sqlite::memory:")]).unwrap_err();
        assert!(err.to_string().contains(ENV_SERVICE_KEY));
    }

    #[test]
    fn test_parses_flags() {
        let cfg = config(&[
            (ENV_DATABASE_URL, "dash.db"),
            (ENV_SERVICE_KEY, "k"),
            (ENV_TRANSACTIONAL, "off"),
            (ENV_SEED_TIMEOUT, "5"),
            (ENV_SEED_DIR, "/srv/seed"),
        ])
        .unwrap();

        assert!(!cfg.transactional);
        assert_eq!(cfg.seed_timeout, Duration::from_secs(5));
        assert_eq!(cfg.seed_dir, Some(PathBuf::from("/srv/seed")));

        assert!(config(&[
            (ENV_DATABASE_URL, "dash.db"),
            (ENV_SERVICE_KEY, "k"),
            (ENV_TRANSACTIONAL, "maybe"),
        ])
        .is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let shown = format!("{:?}", Credential::Service("sk-live-123".into()));
        assert!(!shown.contains("sk-live-123"));
    }
}

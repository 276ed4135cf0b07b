// ABOUTME: Configuration types and parsing for remote-grep.yml.
// ABOUTME: Resolves an environment.label.file selector into a run plan.

mod selector;
mod server;

pub use selector::Selector;
pub use server::HostEntry;

use crate::error::{Error, Result};
use crate::fleet::{RunOptions, RunPlan};
use crate::grep::FilterSpec;
use crate::ssh::HostTarget;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "remote-grep.yml";
pub const CONFIG_FILENAME_ALT: &str = "remote-grep.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".remote-grep/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub environments: HashMap<String, Environment>,
}

/// Credentials, host groups and log files shared by one environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Environment {
    pub user: String,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_trust_first_connection")]
    pub trust_first_connection: bool,

    #[serde(default)]
    pub known_hosts_path: Option<PathBuf>,

    #[serde(default, with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,

    #[serde(default)]
    pub max_concurrent_connects: Option<usize>,

    /// Host groups by label.
    #[serde(default)]
    pub labels: HashMap<String, Vec<HostEntry>>,

    /// Absolute remote paths by file name.
    #[serde(default)]
    pub files: HashMap<String, String>,
}

fn default_port() -> u16 {
    22
}

fn default_trust_first_connection() -> bool {
    true
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!("loading configuration from {}", path.display());
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        for (name, env) in &self.environments {
            if env.user.trim().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "environment '{name}' has an empty user"
                )));
            }
            if env.max_concurrent_connects == Some(0) {
                return Err(Error::InvalidConfig(format!(
                    "environment '{name}': max_concurrent_connects must be at least 1"
                )));
            }
        }
        Ok(())
    }

    /// Resolve `selector` and the search terms into everything a run needs.
    ///
    /// A label with no hosts yields a plan with no hosts.
    pub fn plan(&self, selector: &Selector, terms: Vec<String>) -> Result<RunPlan> {
        let env = self
            .environments
            .get(&selector.environment)
            .ok_or_else(|| Error::UnknownEnvironment(selector.environment.clone()))?;

        let entries = env
            .labels
            .get(&selector.label)
            .ok_or_else(|| Error::UnknownLabel {
                environment: selector.environment.clone(),
                label: selector.label.clone(),
            })?;

        let file = env.files.get(&selector.file).ok_or_else(|| Error::UnknownFile {
            environment: selector.environment.clone(),
            file: selector.file.clone(),
        })?;

        let spec = FilterSpec::new(terms, file.as_str())?;
        let hosts = entries.iter().map(|entry| env.target_for(entry)).collect();

        Ok(RunPlan {
            hosts,
            spec,
            options: RunOptions {
                max_concurrent_connects: env.max_concurrent_connects,
                ..RunOptions::default()
            },
        })
    }
}

impl Environment {
    fn target_for(&self, entry: &HostEntry) -> HostTarget {
        let mut target = HostTarget::new(&entry.host, &self.user)
            .port(entry.port.unwrap_or(self.port))
            .trust_on_first_use(self.trust_first_connection);

        if let Some(password) = &self.password {
            target = target.password(password);
        }
        if let Some(path) = &self.private_key_path {
            target = target.key_path(expand_home(path));
        }
        if let Some(path) = &self.known_hosts_path {
            target = target.known_hosts_path(expand_home(path));
        }
        if let Some(timeout) = self.connect_timeout {
            target = target.connect_timeout(timeout);
        }
        target
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

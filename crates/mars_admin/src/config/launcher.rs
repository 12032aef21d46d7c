//! Per-invocation launcher configuration

use crate::config::env_file::{load_env_file, EnvFileError, ENV_FILE_NAME};
use crate::config::values::{ConfigValueError, ConfigValues, CONFIG_FILE_NAME};
use crate::runtime::DEFAULT_GRACE_PERIOD;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides the install directory (normally two levels above the binary)
pub const HOME_ENV: &str = "MARS_ADMIN_HOME";
/// Overrides the cluster conf dir (normally `<home>/conf`)
pub const CONF_DIR_ENV: &str = "MARS_ADMIN_CONF_DIR";
/// Liveness grace period in milliseconds
pub const GRACE_ENV: &str = "MARS_ADMIN_GRACE_MS";

/// Raw inputs the configuration is resolved from
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Process environment
    pub vars: HashMap<String, String>,
    /// Location of the running launcher binary
    pub exe_path: Option<PathBuf>,
    /// The user's home directory
    pub user_home: Option<PathBuf>,
    /// `-c key=value` overrides, in command-line order
    pub config_opts: Vec<String>,
    /// `--config` file
    pub conf_file: Option<String>,
}

impl ConfigSources {
    /// Snapshot the current process
    pub fn from_process(config_opts: Vec<String>, conf_file: Option<String>) -> Self {
        Self {
            vars: std::env::vars().collect(),
            exe_path: std::env::current_exe()
                .and_then(|p| p.canonicalize())
                .ok(),
            user_home: dirs::home_dir(),
            config_opts,
            conf_file,
        }
    }
}

/// Everything the commands need, resolved once and passed by reference
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Install directory holding `bin/`, `lib/`, `conf/`
    pub home: PathBuf,
    /// Directory with the cluster-wide configuration
    pub cluster_conf_dir: PathBuf,
    /// `~/.mars` when it holds a config file, otherwise the cluster conf dir
    pub user_conf_dir: PathBuf,
    /// Directory with the service jars
    pub lib_dir: PathBuf,
    /// Variables from the environment file, injected into every child
    pub env: IndexMap<String, String>,
    /// Java executable
    pub java_cmd: String,
    /// `-c key=value` overrides
    pub config_opts: Vec<String>,
    /// `--config` file, empty when not given
    pub conf_file: String,
    /// How long a launched child must survive to count as started
    pub grace_period: Duration,
    /// Where the PID of the launched service is recorded
    pub pid_file: PathBuf,
    vars: HashMap<String, String>,
}

impl LauncherConfig {
    /// Resolve the configuration for this process
    pub fn resolve(config_opts: Vec<String>, conf_file: Option<String>) -> Result<Self, ConfigError> {
        Self::from_sources(ConfigSources::from_process(config_opts, conf_file))
    }

    pub fn from_sources(sources: ConfigSources) -> Result<Self, ConfigError> {
        let ConfigSources {
            vars,
            exe_path,
            user_home,
            config_opts,
            conf_file,
        } = sources;

        let home = match vars.get(HOME_ENV) {
            Some(home) => PathBuf::from(home),
            None => exe_path
                .as_deref()
                .and_then(|exe| exe.parent()?.parent())
                .map(Path::to_path_buf)
                .ok_or(ConfigError::UnknownHome)?,
        };

        let cluster_conf_dir = vars
            .get(CONF_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("conf"));

        let user_conf_dir = user_home
            .map(|h| h.join(".mars"))
            .filter(|dir| dir.join(CONFIG_FILE_NAME).is_file())
            .unwrap_or_else(|| cluster_conf_dir.clone());

        let env = load_env_file(&cluster_conf_dir.join(ENV_FILE_NAME))?;

        let mut config = Self {
            lib_dir: home.join("lib"),
            pid_file: home.join("logs").join("mars.pid"),
            home,
            cluster_conf_dir,
            user_conf_dir,
            env,
            java_cmd: String::new(),
            config_opts,
            conf_file: conf_file.unwrap_or_default(),
            grace_period: DEFAULT_GRACE_PERIOD,
            vars,
        };

        config.java_cmd = config.resolve_java()?;
        config.grace_period = config.resolve_grace_period()?;

        if !config.lib_dir.exists() {
            return Err(ConfigError::NotARelease(config.lib_dir.clone()));
        }

        log::debug!(
            "Resolved home={} conf={} java={}",
            config.home.display(),
            config.cluster_conf_dir.display(),
            config.java_cmd
        );
        Ok(config)
    }

    /// Look up a variable, preferring the environment file over the process
    pub fn var(&self, name: &str) -> Option<&str> {
        self.env
            .get(name)
            .or_else(|| self.vars.get(name))
            .map(String::as_str)
    }

    /// Environment handed to spawned children on top of the inherited one
    pub fn child_env(&self) -> HashMap<String, String> {
        self.env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn resolve_java(&self) -> Result<String, ConfigError> {
        let Some(java_home) = self.var("JAVA_HOME").filter(|h| !h.is_empty()) else {
            return Ok("java".to_string());
        };

        let java = Path::new(java_home).join("bin").join(java_binary_name());
        if !java.exists() {
            return Err(ConfigError::InvalidJavaHome(java_home.to_string()));
        }
        Ok(java.to_string_lossy().into_owned())
    }

    fn resolve_grace_period(&self) -> Result<Duration, ConfigError> {
        match self.var(GRACE_ENV) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidValue {
                    name: GRACE_ENV.to_string(),
                    value: raw.to_string(),
                }),
            None => Ok(DEFAULT_GRACE_PERIOD),
        }
    }

    /// `-Dmars.admin.options=` with every override form-encoded
    pub fn config_opts_flag(&self) -> String {
        let encoded: Vec<String> = self.config_opts.iter().map(|o| quote_plus(o)).collect();
        format!("-Dmars.admin.options={}", encoded.join(","))
    }

    /// `--config` file as a path, if one was given
    pub fn conf_file_path(&self) -> Option<&Path> {
        (!self.conf_file.is_empty()).then(|| Path::new(&self.conf_file))
    }

    /// Merged configuration values as seen from `dir`
    pub fn values(&self, dir: &Path) -> Result<ConfigValues, ConfigError> {
        Ok(ConfigValues::load(
            dir,
            self.conf_file_path(),
            &self.config_opts,
        )?)
    }

    /// Single configuration value as seen from `dir`
    pub fn value(&self, name: &str, dir: &Path) -> Result<Option<String>, ConfigError> {
        Ok(self.values(dir)?.get(name))
    }
}

fn java_binary_name() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

/// Form encoding: reserved characters percent-encoded, spaces as `+`
fn quote_plus(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

/// Errors resolving the launcher configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot determine the install directory; set {}", HOME_ENV)]
    UnknownHome,

    #[error("JAVA_HOME is invalid.  Could not find bin/java at {0}.")]
    InvalidJavaHome(String),

    #[error("Not running from within a release: {} does not exist", .0.display())]
    NotARelease(PathBuf),

    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: String, value: String },

    #[error("Environment file error: {0}")]
    EnvFile(#[from] EnvFileError),

    #[error(transparent)]
    Values(#[from] ConfigValueError),
}

//! Command-line interface for mars_admin

use argh::FromArgs;

/// Launcher for the mars admin service
#[derive(FromArgs, Debug)]
pub struct LauncherArgs {
    /// override a configuration value (format: key=value), may be repeated
    #[argh(option, short = 'c', long = "conf", from_str_fn(parse_config_override))]
    pub config_opts: Vec<String>,

    /// configuration file handed to the service
    #[argh(option)]
    pub config: Option<String>,

    /// capture the child's output and relay it until it closes
    #[argh(switch)]
    pub attach: bool,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,

    /// command followed by its arguments
    #[argh(positional)]
    pub command: Vec<String>,
}

/// Parse a configuration override in format "key=value"
fn parse_config_override(s: &str) -> Result<String, String> {
    match s.split_once('=') {
        Some((key, _)) if !key.trim().is_empty() => Ok(s.to_string()),
        _ => Err(format!(
            "Invalid config override '{}'. Expected 'key=value'",
            s
        )),
    }
}

impl LauncherArgs {
    /// Log filter for env_logger, falling back to info
    pub fn log_filter(&self) -> &'static str {
        match self.log_level.to_lowercase().as_str() {
            "error" => "error",
            "warn" => "warn",
            "info" => "info",
            "debug" => "debug",
            "trace" => "trace",
            _ => "info",
        }
    }
}

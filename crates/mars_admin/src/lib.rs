//! Mars Admin Launcher
//!
//! Resolves configuration, builds the classpath and starts the JVM-based
//! mars admin service, optionally staying attached to its output.
//!
//! # Overview
//!
//! The launcher:
//! - Reads `mars_admin_env.ini` and the YAML configs from the release
//! - Splits option strings like `mars.admin.childopts` with bash-like quoting
//! - Spawns the JVM and records its PID
//! - Reports whether the child survived its grace period
//! - Drains captured output without ever blocking on a pipe
//!
//! # Example
//!
//! ```no_run
//! use mars_admin::runtime::{LaunchSpec, LivenessProbe, OutputMode, ProcessLauncher};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = LaunchSpec::new("java", mars_admin::tokenize("-Xmx1g -version")?)
//!     .with_output(OutputMode::Capture);
//! let mut handle = ProcessLauncher::new().spawn(&spec)?;
//! let liveness = LivenessProbe::default().probe(&mut handle).await?;
//! while let Some(line) = handle.stderr().and_then(|q| q.try_read()) {
//!     println!("{}: {}", line.source, line.text);
//! }
//! println!("{}", liveness);
//! # Ok(())
//! # }
//! ```

pub mod classpath;
pub mod cli;
pub mod commands;
pub mod config;
pub mod runtime;

pub use cli::LauncherArgs;
pub use commands::{dispatch, Command, CommandError, RunOptions};
pub use config::{ConfigError, LauncherConfig};
pub use runtime::{
    tokenize, LaunchError, LaunchSpec, LineQueue, Liveness, LivenessProbe, OutputLine,
    OutputMode, PidFile, ProcessHandle, ProcessLauncher, StreamDrainer, StreamError, StreamSource,
    TokenizeError,
};

//! Command dispatch and handlers

use crate::classpath::{build_classpath, ClasspathError};
use crate::config::{ConfigError, LauncherConfig};
use crate::runtime::{
    tokenize, LaunchError, LaunchSpec, LineQueue, LivenessProbe, OutputLine, OutputMode, PidFile,
    ProbeError, ProcessHandle, ProcessLauncher, StreamSource,
};
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::watch;

/// Main class of the admin service
pub const ADMIN_CLASS: &str = "com.jd.mars.admin.MarsAdmin";
/// Main class printing the release version
pub const VERSION_CLASS: &str = "com.jd.mars.admin.utils.VersionInfo";

/// Exit code for an unknown command
pub const EXIT_UNKNOWN_COMMAND: i32 = 254;
/// Exit code when no command is given
pub const EXIT_NO_COMMAND: i32 = -1;

/// Commands understood by the launcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Admin,
    Classpath,
    Help,
    LocalConfValue,
    RemoteConfValue,
    Version,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::Admin,
        Command::Classpath,
        Command::Help,
        Command::LocalConfValue,
        Command::RemoteConfValue,
        Command::Version,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Command::Admin => "admin",
            Command::Classpath => "classpath",
            Command::Help => "help",
            Command::LocalConfValue => "localconfvalue",
            Command::RemoteConfValue => "remoteconfvalue",
            Command::Version => "version",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Help text shown by `help <command>`
    pub fn usage(&self) -> &'static str {
        match self {
            Command::Admin => {
                "Syntax: [mars_admin admin [main-class]]\n\n\
                 Launches the admin daemon. This command should be run under\n\
                 supervision with a tool like daemontools or monit."
            }
            Command::Classpath => {
                "Syntax: [mars_admin classpath]\n\n\
                 Prints the classpath used by the launcher when running commands."
            }
            Command::Help => {
                "Syntax: [mars_admin help [command]]\n\n\
                 Prints the list of commands, or the help of one command."
            }
            Command::LocalConfValue => {
                "Syntax: [mars_admin localconfvalue conf-name]\n\n\
                 Prints out the value for conf-name in the local configs.\n\
                 The local configs are the ones in ~/.mars/mars-admin.yaml merged\n\
                 in with the configs in mars-defaults.yaml."
            }
            Command::RemoteConfValue => {
                "Syntax: [mars_admin remoteconfvalue conf-name]\n\n\
                 Prints out the value for conf-name in the cluster's configs.\n\
                 The cluster's configs are the ones in $MARS_ADMIN_HOME/conf/mars-admin.yaml\n\
                 merged in with the configs in mars-defaults.yaml.\n\n\
                 This command must be run on a cluster machine."
            }
            Command::Version => {
                "Syntax: [mars_admin version]\n\n\
                 Prints the version number of this release."
            }
        }
    }
}

/// Caller-selected launch behaviour
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Capture the child's output and relay it until both streams close
    pub attach: bool,
}

/// Run the command named by `words[0]` with the remaining words as arguments.
///
/// Returns the exit code the launcher should terminate with.
pub async fn dispatch(
    config: &LauncherConfig,
    options: RunOptions,
    words: &[String],
) -> Result<i32, CommandError> {
    let Some((name, args)) = words.split_first() else {
        print_usage(None);
        return Ok(EXIT_NO_COMMAND);
    };

    let Some(command) = Command::from_name(name) else {
        println!("Unknown command: [mars_admin {}]", words.join(" "));
        print_usage(None);
        return Ok(EXIT_UNKNOWN_COMMAND);
    };

    log::debug!("Dispatching '{}' with {:?}", command.name(), args);

    match command {
        Command::Admin => {
            let class = match args {
                [] => ADMIN_CLASS,
                [class] => class.as_str(),
                _ => return Err(CommandError::Usage(command)),
            };
            admin(config, options, class).await
        }
        Command::Version => {
            expect_args(command, args, 0)?;
            version(config, options).await
        }
        Command::LocalConfValue => {
            expect_args(command, args, 1)?;
            let value = config.value(&args[0], &config.user_conf_dir)?;
            println!("{}: {}", args[0], value.unwrap_or_default());
            Ok(0)
        }
        Command::RemoteConfValue => {
            expect_args(command, args, 1)?;
            let value = config.value(&args[0], &config.cluster_conf_dir)?;
            println!("{}: {}", args[0], value.unwrap_or_default());
            Ok(0)
        }
        Command::Classpath => {
            expect_args(command, args, 0)?;
            println!("{}", build_classpath(config, &[])?);
            Ok(0)
        }
        Command::Help => {
            match args {
                [] => print_usage(None),
                [name, ..] => print_usage(Some(name.as_str())),
            }
            Ok(0)
        }
    }
}

fn expect_args(command: Command, args: &[String], count: usize) -> Result<(), CommandError> {
    if args.len() == count {
        Ok(())
    } else {
        Err(CommandError::Usage(command))
    }
}

/// Print the command list, or the help of one command
pub fn print_usage(command: Option<&str>) {
    match command {
        Some(name) => match Command::from_name(name) {
            Some(command) => println!("{}", command.usage()),
            None => println!("<{}> is not a valid command", name),
        },
        None => print_commands(),
    }
}

fn print_commands() {
    let mut names: Vec<&str> = Command::ALL.iter().map(Command::name).collect();
    names.sort_unstable();
    println!("Commands:\n\t{}", names.join("\n\t"));
    println!("\nHelp: \n\thelp \n\thelp <command>");
    println!(
        "\nConfigs can be overridden using one or more -c flags, \
         e.g. \"mars_admin remoteconfvalue mars.admin.port -c mars.admin.port=9000\"\n"
    );
}

async fn admin(
    config: &LauncherConfig,
    options: RunOptions,
    class: &str,
) -> Result<i32, CommandError> {
    let cluster_conf = config.cluster_conf_dir.clone();
    let childopts = config
        .value("mars.admin.childopts", &cluster_conf)?
        .unwrap_or_default();

    // A broken childopts value drops only that value, not the launch
    let mut jvm_opts = match tokenize(&childopts) {
        Ok(opts) => opts,
        Err(e) => {
            log::error!("Ignoring mars.admin.childopts '{}': {}", childopts, e);
            Vec::new()
        }
    };
    jvm_opts.extend([
        "-Dlogfile.name=mars-admin.log".to_string(),
        "-DLog4jContextSelector=org.apache.logging.log4j.core.async.AsyncLoggerContextSelector"
            .to_string(),
        format!(
            "-Dlog4j.configurationFile={}",
            cluster_conf.join("mars-admin-log4j2.xml").display()
        ),
    ]);

    let launch = JavaLaunch {
        class: class.to_string(),
        jvm_type: "-server",
        jvm_opts,
        extra_classpath: vec![cluster_conf],
        args: Vec::new(),
    };
    exec_class(config, options, &launch).await
}

async fn version(config: &LauncherConfig, options: RunOptions) -> Result<i32, CommandError> {
    let launch = JavaLaunch {
        class: VERSION_CLASS.to_string(),
        jvm_type: "-client",
        jvm_opts: Vec::new(),
        extra_classpath: vec![config.cluster_conf_dir.clone()],
        args: Vec::new(),
    };
    exec_class(config, options, &launch).await
}

/// One JVM main class to run
#[derive(Debug, Clone)]
pub struct JavaLaunch {
    pub class: String,
    /// `-server` or `-client`
    pub jvm_type: &'static str,
    /// Options placed after the classpath, before the class
    pub jvm_opts: Vec<String>,
    pub extra_classpath: Vec<PathBuf>,
    /// Arguments after the class
    pub args: Vec<String>,
}

/// Full argument vector, starting with the java executable
pub fn java_command(
    config: &LauncherConfig,
    launch: &JavaLaunch,
) -> Result<Vec<String>, CommandError> {
    let cluster_conf = &config.cluster_conf_dir;
    let log_dir = config
        .value("mars.admin.log.dir", cluster_conf)?
        .filter(|v| v != "null")
        .unwrap_or_else(|| config.home.join("logs").display().to_string());
    let native_dir = config
        .value("java.library.path", cluster_conf)?
        .filter(|v| v != "null")
        .unwrap_or_else(|| config.home.join("native").display().to_string());

    let mut command = vec![
        config.java_cmd.clone(),
        launch.jvm_type.to_string(),
        config.config_opts_flag(),
        format!("-Dmars.admin.home={}", config.home.display()),
        format!("-Dmars.admin.log.dir={}", log_dir),
        format!("-Djava.library.path={}", native_dir),
        format!("-Dmars.admin.conf.file={}", config.conf_file),
        "-cp".to_string(),
        build_classpath(config, &launch.extra_classpath)?,
    ];
    command.extend(launch.jvm_opts.iter().cloned());
    command.push(launch.class.clone());
    command.extend(launch.args.iter().cloned());
    Ok(command)
}

/// Launch `launch` and return the launcher's exit code.
///
/// Detached (default): the child inherits stdio, the launch is probed once
/// after the grace period and the child is left running.
/// Attached: output is captured and relayed until both streams close.
pub async fn exec_class(
    config: &LauncherConfig,
    options: RunOptions,
    launch: &JavaLaunch,
) -> Result<i32, CommandError> {
    let command = java_command(config, launch)?;
    println!("Running: {}", command.join(" "));
    let _ = std::io::stdout().flush();

    let output = if options.attach {
        OutputMode::Capture
    } else {
        OutputMode::Inherit
    };
    let spec = LaunchSpec::new(command[0].clone(), command[1..].to_vec())
        .with_env(config.child_env())
        .with_output(output);

    let launcher = ProcessLauncher::new().with_pid_file(PidFile::new(&config.pid_file));
    let mut handle = launcher.spawn(&spec)?;

    if options.attach {
        return attach(handle).await;
    }

    let liveness = LivenessProbe::new(config.grace_period)
        .probe(&mut handle)
        .await?;
    if !liveness.is_started() {
        log::warn!(
            "'{}' {} within {:?}",
            launch.class,
            liveness,
            config.grace_period
        );
    }
    Ok(liveness.exit_status())
}

/// Relay captured output until both streams close, then return the exit code.
///
/// Ctrl+C kills the child and returns its exit code. The child writes into
/// pipes owned by this process, so it cannot outlive the launcher here.
pub async fn attach(handle: ProcessHandle) -> Result<i32, CommandError> {
    let (stop_tx, stop_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.send(true);
    }) {
        log::warn!("Ctrl+C will not stop the child: {}", e);
    }

    relay_output(handle, stop_rx, std::io::stdout(), std::io::stderr()).await
}

/// Write captured stdout lines to `out` and stderr lines to `err`.
///
/// Runs until both streams close, then reaps the child. A change on `stop`
/// kills the child instead. A writer that fails stops receiving lines, but
/// the streams are still drained so the child never blocks on them.
pub async fn relay_output<O: Write, E: Write>(
    mut handle: ProcessHandle,
    mut stop: watch::Receiver<bool>,
    out: O,
    err: E,
) -> Result<i32, CommandError> {
    let pid = handle.pid();
    let probe_error = |source: std::io::Error| ProbeError { pid, source };

    let mut out = Relay::new(StreamSource::Stdout, out);
    let mut err = Relay::new(StreamSource::Stderr, err);
    let mut stdout = handle.take_stdout();
    let mut stderr = handle.take_stderr();

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            line = next_line(&mut stdout), if stdout.is_some() => match line {
                Some(line) => out.write(&line),
                None => stdout = None,
            },
            line = next_line(&mut stderr), if stderr.is_some() => match line {
                Some(line) => err.write(&line),
                None => stderr = None,
            },
            Ok(()) = stop.changed() => {
                log::info!("Interrupted; stopping PID {}", pid);
                handle.close_streams();
                let code = handle.kill().await.map_err(probe_error)?;
                log::info!("PID {} stopped with code {}", pid, code);
                return Ok(code);
            }
        }
    }

    for error in handle.finish_streams().await {
        log::warn!("{}", error);
    }
    let code = handle.wait_exit().await.map_err(probe_error)?;
    log::info!("PID {} exited with code {}", pid, code);
    Ok(code)
}

async fn next_line(queue: &mut Option<LineQueue>) -> Option<OutputLine> {
    match queue {
        Some(queue) => queue.read().await,
        None => None,
    }
}

/// Line writer that goes quiet after its first failure
struct Relay<W> {
    source: StreamSource,
    writer: W,
    open: bool,
}

impl<W: Write> Relay<W> {
    fn new(source: StreamSource, writer: W) -> Self {
        Self {
            source,
            writer,
            open: true,
        }
    }

    fn write(&mut self, line: &OutputLine) {
        if !self.open {
            return;
        }
        let result = writeln!(self.writer, "{}", line.text).and_then(|()| self.writer.flush());
        if let Err(e) = result {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                log::debug!("Reader of {} went away, discarding its lines", self.source);
            } else {
                log::warn!("Failed relaying {}: {}", self.source, e);
            }
            self.open = false;
        }
    }
}

/// Errors surfaced by a command
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Wrong arguments for '{}'", .0.name())]
    Usage(Command),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Classpath(#[from] ClasspathError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Probe(#[from] ProbeError),
}

impl CommandError {
    /// Exit code the launcher terminates with
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::Launch(e) => e.os_code(),
            _ => 1,
        }
    }
}

//! Mars Admin Launcher CLI
//!
//! Usage:
//!   mars_admin admin                          # start the admin service
//!   mars_admin admin --attach                 # start it and relay its output
//!   mars_admin version
//!   mars_admin remoteconfvalue mars.admin.log.dir
//!   mars_admin localconfvalue mars.admin.port -c mars.admin.port=9000
//!   mars_admin classpath
//!   mars_admin help [command]

use mars_admin::commands::print_usage;
use mars_admin::{dispatch, CommandError, ConfigError, LauncherArgs, LauncherConfig, RunOptions};

#[tokio::main]
async fn main() {
    let args: LauncherArgs = argh::from_env();

    // Initialize logging
    let env = env_logger::Env::default().default_filter_or(args.log_filter());
    env_logger::init_from_env(env);

    std::process::exit(run(args).await);
}

async fn run(args: LauncherArgs) -> i32 {
    let config = match LauncherConfig::resolve(args.config_opts, args.config) {
        Ok(config) => config,
        Err(ConfigError::NotARelease(lib_dir)) => {
            log::debug!("Missing {}", lib_dir.display());
            print_not_a_release();
            return 1;
        }
        Err(e) => {
            println!("ERROR:  {}", e);
            return 1;
        }
    };

    let options = RunOptions {
        attach: args.attach,
    };

    match dispatch(&config, options, &args.command).await {
        Ok(code) => code,
        Err(CommandError::Usage(command)) => {
            eprintln!("Wrong arguments for '{}'", command.name());
            print_usage(Some(command.name()));
            1
        }
        Err(e) => {
            let code = e.exit_code();
            let err = anyhow::Error::new(e)
                .context(format!("mars_admin {} failed", args.command.join(" ")));
            log::error!("{:#}", err);
            code
        }
    }
}

fn print_not_a_release() {
    println!("******************************************");
    println!(
        "The mars client can only be run from within a release. \
         You appear to be trying to run the client from a checkout of Mars' source code."
    );
    println!("\nYou can download a Mars release at http://mars.jd.com/downloads.html");
    println!("******************************************");
}

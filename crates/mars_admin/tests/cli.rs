//! End-to-end runs of the mars_admin binary against a fake release

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// A release layout with a fake `java` that logs its arguments
struct Release {
    home: TempDir,
    java_home: TempDir,
}

impl Release {
    fn new(java_script: &str) -> Self {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join("lib")).unwrap();
        std::fs::create_dir_all(home.path().join("conf")).unwrap();
        std::fs::write(home.path().join("lib").join("mars-admin-1.0.jar"), b"").unwrap();

        let java_home = tempfile::tempdir().unwrap();
        let bin = java_home.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let java = bin.join("java");
        std::fs::write(&java, format!("#!/bin/sh\n{}\n", java_script)).unwrap();
        std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).unwrap();

        Self { home, java_home }
    }

    fn home(&self) -> &Path {
        self.home.path()
    }

    fn conf(&self) -> PathBuf {
        self.home().join("conf")
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_mars_admin"))
            .args(args)
            .env("MARS_ADMIN_HOME", self.home())
            .env("JAVA_HOME", self.java_home.path())
            .env("MARS_ADMIN_GRACE_MS", "500")
            .env_remove("MARS_ADMIN_CONF_DIR")
            .env("HOME", self.home())
            .output()
            .unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_no_command_prints_usage() {
    let release = Release::new("exit 0");
    let output = release.run(&[]);
    assert_eq!(output.status.code(), Some(255));
    assert!(stdout(&output).contains("Commands:"));
}

#[test]
fn test_unknown_command() {
    let release = Release::new("exit 0");
    let output = release.run(&["nimbus", "x"]);
    assert_eq!(output.status.code(), Some(254));
    assert!(stdout(&output).contains("Unknown command: [mars_admin nimbus x]"));
}

#[test]
fn test_not_a_release() {
    let release = Release::new("exit 0");
    std::fs::remove_dir_all(release.home().join("lib")).unwrap();
    let output = release.run(&["classpath"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("can only be run from within a release"));
}

#[test]
fn test_invalid_java_home() {
    let release = Release::new("exit 0");
    std::fs::remove_file(release.java_home.path().join("bin").join("java")).unwrap();
    let output = release.run(&["classpath"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("JAVA_HOME is invalid"));
}

#[test]
fn test_remoteconfvalue_with_override() {
    let release = Release::new("exit 0");
    std::fs::write(
        release.conf().join("mars-admin.yaml"),
        "mars.admin.log.dir: /var/log/mars\n",
    )
    .unwrap();

    let output = release.run(&["remoteconfvalue", "mars.admin.log.dir"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "mars.admin.log.dir: /var/log/mars\n");

    let output = release.run(&[
        "remoteconfvalue",
        "mars.admin.log.dir",
        "-c",
        "mars.admin.log.dir=/tmp/override",
    ]);
    assert_eq!(stdout(&output), "mars.admin.log.dir: /tmp/override\n");
}

#[test]
fn test_classpath() {
    let release = Release::new("exit 0");
    let output = release.run(&["classpath"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        stdout(&output).trim_end(),
        release.home().join("lib").join("mars-admin-1.0.jar").display().to_string()
    );
}

#[test]
fn test_version_fast_exit_reports_child_code() {
    let release = Release::new("echo \"$@\" > \"$MARS_ADMIN_HOME/args.txt\"; exit 3");
    let output = release.run(&["version"]);

    assert_eq!(output.status.code(), Some(3));
    assert!(stdout(&output).starts_with("Running: "));

    let args = std::fs::read_to_string(release.home().join("args.txt")).unwrap();
    assert!(args.starts_with("-client -Dmars.admin.options= "));
    assert!(args.contains("-cp "));
    assert!(args.trim_end().ends_with("com.jd.mars.admin.utils.VersionInfo"));

    let pid = std::fs::read_to_string(release.home().join("logs").join("mars.pid")).unwrap();
    assert!(pid.parse::<u32>().is_ok());
}

#[test]
fn test_admin_started_with_childopts() {
    let release = Release::new("echo \"$@\" > \"$MARS_ADMIN_HOME/args.txt\"; sleep 3");
    std::fs::write(
        release.conf().join("mars-admin.yaml"),
        "mars.admin.childopts: \"-Xmx1g '-Dname=a b'\"\n",
    )
    .unwrap();

    let output = release.run(&["admin"]);
    assert_eq!(output.status.code(), Some(0));

    let args = std::fs::read_to_string(release.home().join("args.txt")).unwrap();
    assert!(args.starts_with("-server "));
    assert!(args.contains("-Xmx1g -Dname=a b -Dlogfile.name=mars-admin.log"));
    assert!(args.trim_end().ends_with("com.jd.mars.admin.MarsAdmin"));
}

#[test]
fn test_attach_relays_output_and_exit_code() {
    let release = Release::new("echo \"from java\"; echo \"java warning\" >&2; exit 4");
    let output = release.run(&["--attach", "version"]);

    assert_eq!(output.status.code(), Some(4));
    assert!(stdout(&output).contains("from java"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("java warning"));
}

#[test]
fn test_child_receives_ini_environment() {
    let release = Release::new("echo \"$MARS_FROM_INI\" > \"$MARS_ADMIN_HOME/env.txt\"; exit 0");
    std::fs::write(
        release.conf().join("mars_admin_env.ini"),
        "[environment]\nMARS_FROM_INI = yes\n",
    )
    .unwrap();

    let output = release.run(&["version"]);
    assert_eq!(output.status.code(), Some(0));
    let env = std::fs::read_to_string(release.home().join("env.txt")).unwrap();
    assert_eq!(env.trim(), "yes");
}

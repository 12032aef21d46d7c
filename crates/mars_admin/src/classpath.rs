//! Classpath assembly from the release directories

use crate::config::LauncherConfig;
use std::path::{Path, PathBuf};

/// Jar files directly inside `dir`, sorted by name.
///
/// A path to a single jar yields just that jar; anything else yields nothing.
pub fn jars_in(dir: &Path) -> Vec<PathBuf> {
    if dir.is_file() {
        return if is_jar(dir) { vec![dir.to_path_buf()] } else { Vec::new() };
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Skipping {} for classpath: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut jars: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_jar(path))
        .collect();
    jars.sort();
    jars
}

fn is_jar(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "jar")
}

/// Jars from `<home>` and `<home>/lib`, followed by `extra` entries as given
pub fn classpath_entries(config: &LauncherConfig, extra: &[PathBuf]) -> Vec<PathBuf> {
    let mut entries = jars_in(&config.home);
    entries.extend(jars_in(&config.lib_dir));
    entries.extend(extra.iter().cloned());
    entries
}

/// Classpath string for the JVM, joined with the platform separator
pub fn build_classpath(config: &LauncherConfig, extra: &[PathBuf]) -> Result<String, ClasspathError> {
    let joined = std::env::join_paths(classpath_entries(config, extra))?;
    normalize(joined.to_string_lossy().into_owned())
}

/// Convert to native Windows form when running under cygwin
#[cfg(target_os = "cygwin")]
fn normalize(classpath: String) -> Result<String, ClasspathError> {
    let output = std::process::Command::new("cygpath")
        .arg("-wp")
        .arg(&classpath)
        .output()
        .map_err(ClasspathError::Cygpath)?;
    let converted = String::from_utf8_lossy(&output.stdout);
    Ok(converted.lines().next().unwrap_or_default().to_string())
}

#[cfg(not(target_os = "cygwin"))]
fn normalize(classpath: String) -> Result<String, ClasspathError> {
    Ok(classpath)
}

/// Errors building the classpath
#[derive(Debug, thiserror::Error)]
pub enum ClasspathError {
    #[error("Classpath entry contains the path separator: {0}")]
    Join(#[from] std::env::JoinPathsError),

    #[cfg(target_os = "cygwin")]
    #[error("Failed to run cygpath: {0}")]
    Cygpath(std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSources, HOME_ENV};

    fn config_for(home: &Path) -> LauncherConfig {
        let mut sources = ConfigSources::default();
        sources
            .vars
            .insert(HOME_ENV.to_string(), home.display().to_string());
        LauncherConfig::from_sources(sources).unwrap()
    }

    fn touch(path: &Path) {
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_jars_in_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.jar"));
        touch(&dir.path().join("a.jar"));
        touch(&dir.path().join("readme.txt"));
        std::fs::create_dir(dir.path().join("nested.jar.d")).unwrap();

        let jars = jars_in(dir.path());
        assert_eq!(jars, vec![dir.path().join("a.jar"), dir.path().join("b.jar")]);
    }

    #[test]
    fn test_jars_in_single_file_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("one.jar");
        touch(&jar);
        let txt = dir.path().join("one.txt");
        touch(&txt);

        assert_eq!(jars_in(&jar), vec![jar.clone()]);
        assert!(jars_in(&txt).is_empty());
        assert!(jars_in(&dir.path().join("missing")).is_empty());
    }

    #[test]
    fn test_classpath_order() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join("lib")).unwrap();
        touch(&home.path().join("mars-admin.jar"));
        touch(&home.path().join("lib").join("dep.jar"));
        let config = config_for(home.path());

        let conf = home.path().join("conf");
        let entries = classpath_entries(&config, &[conf.clone()]);
        assert_eq!(
            entries,
            vec![
                home.path().join("mars-admin.jar"),
                home.path().join("lib").join("dep.jar"),
                conf,
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_build_classpath_joins_with_colon() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join("lib")).unwrap();
        touch(&home.path().join("lib").join("dep.jar"));
        let config = config_for(home.path());

        let classpath = build_classpath(&config, &[PathBuf::from("/etc/mars")]).unwrap();
        assert_eq!(
            classpath,
            format!("{}:/etc/mars", home.path().join("lib").join("dep.jar").display())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_build_classpath_rejects_separator() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join("lib")).unwrap();
        let config = config_for(home.path());

        let result = build_classpath(&config, &[PathBuf::from("/a:/b")]);
        assert!(matches!(result, Err(ClasspathError::Join(_))));
    }
}

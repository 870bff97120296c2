//! Locating `config.yaml` on disk.
//!
//! Two finders are provided. [`DefaultConfigPathFinder`] walks a fixed list of
//! candidate locations and always yields a path (the caller fails on load if
//! nothing exists there). [`StandaloneConfigPathFinder`] only accepts a file
//! next to the executable, for self-contained deployments.

use std::path::{Component, Path, PathBuf};

use super::error::ConfigError;

/// File name searched for when no explicit path is given.
pub const DEFAULT_CONFIG_NAME: &str = "config.yaml";

/// Subdirectory of the working directory that is also searched.
pub const CONFIG_SUBDIR: &str = "config";

/// Strategy for resolving the configuration file path.
pub trait ConfigPathFinder {
    /// Return the resolved path, or `None` when this strategy has no answer.
    fn find_config_path(&self) -> Option<PathBuf>;

    /// Resolve the path or produce an error carrying remediation text.
    fn require_config_path(&self) -> Result<PathBuf, ConfigError> {
        self.find_config_path().ok_or(ConfigError::StandaloneNotFound)
    }
}

// ---------------------------------------------------------------------------
// Default finder
// ---------------------------------------------------------------------------

/// Search order:
///
/// 1. explicit `--config` flag
/// 2. `./config.yaml`
/// 3. `<exe dir>/config.yaml`
/// 4. `./config/config.yaml`
/// 5. `../config.yaml`
/// 6. `../../config.yaml`
/// 7. `./config.yaml` made absolute, even if it does not exist
#[derive(Debug, Clone)]
pub struct DefaultConfigPathFinder {
    pub config_flag: Option<PathBuf>,
    cwd: Option<PathBuf>,
    exe_dir: Option<PathBuf>,
}

impl Default for DefaultConfigPathFinder {
    fn default() -> Self {
        Self::new(None)
    }
}

impl DefaultConfigPathFinder {
    pub fn new(config_flag: Option<PathBuf>) -> Self {
        Self {
            config_flag,
            cwd: std::env::current_dir().ok(),
            exe_dir: executable_dir(),
        }
    }

    /// Override the working and executable directories used for the search.
    pub fn with_dirs(mut self, cwd: impl Into<PathBuf>, exe_dir: Option<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self.exe_dir = exe_dir;
        self
    }

    fn candidates(&self, cwd: &Path) -> Vec<PathBuf> {
        let mut out = vec![cwd.join(DEFAULT_CONFIG_NAME)];
        if let Some(exe_dir) = &self.exe_dir {
            out.push(exe_dir.join(DEFAULT_CONFIG_NAME));
        }
        out.push(cwd.join(CONFIG_SUBDIR).join(DEFAULT_CONFIG_NAME));
        out.push(cwd.join("..").join(DEFAULT_CONFIG_NAME));
        out.push(cwd.join("..").join("..").join(DEFAULT_CONFIG_NAME));
        out
    }
}

impl ConfigPathFinder for DefaultConfigPathFinder {
    fn find_config_path(&self) -> Option<PathBuf> {
        let cwd = self.cwd.clone().unwrap_or_else(|| PathBuf::from("."));

        if let Some(flag) = &self.config_flag {
            return Some(absolutize(&cwd, flag));
        }

        for candidate in self.candidates(&cwd) {
            if candidate.is_file() {
                log::debug!("config found path={}", candidate.display());
                return Some(normalize(&candidate));
            }
        }

        Some(absolutize(&cwd, Path::new(DEFAULT_CONFIG_NAME)))
    }
}

// ---------------------------------------------------------------------------
// Standalone finder
// ---------------------------------------------------------------------------

/// Accepts only the explicit flag or a `config.yaml` beside the executable.
#[derive(Debug, Clone, Default)]
pub struct StandaloneConfigPathFinder {
    pub config_flag: Option<PathBuf>,
    exe_dir: Option<PathBuf>,
}

impl StandaloneConfigPathFinder {
    pub fn new(config_flag: Option<PathBuf>) -> Self {
        Self {
            config_flag,
            exe_dir: executable_dir(),
        }
    }

    pub fn with_exe_dir(mut self, exe_dir: impl Into<PathBuf>) -> Self {
        self.exe_dir = Some(exe_dir.into());
        self
    }
}

impl ConfigPathFinder for StandaloneConfigPathFinder {
    fn find_config_path(&self) -> Option<PathBuf> {
        if let Some(flag) = &self.config_flag {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            return Some(absolutize(&cwd, flag));
        }

        let candidate = self.exe_dir.as_ref()?.join(DEFAULT_CONFIG_NAME);
        candidate.is_file().then_some(candidate)
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

fn absolutize(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&cwd.join(path))
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "s3:\n  bucket: b\n  endpoint: e\n").unwrap();
    }

    #[test]
    fn test_flag_wins_over_everything() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("config.yaml"));

        let finder = DefaultConfigPathFinder::new(Some(PathBuf::from("custom/app.yaml")))
            .with_dirs(dir.path(), None);

        assert_eq!(
            finder.find_config_path().unwrap(),
            dir.path().join("custom").join("app.yaml")
        );
    }

    #[test]
    fn test_current_dir_before_exe_dir() {
        let cwd = tempdir().unwrap();
        let exe = tempdir().unwrap();
        touch(&cwd.path().join("config.yaml"));
        touch(&exe.path().join("config.yaml"));

        let finder = DefaultConfigPathFinder::default()
            .with_dirs(cwd.path(), Some(exe.path().to_path_buf()));

        assert_eq!(finder.find_config_path().unwrap(), cwd.path().join("config.yaml"));
    }

    #[test]
    fn test_exe_dir_before_config_subdir() {
        let cwd = tempdir().unwrap();
        let exe = tempdir().unwrap();
        touch(&cwd.path().join("config").join("config.yaml"));
        touch(&exe.path().join("config.yaml"));

        let finder = DefaultConfigPathFinder::default()
            .with_dirs(cwd.path(), Some(exe.path().to_path_buf()));

        assert_eq!(finder.find_config_path().unwrap(), exe.path().join("config.yaml"));
    }

    #[test]
    fn test_config_subdir_before_parent() {
        let root = tempdir().unwrap();
        let cwd = root.path().join("app");
        touch(&cwd.join("config").join("config.yaml"));
        touch(&root.path().join("config.yaml"));

        let finder = DefaultConfigPathFinder::default().with_dirs(&cwd, None);

        assert_eq!(
            finder.find_config_path().unwrap(),
            cwd.join("config").join("config.yaml")
        );
    }

    #[test]
    fn test_two_parents_up_resolves_to_absolute_path() {
        let root = tempdir().unwrap();
        let cwd = root.path().join("a").join("b");
        fs::create_dir_all(&cwd).unwrap();
        let exe = tempdir().unwrap();
        touch(&root.path().join("config.yaml"));

        let finder = DefaultConfigPathFinder::default()
            .with_dirs(&cwd, Some(exe.path().to_path_buf()));

        let found = finder.find_config_path().unwrap();
        assert!(found.is_absolute());
        assert_eq!(found, root.path().join("config.yaml"));
    }

    #[test]
    fn test_falls_back_to_default_name_when_nothing_exists() {
        let cwd = tempdir().unwrap();
        let nested = cwd.path().join("x").join("y").join("z");
        fs::create_dir_all(&nested).unwrap();

        let finder = DefaultConfigPathFinder::default().with_dirs(&nested, None);

        let found = finder.find_config_path().unwrap();
        assert_eq!(found, nested.join("config.yaml"));
        assert!(!found.exists());
    }

    #[test]
    fn test_default_finder_returns_absolute_path() {
        let path = DefaultConfigPathFinder::default().find_config_path().unwrap();
        assert!(path.is_absolute(), "{}", path.display());
        assert!(path.ends_with(DEFAULT_CONFIG_NAME));
    }

    #[test]
    fn test_standalone_requires_file_next_to_binary() {
        let exe = tempdir().unwrap();
        let finder = StandaloneConfigPathFinder::default().with_exe_dir(exe.path());

        let err = finder.require_config_path().unwrap_err();
        assert!(err.to_string().contains("same directory as the binary"));

        touch(&exe.path().join("config.yaml"));
        assert_eq!(
            finder.require_config_path().unwrap(),
            exe.path().join("config.yaml")
        );
    }

    #[test]
    fn test_normalize_collapses_parent_components() {
        assert_eq!(
            normalize(Path::new("/srv/app/bin/../../config.yaml")),
            PathBuf::from("/srv/config.yaml")
        );
    }
}

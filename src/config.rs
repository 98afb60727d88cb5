use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

static PROJECT_DIRS: Lazy<Option<ProjectDirs>> =
    Lazy::new(|| ProjectDirs::from("", "", "facetrack"));

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| {
    if let Some(path) = option_env!("FACETRACK_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    PROJECT_DIRS
        .as_ref()
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("/usr/local/etc/facetrack/config.toml"))
});

pub static DATA_DIR: Lazy<PathBuf> = Lazy::new(|| {
    if let Some(path) = option_env!("FACETRACK_DATA_DIR") {
        return PathBuf::from(path);
    }
    PROJECT_DIRS
        .as_ref()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("/usr/local/var/facetrack"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Face collection every profile is enrolled into
    pub collection_id: String,
    pub data_dir: PathBuf,
    /// Base URL the artifact directory is served from, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,
    /// Upper bound on each store, index and registry call
    pub call_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collection_id: "users_faces".to_string(),
            data_dir: DATA_DIR.clone(),
            public_base_url: None,
            call_timeout_secs: 10,
        }
    }
}

impl Config {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.data_dir.join("artifacts")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    pub fn profile_file(&self) -> PathBuf {
        self.data_dir.join("profiles.bin")
    }
}

/// Read the config, falling back to defaults when no file exists yet.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(CONFIG_PATH.as_path());
    match std::fs::read_to_string(path) {
        Ok(raw) => toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(e).with_context(|| format!("reading config at {}", path.display())),
    }
}

/// Write the config. The file is replaced whole, so an editor or a concurrent
/// `load_config` never sees a partial document.
pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(CONFIG_PATH.as_path());
    let data = toml::to_string_pretty(cfg).context("serializing config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating config dir {}", parent.display()))?;
    }

    let staging = path.with_extension("toml.part");
    std::fs::write(&staging, data)
        .with_context(|| format!("writing config to {}", staging.display()))?;
    std::fs::rename(&staging, path)
        .with_context(|| format!("replacing config at {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.collection_id, "users_faces");
        assert_eq!(cfg.call_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "collection_id = \"staff_faces\"\ncall_timeout_secs = 3\n").unwrap();

        let cfg = load_config(Some(path.as_path())).unwrap();
        assert_eq!(cfg.collection_id, "staff_faces");
        assert_eq!(cfg.call_timeout(), Duration::from_secs(3));
        assert_eq!(cfg.data_dir, *DATA_DIR);
        assert_eq!(cfg.public_base_url, None);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc").join("config.toml");
        let cfg = Config {
            collection_id: "users_faces".into(),
            data_dir: dir.path().join("data"),
            public_base_url: Some("https://faces.example.com".into()),
            call_timeout_secs: 5,
        };
        save_config(&cfg, Some(path.as_path())).unwrap();
        assert_eq!(load_config(Some(path.as_path())).unwrap(), cfg);
    }

    #[test]
    fn bad_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "call_timeout_secs = \"soon\"").unwrap();
        assert!(load_config(Some(path.as_path())).is_err());
    }

    #[test]
    fn data_layout() {
        let cfg = Config {
            data_dir: PathBuf::from("/srv/facetrack"),
            ..Config::default()
        };
        assert_eq!(cfg.artifact_dir(), PathBuf::from("/srv/facetrack/artifacts"));
        assert_eq!(cfg.index_dir(), PathBuf::from("/srv/facetrack/index"));
        assert_eq!(cfg.profile_file(), PathBuf::from("/srv/facetrack/profiles.bin"));
    }

    #[test]
    fn save_replaces_the_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "collection_id = \"old\"\ncall_timeout_secs = 99\n").unwrap();

        let cfg = Config {
            data_dir: dir.path().join("data"),
            ..Config::default()
        };
        save_config(&cfg, Some(path.as_path())).unwrap();

        assert_eq!(load_config(Some(path.as_path())).unwrap(), cfg);
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["config.toml"]);
    }

    #[test]
    fn unreadable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be
        assert!(load_config(Some(dir.path())).is_err());
    }
}

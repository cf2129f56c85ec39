use kiroku_core::backend::{BackendKind, BackendSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_VERSION: u32 = 1;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("home directory not found; set HOME")]
    HomeMissing,
    #[error("config io error: {0}")]
    Io(#[from] io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub tags_path: PathBuf,
    pub prompts_path: PathBuf,
}

impl ConfigPaths {
    pub fn from_home() -> Result<Self, ConfigError> {
        let home = std::env::var("HOME").map_err(|_| ConfigError::HomeMissing)?;
        Ok(Self::from_base(PathBuf::from(home).join(".kiroku")))
    }

    pub fn from_base(base_dir: PathBuf) -> Self {
        let config_path = base_dir.join("config.toml");
        let data_dir = base_dir.join("data");
        let tags_path = base_dir.join("tags.json");
        let prompts_path = base_dir.join("prompts.md");
        Self {
            base_dir,
            config_path,
            data_dir,
            tags_path,
            prompts_path,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    /// Backends in priority order; the fallback chain tries them top to
    /// bottom.
    pub backends: Vec<BackendSpec>,
    /// Name of the backend `--alternate` rotates to the front.
    pub alternate_backend: String,
    /// Override for the category file; defaults to `tags.json` in the config
    /// directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags_file: Option<PathBuf>,
    /// Override for the prompt template file; defaults to `prompts.md` in the
    /// config directory, used only when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts_file: Option<PathBuf>,
    pub calendar: CalendarConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            backends: vec![
                BackendSpec {
                    name: "doubao".to_string(),
                    kind: BackendKind::Openai,
                    base_url: "https://ark.cn-beijing.volces.com/api/v3".to_string(),
                    model: "doubao-1-5-lite-32k-250115".to_string(),
                    api_key: String::new(),
                },
                BackendSpec {
                    name: "supermind".to_string(),
                    kind: BackendKind::Openai,
                    base_url: "https://space.ai-builders.com/backend/v1".to_string(),
                    model: "supermind-agent-v1".to_string(),
                    api_key: String::new(),
                },
                BackendSpec {
                    name: "ollama".to_string(),
                    kind: BackendKind::Ollama,
                    base_url: "http://localhost:11434".to_string(),
                    model: "llama3.2:latest".to_string(),
                    api_key: String::new(),
                },
            ],
            alternate_backend: "ollama".to_string(),
            tags_file: None,
            prompts_file: None,
            calendar: CalendarConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub add_timeout_secs: u64,
    pub undo_timeout_secs: u64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            add_timeout_secs: 10,
            undo_timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn load_or_create(paths: &ConfigPaths) -> Result<Self, ConfigError> {
        ensure_dirs(paths)?;
        if paths.config_path.exists() {
            return Self::load(paths);
        }

        let config = Self::default();
        Self::write(paths, &config)?;
        Ok(config)
    }

    pub fn load(paths: &ConfigPaths) -> Result<Self, ConfigError> {
        ensure_dirs(paths)?;
        let content = fs::read_to_string(&paths.config_path)?;
        let raw: toml::Value = toml::from_str(&content)?;
        let file_version = raw
            .get("version")
            .and_then(|value| value.as_integer())
            .unwrap_or(0) as u32;

        let mut config: Config = toml::from_str(&content)?;
        let mut migrated = false;

        if file_version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
            migrated = true;
        } else if file_version > CONFIG_VERSION {
            eprintln!(
                "config version {file_version} is newer than supported {CONFIG_VERSION}; proceeding"
            );
        }

        warn_if_loose_permissions(&paths.config_path)?;

        if migrated {
            Self::write(paths, &config)?;
        }

        Ok(config)
    }

    pub fn write(paths: &ConfigPaths, config: &Config) -> Result<(), ConfigError> {
        ensure_dirs(paths)?;
        let content = toml::to_string_pretty(config)?;
        write_atomic(&paths.config_path, content.as_bytes())?;
        Ok(())
    }

    pub fn redacted(&self) -> Self {
        let mut redacted = self.clone();
        for backend in &mut redacted.backends {
            if !backend.api_key.trim().is_empty() {
                backend.api_key = "<redacted>".to_string();
            }
        }
        redacted
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::Validation(
                "backends must list at least one backend".into(),
            ));
        }
        for backend in &self.backends {
            if backend.name.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "backends entries must have a name".into(),
                ));
            }
            if backend.base_url.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "backend {} must have a base_url",
                    backend.name
                )));
            }
            if backend.model.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "backend {} must have a model",
                    backend.name
                )));
            }
        }
        let mut names: Vec<&str> = self.backends.iter().map(|b| b.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.backends.len() {
            return Err(ConfigError::Validation(
                "backend names must be unique".into(),
            ));
        }
        if !self
            .backends
            .iter()
            .any(|b| b.name == self.alternate_backend)
        {
            return Err(ConfigError::Validation(format!(
                "alternate_backend {} is not a configured backend",
                self.alternate_backend
            )));
        }
        if self.calendar.add_timeout_secs == 0 || self.calendar.undo_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "calendar timeouts must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn tags_path(&self, paths: &ConfigPaths) -> PathBuf {
        self.tags_file
            .clone()
            .unwrap_or_else(|| paths.tags_path.clone())
    }

    pub fn prompts_path(&self, paths: &ConfigPaths) -> PathBuf {
        self.prompts_file
            .clone()
            .unwrap_or_else(|| paths.prompts_path.clone())
    }

    /// Apply `KIROKU_<NAME>_API_KEY` environment overrides, so keys can stay
    /// out of the config file.
    pub fn apply_env_overrides(&mut self) {
        for backend in &mut self.backends {
            let var = format!(
                "KIROKU_{}_API_KEY",
                backend.name.to_uppercase().replace('-', "_")
            );
            if let Ok(key) = std::env::var(&var)
                && !key.trim().is_empty()
            {
                backend.api_key = key;
            }
        }
    }
}

fn ensure_dirs(paths: &ConfigPaths) -> Result<(), ConfigError> {
    fs::create_dir_all(&paths.base_dir)?;
    fs::create_dir_all(&paths.data_dir)?;
    Ok(())
}

pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), io::Error> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::other("path missing parent directory"))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("path missing file name"))?;
    let tmp_path = parent.join(format!("{}.tmp", file_name.to_string_lossy()));
    fs::write(&tmp_path, contents)?;
    set_strict_permissions(&tmp_path)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn set_strict_permissions(path: &Path) -> Result<(), io::Error> {
    #[cfg(unix)]
    {
        let perm = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perm)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

fn warn_if_loose_permissions(path: &Path) -> Result<(), ConfigError> {
    #[cfg(unix)]
    {
        let metadata = fs::metadata(path)?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            eprintln!(
                "config file {} is group/world readable; set permissions to 0600",
                path.display()
            );
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{CONFIG_VERSION, Config, ConfigPaths};
    use std::fs;

    #[test]
    fn load_or_create_writes_defaults_and_dirs() {
        let temp = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::from_base(temp.path().join("kiroku"));
        let config = Config::load_or_create(&paths).unwrap();

        assert!(paths.config_path.exists());
        assert!(paths.data_dir.is_dir());
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.backends[0].name, "doubao");
        assert_eq!(config.alternate_backend, "ollama");
        config.validate().unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&paths.config_path)
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn load_fills_missing_sections_with_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::from_base(temp.path().join("kiroku"));
        fs::create_dir_all(&paths.base_dir).unwrap();
        let content = r#"version = 0

[[backends]]
name = "ollama"
kind = "ollama"
base_url = "http://localhost:11434"
model = "llama3.2:latest"
"#;
        fs::write(&paths.config_path, content).unwrap();

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.calendar.add_timeout_secs, 10);

        let updated = fs::read_to_string(&paths.config_path).unwrap();
        assert!(updated.contains("version = 1"));
    }

    #[test]
    fn redacted_hides_api_keys() {
        let mut config = Config::default();
        config.backends[0].api_key = "secret".to_string();
        let redacted = config.redacted();
        assert_eq!(redacted.backends[0].api_key, "<redacted>");
        assert_eq!(redacted.backends[2].api_key, "");
    }

    #[test]
    fn validate_rejects_duplicate_names_and_unknown_alternate() {
        let mut config = Config::default();
        config.backends[1].name = "doubao".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.alternate_backend = "missing".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_path_overrides_win_over_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::from_base(temp.path().join("kiroku"));
        let mut config = Config::default();
        assert_eq!(config.tags_path(&paths), paths.tags_path);
        assert_eq!(config.prompts_path(&paths), paths.prompts_path);

        config.tags_file = Some("/elsewhere/tags.json".into());
        assert_eq!(
            config.tags_path(&paths),
            std::path::PathBuf::from("/elsewhere/tags.json")
        );
    }

    #[test]
    fn validate_rejects_empty_backends() {
        let mut config = Config::default();
        config.backends.clear();
        assert!(config.validate().is_err());
    }
}

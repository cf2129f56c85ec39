use clap::{Args, Subcommand};
use std::process::Command;

use crate::config::{Config, ConfigError, ConfigPaths};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the config with API keys redacted.
    Print,
    /// Open the config file in $EDITOR.
    Edit,
    /// Set one value, e.g. `set alternate_backend ollama` or
    /// `set backends.doubao.api_key sk-...`.
    Set { key: String, value: String },
}

pub fn run(paths: &ConfigPaths, args: &ConfigArgs) -> Result<(), ConfigError> {
    match args.action.as_ref().unwrap_or(&ConfigAction::Print) {
        ConfigAction::Print => print(paths),
        ConfigAction::Edit => edit(paths),
        ConfigAction::Set { key, value } => set(paths, key, value),
    }
}

fn print(paths: &ConfigPaths) -> Result<(), ConfigError> {
    let config = Config::load_or_create(paths)?;
    let content = toml::to_string_pretty(&config.redacted())?;
    println!("# {}", paths.config_path.display());
    print!("{content}");
    Ok(())
}

fn edit(paths: &ConfigPaths) -> Result<(), ConfigError> {
    Config::load_or_create(paths)?;
    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let mut parts = editor.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| ConfigError::Validation("EDITOR is empty".into()))?;
    let status = Command::new(program)
        .args(parts)
        .arg(&paths.config_path)
        .status()?;
    if !status.success() {
        return Err(ConfigError::Validation(format!(
            "editor exited with {status}"
        )));
    }

    // Surface mistakes immediately instead of at the next analyze.
    let config = Config::load(paths)?;
    config.validate()?;
    Ok(())
}

fn set(paths: &ConfigPaths, key: &str, value: &str) -> Result<(), ConfigError> {
    let mut config = Config::load_or_create(paths)?;
    apply_set(&mut config, key, value)?;
    config.validate()?;
    Config::write(paths, &config)?;
    println!("set {key}");
    Ok(())
}

fn apply_set(config: &mut Config, key: &str, value: &str) -> Result<(), ConfigError> {
    match key {
        "alternate_backend" => {
            config.alternate_backend = value.to_string();
            return Ok(());
        }
        "calendar.add_timeout_secs" => {
            config.calendar.add_timeout_secs = parse_secs(key, value)?;
            return Ok(());
        }
        "calendar.undo_timeout_secs" => {
            config.calendar.undo_timeout_secs = parse_secs(key, value)?;
            return Ok(());
        }
        "tags_file" => {
            config.tags_file = Some(value.into());
            return Ok(());
        }
        "prompts_file" => {
            config.prompts_file = Some(value.into());
            return Ok(());
        }
        _ => {}
    }

    if let Some(rest) = key.strip_prefix("backends.")
        && let Some((name, field)) = rest.split_once('.')
    {
        let backend = config
            .backends
            .iter_mut()
            .find(|b| b.name == name)
            .ok_or_else(|| ConfigError::Validation(format!("unknown backend {name}")))?;
        match field {
            "base_url" => backend.base_url = value.to_string(),
            "model" => backend.model = value.to_string(),
            "api_key" => backend.api_key = value.to_string(),
            other => {
                return Err(ConfigError::Validation(format!(
                    "unknown backend field {other}"
                )));
            }
        }
        return Ok(());
    }

    Err(ConfigError::Validation(format!("unknown config key {key}")))
}

fn parse_secs(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{key} must be a number of seconds")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_set_updates_top_level_and_backend_fields() {
        let mut config = Config::default();
        apply_set(&mut config, "alternate_backend", "supermind").unwrap();
        assert_eq!(config.alternate_backend, "supermind");

        apply_set(&mut config, "backends.doubao.api_key", "sk-test").unwrap();
        assert_eq!(config.backends[0].api_key, "sk-test");

        apply_set(&mut config, "calendar.add_timeout_secs", "20").unwrap();
        assert_eq!(config.calendar.add_timeout_secs, 20);

        apply_set(&mut config, "tags_file", "/tmp/tags.json").unwrap();
        assert_eq!(
            config.tags_file.as_deref(),
            Some(std::path::Path::new("/tmp/tags.json"))
        );
    }

    #[test]
    fn apply_set_rejects_unknown_keys() {
        let mut config = Config::default();
        assert!(apply_set(&mut config, "nope", "x").is_err());
        assert!(apply_set(&mut config, "backends.missing.model", "x").is_err());
        assert!(apply_set(&mut config, "backends.doubao.nope", "x").is_err());
        assert!(apply_set(&mut config, "calendar.add_timeout_secs", "soon").is_err());
    }

    #[test]
    fn set_round_trips_through_the_config_file() {
        let temp = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::from_base(temp.path().join("kiroku"));
        set(&paths, "backends.ollama.model", "qwen2.5:7b").unwrap();

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.backends[2].model, "qwen2.5:7b");
    }
}

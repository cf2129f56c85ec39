use clap::Args;
use kiroku_core::tags::CategoryConfiguration;

use crate::config::{Config, ConfigError, ConfigPaths, write_atomic};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite existing config and tags with the defaults.
    #[arg(long)]
    pub force: bool,
}

/// Scaffold `~/.kiroku`: config.toml, tags.json, and the data directory.
pub fn run(paths: &ConfigPaths, args: &InitArgs) -> Result<(), ConfigError> {
    if args.force && paths.config_path.exists() {
        std::fs::remove_file(&paths.config_path)?;
    }
    let config = Config::load_or_create(paths)?;
    config.validate()?;

    if args.force || !paths.tags_path.exists() {
        let records = CategoryConfiguration::default();
        let content = serde_json::to_vec_pretty(records.records())
            .map_err(|e| ConfigError::Validation(format!("tags serialization failed: {e}")))?;
        write_atomic(&paths.tags_path, &content)?;
    }

    println!("config:  {}", paths.config_path.display());
    println!("tags:    {}", paths.tags_path.display());
    println!("data:    {}", paths.data_dir.display());
    println!("prompts: {} (optional, built-in used when absent)", paths.prompts_path.display());
    println!();
    println!("set API keys in the config file or via KIROKU_<BACKEND>_API_KEY");
    Ok(())
}

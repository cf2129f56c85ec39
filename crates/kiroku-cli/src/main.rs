mod config;
mod config_cmd;
mod history;
mod init;
mod osascript;

use std::collections::BTreeMap;
use std::io::Read;

use clap::{Args, Parser, Subcommand};
use log::warn;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use kiroku_core::backend::{ChatBackend, create_backend};
use kiroku_core::calendar::{CalendarWriter, write_batch};
use kiroku_core::pipeline::Pipeline;
use kiroku_core::prompt::PromptTemplates;
use kiroku_core::tags::CategoryConfiguration;
use kiroku_core::types::{ExtractionResult, TimeAnchor, TranscriptInput};
use kiroku_core::validate::ValidatorRules;

use config::{Config, ConfigPaths};
use history::HistoryStore;
use osascript::OsaScriptWriter;

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    name = "kiroku",
    version,
    about = "Turn voice transcripts into calendar time blocks"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scaffold the config directory.
    Init(init::InitArgs),
    /// Print, edit, or set configuration values.
    Config(config_cmd::ConfigArgs),
    /// Extract time blocks from a transcript and print them as JSON.
    Analyze(AnalyzeArgs),
    /// Extract time blocks and write them to the calendar.
    Record(AnalyzeArgs),
    /// Delete the events written by the last `record`.
    Undo,
    /// Show previously recorded time blocks.
    History(HistoryArgs),
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Transcript text; reads stdin when omitted.
    transcript: Option<String>,
    /// Anchor timestamp override, `YYYY-MM-DDTHH:MM:SS` local time.
    /// Defaults to the current local time.
    #[arg(long, value_name = "TIMESTAMP")]
    at: Option<String>,
    /// Try the configured alternate backend first.
    #[arg(long)]
    alternate: bool,
}

#[derive(Args)]
struct HistoryArgs {
    /// Only entries whose block starts on this date, `YYYY-MM-DD`.
    #[arg(long)]
    date: Option<String>,
}

fn main() {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> CliResult {
    let cli = Cli::parse();
    let paths = ConfigPaths::from_home()?;

    match cli.command {
        Command::Init(args) => init::run(&paths, &args)?,
        Command::Config(args) => config_cmd::run(&paths, &args)?,
        Command::Analyze(args) => cmd_analyze(&paths, &args)?,
        Command::Record(args) => cmd_record(&paths, &args)?,
        Command::Undo => cmd_undo(&paths)?,
        Command::History(args) => cmd_history(&paths, &args)?,
    }
    Ok(())
}

fn cmd_analyze(paths: &ConfigPaths, args: &AnalyzeArgs) -> CliResult {
    let result = extract(paths, args)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn cmd_record(paths: &ConfigPaths, args: &AnalyzeArgs) -> CliResult {
    let config = load_config(paths)?;
    let categories = load_categories(&config.tags_path(paths));
    let result = extract(paths, args)?;

    let store = HistoryStore::new(paths.data_dir.clone());
    store.append_blocks(&result.blocks)?;

    if result.blocks.is_empty() {
        println!(
            "{}",
            result.notice.as_deref().unwrap_or("no time blocks found")
        );
        return Ok(());
    }

    let writer = OsaScriptWriter::new(
        config.calendar.add_timeout_secs,
        config.calendar.undo_timeout_secs,
    );
    let outcome = write_batch(&writer, &result.blocks, &categories);

    for event in &outcome.written {
        println!(
            "added: {} ({} to {})",
            event.request.title,
            event.request.starts_at,
            event.request.ends_at
        );
    }
    for failure in &outcome.failures {
        eprintln!("failed: {}: {}", failure.title, failure.error);
    }

    if !outcome.written.is_empty() {
        let batch = store.save_recent_batch(outcome.written.clone())?;
        println!(
            "{} event(s) written; undo with `kiroku undo` (batch {})",
            batch.events.len(),
            batch.batch_id
        );
    }
    if outcome.all_failed() {
        return Err("no events could be written to the calendar".into());
    }
    Ok(())
}

fn cmd_undo(paths: &ConfigPaths) -> CliResult {
    let config = load_config(paths)?;
    let store = HistoryStore::new(paths.data_dir.clone());
    let Some(batch) = store.load_recent_batch()? else {
        println!("nothing to undo");
        return Ok(());
    };

    let mut by_calendar: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for event in &batch.events {
        by_calendar
            .entry(event.request.calendar_name.clone())
            .or_default()
            .push(event.event_id.clone());
    }

    let writer = OsaScriptWriter::new(
        config.calendar.add_timeout_secs,
        config.calendar.undo_timeout_secs,
    );
    let mut failed = false;
    for (calendar_name, ids) in &by_calendar {
        if let Err(err) = writer.delete_events(calendar_name, ids) {
            failed = true;
            eprintln!("undo failed for calendar {calendar_name}: {err}");
        }
    }
    if failed {
        return Err("some events could not be deleted; batch kept for retry".into());
    }

    store.clear_recent_batch()?;
    println!("deleted {} event(s) from batch {}", batch.events.len(), batch.batch_id);
    Ok(())
}

fn cmd_history(paths: &ConfigPaths, args: &HistoryArgs) -> CliResult {
    let store = HistoryStore::new(paths.data_dir.clone());
    let entries = store.entries(args.date.as_deref())?;
    if entries.is_empty() {
        println!("no entries");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{} to {}  {} [{}]",
            entry.block.start_time, entry.block.end_time, entry.block.activity, entry.block.tag
        );
    }
    Ok(())
}

fn extract(paths: &ConfigPaths, args: &AnalyzeArgs) -> CliResult<ExtractionResult> {
    let config = load_config(paths)?;
    let categories = load_categories(&config.tags_path(paths));
    let templates = load_templates(&config.prompts_path(paths))?;
    let rules = ValidatorRules::default();

    let backends = build_backends(&config)?;
    let alternate = backends
        .iter()
        .position(|b| b.name() == config.alternate_backend);

    let mut input = TranscriptInput::new(read_transcript(args.transcript.as_deref())?);
    input.use_alternate_backend = args.alternate;
    if input.transcript.trim().is_empty() {
        return Err("transcript is empty".into());
    }

    let anchor = resolve_anchor(args.at.as_deref())?;
    let pipeline =
        Pipeline::new(&backends, &categories, &templates, &rules).with_alternate(alternate);
    Ok(pipeline.extract(&input, anchor)?)
}

fn load_config(paths: &ConfigPaths) -> CliResult<Config> {
    let mut config = Config::load_or_create(paths)?;
    config.validate()?;
    config.apply_env_overrides();
    Ok(config)
}

fn load_categories(tags_path: &std::path::Path) -> CategoryConfiguration {
    if tags_path.exists() {
        match CategoryConfiguration::load(tags_path) {
            Ok(categories) => return categories,
            Err(err) => warn!(
                "ignoring unreadable tags file {}: {err}",
                tags_path.display()
            ),
        }
    }
    CategoryConfiguration::default()
}

fn load_templates(prompts_path: &std::path::Path) -> CliResult<PromptTemplates> {
    if prompts_path.exists() {
        return Ok(PromptTemplates::from_file(prompts_path)?);
    }
    Ok(PromptTemplates::builtin())
}

fn build_backends(config: &Config) -> CliResult<Vec<Box<dyn ChatBackend>>> {
    let mut backends = Vec::with_capacity(config.backends.len());
    for spec in &config.backends {
        match create_backend(spec) {
            Ok(backend) => backends.push(backend),
            Err(err) => warn!("backend {} disabled: {err}", spec.name),
        }
    }
    if backends.is_empty() {
        return Err("no usable backends; set an API key or configure ollama".into());
    }
    Ok(backends)
}

fn read_transcript(arg: Option<&str>) -> CliResult<String> {
    if let Some(text) = arg {
        return Ok(text.to_string());
    }
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;
    Ok(text.trim().to_string())
}

fn resolve_anchor(at: Option<&str>) -> CliResult<TimeAnchor> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    match at {
        Some(raw) => {
            let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
            let local = PrimitiveDateTime::parse(raw, &format)
                .map_err(|_| format!("invalid --at timestamp {raw:?}; expected YYYY-MM-DDTHH:MM:SS"))?;
            Ok(TimeAnchor::new(local, offset))
        }
        None => {
            let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
            Ok(TimeAnchor::from_offset_datetime(now))
        }
    }
}

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use pop2piano_config::config::{
    Pop2PianoConfig, Pop2PianoProcessorConfig, ProcessorConfigOverrides, SerializableRecord,
};
use pop2piano_config::pretrained::fetch_pretrained_config;
use pop2piano_config::storage::AppFs;
use pop2piano_config::storage_ext::StorageExt;

#[derive(Parser)]
#[command(name = "pop2piano-config")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolves a Pop2Piano model configuration.
    Model(ModelArgs),
    /// Resolves a Pop2Piano processor configuration.
    Processor(ProcessorArgs),
}

#[derive(clap::Args)]
struct ModelArgs {
    /// Name of a published checkpoint whose configuration will be downloaded,
    /// for example sweetcocoa/pop2piano.
    #[arg(long)]
    pretrained: Option<String>,

    /// Local directory containing a config.json.
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Overrides a field, the value is parsed as JSON and falls back to a plain string.
    /// Aliases such as hidden_size are accepted.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    set: Vec<(String, Value)>,

    /// Prints only the given fields instead of the whole configuration.
    #[arg(long, value_name = "KEY")]
    get: Vec<String>,

    /// Directory where the resolved configuration will be saved.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Force the download of the pretrained configuration.
    #[arg(long, default_value = "false")]
    force_download: bool,
}

#[derive(clap::Args)]
struct ProcessorArgs {
    /// Local directory containing a processor_config.json.
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Overrides a field using its flat name, for example vocab_size_time=200
    /// or dataset_sample_rate=44100.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    set: Vec<(String, Value)>,

    /// Prints the feature token reserved for a composer, for example composer3.
    #[arg(long, value_name = "NAME")]
    composer: Vec<String>,

    /// Directory where the resolved configuration will be saved.
    #[arg(long)]
    output: Option<PathBuf>,
}

impl ModelArgs {
    fn validate(&self) -> anyhow::Result<()> {
        if self.pretrained.is_some() && self.dir.is_some() {
            return Err(anyhow!("--pretrained and --dir cannot be used together"));
        }
        if self.force_download && self.pretrained.is_none() {
            return Err(anyhow!("--force-download only makes sense with --pretrained"));
        }
        Ok(())
    }
}

fn parse_key_value(s: &str) -> Result<(String, Value), String> {
    let Some((key, value)) = s.split_once('=') else {
        return Err(format!("expected KEY=VALUE, got {s}"));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in {s}"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub async fn cli() -> anyhow::Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Model(args) => run_model(args).await,
        Command::Processor(args) => run_processor(args).await,
    }
}

async fn run_model(args: ModelArgs) -> anyhow::Result<()> {
    args.validate()?;

    let config = if let Some(name) = &args.pretrained {
        fetch_pretrained_config(&AppFs::project()?, name, args.force_download).await?
    } else if let Some(dir) = &args.dir {
        load_from_dir(dir).await?
    } else {
        Pop2PianoConfig::default()
    };
    let config = config.updated(Map::from_iter(args.set))?;

    if args.get.is_empty() {
        print!("{}", config.to_json_string()?);
    } else {
        for key in &args.get {
            match config.get(key) {
                Some(value) => println!("{key} = {value}"),
                None => warn!("{key} is not set"),
            }
        }
    }

    if let Some(output) = args.output {
        let path = AppFs::new(output).save_record("", &config).await?;
        info!("Configuration written to {}", path.display());
    }
    Ok(())
}

async fn run_processor(args: ProcessorArgs) -> anyhow::Result<()> {
    let config = match &args.dir {
        Some(dir) => load_from_dir(dir).await?,
        None => Pop2PianoProcessorConfig::default(),
    };
    let config = config.with_overrides(processor_overrides(args.set)?);

    if args.composer.is_empty() {
        print!("{}", config.to_json_string()?);
    } else {
        for composer in &args.composer {
            let token = config
                .composer_token(composer)
                .ok_or_else(|| anyhow!("Unknown composer {composer}"))?;
            println!("{composer} = {token}");
        }
    }

    if let Some(output) = args.output {
        let path = AppFs::new(output).save_record("", &config).await?;
        info!("Configuration written to {}", path.display());
    }
    Ok(())
}

fn processor_overrides(set: Vec<(String, Value)>) -> anyhow::Result<ProcessorConfigOverrides> {
    let known = serde_json::to_value(ProcessorConfigOverrides::default())?;
    for (key, _) in &set {
        if known.get(key).is_none() {
            warn!("{key} is not a processor setting, ignoring it");
        }
    }
    Ok(serde_json::from_value(Value::Object(Map::from_iter(set)))?)
}

async fn load_from_dir<R: SerializableRecord + Send>(dir: &Path) -> anyhow::Result<R> {
    let record: Option<R> = AppFs::new(dir).load_record("").await?;
    record.ok_or_else(|| anyhow!("No {} found in {}", R::FILE_NAME, dir.display()))
}

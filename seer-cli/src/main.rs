use clap::{Parser, Subcommand, ValueEnum};
use seer::{Query, Seer, SeerConfig};
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;
use std::process;

/// seer CLI: read and edit a tree of YAML documents from the command line
#[derive(Parser)]
#[command(name = "seer", version, about)]
struct Cli {
    /// Store root directory (default: current directory)
    #[arg(long, default_value = ".", conflicts_with = "config")]
    root: PathBuf,

    /// Read the store location from a YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List directories, documents, keys or sequence items under a path
    Ls {
        /// Slash-separated path (default: the store root)
        #[arg(default_value = "/")]
        path: String,
    },

    /// Print the value at a path
    Get {
        /// Slash-separated path; a `name.yaml` segment opens a document
        path: String,
    },

    /// Replace the value at a path, creating what is missing
    Set {
        /// Slash-separated path; a `name.yaml` segment opens a document
        path: String,
        /// New value, parsed as YAML (e.g. `8080`, `[a, b]`, `{k: v}`)
        value: String,
    },

    /// Delete a key, sequence item, document or directory
    Rm {
        /// Slash-separated path
        path: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = match &cli.config {
        Some(path) => SeerConfig::from_file(path)?,
        None => SeerConfig::new(&cli.root),
    };
    let seer = config.open()?;
    log::debug!("Opened store at {}", config.root.display());

    match cli.command {
        Command::Ls { path } => {
            let names = match build_query(&seer, &path) {
                Some(query) => query.list()?,
                None => seer.list()?,
            };
            print_output(&names, &cli.format)?;
        }

        Command::Get { path } => match build_query(&seer, &path) {
            Some(query) => {
                let value: serde_yaml::Value = query.value()?;
                print_output(&value, &cli.format)?;
            }
            None => print_output(&seer.list()?, &cli.format)?,
        },

        Command::Set { path, value } => {
            let query = build_query(&seer, &path).ok_or("set needs a path below the root")?;
            let value: serde_yaml::Value = serde_yaml::from_str(&value)
                .map_err(|e| format!("Invalid YAML value '{value}': {e}"))?;
            query.set(value).commit()?;
            seer.sync()?;
        }

        Command::Rm { path } => {
            let query = build_query(&seer, &path).ok_or("rm needs a path below the root")?;
            remove(&seer, query)?;
        }
    }

    Ok(())
}

/// Turn `dir/name.yaml/key/0` into a query. `None` means the store root.
fn build_query(seer: &Seer, path: &str) -> Option<Query> {
    let mut query: Option<Query> = None;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let (name, is_document) = match segment.strip_suffix(".yaml") {
            Some(stem) if !stem.is_empty() => (stem, true),
            _ => (segment, false),
        };
        let next = match query {
            Some(query) => query.get(name),
            None => seer.get(name),
        };
        query = Some(if is_document { next.document() } else { next });
    }
    query
}

/// Delete what `query` points at. A write replay would create a missing path
/// before deleting it, so existence is checked with a read first.
fn remove(seer: &Seer, query: Query) -> Result<(), Box<dyn Error>> {
    query.value::<serde_yaml::Value>()?;
    query.delete().commit()?;
    seer.sync()?;
    Ok(())
}

fn print_output<T: Serialize>(value: &T, format: &OutputFormat) -> Result<(), Box<dyn Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value)?);
        }
    }
    Ok(())
}

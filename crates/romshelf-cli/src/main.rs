//! romshelf command-line front end
//!
//! Lists the indexed titles, forces rescans, and sets the search root. The
//! index itself is built synchronously, so it runs on a blocking worker and
//! the result is handed back to the async main task.

use anyhow::{Context, Result, bail};
use romshelf_config::{ShelfConfig, TomlPreferences};
use romshelf_library::{
    DirectoryScanner, IndexRow, Library, LibraryCache, LibraryError, LibraryIndex,
    LoaderRegistry, LocalStorage, TitleEntry,
};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

type ShelfLibrary = Library<LocalStorage, TomlPreferences>;

const USAGE: &str = "\
Usage: romshelf <command> [options]

Commands:
  list [--json]      Show indexed titles, scanning only when needed
  refresh [--json]   Rescan the search root, ignoring the cache
  set-root <dir>     Set the directory tree to index
  skipped            Rescan and show files that were left out
  help               Show this message

Environment:
  ROMSHELF_CONFIG    Path of the config file
  RUST_LOG           Log filter (overrides log_level)";

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    List { json: bool },
    Refresh { json: bool },
    SetRoot(String),
    Skipped,
    Help,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let json = args.iter().skip(1).any(|arg| arg == "--json");
        match args.first().map(String::as_str) {
            None | Some("list") => Ok(Command::List { json }),
            Some("refresh") => Ok(Command::Refresh { json }),
            Some("set-root") => match args.get(1) {
                Some(dir) => Ok(Command::SetRoot(dir.clone())),
                None => bail!("set-root needs a directory\n\n{}", USAGE),
            },
            Some("skipped") => Ok(Command::Skipped),
            Some("help") | Some("-h") | Some("--help") => Ok(Command::Help),
            Some(other) => bail!("Unknown command: {}\n\n{}", other, USAGE),
        }
    }
}

/// JSON view of a title; icons are reported by size only
#[derive(Debug, Serialize)]
struct TitleView<'a> {
    format: &'static str,
    name: &'a str,
    author: Option<&'a str>,
    version: Option<&'a str>,
    location: &'a str,
    icon_bytes: usize,
}

impl<'a> From<&'a TitleEntry> for TitleView<'a> {
    fn from(entry: &'a TitleEntry) -> Self {
        let meta = entry.metadata();
        Self {
            format: entry.format().label(),
            name: entry.name(),
            author: meta.author.as_deref(),
            version: meta.version.as_deref(),
            location: entry.location(),
            icon_bytes: meta.icon.as_ref().map_or(0, Vec::len),
        }
    }
}

/// Setup logging to stderr, keeping stdout for output
fn setup_logging(default_level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn open_library(config: &ShelfConfig) -> Result<ShelfLibrary> {
    let preferences_path = config.preferences_path();
    let preferences = TomlPreferences::open(&preferences_path)
        .with_context(|| format!("Failed to open preferences {}", preferences_path.display()))?;

    Ok(Library::new(
        LocalStorage::new(),
        preferences,
        LoaderRegistry::with_defaults(),
        LibraryCache::new(config.cache_path()),
        DirectoryScanner::with_config(config.scan.clone()),
    ))
}

/// Run the blocking index work off the async runtime
async fn with_library<T, F>(library: ShelfLibrary, work: F) -> Result<(ShelfLibrary, T)>
where
    T: Send + 'static,
    F: FnOnce(&mut ShelfLibrary) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut library = library;
        let output = work(&mut library);
        (library, output)
    })
    .await
    .context("Index worker panicked")
}

fn explain(err: LibraryError) -> anyhow::Error {
    match err {
        LibraryError::NotConfigured => {
            anyhow::anyhow!("No search location configured, run `romshelf set-root <dir>` first")
        }
        LibraryError::RootUnavailable { root, source } => anyhow::anyhow!(
            "Cannot read search location {}: {}. Choose another with `romshelf set-root <dir>`",
            root,
            source
        ),
        other => other.into(),
    }
}

fn print_index(index: &LibraryIndex, json: bool) -> Result<()> {
    if json {
        let titles: Vec<TitleView<'_>> = index.entries().map(TitleView::from).collect();
        println!("{}", serde_json::to_string_pretty(&titles)?);
        return Ok(());
    }

    for row in index.rows() {
        match row {
            IndexRow::Header(label) => println!("== {} ==", label),
            IndexRow::Title(entry) => {
                let meta = entry.metadata();
                let mut line = format!("  {}", entry.name());
                if let Some(version) = &meta.version {
                    line.push_str(&format!(" v{}", version));
                }
                if let Some(author) = &meta.author {
                    line.push_str(&format!(" by {}", author));
                }
                println!("{}\n    {}", line, entry.location());
            }
            IndexRow::Empty => println!("No ROMs found"),
        }
    }
    Ok(())
}

async fn show_index(config: &ShelfConfig, json: bool, force: bool) -> Result<()> {
    let library = open_library(config)?;
    let (library, outcome) = with_library(library, move |library| {
        if force {
            library.force_refresh().map(|_| ())
        } else {
            library.get_entries().map(|_| ())
        }
    })
    .await?;
    outcome.map_err(explain)?;

    debug!("Index source: {:?}", library.source());
    print_index(library.index(), json)
}

async fn run(command: Command, config: ShelfConfig) -> Result<()> {
    match command {
        Command::Help => {
            println!("{}", USAGE);
        }
        Command::SetRoot(dir) => {
            let path = Path::new(&dir);
            if !path.is_dir() {
                bail!("{} is not a directory", dir);
            }
            let root = path
                .canonicalize()
                .with_context(|| format!("Failed to resolve {}", dir))?;
            let root = root.to_string_lossy().to_string();

            let mut library = open_library(&config)?;
            library.set_search_root(&root).map_err(explain)?;
            info!("Search location set to {}", root);
            println!("Search location set to {}; the next listing will rescan", root);
        }
        Command::List { json } => show_index(&config, json, false).await?,
        Command::Refresh { json } => show_index(&config, json, true).await?,
        Command::Skipped => {
            let library = open_library(&config)?;
            let (library, outcome) =
                with_library(library, |library| library.force_refresh().map(|_| ())).await?;
            outcome.map_err(explain)?;

            let mut any = false;
            for (format, result) in library.last_scan() {
                for skipped in &result.skipped {
                    any = true;
                    println!("[{}] {}: {}", format, skipped.location, skipped.reason);
                }
            }
            if !any {
                println!("Nothing was skipped");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let config = ShelfConfig::load_default().context("Failed to load configuration")?;
    setup_logging(&config.log_level);

    debug!("Using data directory {}", config.data_dir.display());
    run(command, config).await
}

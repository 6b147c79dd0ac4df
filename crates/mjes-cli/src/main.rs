use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use mjes::scraper::PageSource;
use mjes::transcript::parse_transcript_links;
use mjes::{HarvestOptions, Harvester, JsonStore, SiteSchema, SyncReport, TranscriptCleaner, WebScraper};

#[derive(Parser)]
#[command(name = "mjes")]
#[command(about = "A sejm.gov.pl member and speech scraper", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[arg(long, global = true, help = "Legislature term to crawl [default: 9]")]
    term: Option<u32>,

    #[arg(long, global = true, value_name = "FILE", help = "JSON file overriding the site schema")]
    schema: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "FILE",
        default_value = "mjes-store.json",
        help = "JSON store to sync into"
    )]
    store: PathBuf,

    #[arg(
        long,
        global = true,
        default_value_t = 8,
        value_parser = clap::value_parser!(u16).range(1..),
        help = "Pages fetched at once"
    )]
    concurrency: u16,

    #[arg(long, global = true, value_name = "SECS", default_value_t = 30, help = "HTTP timeout")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl every member profile of the term and add new members to the store
    Members,
    /// Crawl member speeches and add the ones the store lacks
    Speeches {
        #[arg(long, help = "Fetch every speech, not only those newer than the stored ones")]
        all: bool,

        #[arg(long, help = "Only crawl this member (either name order)")]
        name: Option<String>,
    },
    /// Crawl members, then speeches
    All,
    /// Clean the text dump of a plenary transcript PDF
    Transcript {
        #[arg(help = "Text file with one page per form feed")]
        file: PathBuf,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// List transcript PDF links found on a page
    Links {
        #[arg(help = "URL of the page to scan")]
        url: String,
    },
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

fn load_schema(path: Option<&Path>, term: Option<u32>) -> SiteSchema {
    let mut schema = match path {
        Some(path) => SiteSchema::from_json_file(path).unwrap_or_else(|e| {
            log::error!("Error loading site schema {}: {}", path.display(), e);
            process::exit(1);
        }),
        None => SiteSchema::default(),
    };
    if let Some(term) = term {
        schema.term = term;
    }
    schema
}

fn build_harvester(schema: SiteSchema, options: HarvestOptions) -> Harvester<WebScraper> {
    Harvester::from_options(schema, options).unwrap_or_else(|e| {
        log::error!("Error creating scraper: {}", e);
        process::exit(1);
    })
}

fn open_store(path: &Path) -> JsonStore {
    JsonStore::open(path).unwrap_or_else(|e| {
        log::error!("Error opening store {}: {}", path.display(), e);
        process::exit(1);
    })
}

fn persist_store(store: &JsonStore) {
    if let Err(e) = store.persist() {
        log::error!("Error writing store: {}", e);
        process::exit(1);
    }
}

fn write_unresolved(store_path: &Path, report: &SyncReport) {
    if report.unresolved.is_empty() {
        return;
    }

    let mut path = store_path.as_os_str().to_owned();
    path.push(".unresolved.json");
    let path = PathBuf::from(path);

    let written = serde_json::to_string_pretty(&report.unresolved)
        .map_err(|e| e.to_string())
        .and_then(|json| fs::write(&path, json).map_err(|e| e.to_string()));
    match written {
        Ok(()) => log::warn!(
            "{} unresolved speeches written to {}",
            report.unresolved.len(),
            path.display()
        ),
        Err(e) => log::error!("Error writing unresolved speeches: {}", e),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    let schema = load_schema(cli.schema.as_deref(), cli.term);

    let mut options = HarvestOptions {
        concurrency: usize::from(cli.concurrency),
        timeout: Duration::from_secs(cli.timeout),
        ..HarvestOptions::default()
    };

    match cli.command {
        Commands::Members => {
            let harvester = build_harvester(schema, options);
            let mut store = open_store(&cli.store);

            let report = harvester.sync_members(&mut store).await.unwrap_or_else(|e| {
                log::error!("Error syncing members: {}", e);
                process::exit(1);
            });
            persist_store(&store);
            println!("Members: {}", report);
        }

        Commands::Speeches { all, name } => {
            options.only_new = !all;
            options.name_filter = name;
            let harvester = build_harvester(schema, options);
            let mut store = open_store(&cli.store);

            let report = harvester.sync_speeches(&mut store).await.unwrap_or_else(|e| {
                log::error!("Error syncing speeches: {}", e);
                process::exit(1);
            });
            persist_store(&store);
            write_unresolved(&cli.store, &report);
            println!("Speeches: {}", report);
        }

        Commands::All => {
            let harvester = build_harvester(schema, options);
            let mut store = open_store(&cli.store);

            let members = harvester.sync_members(&mut store).await.unwrap_or_else(|e| {
                log::error!("Error syncing members: {}", e);
                process::exit(1);
            });
            persist_store(&store);
            println!("Members: {}", members);

            let speeches = harvester.sync_speeches(&mut store).await.unwrap_or_else(|e| {
                log::error!("Error syncing speeches: {}", e);
                process::exit(1);
            });
            persist_store(&store);
            write_unresolved(&cli.store, &speeches);
            println!("Speeches: {}", speeches);
        }

        Commands::Transcript { file, format } => {
            let text = fs::read_to_string(&file).unwrap_or_else(|e| {
                log::error!("Error reading {}: {}", file.display(), e);
                process::exit(1);
            });

            let cleaner = TranscriptCleaner::new(&schema.transcript).unwrap_or_else(|e| {
                log::error!("Invalid transcript pattern in schema: {}", e);
                process::exit(1);
            });

            let cleaned = cleaner.clean_pages(text.split('\u{c}')).unwrap_or_else(|e| {
                log::error!("Error cleaning transcript: {}", e);
                process::exit(1);
            });

            match format {
                OutputFormat::Json => serialize_json(&serde_json::json!({
                    "source": file.display().to_string(),
                    "text": cleaned,
                })),
                OutputFormat::Text => println!("{}", cleaned),
            }
        }

        Commands::Links { url } => {
            let url = schema.resolve(&url);
            log::info!("Fetching {}...", url);

            let scraper = WebScraper::with_timeout(options.timeout).unwrap_or_else(|e| {
                log::error!("Error creating scraper: {}", e);
                process::exit(1);
            });

            let html = scraper.get_html(&url).await.unwrap_or_else(|e| {
                log::error!("Error fetching {}: {}", url, e);
                process::exit(1);
            });

            let links = parse_transcript_links(&html);
            if links.is_empty() {
                println!("No transcript links found.");
            }
            for link in links {
                println!("{}", schema.resolve(&link));
            }
        }
    }
}

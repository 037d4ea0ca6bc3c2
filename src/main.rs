//! Puck line scraper CLI
//!
//! Walks the configured NHL seasons one date at a time and writes every final
//! game with a standard ±1.5 puck line to CSV or JSON.

use clap::{Parser, Subcommand};
use puckline::{Config, DateToken, OutputFormat, Result};

#[derive(Parser)]
#[command(name = "puckline")]
#[command(about = "Scrape historical NHL puck lines and results", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new project with default config
    Init,
    /// Fetch, validate and write puck line games
    Scrape {
        /// Only scrape these dates (YYYYMMDD); repeatable
        #[arg(long = "date", value_parser = parse_token)]
        dates: Vec<DateToken>,
        /// Cache directory for fetched pages
        #[arg(long)]
        cache: Option<String>,
        /// Use only cached pages (no network requests)
        #[arg(long)]
        offline: bool,
        /// Output file
        #[arg(long)]
        output: Option<String>,
        /// Output format (csv or json)
        #[arg(long)]
        format: Option<OutputFormat>,
        /// Tries per date before giving up on it
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Also store accepted games in this SQLite database
        #[arg(long)]
        db: Option<String>,
    },
    /// Show stored games
    Status,
}

fn parse_token(s: &str) -> std::result::Result<DateToken, String> {
    let token = DateToken::new(s.trim());
    match token.to_date() {
        Some(_) => Ok(token),
        None => Err(format!("Invalid date: {}. Use YYYYMMDD.", s)),
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match cli.command {
        Commands::Init => commands::init(&cli.config),
        Commands::Scrape {
            dates,
            cache,
            offline,
            output,
            format,
            max_attempts,
            db,
        } => {
            let mut config = config;
            if cache.is_some() {
                config.source.cache_dir = cache;
            }
            config.source.offline |= offline;
            if let Some(output) = output {
                config.output.path = output;
            }
            if let Some(format) = format {
                config.output.format = format;
            }
            if let Some(max_attempts) = max_attempts {
                config.retry.max_attempts = max_attempts;
            }
            if db.is_some() {
                config.output.database_path = db;
            }
            config
                .validate()
                .and_then(|_| commands::scrape(&config, dates))
        }
        Commands::Status => commands::status(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use puckline::data::{calendar, sink, Database, DonbestFetcher};
    use puckline::pipeline::{Classifier, Pipeline, RetryPolicy, RunReport};

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("data")?;
        println!("Created data/ directory");

        println!("\nNext steps:");
        println!("  1. Edit {} to customize seasons and output", config_path);
        println!("  2. Run 'puckline scrape --cache data/pages' to fetch the games");
        println!("  3. Run 'puckline status' to inspect stored games");

        Ok(())
    }

    pub fn scrape(config: &Config, dates: Vec<DateToken>) -> Result<()> {
        let tokens = if dates.is_empty() {
            calendar::date_tokens(&config.seasons)
        } else {
            dates
        };

        let fetcher = DonbestFetcher::new(&config.source)?;
        if let Some(cache_dir) = &config.source.cache_dir {
            println!("Using cache directory: {}", cache_dir);
        }
        if config.source.offline {
            println!("Offline mode: using cached pages only");
        }

        let reference_book = config.classify.reference_book;
        let pipeline = Pipeline::new(
            fetcher,
            Classifier::new(reference_book),
            RetryPolicy::from_config(&config.retry),
        );

        println!(
            "Scraping {} dates against {} puck lines...",
            tokens.len(),
            reference_book
        );
        let report = pipeline.run(tokens);
        print_summary(&report);

        let records = report.records.into_sorted_vec();
        sink::write_records(
            &config.output.path,
            config.output.format,
            reference_book,
            &records,
        )?;
        println!("Wrote {} games to {}", records.len(), config.output.path);

        if let Some(path) = &config.output.database_path {
            let mut db = Database::open(path)?;
            let count = db.upsert_games(&records)?;
            println!("Stored {} games in {}", count, path);
        }

        Ok(())
    }

    fn print_summary(report: &RunReport) {
        let stats = &report.stats;

        println!("\nRun Summary");
        println!("───────────────────────────────");
        println!("  Dates completed:  {}", stats.dates_completed);
        println!("  Attempts:         {}", stats.attempts);
        println!("  Games accepted:   {}", report.records.len());
        println!("  Games rejected:   {}", stats.total_rejected());
        for (reason, count) in &stats.rejected {
            println!("    {:<18} {}", reason, count);
        }
        println!(
            "  Requeues:         {} (transport {}, page shape {}, wrong page {})",
            stats.requeues,
            stats.transport_failures,
            stats.parse_shape_failures,
            stats.wrong_page_retries
        );
        if !report.abandoned.is_empty() {
            let abandoned: Vec<&str> = report.abandoned.iter().map(|t| t.as_str()).collect();
            println!(
                "  Abandoned:        {} ({})",
                abandoned.len(),
                abandoned.join(", ")
            );
        }
    }

    pub fn status(config: &Config) -> Result<()> {
        let Some(path) = &config.output.database_path else {
            println!("No database configured. Set output.database_path or pass --db to scrape.");
            return Ok(());
        };

        let db = Database::open(path)?;
        let stats = db.get_stats()?;

        println!("Database Status");
        println!("───────────────────────────────");
        println!("  Path:               {}", path);
        println!("  Games:              {}", stats.game_count);
        println!("  Favorites covered:  {}", stats.favorites_covered);
        if let (Some(earliest), Some(latest)) = (stats.earliest_game, stats.latest_game) {
            println!("  Range:              {} to {}", earliest, latest);
        }

        Ok(())
    }
}

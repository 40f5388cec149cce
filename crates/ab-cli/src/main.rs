mod server;
mod service;

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ab_core::{Bot, ExternalService, Session};
use ab_store::bot_dir::parse_aimlif;
use ab_store::{BotDir, Store, open_bot};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rmcp::{ServiceExt, transport::stdio};

use crate::service::HttpService;

#[derive(Parser)]
#[command(name = "ab", about = "AIML chatbot engine: chat, maintenance and MCP server")]
struct Cli {
    /// Bot directory (default: $AB_BOT_DIR, then the current directory)
    #[arg(long, global = true)]
    bot: Option<PathBuf>,

    /// Where ab.db lives (default: $AB_DATA_DIR, then the bot directory)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Client id owning the conversation's predicates
    #[arg(long, global = true, default_value = "local")]
    client: String,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive conversation on stdin; `quit` ends it
    Chat,

    /// Send a single request and print the reply
    Ask {
        /// Request text
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// Show bot statistics
    Stats,

    /// Write every loaded category to a file
    Export {
        /// Output file path
        path: PathBuf,

        #[arg(long, value_enum, default_value_t = Format::Aimlif)]
        format: Format,
    },

    /// Store the categories of an AIMLIF file so every later run loads them
    Import {
        /// AIMLIF file to read
        path: PathBuf,
    },

    /// Start MCP server on stdio transport
    Serve,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Aimlif,
    Aiml,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Chat => cmd_chat(&cli),
        Commands::Ask { text } => cmd_ask(&cli, &text.join(" ")),
        Commands::Stats => cmd_stats(&cli),
        Commands::Export { path, format } => cmd_export(&cli, path, *format),
        Commands::Import { path } => cmd_import(&cli, path),
        Commands::Serve => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(cmd_serve(&cli))
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

// ---------------------------------------------------------------------------
// Opening the bot and its store
// ---------------------------------------------------------------------------

fn bot_root(cli: &Cli) -> PathBuf {
    cli.bot
        .clone()
        .or_else(|| std::env::var("AB_BOT_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn data_dir(cli: &Cli) -> PathBuf {
    cli.data_dir
        .clone()
        .or_else(|| std::env::var("AB_DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| bot_root(cli))
}

fn open_store(cli: &Cli) -> Result<Store> {
    let dir = data_dir(cli);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create data directory {}", dir.display()))?;
    let path = dir.join("ab.db");
    Store::open(&path).with_context(|| format!("failed to open store {}", path.display()))
}

fn open_dir(cli: &Cli) -> Result<BotDir> {
    let root = bot_root(cli);
    BotDir::open(&root).with_context(|| format!("failed to open bot {}", root.display()))
}

fn http_service(dir: &BotDir) -> Result<Option<Arc<dyn ExternalService>>> {
    let manifest = dir.manifest();
    let Some(url) = &manifest.service_url else {
        return Ok(None);
    };
    let service = HttpService::new(url, manifest.config.service_timeout())
        .context("failed to build HTTP client")?;
    tracing::info!("external service at {}", service.endpoint());
    Ok(Some(Arc::new(service)))
}

/// The bot with its directory contents and everything the store persisted.
fn load(cli: &Cli) -> Result<(Bot, Store)> {
    let dir = open_dir(cli)?;
    let store = open_store(cli)?;
    let (bot, report) = open_bot(&dir, &store, http_service(&dir)?)
        .with_context(|| format!("failed to load bot {}", dir.root().display()))?;
    for (source, reason) in &report.rejected {
        tracing::warn!("skipped {source}: {reason}");
    }
    tracing::info!(
        "loaded {} categories ({} rejected)",
        report.loaded,
        report.rejected.len()
    );
    Ok((bot, store))
}

fn open_session(cli: &Cli, bot: Bot, store: &Store) -> Result<Session> {
    let mut session = Session::new(Arc::new(bot), &cli.client);
    let saved = store
        .load_predicates(&cli.client)
        .context("failed to load predicates")?;
    session.predicates_mut().extend_from(&saved);
    Ok(session)
}

fn save_session(session: &Session, store: &Store) -> Result<()> {
    store
        .persist_learned(session.bot())
        .context("failed to persist learned categories")?;
    store
        .save_predicates(session.client_id(), session.predicates())
        .context("failed to save predicates")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_serve(cli: &Cli) -> Result<()> {
    let (bot, store) = load(cli)?;
    tracing::info!("starting MCP server for bot '{}'", bot.name());

    let server = server::AbServer::new(bot, store);
    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server")?;
    service.waiting().await?;
    Ok(())
}

fn cmd_chat(cli: &Cli) -> Result<()> {
    let (bot, store) = load(cli)?;
    let name = bot.name().to_string();
    let mut session = open_session(cli, bot, &store)?;

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.eq_ignore_ascii_case("quit") {
            break;
        }
        let reply = session.respond(line);
        writeln!(stdout, "{name}: {reply}")?;
        save_session(&session, &store)?;
    }
    Ok(())
}

fn cmd_ask(cli: &Cli, text: &str) -> Result<()> {
    let (bot, store) = load(cli)?;
    let mut session = open_session(cli, bot, &store)?;
    let reply = session.respond(text);
    save_session(&session, &store)?;
    println!("{reply}");
    Ok(())
}

fn cmd_stats(cli: &Cli) -> Result<()> {
    let (bot, store) = load(cli)?;
    let stats = bot.stats();
    let stored = store.category_count().context("failed to count stored categories")?;

    println!("name:        {}", bot.name());
    println!("categories:  {}", stats.categories);
    println!("stored:      {stored}");
    println!("vocabulary:  {}", stats.vocabulary);
    println!("nodes:       {}", stats.nodes);
    println!("shortcuts:   {}", stats.shortcuts);
    println!("singletons:  {}", stats.singletons);
    println!(
        "branching:   max {} mean {:.2}",
        stats.max_branching, stats.mean_branching
    );
    println!("triples:     {}", bot.memory().len());

    if cli.verbose {
        eprintln!("--- data dir: {} ---", data_dir(cli).display());
    }
    Ok(())
}

fn cmd_export(cli: &Cli, path: &Path, format: Format) -> Result<()> {
    let (bot, _store) = load(cli)?;
    let mut categories = bot.categories();
    categories.sort_by(|a, b| {
        (a.filename(), a.path_key()).cmp(&(b.filename(), b.path_key()))
    });

    let mut out = String::new();
    match format {
        Format::Aimlif => {
            for category in &categories {
                out.push_str(&category.to_record());
                out.push('\n');
            }
        }
        Format::Aiml => {
            out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<aiml version=\"2.0\">\n");
            for category in &categories {
                out.push_str(&category.to_aiml());
                out.push('\n');
            }
            out.push_str("</aiml>\n");
        }
    }

    std::fs::write(path, out).with_context(|| format!("failed to write {}", path.display()))?;
    println!("exported {} categories to {}", categories.len(), path.display());
    Ok(())
}

fn cmd_import(cli: &Cli, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let (parsed, mut rejected) = parse_aimlif(&text, &path.display().to_string());

    let mut valid = Vec::with_capacity(parsed.len());
    for category in parsed {
        match category.validate() {
            Ok(()) => valid.push(category),
            Err(e) => rejected.push((category.path_key(), e.to_string())),
        }
    }
    for (source, reason) in &rejected {
        eprintln!("  skipped {source}: {reason}");
    }

    let store = open_store(cli)?;
    let saved = store
        .save_categories(&valid)
        .context("failed to store categories")?;
    println!("imported {saved} categories ({} skipped)", rejected.len());
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ayuda_core::connectivity::DEFAULT_PROBE_TARGET;
use ayuda_core::keystore::mask_key;
use ayuda_core::{
    Config, ConnectivityMonitor, Conversation, Directory, FileStorage, GeminiClient, GuideBook,
    KeyStore, Scenario, StoredCredentials,
};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

const LOG_FILE_NAME: &str = "ayuda.log";

#[derive(Parser)]
#[command(name = "ayuda")]
#[command(version, about = "Emergency directory, safety guides and an AI assistant for Guatemala")]
struct Cli {
    /// Config file (defaults to <config dir>/ayuda-gt/config.json)
    #[arg(long, global = true, env = "AYUDA_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Without a subcommand the terminal interface opens
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the assistant a single question
    Ask {
        /// Your question
        question: String,
    },
    /// Manage the stored Gemini API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Print a scenario guide (fire, earthquake, firstAid, lost, theft)
    Guide {
        scenario: String,
    },
    /// List emergency services
    Directory {
        /// Filter by name, category or phone number
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Translate text with the assistant
    Translate {
        text: String,
        /// Target language (defaults to the configured one)
        #[arg(short, long)]
        language: Option<String>,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Save a key
    Set { key: String },
    /// Show the key masked, and where it comes from
    Show,
    /// Delete the stored key
    Remove,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Warning: could not read config, using defaults: {}", e);
            Config::new()
        }),
    };

    match cli.command {
        None => {
            init_file_logging()?;
            run_tui(config).await?
        }
        Some(command) => {
            init_stderr_logging();
            run_command(command, config).await?
        }
    }

    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// The alternate screen owns the terminal, so the TUI logs to a file
fn init_file_logging() -> Result<()> {
    let dir = Config::get_cache_dir();
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(LOG_FILE_NAME);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| anyhow!("Failed to open log file {:?}: {}", path, e))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

async fn run_tui(config: Config) -> Result<()> {
    tui::install_panic_hook();

    let mut events = EventHandler::new();
    let mut app = App::new(config, events.sender()).await?;

    let monitor = ConnectivityMonitor::default();
    events.forward_connectivity(monitor.subscribe());
    let probe = monitor.spawn_probe(DEFAULT_PROBE_TARGET.to_string(), Duration::from_secs(15));

    let mut terminal = tui::init()?;
    tracing::info!("terminal interface started");

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event).await?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    probe.abort();
    app.audio.release();
    tui::restore()?;
    result
}

async fn run_command(command: Commands, config: Config) -> Result<()> {
    let storage = Arc::new(FileStorage::default_location()?);
    let credentials = Arc::new(StoredCredentials::new(KeyStore::new(storage)));

    match command {
        Commands::Ask { question } => {
            let client = GeminiClient::new(config.client_settings(), credentials);
            let mut conversation = Conversation::empty();
            let reply = conversation.send(&client, &question).await?;
            println!("{}", reply.text);
        }
        Commands::Key { action } => manage_key(action, &credentials)?,
        Commands::Guide { scenario } => print_guide(&config, &scenario).await?,
        Commands::Directory { search } => print_directory(&config, search.as_deref()).await?,
        Commands::Translate { text, language } => {
            let client = GeminiClient::new(config.client_settings(), credentials);
            let language = language.as_deref().unwrap_or(config.translate_language());
            let translation = client
                .translate(&text, language)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "translation failed");
                    e.translate_reply()
                });
            println!("{}", translation);
        }
    }

    Ok(())
}

fn manage_key(action: KeyAction, credentials: &StoredCredentials) -> Result<()> {
    let store = credentials.store();
    match action {
        KeyAction::Set { key } => {
            let key = key.trim();
            if key.is_empty() {
                return Err(anyhow!("Ingresa una API Key válida."));
            }
            store.save(key)?;
            println!("API Key guardada.");
        }
        KeyAction::Show => match credentials.resolve() {
            Some((key, source)) => println!("{} ({})", mask_key(&key), source.as_str()),
            None => println!("No hay API Key configurada."),
        },
        KeyAction::Remove => {
            store.remove()?;
            println!("API Key eliminada.");
        }
    }
    Ok(())
}

async fn print_guide(config: &Config, id: &str) -> Result<()> {
    let scenario = Scenario::from_id(id).ok_or_else(|| {
        let known: Vec<&str> = Scenario::all().iter().map(|s| s.as_str()).collect();
        anyhow!("Unknown scenario '{}', expected one of: {}", id, known.join(", "))
    })?;

    let book = match &config.guides_path {
        Some(path) => GuideBook::load_from_json(path).await?,
        None => GuideBook::builtin(),
    };
    let guide = book
        .get(scenario)
        .ok_or_else(|| anyhow!("No guide for '{}'", scenario.as_str()))?;

    println!("{}\n", guide.title);
    for step in guide.numbered_steps() {
        println!("{}", step);
    }
    Ok(())
}

async fn print_directory(config: &Config, search: Option<&str>) -> Result<()> {
    let directory = match &config.directory_path {
        Some(path) => Directory::load_from_json(path).await?,
        None => Directory::builtin(),
    };

    let results = directory.search(search.unwrap_or(""), usize::MAX);
    if results.is_empty() {
        println!("No se encontraron servicios");
        return Ok(());
    }

    let mut current_category = "";
    for (category, item) in results {
        if category.title != current_category {
            println!("\n{}", category.title);
            current_category = &category.title;
        }
        match &item.phone {
            Some(phone) => println!("  {:<40} {}", item.name, phone),
            None => println!("  {}", item.name),
        }
    }
    Ok(())
}

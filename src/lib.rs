pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod daemon;
pub mod daemon_client;
pub mod history;
pub mod history_cache;
pub mod init;
pub mod json_extract;
pub mod plan;
pub mod suggest;
pub mod util;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, ConfigAction, InitAction};

/// Process entry point, called from the binary.
pub fn main_inner() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    config::load_dotenv(Path::new(".env"));
    config::load_api_keys_into_env();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Daemon { port_file }) => run_daemon(port_file).await,
        Some(Commands::Suggest { cwd, partial }) => run_suggest(cwd, partial).await,
        Some(Commands::Init { action }) => {
            match action {
                InitAction::Zsh => print!("{}", init::zsh_script()),
                InitAction::Alias => println!("{}", init::alias_script()),
            }
            Ok(())
        }
        Some(Commands::Config { action }) => run_config(action),
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "komplete", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Version) => {
            println!("komplete {}", env!("KOMPLETE_BUILD_LONG_VERSION"));
            Ok(())
        }
        None => {
            let request = cli.request.join(" ");
            if request.trim().is_empty() {
                Cli::command().print_help()?;
                bail!("no request given");
            }
            let opts = plan::RequestOptions {
                dry_run: cli.dry_run,
                model: cli.model,
                shell: cli.shell,
                cwd: cli.cwd,
                timeout: cli.timeout,
                verbose: cli.verbose,
            };
            plan::run_request(&request, &opts).await
        }
    }
}

async fn run_daemon(port_file: Option<std::path::PathBuf>) -> Result<()> {
    let config = config::Config::load().unwrap_or_default();
    let api_key = config::resolve_api_key(&config)?;

    let server_config = daemon::ServerConfig::new(port_file, config.shell.clone());
    daemon::ensure_port_file_dir(&server_config.port_file)?;

    let client = suggest::GroqClient::new(
        api_key,
        config.groq_model.clone(),
        Duration::from_secs(2),
    );
    let server = daemon::Server::bind(server_config, Arc::new(client)).await?;
    eprintln!("komplete daemon listening on {}", server.local_addr()?);
    server.run().await
}

/// One-shot suggestion: ask a running daemon first, fall back to a direct
/// completion call. Stays silent on any failure so the shell plugin never
/// sees an error.
async fn run_suggest(cwd: Option<String>, partial: Vec<String>) -> Result<()> {
    let buffer = partial.join(" ");
    if buffer.trim().is_empty() {
        return Ok(());
    }

    let shell = std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "zsh".to_string());
    let cwd = match cwd {
        Some(c) => c,
        None => std::env::current_dir()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let request = daemon::SuggestRequest {
        buffer: buffer.clone(),
        cwd: cwd.clone(),
        shell: shell.clone(),
    };
    let port_file = daemon::default_port_file();
    if let Some(suggestion) = daemon_client::fetch_suggestion(&port_file, &request) {
        println!("{suggestion}");
        return Ok(());
    }

    let config = config::Config::load().unwrap_or_default();
    let Ok(api_key) = config::resolve_api_key(&config) else {
        return Ok(());
    };
    let client = suggest::GroqClient::new(
        api_key,
        config.groq_model.clone(),
        Duration::from_secs(2),
    );
    let history = history::shell_history(&shell);
    let completion = tokio::time::timeout(
        daemon::COMPLETION_DEADLINE,
        suggest::CompletionProvider::complete(&client, &buffer, &cwd, &shell, &history),
    )
    .await;
    if let Ok(Ok(suggestion)) = completion {
        if !suggestion.is_empty() {
            println!("{suggestion}");
        }
    }
    Ok(())
}

fn run_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = config::Config::load()?;
            match config.get(&key)? {
                Some(value) => {
                    println!("{value}");
                    Ok(())
                }
                None => bail!("value not set"),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = config::Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("Set {key} = {value}");
            Ok(())
        }
        ConfigAction::List => {
            let config = config::Config::load()?;
            for key in config::ALLOWED_KEYS {
                if let Some(value) = config.get(key)? {
                    println!("{key} = {value}");
                }
            }
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", config::Config::path()?.display());
            Ok(())
        }
    }
}

//! Usage: Auth bootstrap CLI (`auth` / `url` / `status`).

use clap::{Parser, Subcommand};
use dialoguer::{Input, Password};
use ticktick_mcp::app::logging;
use ticktick_mcp::shared::security::mask_token;
use ticktick_mcp::{codes, AppError, AppResult, AuthStore, Authenticator, Config};

#[derive(Parser)]
#[command(name = "ticktick-mcp", version, about = "TickTick OAuth2 auth bootstrap")]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG when set).
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the browser authorization flow and persist the tokens.
    Auth,
    /// Print the authorization URL for manual navigation.
    Url,
    /// Report the persisted auth record (tokens masked).
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if cli.debug && std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "debug");
    }
    let _log_guard = logging::init(Some(logging::default_log_dir()));

    // Panics land in the disk log for post-mortem diagnosis. The payload is
    // intentionally NOT logged to avoid leaking user content.
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        tracing::error!(location = %location, "PANIC: process panicked");
    }));

    if let Err(err) = run(cli).await {
        tracing::error!(code = err.code(), "{err}");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let config = Config::from_env();
    let store = AuthStore::new(&config);

    match cli.command {
        Commands::Auth => auth(config, store).await,
        Commands::Url => url(config, store),
        Commands::Status => status(store).await,
    }
}

async fn auth(mut config: Config, store: AuthStore) -> AppResult<()> {
    ensure_credentials_interactive(&mut config)?;

    let authenticator = Authenticator::new(config, store)?;
    eprintln!("Opening the TickTick authorization page in your browser...");
    eprintln!("Waiting for the callback on http://localhost:8000/callback");

    let pair = authenticator.start_flow().await?;

    eprintln!("Authorization successful.");
    eprintln!("  access token:  {}", mask_token(&pair.access_token));
    eprintln!(
        "  refresh token: {}",
        pair.refresh_token
            .as_deref()
            .map(mask_token)
            .unwrap_or_else(|| "<none>".to_string())
    );
    eprintln!(
        "Credentials saved to {}",
        authenticator.store().path().display()
    );
    Ok(())
}

fn url(mut config: Config, store: AuthStore) -> AppResult<()> {
    ensure_credentials_interactive(&mut config)?;
    let authenticator = Authenticator::new(config, store)?;
    let state = ticktick_mcp::auth::flow::generate_state_nonce();
    println!("{}", authenticator.authorization_url(&state)?);
    Ok(())
}

async fn status(store: AuthStore) -> AppResult<()> {
    let record = store.load().await?;
    println!("auth file: {}", store.path().display());
    if !record.has_access_token() && !record.has_refresh_token() {
        println!("no persisted tokens; run `ticktick-mcp auth`");
        return Ok(());
    }
    println!(
        "access token:  {}",
        if record.has_access_token() {
            mask_token(&record.access_token)
        } else {
            "<none>".to_string()
        }
    );
    println!(
        "refresh token: {}",
        if record.has_refresh_token() {
            mask_token(&record.refresh_token)
        } else {
            "<none>".to_string()
        }
    );
    Ok(())
}

/// Prompts for whichever half of the client credential the environment lacks.
fn ensure_credentials_interactive(config: &mut Config) -> AppResult<()> {
    if config.client_id.trim().is_empty() {
        config.client_id = Input::new()
            .with_prompt("TickTick client ID")
            .interact_text()
            .map_err(|e| {
                AppError::new(codes::INVALID_CREDENTIALS, format!("prompt failed: {e}"))
            })?;
    }
    if config.client_secret.trim().is_empty() {
        config.client_secret = Password::new()
            .with_prompt("TickTick client secret")
            .interact()
            .map_err(|e| {
                AppError::new(codes::INVALID_CREDENTIALS, format!("prompt failed: {e}"))
            })?;
    }
    config.require_credentials()
}

//! NOWEX admin CLI - sign in to the exchange admin backend and query it
//! from a terminal.
//!
//! Session tokens persist between runs in the store chosen by the config
//! (`file` by default), so `nowex login` once and later commands reuse it.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use nowex_core::api::{ApiClient, DEFAULT_USER_PAGE_SIZE};
use nowex_core::auth::{AuthError, AuthManager};
use nowex_core::config::{Config, StoreKind};
use nowex_core::models::LoginRequest;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Constants
// ============================================================================

/// Password source for non-interactive use
const ENV_PASSWORD: &str = "NOWEX_PASSWORD";

/// Passphrase for the encrypted session store
const ENV_STORE_PASSPHRASE: &str = "NOWEX_STORE_PASSPHRASE";

const USAGE: &str = "\
Usage: nowex <command> [args]

Commands:
  login [email]          Sign in and store the session tokens
  logout                 Revoke the session and clear stored tokens
  status                 Show whether a session token is stored
  get <path>             GET an arbitrary API path and print the JSON
  users [page] [limit]   List admin users (default page 1, limit 10)
  help                   Show this message

Environment:
  NOWEX_API_URL, NOWEX_TIMEOUT_MS, NOWEX_STORE, NOWEX_PASSWORD,
  NOWEX_STORE_PASSPHRASE, RUST_LOG";

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes buffered log lines when dropped.
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("help");
    if matches!(command, "help" | "-h" | "--help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load().context("Failed to load configuration")?;
    debug!(api_url = %config.api_url, store = %config.store, "Configuration loaded");

    let passphrase = std::env::var(ENV_STORE_PASSPHRASE).ok();
    let store = config.open_store(passphrase)?;
    let client = ApiClient::new(&config.client_config(), store)?;
    let auth = AuthManager::new(client);

    match command {
        "login" => login(&auth, &mut config, args.get(1).cloned()).await,
        "logout" => logout(&auth).await,
        "status" => {
            status(&auth, &config);
            Ok(())
        }
        "get" => {
            let path = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("Usage: nowex get <path>"))?;
            let body: serde_json::Value = auth.client().get(path, None).await?;
            print_json(&body)
        }
        "users" => {
            let page = parse_arg(args.get(1), 1, "page")?;
            let limit = parse_arg(args.get(2), DEFAULT_USER_PAGE_SIZE, "limit")?;
            let users = auth.client().list_users(page, limit).await?;
            for user in &users {
                println!(
                    "{:<38} {:<32} {:<24} {:?}/{}",
                    user.id,
                    user.email,
                    user.name,
                    user.role,
                    user.status.display_name()
                );
            }
            Ok(())
        }
        other => Err(anyhow::anyhow!("Unknown command '{}'\n\n{}", other, USAGE)),
    }
}

async fn login(auth: &AuthManager, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = match std::env::var(ENV_PASSWORD) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password(format!("Password for {}: ", email))
            .context("Failed to read password")?,
    };

    let session = auth.login(&LoginRequest::new(email.clone(), password)).await?;
    println!("Signed in as {} ({})", session.user.name, session.user.role);

    // The memory store forgets the session on exit, so there is nothing to remember.
    if config.store != StoreKind::Memory {
        config.last_email = Some(email);
        config.save().context("Failed to save configuration")?;
    }
    info!(user = %session.user.email, "Session stored");
    Ok(())
}

async fn logout(auth: &AuthManager) -> Result<()> {
    let result = auth.logout().await;
    report_logout(result, auth.is_authenticated())
}

/// A remote failure is only a warning once the local tokens are gone.
/// Storage failures, or tokens still present, fail the command.
fn report_logout(result: std::result::Result<(), AuthError>, still_signed_in: bool) -> Result<()> {
    match result {
        Ok(()) if !still_signed_in => println!("Signed out"),
        Err(AuthError::Api(e)) if !still_signed_in => {
            eprintln!("Remote logout failed ({}: {}); local session cleared", e.code(), e.message());
        }
        Err(e @ AuthError::Store(_)) => {
            return Err(anyhow::Error::new(e).context("Failed to clear the local session"));
        }
        Ok(()) | Err(AuthError::Api(_)) => {
            return Err(anyhow::anyhow!("Local session tokens are still stored after logout"));
        }
    }
    Ok(())
}

fn status(auth: &AuthManager, config: &Config) {
    let state = if auth.is_authenticated() {
        "signed in"
    } else {
        "signed out"
    };
    println!("API:     {}", config.api_url);
    println!("Store:   {}", config.store);
    println!("Session: {}", state);
    if let Some(ref email) = config.last_email {
        println!("Email:   {}", email);
    }
}

fn parse_arg(arg: Option<&String>, default: u32, name: &str) -> Result<u32> {
    match arg {
        Some(value) => value
            .parse()
            .with_context(|| format!("{} must be a positive number", name)),
        None => Ok(default),
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        return Err(anyhow::anyhow!("No input provided"));
    }
    Ok(value)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! booktracker server entry point.

use booktracker::{
    auth::AuthService,
    config::{Cli, Command, Config, UserCommand},
    db::Database,
    server,
};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    // Handle command
    match cli.command {
        Some(Command::Init { force }) => cmd_init(force).await,
        Some(Command::User { action }) => cmd_user(action, &config).await,
        Some(Command::Serve { bind }) => cmd_serve(config, bind, cli.local).await,
        None => {
            // Default: start server
            cmd_serve(config, None, cli.local).await
        }
    }
}

/// Initialize config and database.
async fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    // Write default config
    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    // Initialize database
    let config = Config::default();
    let _db = Database::open(&config.database.path)?;
    println!("Initialized database: {}", config.database.path.display());

    println!("\nEdit config.toml to configure your server.");
    println!("Then run: booktracker user add <login> --password <password>");

    Ok(())
}

/// User management commands.
async fn cmd_user(action: UserCommand, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let auth = AuthService::new(
        db,
        config.auth.session_days,
        config.auth.registration_enabled(),
    );

    match action {
        UserCommand::Add { login, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("Password: ")?,
            };

            let user = auth.create_user(&login, &password)?;
            println!("Created user: {} (eid: {})", user.login, user.eid);
        }

        UserCommand::Del { login } => {
            if auth.delete_user(&login)? {
                println!("Deleted user: {}", login);
            } else {
                println!("User not found: {}", login);
            }
        }

        UserCommand::List => {
            let users = auth.list_users()?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<24} {:<36} LAST LOGIN", "LOGIN", "EID");
                println!("{}", "-".repeat(80));
                for user in users {
                    let last_login = user
                        .last_login
                        .map(|ts| {
                            chrono::DateTime::from_timestamp(ts, 0)
                                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                                .unwrap_or_else(|| "unknown".to_string())
                        })
                        .unwrap_or_else(|| "never".to_string());
                    println!("{:<24} {:<36} {}", user.login, user.eid, last_login);
                }
            }
        }

        UserCommand::Passwd { login, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("New password: ")?,
            };

            if auth.change_password(&login, &password)? {
                println!("Password changed for: {}", login);
            } else {
                println!("User not found: {}", login);
            }
        }
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(
    mut config: Config,
    bind: Option<std::net::SocketAddr>,
    local: bool,
) -> anyhow::Result<()> {
    // CLI overrides
    if let Some(addr) = bind {
        config.server.bind = addr;
    }
    if local {
        config.server.local = true;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "booktracker=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Open database
    let db = Database::open(&config.database.path)?;

    let expired = db.cleanup_expired_sessions()?;
    if expired > 0 {
        tracing::info!(sessions = expired, "Removed expired sessions");
    }

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        local = config.server.local,
        "Starting booktracker server"
    );

    if config.server.local {
        tracing::warn!("Local mode: plain HTTP requests are not redirected to HTTPS");
    }

    let bind_addr = config.server.bind;
    let state = server::AppState::new(config, db);
    let app = server::create_router(state);

    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(address = %bind_addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Prompt for password input.
fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut password = String::new();
    io::stdin().read_line(&mut password)?;

    Ok(password.trim().to_string())
}

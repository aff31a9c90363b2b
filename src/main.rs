use std::net::SocketAddr;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use notewall::accounts::{reaper, session, users};
use notewall::config::{Cli, Command, Config};
use notewall::db;
use notewall::routes;
use notewall::state::{AppState, DbPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, pool).await,
        Command::ReapGuests => reap_guests(&config, &pool),
        Command::CreateSuperuser { username, password } => {
            create_superuser(&config, &pool, &username, &password)
        }
    }
}

async fn serve(config: Config, pool: DbPool) -> anyhow::Result<()> {
    // Ensure uploads directory exists
    std::fs::create_dir_all(config.uploads_path())?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = routes::app(AppState::new(pool, config));

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn reap_guests(config: &Config, pool: &DbPool) -> anyhow::Result<()> {
    let now = Utc::now();
    let report = reaper::reap_expired_guests(pool, config.guest.retention(), now)?;
    let purged = session::purge_expired(pool, now)?;

    if report.deleted > 0 {
        println!("Deleted {} guest account(s) created before {}.", report.deleted, report.cutoff);
    } else {
        println!("No guest accounts to delete.");
    }
    tracing::info!(sessions = purged, "Expired sessions purged");
    Ok(())
}

fn create_superuser(
    config: &Config,
    pool: &DbPool,
    username: &str,
    password: &str,
) -> anyhow::Result<()> {
    let errors = users::validate_signup(username, password, password, &config.guest.username_prefix);
    if !errors.is_empty() {
        anyhow::bail!(errors.join(" "));
    }
    let user = users::create_registered(pool, username, password, true, config.auth.bcrypt_cost)?;
    println!("Superuser {} created (id {}).", user.username, user.id);
    Ok(())
}

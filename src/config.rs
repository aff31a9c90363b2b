use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "notewall",
    about = "Collaborative sticky-note boards with a discussion forum"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the web server (default)
    Serve,
    /// Delete guest accounts past the retention window, with everything they own
    ReapGuests,
    /// Create a registered account with superuser rights
    CreateSuperuser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub guest: GuestConfig,
    pub forum: ForumConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
    /// URL prefix uploaded files are served under
    pub media_url: String,
    pub max_upload_bytes: usize,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub session_hours: u64,
    pub bcrypt_cost: u32,
    /// How long auto-guest stays suppressed after a guest is sent to the login page
    pub login_suspend_secs: i64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GuestConfig {
    pub username_prefix: String,
    pub suffix_digits: usize,
    pub password_length: usize,
    pub retention_hours: i64,
    pub max_mint_attempts: u32,
    /// Paths where a visitor is provisioned automatically. Empty means everywhere.
    pub auto_paths: Vec<String>,
    pub excluded_paths: Vec<String>,
    pub login_path: String,
    pub signup_path: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ForumConfig {
    pub page_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            media_url: "/media".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "notewall_session".to_string(),
            session_hours: 336,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            login_suspend_secs: 300,
        }
    }
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            username_prefix: "Guest_".to_string(),
            suffix_digits: 6,
            password_length: 12,
            retention_hours: 24,
            max_mint_attempts: 32,
            auto_paths: ["/", "/collaboration/", "/forum/"]
                .into_iter()
                .map(String::from)
                .collect(),
            excluded_paths: [
                "/accounts/logout/",
                "/accounts/guest-login/",
                "/admin/",
                "/static/",
                "/media/",
                "/api/",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            login_path: "/accounts/login/".to_string(),
            signup_path: "/accounts/signup/".to_string(),
        }
    }
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self { page_size: 10 }
    }
}

impl GuestConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours)
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("notewall.db"));
        }
        if config.storage.path.is_none() {
            config.storage.path = Some(data_dir.join("uploads"));
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".notewall")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("notewall.db"))
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("uploads"))
    }
}

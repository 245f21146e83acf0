use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;
const DEFAULT_RATE_LIMIT: u32 = 300;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub database_url: String,
    pub assets_dir: PathBuf,
    /// Cookie signing secret. None means a fresh secret per process.
    pub session_secret: Option<String>,
    pub max_upload_bytes: usize,
    /// Requests per minute per client address.
    pub rate_limit: u32,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("data_dir", &self.data_dir)
            .field("database_url", &self.database_url)
            .field("assets_dir", &self.assets_dir)
            .field("session_secret", &self.session_secret.as_ref().map(|_| "<redacted>"))
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Tardigradio audio sharing site")]
pub struct Args {
    /// Port to listen on
    pub port: Option<u16>,

    /// Host to bind to (overrides TARDIGRADIO_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Directory for the database and local object storage (overrides TARDIGRADIO_DATA_DIR)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Database URL (overrides TARDIGRADIO_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory served under /assets (overrides TARDIGRADIO_ASSETS_DIR)
    #[arg(long)]
    pub assets_dir: Option<PathBuf>,

    /// Apply the database schema and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge parsed arguments with variables from `lookup`. Arguments win.
    pub fn resolve<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_host = lookup("TARDIGRADIO_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_data_dir = lookup("TARDIGRADIO_DATA_DIR").unwrap_or_else(|| "./data".into());
        let data_dir = args.data_dir.unwrap_or_else(|| PathBuf::from(env_data_dir));

        let database_url = match args.database_url.or_else(|| lookup("TARDIGRADIO_DATABASE_URL")) {
            Some(url) => url,
            None => format!("sqlite://{}", data_dir.join("db.sqlite").display()),
        };

        let assets_dir = args
            .assets_dir
            .or_else(|| lookup("TARDIGRADIO_ASSETS_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("./assets"));

        let session_secret = lookup("TARDIGRADIO_SESSION_SECRET").filter(|s| !s.is_empty());

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(DEFAULT_PORT),
            data_dir,
            database_url,
            assets_dir,
            session_secret,
            max_upload_bytes: parse_var(
                &lookup,
                "TARDIGRADIO_MAX_UPLOAD_BYTES",
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            rate_limit: parse_var(&lookup, "TARDIGRADIO_RATE_LIMIT", DEFAULT_RATE_LIMIT)?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(default),
    }
}

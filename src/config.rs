use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Keep zero-file partitions in statistics responses.
    pub include_empty: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Statistics reporting over a sharded bucket store")]
pub struct Args {
    /// Host to bind to (overrides BUCKET_STATS_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BUCKET_STATS_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides BUCKET_STATS_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Keep zero-file partitions in responses (or BUCKET_STATS_INCLUDE_EMPTY=1)
    #[arg(long)]
    pub include_empty_partitions: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("BUCKET_STATS_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("BUCKET_STATS_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing BUCKET_STATS_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading BUCKET_STATS_PORT"),
        };
        let env_db = env::var("BUCKET_STATS_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/bucket_stats.db".into());
        let env_include_empty = matches!(
            env::var("BUCKET_STATS_INCLUDE_EMPTY").as_deref(),
            Ok("1") | Ok("true")
        );

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            include_empty: args.include_empty_partitions || env_include_empty,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

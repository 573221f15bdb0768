use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use uuid::Uuid;

/// Command-line arguments for the agora binary.
#[derive(Debug, Parser)]
#[command(name = "agora", version, about = "Social feed core")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "AGORA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Apply bundled migrations to the configured database.
    Migrate(DatabaseOverride),
    /// Assemble one feed window and print it as JSON.
    Feed(FeedArgs),
    /// Verify database connectivity.
    Check(DatabaseOverride),
}

impl Default for Command {
    fn default() -> Self {
        Self::Check(DatabaseOverride::default())
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverrides {
    /// Enable or disable the read-through cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub enabled: Option<bool>,

    /// Override the feed window TTL.
    #[arg(long = "cache-feed-ttl-seconds", value_name = "SECONDS")]
    pub feed_ttl_secs: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct FeedArgs {
    /// Viewer whose feed is assembled.
    #[arg(long, value_name = "UUID")]
    pub viewer: Uuid,

    /// Page size (clamped to 1..=100).
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<u32>,

    /// Number of items to skip.
    #[arg(long, value_name = "COUNT")]
    pub offset: Option<u32>,

    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(flatten)]
    pub cache: CacheOverrides,
}

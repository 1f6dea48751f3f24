use clap::{Parser, Subcommand};

use super::config::CacheBackendType;
use super::constants::{
    ENV_CACHE_REDIS_URL, ENV_HOST, ENV_INGEST_HARD_LIMIT, ENV_INGEST_SOFT_LIMIT, ENV_PORT,
};

#[derive(Parser)]
#[command(name = "errorwatch")]
#[command(version, about = "Error monitoring and alerting server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Cache backend (memory or redis)
    #[arg(long, global = true, value_parser = parse_cache_backend_type)]
    pub cache_backend: Option<CacheBackendType>,

    /// Redis-compatible cache URL (redis://host:port/db)
    #[arg(long, global = true, env = ENV_CACHE_REDIS_URL)]
    pub cache_redis_url: Option<String>,

    /// Per-second soft ingest limit (accept everything below this)
    #[arg(long, global = true, env = ENV_INGEST_SOFT_LIMIT)]
    pub ingest_soft_limit: Option<u32>,

    /// Per-second hard ingest limit (drop everything at or above this)
    #[arg(long, global = true, env = ENV_INGEST_HARD_LIMIT)]
    pub ingest_hard_limit: Option<u32>,
}

/// Parse cache backend type from CLI/env string
fn parse_cache_backend_type(s: &str) -> Result<CacheBackendType, String> {
    match s.to_lowercase().as_str() {
        "memory" => Ok(CacheBackendType::Memory),
        "redis" => Ok(CacheBackendType::Redis),
        _ => Err(format!(
            "Invalid cache backend '{}'. Valid options: memory, redis",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the server (default command)
    Start,
    /// System maintenance commands
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum SystemCommands {
    /// Delete local data directory (database, caches). Requires confirmation.
    Prune {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub cache_backend: Option<CacheBackendType>,
    pub cache_redis_url: Option<String>,
    pub ingest_soft_limit: Option<u32>,
    pub ingest_hard_limit: Option<u32>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        host: cli.host,
        port: cli.port,
        cache_backend: cli.cache_backend,
        cache_redis_url: cli.cache_redis_url,
        ingest_soft_limit: cli.ingest_soft_limit,
        ingest_hard_limit: cli.ingest_hard_limit,
    };
    (config, cli.command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cache_backend_type() {
        assert!(matches!(
            parse_cache_backend_type("memory"),
            Ok(CacheBackendType::Memory)
        ));
        assert!(matches!(
            parse_cache_backend_type("Redis"),
            Ok(CacheBackendType::Redis)
        ));
        assert!(parse_cache_backend_type("memcached").is_err());
    }
}

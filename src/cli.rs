//! Command-line arguments for the server binary.

use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;

/// Natural-language copilot for your databases.
#[derive(Parser, Debug)]
#[command(name = "db-copilot")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", env = "DB_COPILOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on (overrides [server] bind)
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// SQLite state database (overrides [storage] path)
    #[arg(long, value_name = "PATH")]
    pub state_db: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Applies flag overrides on top of file and environment settings.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if let Some(path) = &self.state_db {
            config.storage.path = Some(path.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["db-copilot"]).unwrap();
        assert_eq!(cli.log_level, "info");
        assert!(!cli.json_logs);
        assert!(cli.bind.is_none());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "db-copilot",
            "--bind",
            "127.0.0.1:9999",
            "--state-db",
            "/tmp/state.db",
            "--json-logs",
        ])
        .unwrap();
        let mut config = Config::default();
        cli.apply_to(&mut config);

        assert_eq!(config.server.bind, "127.0.0.1:9999");
        assert_eq!(config.storage.path, Some(PathBuf::from("/tmp/state.db")));
        assert!(cli.json_logs);
    }

    #[test]
    fn test_explicit_config_path() {
        let cli = Cli::try_parse_from(["db-copilot", "--config", "/etc/copilot.toml"]).unwrap();
        assert_eq!(cli.config_path(), PathBuf::from("/etc/copilot.toml"));
    }
}

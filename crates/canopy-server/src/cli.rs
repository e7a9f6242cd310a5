use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "canopy-server", version)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (the default).
    Serve,
    /// Load and validate the configuration, then exit.
    CheckConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_parses_serve_subcommand() {
        let cli = Cli::parse_from(["canopy-server", "serve"]);
        assert!(matches!(cli.command, Some(Command::Serve)));
    }

    #[test]
    fn cli_parses_check_config_subcommand() {
        let cli = Cli::parse_from(["canopy-server", "check-config"]);
        assert!(matches!(cli.command, Some(Command::CheckConfig)));
    }

    #[test]
    fn cli_parses_config_flag() {
        let cli = Cli::parse_from(["canopy-server", "--config", "/etc/canopy.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/canopy.toml")));
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_defaults_to_no_subcommand() {
        let cli = Cli::parse_from(["canopy-server"]);
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn cli_config_flag_works_after_subcommand() {
        let cli =
            Cli::parse_from(["canopy-server", "check-config", "--config", "/etc/canopy.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/canopy.toml")));
        assert!(matches!(cli.command, Some(Command::CheckConfig)));
    }

    #[test]
    fn cli_rejects_unknown_subcommand() {
        let result = Cli::try_parse_from(["canopy-server", "migrate"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_version_flag() {
        let result = Cli::try_parse_from(["canopy-server", "--version"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}

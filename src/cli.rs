//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// DevOps API server - authentication, RBAC and cached resource queries
#[derive(Parser, Debug)]
#[command(name = "devops-apiserver")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "DEVOPS_APISERVER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "DEVOPS_APISERVER_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "DEVOPS_APISERVER_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "DEVOPS_APISERVER_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "DEVOPS_APISERVER_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Debug mode: allows the in-process credential store via redis host `FAKE`
    #[arg(long, env = "DEVOPS_APISERVER_DEBUG")]
    pub debug: bool,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the API server (default)
    Serve,

    /// Print which configuration sections are present, as JSON
    Config,

    /// Print a bcrypt hash for seeding a user's password
    HashPassword {
        /// Plain-text password
        #[arg(required = true)]
        password: String,

        /// bcrypt cost
        #[arg(long, default_value_t = bcrypt::DEFAULT_COST)]
        cost: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default() {
        let cli = Cli::try_parse_from(["devops-apiserver"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn hash_password_takes_a_cost() {
        let cli =
            Cli::try_parse_from(["devops-apiserver", "hash-password", "pw1", "--cost", "4"])
                .unwrap();
        match cli.command {
            Some(Command::HashPassword { password, cost }) => {
                assert_eq!(password, "pw1");
                assert_eq!(cost, 4);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["devops-apiserver", "config", "-c", "/tmp/ks.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/ks.yaml")));
        assert!(matches!(cli.command, Some(Command::Config)));
    }
}

// ABOUTME: clap definition of the wharf command line.
// ABOUTME: Global output and fan-out flags plus the setup, deploy, exec, revision, list and init subcommands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wharf")]
#[command(about = "Deploy a git revision to remote hosts over SSH and reload pm2")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file (default: discover wharf.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output (for CI)
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Output JSON lines for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Maximum number of hosts handled at once
    #[arg(long, global = true, value_parser = clap::value_parser!(u16).range(1..))]
    pub fanout: Option<u16>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// First-time provisioning: pre-setup, post-setup and checkout
    Setup {
        /// Environment name from the config file
        environment: String,
    },

    /// Sync the configured ref, write the env file and reload the app
    Deploy {
        /// Environment name from the config file
        environment: String,

        /// Break a deploy lock held by another run
        #[arg(short, long)]
        force: bool,
    },

    /// Run a command in the current checkout on every host
    Exec {
        /// Environment name from the config file
        environment: String,

        /// Command and arguments to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Show the deployed commit on every host
    Revision {
        /// Environment name from the config file
        environment: String,
    },

    /// List configured environments
    List,

    /// Initialize a new wharf.yml configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_keeps_hyphenated_arguments() {
        let cli = Cli::parse_from(["wharf", "exec", "dev", "ls", "-la"]);
        match cli.command {
            Commands::Exec {
                environment,
                command,
            } => {
                assert_eq!(environment, "dev");
                assert_eq!(command, ["ls", "-la"]);
            }
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["wharf", "deploy", "dev", "--force", "--fanout", "2", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.fanout, Some(2));
        assert!(matches!(cli.command, Commands::Deploy { force: true, .. }));
    }

    #[test]
    fn zero_fanout_is_rejected() {
        assert!(Cli::try_parse_from(["wharf", "deploy", "dev", "--fanout", "0"]).is_err());
    }
}

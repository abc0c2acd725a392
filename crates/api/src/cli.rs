//! Command-line surface of the `relaypost` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use relaypost_domain::DispatchMode;

#[derive(Debug, Parser)]
#[command(name = "relaypost", version)]
#[command(about = "Fan-out content synchronisation to remote REST endpoints", long_about = None)]
pub struct Cli {
    /// Config file (TOML or JSON). Defaults to the probed locations.
    #[arg(short, long, global = true, env = "RELAYPOST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage remote targets.
    Target {
        #[command(subcommand)]
        command: TargetCommand,
    },
    /// Sync a content item to its targets.
    Sync {
        item_id: u64,
        /// Restrict to these target ids (repeatable). Defaults to every
        /// active target.
        #[arg(short, long = "target")]
        targets: Vec<String>,
        /// Override the configured dispatch mode.
        #[arg(short, long)]
        mode: Option<DispatchMode>,
    },
    /// Delete the remote copies of a content item.
    Delete {
        item_id: u64,
        #[arg(short, long = "target")]
        targets: Vec<String>,
    },
    /// Queue failed syncs of a target for another attempt.
    RetryFailed {
        target_id: String,
        #[arg(long, default_value_t = 3)]
        max_retries: u32,
    },
    /// Ledger counts by status.
    Stats {
        #[arg(short, long)]
        target: Option<String>,
    },
    /// Run the deferred worker and the ledger sweeper until interrupted.
    Worker,
}

#[derive(Debug, Subcommand)]
pub enum TargetCommand {
    /// Register a target and store its application password.
    Add {
        name: String,
        base_url: String,
        username: String,
        #[arg(long, env = "RELAYPOST_APP_PASSWORD", hide_env_values = true)]
        password: String,
    },
    List {
        /// Include deactivated targets.
        #[arg(long)]
        all: bool,
    },
    Deactivate {
        target_id: String,
    },
    /// Delete a target with its secret and every ledger row.
    Remove {
        target_id: String,
    },
}

impl Command {
    /// Stable name used in command logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Target { command } => match command {
                TargetCommand::Add { .. } => "target::add",
                TargetCommand::List { .. } => "target::list",
                TargetCommand::Deactivate { .. } => "target::deactivate",
                TargetCommand::Remove { .. } => "target::remove",
            },
            Self::Sync { .. } => "sync",
            Self::Delete { .. } => "delete",
            Self::RetryFailed { .. } => "retry_failed",
            Self::Stats { .. } => "stats",
            Self::Worker => "worker",
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sync_accepts_targets_and_mode() {
        let cli = Cli::try_parse_from([
            "relaypost", "sync", "42", "--target", "a", "-t", "b", "--mode", "parallel",
        ])
        .unwrap();

        match cli.command {
            Command::Sync { item_id, targets, mode } => {
                assert_eq!(item_id, 42);
                assert_eq!(targets, vec!["a", "b"]);
                assert_eq!(mode, Some(DispatchMode::Parallel));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Cli::try_parse_from(["relaypost", "sync", "1", "--mode", "later"]).is_err());
    }

    #[test]
    fn retry_failed_defaults_to_three_attempts() {
        let cli = Cli::try_parse_from(["relaypost", "retry-failed", "t1"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::RetryFailed { ref target_id, max_retries: 3 } if target_id == "t1"
        ));
        assert_eq!(cli.command.name(), "retry_failed");
    }
}

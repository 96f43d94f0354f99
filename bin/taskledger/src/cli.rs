use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Records analysis tasks on the ledger contract and resolves them back.
#[derive(Debug, Parser)]
#[command(name = "taskledger", version)]
pub(crate) struct Cli {
    /// Path to the TOML config file.
    #[arg(long, short)]
    pub(crate) config: PathBuf,

    /// Hex-encoded signing key. Only `submit` needs one.
    #[arg(long, env = "TASKLEDGER_PRIVATE_KEY", hide_env_values = true)]
    pub(crate) private_key: Option<String>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Creates and completes a task with the given analysis.
    Submit(SubmitArgs),

    /// Resolves a task by id, ledger first with local fallback.
    Task { id: u64 },

    /// Resolves the task a transaction belongs to.
    Tx { hash: String },

    /// Lists the most recent ledger tasks.
    Recent {
        #[arg(long)]
        count: Option<u64>,
    },

    /// Shows the stored result of a completed task.
    Result { id: u64 },

    /// Reads the local result store.
    Local(LocalArgs),
}

impl Command {
    /// Whether the command broadcasts transactions.
    pub(crate) fn needs_signer(&self) -> bool {
        matches!(self, Command::Submit(_))
    }
}

#[derive(Debug, Args)]
pub(crate) struct SubmitArgs {
    #[arg(long)]
    pub(crate) task_id: u64,

    #[arg(long)]
    pub(crate) property_address: String,

    #[arg(long)]
    pub(crate) task_type: String,

    #[arg(long, default_value = "")]
    pub(crate) details: String,

    /// Analysis text, free-form or a JSON object.
    #[arg(long, conflicts_with = "analysis_file", required_unless_present = "analysis_file")]
    pub(crate) analysis: Option<String>,

    /// File holding the analysis text.
    #[arg(long)]
    pub(crate) analysis_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub(crate) struct LocalArgs {
    /// Task id to read; lists the index when omitted.
    #[arg(long, conflicts_with = "tx_prefix")]
    pub(crate) task_id: Option<u64>,

    /// Transaction hash or prefix to look up.
    #[arg(long)]
    pub(crate) tx_prefix: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_submit() {
        let cli = Cli::try_parse_from([
            "taskledger",
            "--config",
            "taskledger.toml",
            "--private-key",
            KEY,
            "submit",
            "--task-id",
            "7",
            "--property-address",
            "1 Main St",
            "--task-type",
            "investment",
            "--analysis",
            "looks fine",
        ])
        .unwrap();

        assert_eq!(cli.private_key.as_deref(), Some(KEY));
        assert!(cli.command.needs_signer());
        let Command::Submit(args) = cli.command else {
            panic!("expected submit, got {:?}", cli.command);
        };
        assert_eq!(args.task_id, 7);
        assert_eq!(args.details, "");
        assert_eq!(args.analysis.as_deref(), Some("looks fine"));
    }

    #[test]
    fn test_read_commands_parse_without_key() {
        for args in [
            &["task", "3"][..],
            &["tx", "0xabcd"],
            &["recent"],
            &["result", "3"],
            &["local", "--task-id", "3"],
        ] {
            let argv = ["taskledger", "-c", "c.toml"].into_iter().chain(args.iter().copied());
            let cli = Cli::try_parse_from(argv).unwrap();
            assert!(!cli.command.needs_signer(), "{args:?}");
        }
    }

    #[test]
    fn test_submit_needs_analysis() {
        let res = Cli::try_parse_from([
            "taskledger",
            "--config",
            "c.toml",
            "--private-key",
            KEY,
            "submit",
            "--task-id",
            "1",
            "--property-address",
            "a",
            "--task-type",
            "b",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn test_local_filters_are_exclusive() {
        let res = Cli::try_parse_from([
            "taskledger",
            "--config",
            "c.toml",
            "--private-key",
            KEY,
            "local",
            "--task-id",
            "1",
            "--tx-prefix",
            "0xab",
        ]);
        assert!(res.is_err());

        let cli = Cli::try_parse_from([
            "taskledger",
            "-c",
            "c.toml",
            "--private-key",
            KEY,
            "recent",
            "--count",
            "3",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Recent { count: Some(3) }));
    }
}

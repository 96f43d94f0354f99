//! Command-line entry point for recording and resolving ledger tasks.

mod cli;
mod cmd;
mod context;

use std::process;

use clap::Parser;
use eyre::{bail, Context, Result};
use serde_json::{json, Value};
use taskledger_common::logging;
use taskledger_config::Config;
use taskledger_ledger::AlloyLedgerClient;
use tracing::*;

use crate::{
    cli::Cli,
    context::{init_context, logger_config},
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let output = match run(cli).await {
        Ok(value) => value,
        Err(err) => {
            error!(err = ?err, "command failed");
            print_json(&json!({ "error": format!("{err:#}") }));
            logging::finalize();
            process::exit(1);
        }
    };

    print_json(&output);
    logging::finalize();
}

async fn run(cli: Cli) -> Result<Value> {
    let config = Config::load_from_path(&cli.config)
        .wrap_err_with(|| format!("loading config {}", cli.config.display()))?;

    let private_key = cli.private_key.as_deref();
    if private_key.is_none() && cli.command.needs_signer() {
        bail!("a signing key is required, pass --private-key or set TASKLEDGER_PRIVATE_KEY");
    }

    let signer = private_key
        .map(AlloyLedgerClient::parse_signer)
        .transpose()?
        .map(|s| s.address().to_string());
    logging::init(logger_config(&config.logging, signer))?;

    let ctx = init_context(config, private_key)?;
    cmd::run(&ctx, cli.command).await
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(out) => println!("{out}"),
        Err(e) => eprintln!("failed to render output: {e}"),
    }
}

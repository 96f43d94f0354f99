//! Wires the config into running components.

use std::sync::Arc;

use eyre::{Context, Result};
use taskledger_common::logging::{self, FileOutput, LogFormat, LoggerConfig};
use taskledger_config::{Config, LoggingConfig};
use taskledger_db_store_sled::{init_result_db, open_sled_database, SledDbConfig};
use taskledger_ledger::{AlloyLedgerClient, LedgerClient, TaskLedgerContract};
use taskledger_processor::TaskProcessor;
use taskledger_resolver::TaskResolver;
use taskledger_storage::{create_result_store, TaskCache};
use taskledger_txsubmit::{NonceSequencer, TxSubmitter};
use tracing::*;

const SERVICE_NAME: &str = "taskledger";

/// Running components shared by the commands.
pub(crate) struct AppContext {
    pub(crate) config: Config,
    pub(crate) processor: TaskProcessor<AlloyLedgerClient>,
    pub(crate) resolver: TaskResolver<AlloyLedgerClient>,
}

pub(crate) fn logger_config(config: &LoggingConfig, signer: Option<String>) -> LoggerConfig {
    let service_name =
        logging::format_service_name(SERVICE_NAME, config.service_label.as_deref());
    let format = LogFormat::from_json_flag(config.json_format.unwrap_or(false));

    let mut lconfig = LoggerConfig::new(service_name)
        .with_service_version(env!("CARGO_PKG_VERSION").to_owned())
        .with_stdout_format(format);

    if let Some(url) = &config.otlp_url {
        lconfig = lconfig.with_otlp_endpoint(url.clone());
    }
    if let Some(dir) = &config.log_dir {
        let prefix = config
            .log_file_prefix
            .clone()
            .unwrap_or_else(|| SERVICE_NAME.to_owned());
        lconfig = lconfig.with_file_output(FileOutput::daily(dir.clone(), prefix, format));
    }
    if let Some(signer) = signer {
        lconfig = lconfig.with_signer(signer);
    }
    lconfig
}

/// Builds the ledger client, the local store and the components on top.
/// Without a key the client is read-only and submissions fail at signing.
pub(crate) fn init_context(config: Config, private_key: Option<&str>) -> Result<AppContext> {
    let signer = private_key
        .map(AlloyLedgerClient::parse_signer)
        .transpose()?;
    let client = AlloyLedgerClient::new(&config.ledger.rpc_url, signer, config.ledger.chain_id)?
        .with_read_retries(
            config.ledger.rpc_max_retries,
            config.ledger.rpc_retry_delay_ms,
        );
    let client = Arc::new(client);

    let sled_db = open_sled_database(&config.store.datadir)
        .wrap_err_with(|| format!("opening store at {}", config.store.datadir.display()))?;
    let db_config = SledDbConfig::new_with_constant_backoff(
        config.store.db_retry_count,
        config.store.db_retry_delay_ms,
    );
    let store = create_result_store(init_result_db(&sled_db, db_config)?);

    let cache = Arc::new(TaskCache::with_capacity(config.resolver.cache_capacity));
    let contract = TaskLedgerContract::new(config.ledger.contract_address);
    let sequencer = Arc::new(NonceSequencer::new());
    let submitter = Arc::new(TxSubmitter::new(
        client.clone(),
        sequencer,
        &config.submitter,
    ));

    info!(
        signer = %client.signer_address(),
        read_only = !client.can_sign(),
        contract = %contract.address(),
        datadir = %config.store.datadir.display(),
        "components initialized"
    );

    Ok(AppContext {
        processor: TaskProcessor::new(submitter, contract, store.clone(), cache.clone()),
        resolver: TaskResolver::new(client, contract, store, cache),
        config,
    })
}

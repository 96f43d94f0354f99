//! Command handlers. Each returns a JSON value printed by `main`.

use std::fs;

use eyre::{eyre, Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use taskledger_primitives::{AnalysisOutput, TaskContext, TaskId, TxHash};
use taskledger_processor::TaskRequest;

use crate::{
    cli::{Command, LocalArgs, SubmitArgs},
    context::AppContext,
};

fn to_json(value: &impl Serialize) -> Result<Value> {
    serde_json::to_value(value).wrap_err("serializing output")
}

pub(crate) async fn run(ctx: &AppContext, command: Command) -> Result<Value> {
    match command {
        Command::Submit(args) => submit(ctx, args).await,
        Command::Task { id } => to_json(&ctx.resolver.resolve_task(TaskId::new(id)).await?),
        Command::Tx { hash } => {
            let hash: TxHash = hash
                .parse()
                .map_err(|e| eyre!("invalid transaction hash {hash}: {e}"))?;
            to_json(&ctx.resolver.resolve_tx_hash(hash).await?)
        }
        Command::Recent { count } => {
            let count = count.unwrap_or(ctx.config.resolver.recent_tasks_default);
            to_json(&ctx.resolver.recent_tasks(count).await?)
        }
        Command::Result { id } => to_json(&ctx.resolver.task_result(TaskId::new(id)).await?),
        Command::Local(args) => local(ctx, args).await,
    }
}

async fn submit(ctx: &AppContext, args: SubmitArgs) -> Result<Value> {
    let text = match (args.analysis, args.analysis_file) {
        (Some(text), _) => text,
        (None, Some(path)) => fs::read_to_string(&path)
            .wrap_err_with(|| format!("reading analysis from {}", path.display()))?,
        (None, None) => return Err(eyre!("no analysis given")),
    };

    let request = TaskRequest {
        task_id: TaskId::new(args.task_id),
        context: TaskContext::new(args.property_address, args.task_type, args.details),
    };
    let outcome = ctx
        .processor
        .process(request, AnalysisOutput::Raw(text))
        .await;
    to_json(&outcome)
}

async fn local(ctx: &AppContext, args: LocalArgs) -> Result<Value> {
    match (args.task_id, args.tx_prefix) {
        (Some(id), _) => to_json(&ctx.resolver.local_result(TaskId::new(id)).await?),
        (None, Some(prefix)) => match ctx.resolver.local_result_by_tx_prefix(&prefix).await? {
            Some(record) => to_json(&record),
            None => Err(eyre!("no local result for transaction {prefix}")),
        },
        (None, None) => {
            let entries = ctx.resolver.local_results().await?;
            Ok(json!({ "count": entries.len(), "results": to_json(&entries)? }))
        }
    }
}

//! `evac watch`: stream every state replacement until interrupted.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{Value, json};
use tracing::info;

use evac_api::stream::{Boxed, merge};
use evac_core::ManagedService;

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::runtime::Runtime;

fn line(format: OutputFormat, name: &str, value: &Value, color: bool) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::Json | OutputFormat::JsonCompact => {
            serde_json::to_string(&json!({ "service": name, "value": value }))?
        }
        _ => format!("{} {}", output::label(name, color), serde_json::to_string(value)?),
    })
}

pub async fn handle(args: WatchArgs, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let runtime = Runtime::start(session, global.timeout);
    let color = output::should_color(global.color);

    let selected: Vec<Arc<dyn ManagedService>> = match args.service {
        Some(service) => runtime.services.by_name(service.as_str()).into_iter().collect(),
        None => runtime.services.managed(),
    };
    let streams: Vec<Boxed<(String, Value)>> = selected
        .iter()
        .map(|service| {
            let name = service.name().to_owned();
            service
                .watch()
                .map(move |value| (name.clone(), value))
                .boxed()
        })
        .collect();
    let mut updates = merge(streams);
    let mut states = runtime.states();

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let result = loop {
        tokio::select! {
            _ = &mut interrupt => break Ok(()),
            Some(state) = states.next() => info!(%state, "connection"),
            Some((name, value)) = updates.next() => {
                match line(global.output, &name, &value, color) {
                    Ok(text) => output::print_output(&text, global.quiet),
                    Err(e) => break Err(e),
                }
            }
            else => break Ok(()),
        }
    };

    runtime.shutdown().await;
    result
}

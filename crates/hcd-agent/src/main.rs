//! hcd - local Home Connect appliance agent
//!
//! The agent is responsible for:
//! - Connecting to appliances over AES-HMAC WebSockets or PSK-TLS
//! - Running the session handshake and subscribing to updates
//! - Publishing resolved feature events
//! - Reconnecting after connection loss

use std::collections::BTreeMap;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

mod appliance;
mod cli;
mod config;

use appliance::{Appliance, ApplianceEvent};
use cli::{Cli, Commands};
use config::AgentConfig;
use hcd_common::crypto::PskTlsConnector;
use hcd_common::description::{humanize, value_label, DescriptionResolver};

/// Time allowed for the appliance to answer a one-shot command
const COMMAND_SETTLE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
        EnvFilter::new(format!("hcd={},hcd_common={}", level, level))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::ProbeTls => {
            if PskTlsConnector::is_supported() {
                println!("PSK-TLS supported: TLS appliances can be used");
            } else {
                println!("PSK-TLS not supported: TLS appliances will be disabled");
            }
            Ok(())
        }
        Commands::Lookup { appliance, query } => {
            let config = AgentConfig::load(cli.config.as_deref())?;
            let appliance = config
                .appliance(&appliance)
                .with_context(|| format!("Unknown appliance {}", appliance))?;
            let resolver = appliance.load_resolver()?;
            lookup(&resolver, &query)
        }
        Commands::Run {
            appliance,
            history_out,
        } => {
            let config = AgentConfig::load(cli.config.as_deref())?;
            run_appliances(&config, appliance.as_deref(), history_out).await
        }
        Commands::Command {
            appliance,
            timeout,
            action,
        } => {
            let config = AgentConfig::load(cli.config.as_deref())?;
            let settings = config
                .appliance(&appliance)
                .with_context(|| format!("Unknown appliance {}", appliance))?;
            settings.validate()?;

            let mut appliance = Appliance::spawn(
                settings.setup(&config)?,
                settings.address(),
                settings.credentials(),
                config.transport.clone(),
            );
            let result = send_one(&appliance, action.to_command(), Duration::from_secs(timeout)).await;
            appliance.dispose().await;
            result
        }
    }
}

fn lookup(resolver: &DescriptionResolver, query: &str) -> anyhow::Result<()> {
    let uid = match query.parse::<hcd_common::Uid>() {
        Ok(uid) => uid,
        Err(_) => resolver
            .name_to_uid(query)
            .with_context(|| format!("{} is not in the description", query))?,
    };

    let name = resolver.uid_to_name(uid);
    println!("{} = {} ({})", uid, name, humanize(&name));
    if resolver.is_program(uid) {
        println!("  program");
    }
    if let Some(enum_uid) = resolver.enum_uid_for(uid) {
        println!("  enumeration type {}", enum_uid);
        if let Some(parent) = resolver.enum_parent(enum_uid) {
            println!("  subset of {}", parent);
        }
        let labels = &resolver.description().feature_mapping.enum_description_list;
        if let Some(enum_description) = labels.iter().find(|e| e.id == enum_uid) {
            for (value, label) in &enum_description.values {
                println!("    {:>4}  {} ({})", value, label, value_label(&name, label));
            }
        }
    }
    Ok(())
}

async fn run_appliances(
    config: &AgentConfig,
    only: Option<&str>,
    history_out: Option<std::path::PathBuf>,
) -> anyhow::Result<()> {
    let selected: Vec<_> = config
        .appliances
        .iter()
        .filter(|a| only.map_or(true, |id| a.ha_id == id))
        .collect();
    if selected.is_empty() {
        anyhow::bail!("No appliances configured");
    }

    let mut appliances = Vec::new();
    for settings in selected {
        let appliance = Appliance::spawn(
            settings.setup(config)?,
            settings.address(),
            settings.credentials(),
            config.transport.clone(),
        );
        tokio::spawn(log_events(appliance.ha_id().to_string(), appliance.subscribe()));
        tokio::spawn(log_status(appliance.ha_id().to_string(), appliance.status()));
        appliances.push(appliance);
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    let mut histories = BTreeMap::new();
    for appliance in &mut appliances {
        appliance.dispose().await;
        histories.insert(appliance.ha_id().to_string(), appliance.history().snapshot());
    }

    if let Some(path) = history_out {
        let json = serde_json::to_string_pretty(&histories)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write history to {}", path.display()))?;
        info!("History written to {}", path.display());
    }
    Ok(())
}

async fn log_events(ha_id: String, mut events: tokio::sync::broadcast::Receiver<ApplianceEvent>) {
    loop {
        match events.recv().await {
            Ok(ApplianceEvent::Feature(event)) => {
                info!(ha_id = %ha_id, "{} = {}", event.name, event.value);
            }
            Ok(ApplianceEvent::Description(change)) => {
                info!(
                    ha_id = %ha_id,
                    "{} changed (available: {:?}, access: {:?})",
                    change.name, change.available, change.access
                );
            }
            Ok(ApplianceEvent::Subscribed) => info!(ha_id = %ha_id, "Ready"),
            Err(RecvError::Lagged(skipped)) => warn!(ha_id = %ha_id, "Missed {} events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn log_status(ha_id: String, mut status: tokio::sync::watch::Receiver<hcd_common::ApplianceStatus>) {
    loop {
        info!(ha_id = %ha_id, "Status: {}", *status.borrow_and_update());
        if status.changed().await.is_err() {
            break;
        }
    }
}

/// Wait for the handshake, send one command and give the appliance a moment to answer
async fn send_one(
    appliance: &Appliance,
    command: appliance::ApplianceCommand,
    timeout: Duration,
) -> anyhow::Result<()> {
    let mut events = appliance.subscribe();
    let mut status = appliance.status();
    if let hcd_common::ApplianceStatus::Failed { reason, .. } = &*status.borrow_and_update() {
        anyhow::bail!("Appliance unavailable: {}", reason);
    }

    let subscribed = async {
        loop {
            match events.recv().await {
                Ok(ApplianceEvent::Subscribed) => return Ok(()),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return Err(anyhow::anyhow!("Connection stopped")),
            }
        }
    };
    tokio::time::timeout(timeout, subscribed)
        .await
        .map_err(|_| anyhow::anyhow!("Appliance did not complete the handshake within {:?}", timeout))??;

    appliance.send_command(command).await?;
    info!("Command sent");

    // Print whatever the appliance reports back
    let settle = tokio::time::sleep(COMMAND_SETTLE);
    tokio::pin!(settle);
    loop {
        tokio::select! {
            _ = &mut settle => break,
            event = events.recv() => match event {
                Ok(ApplianceEvent::Feature(event)) => println!("{} = {}", event.name, event.value),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

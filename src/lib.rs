pub mod config;

use std::sync::Arc;

use anyhow::Context;
use dimse::operations::CMover;
use dimse::types::{FindQuery, MoveQuery};
use dimse::{DimseScu, ScuBuilder};
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::{Config, LoggingConfig, ScuCommand};

/// Install the global tracing subscriber
pub fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.log_level))
        .context("Invalid log level")?;

    if logging.log_to_file {
        let file = std::fs::File::create(&logging.log_file_path)
            .with_context(|| format!("Failed to create log file {}", logging.log_file_path))?;

        // Create a file appender
        let file_appender = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(Arc::new(file));

        // Create a stdout appender
        let stdout_appender = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true);

        // Combine both appenders
        tracing_subscriber::registry()
            .with(filter)
            .with(file_appender)
            .with(stdout_appender)
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        // Just stdout if file logging is disabled
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_file(true)
            .with_line_number(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    }
    Ok(())
}

/// Build the SCU described by `config`
pub fn build_scu(config: &Config) -> anyhow::Result<DimseScu> {
    ScuBuilder::from_config(config.scu.clone())
        .build()
        .context("Invalid [scu] configuration")
}

/// Run one command; returns whether the peer reported success
pub async fn run(config: &Config, command: ScuCommand) -> anyhow::Result<bool> {
    let scu = build_scu(config)?;
    tracing::info!("🔧 Starting DIMSE SCU '{}'", scu.config().local_aet);

    let mut message_id: u16 = 1;

    match command {
        ScuCommand::Echo { peer } => {
            let node = config.peer(&peer)?;
            let answered = scu.echo(node, None).await;
            println!("C-ECHO {}: {}", node, if answered { "OK" } else { "NO RESPONSE" });
            Ok(answered)
        }
        ScuCommand::Find { peer, level, keys } => {
            let node = config.peer(&peer)?.clone();
            let mut query = FindQuery {
                query_level: level,
                parameters: Default::default(),
                max_results: 0,
            };
            for (key, value) in keys {
                query = query.with_parameter(key, value);
            }

            let responses = scu.finder(node).find(query, &mut message_id).await?;
            for identifier in responses.iter().filter_map(|r| r.identifier()) {
                println!("{}", serde_json::to_string(identifier)?);
            }
            Ok(responses.last().map_or(false, |r| r.status.is_success()))
        }
        ScuCommand::Move {
            peer,
            destination,
            level,
            keys,
        } => {
            let node = config.peer(&peer)?.clone();
            let mut query = MoveQuery::new(level, destination);
            for (key, value) in keys {
                query = query.with_parameter(key, value);
            }

            let responses = scu.mover(node).send_move(query, &mut message_id).await?;
            if let Some(counts) = CMover::outcome(&responses) {
                println!("{}", serde_json::to_string(&counts)?);
            }
            Ok(responses.last().map_or(false, |r| r.status.is_success()))
        }
        ScuCommand::Get {
            peer,
            sop_instance_uid,
        } => {
            let node = config.peer(&peer)?;
            let query = FindQuery::image(sop_instance_uid);
            let response = scu.get_image(node, query, &mut message_id).await?;
            match response {
                Some(response) => {
                    println!("C-GET {}: {}", node, response.status);
                    Ok(response.status.is_success())
                }
                None => {
                    println!("C-GET {}: NO RESPONSE", node);
                    Ok(false)
                }
            }
        }
    }
}

// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the multi-tenant authorization server
mod config;
mod daemon;
mod domain;
mod events;
mod loader;
mod scripting;
mod server;
mod sessions;
mod signing;
mod templates;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::Config;
use log::info;

use std::env;
use std::io::Write;
use std::path::PathBuf;
use tokio::signal;

/// Multi-tenant OAuth 2.0 / OpenID Connect authorization server
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the authorization server
    Serve {
        /// Named environment; selects `config.<env>.yaml`
        #[arg(long)]
        env: Option<String>,

        /// Network address to bind to
        #[arg(long)]
        hostname: Option<String>,

        /// TCP port to listen on
        #[arg(long)]
        port: Option<u16>,
    },
    /// Dump the registered HTTP routes
    Routes,
}

/// Initialize the logger from `LOG_LEVEL` and `LOG_FORMAT`.
///
/// `LOG_FORMAT=json` switches to one JSON object per line for log
/// shippers; anything else keeps the human-readable console format.
fn init_logger() {
    let level = env::var("LOG_LEVEL")
        .ok()
        .and_then(|level| level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);

    if let Ok(format) = env::var("LOG_FORMAT") {
        if format.eq_ignore_ascii_case("json") {
            builder.format(|buf, record| {
                let line = serde_json::json!({
                    "ts": chrono::Utc::now().to_rfc3339(),
                    "level": record.level().to_string(),
                    "target": record.target(),
                    "message": record.args().to_string(),
                });
                writeln!(buf, "{}", line)
            });
        }
    }
    builder.init();
}

fn config_path(cli_path: &Option<PathBuf>, environment: &Option<String>) -> PathBuf {
    if let Some(path) = cli_path {
        return path.clone();
    }
    match environment {
        Some(name) => PathBuf::from(format!("config.{}.yaml", name)),
        None => PathBuf::from("config.yaml"),
    }
}

#[rocket::main]
async fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();

    // Check if --show-config-schema flag is set
    if args.show_config_schema {
        return config::output_config_schema();
    }

    match args.command {
        Some(Command::Serve {
            env,
            hostname,
            port,
        }) => {
            let path = config_path(&args.config, &env);
            let mut config = match Config::from_file(&path) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("Configuration failure: {}", err);
                    std::process::exit(1);
                }
            };
            config.apply_env();
            config.apply_args(hostname, port);

            info!("Starting in daemon mode");
            let mut daemon = daemon::Daemon::new();
            daemon.launch(&config).await?;

            // Wait for termination signal
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received shutdown signal, terminating daemon");
                    daemon.shutdown();
                    daemon.join().await?;
                }
                Err(err) => {
                    eprintln!("Error waiting for shutdown signal: {}", err);
                }
            }
            Ok(())
        }
        Some(Command::Routes) => {
            let path = config_path(&args.config, &None);
            let mut config = Config::from_file(&path).unwrap_or_default();
            config.apply_env();
            let state = server::AppState::from_config(config);
            let rocket = server::build_rocket(state);
            for route in rocket.routes() {
                println!("{:<6} {}", route.method.to_string(), route.uri);
            }
            Ok(())
        }
        None => {
            eprintln!("No subcommand given; try `serve` or `routes`");
            std::process::exit(1);
        }
    }
}

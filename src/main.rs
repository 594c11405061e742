// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod app;
mod config;
mod error;
mod map;
mod overlay;
mod status;
mod status_pane;

use std::process::ExitCode;
use std::time::Duration;

use app::SkywatchApp;
use clap::{Parser, Subcommand};
use config::AppConfig;
use eframe::egui;
use error::AppError;
use log::{error, info, warn};
use mimalloc::MiMalloc;
use opensky_client::gateway::{self, GatewayConfig};
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Parser)]
#[command(name = "skywatch", version, about = "Live aircraft map backed by OpenSky Network state vectors")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open the map viewer (default)
    View {
        /// Don't start the gateway in this process
        #[arg(long)]
        no_gateway: bool,

        /// Gateway base URL to query instead of the configured one
        #[arg(long)]
        gateway_url: Option<String>,
    },
    /// Run only the proxy gateway
    Gateway {
        /// Listen address, e.g. 0.0.0.0:8787
        #[arg(long)]
        bind: Option<String>,

        /// Upstream states/all URL
        #[arg(long)]
        upstream: Option<String>,
    },
    /// Print the configuration file path
    Config,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let command = cli.command.unwrap_or(Command::View {
        no_gateway: false,
        gateway_url: None,
    });

    match command {
        Command::Config => {
            println!("{}", AppConfig::get_config_path()?.display());
            Ok(())
        }
        Command::Gateway { bind, upstream } => {
            let config = load_config();
            let mut gateway_config = config.gateway_config();
            if let Some(bind) = bind {
                gateway_config.bind_address = bind;
            }
            if let Some(upstream) = upstream {
                gateway_config.upstream_url = upstream;
            }
            run_gateway(gateway_config)
        }
        Command::View { no_gateway, gateway_url } => {
            let mut config = load_config();
            if no_gateway {
                config.embedded_gateway = false;
            }
            if let Some(url) = gateway_url {
                config.gateway_url = url;
            }
            run_viewer(config)
        }
    }
}

fn load_config() -> AppConfig {
    match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load configuration, using defaults: {e}");
            AppConfig::default()
        }
    }
}

fn run_gateway(config: GatewayConfig) -> Result<(), AppError> {
    let runtime = tokio::runtime::Runtime::new()?;
    let cancel_token = CancellationToken::new();

    runtime.block_on(async {
        let shutdown = cancel_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl-C, shutting down gateway");
            }
            shutdown.cancel();
        });

        gateway::serve(config, cancel_token).await
    })?;

    Ok(())
}

fn run_viewer(config: AppConfig) -> Result<(), AppError> {
    info!("Starting Skywatch...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("skywatch-io")
        .build()?;
    let gateway_token = CancellationToken::new();

    if config.embedded_gateway {
        let gateway_config = config.gateway_config();
        let token = gateway_token.clone();
        runtime.spawn(async move {
            if let Err(e) = gateway::serve(gateway_config, token).await {
                error!("Embedded gateway stopped: {e}");
            }
        });
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 800.0])
            .with_title("Skywatch"),
        ..Default::default()
    };

    let handle = runtime.handle().clone();
    let result = eframe::run_native(
        "Skywatch",
        options,
        Box::new(move |cc| Ok(Box::new(SkywatchApp::new(cc, &config, handle)?))),
    );

    gateway_token.cancel();
    runtime.shutdown_timeout(Duration::from_secs(1));
    info!("Skywatch stopped");

    result.map_err(AppError::from)
}

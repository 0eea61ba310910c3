//! CLI for lineage-hub
//!
//! Subcommands:
//! - `serve`: run the hub and its WebSocket server
//! - `watch`: connect as an observer and print every delivered update

use clap::Parser;
use futures_util::StreamExt;
use lineage_hub::config::{Settings, load_config, load_config_from};
use lineage_hub::hub::Hub;
use lineage_hub::transport::frame::split_frame;
use lineage_hub::transport::start_websocket_server;
use lineage_hub::utils::{HubError, logging};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "lineage-hub", version, about = "Real-time lineage update hub")]
enum Command {
    /// Start the hub and the WebSocket server
    Serve {
        /// Configuration file (defaults to config/default.*)
        #[arg(long)]
        config: Option<String>,
    },
    /// Connect to a running server and print every update it delivers
    Watch {
        /// WebSocket URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
        url: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    match Command::parse() {
        Command::Serve { config } => {
            let settings = match config {
                Some(path) => load_config_from(&path),
                None => load_config(),
            };
            let settings = match settings {
                Ok(settings) => settings,
                Err(e) => {
                    logging::init("info");
                    error!("Invalid configuration: {}", e);
                    std::process::exit(1);
                }
            };

            logging::init(&settings.logging.level);
            if let Err(e) = run_server(settings).await {
                error!("Server failed: {}", e);
                std::process::exit(1);
            }
        }
        Command::Watch { url } => {
            logging::init("info");
            if let Err(e) = run_watch(&url).await {
                error!("Watch failed: {}", e);
                std::process::exit(1);
            }
        }
    }
}

async fn run_server(settings: Settings) -> Result<(), HubError> {
    let (hub, hub_task) = Hub::spawn(&settings.hub);
    let server = start_websocket_server(settings.listen_addr(), hub.clone(), settings);
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            hub.shutdown();
            result?;
            error!("WebSocket server exited unexpectedly.");
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, closing all connections.");
        }
    }

    // closing the hub closes every member queue; connections send their
    // Close frames while the server drains them
    hub.shutdown();
    server.await?;
    if tokio::time::timeout(Duration::from_secs(5), hub_task)
        .await
        .is_err()
    {
        warn!("Hub did not stop in time");
    }
    info!("Server exited");
    Ok(())
}

async fn run_watch(url: &str) -> Result<(), HubError> {
    let (mut ws_stream, _response) = connect_async(url).await?;
    info!("Connected to {}", url);

    loop {
        tokio::select! {
            next = ws_stream.next() => match next {
                Some(Ok(WsMessage::Text(text))) => print_payloads(text.as_bytes()),
                Some(Ok(WsMessage::Binary(data))) => print_payloads(&data),
                Some(Ok(WsMessage::Close(frame))) => {
                    info!("Server closed the connection: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                ws_stream.close(None).await?;
                break;
            }
        }
    }

    Ok(())
}

fn print_payloads(frame: &[u8]) {
    for payload in split_frame(frame) {
        println!("{}", String::from_utf8_lossy(payload));
    }
}

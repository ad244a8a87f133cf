// Copyright 2026 The Rayrelay Project
// SPDX-License-Identifier: Apache-2.0

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use rayrelay::config::Config;
use rayrelay::models::{HttpModelFetcher, ModelCache};
use rayrelay::proxy::{self, RelayBackend};
use rayrelay::relay::{Relay, ReqwestChatTransport};

#[derive(Parser)]
#[command(name = "rayrelay", about = "OpenAI-compatible relay for the Raycast AI backend")]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = 8080, env = "PORT")]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            tracing::error!("failed to load config: {err}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        chat_url = %config.chat_url,
        models_url = %config.models_url,
        "config loaded"
    );

    let client = reqwest::Client::new();
    let fetcher = Arc::new(HttpModelFetcher::new(client.clone(), Arc::clone(&config)));
    let cache = Arc::new(ModelCache::new(fetcher));
    let transport = Arc::new(ReqwestChatTransport::new(client, Arc::clone(&config)));
    let backend: Arc<dyn RelayBackend> = Arc::new(Relay::new(cache, transport));

    let app = proxy::build_router(backend);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    tracing::info!(%addr, "rayrelay listening");

    axum::serve(listener, app).await.expect("server error");
}

//! WebSocket transport
//!
//! Accepts TCP connections, performs the WebSocket upgrade and hands every
//! upgraded connection to its own `ClientActor`. Responsibilities:
//! - reject upgrade requests for any path other than the configured one
//! - report upgrade failures without creating a connection
//! - stop accepting once the hub shuts down and give open connections the
//!   write deadline to send their Close frames

use std::net::SocketAddr;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;

use crate::client::ClientActor;
use crate::config::Settings;
use crate::hub::HubHandle;
use crate::utils::HubError;

/// Binds `addr` and serves WebSocket observers until the hub shuts down.
pub async fn start_websocket_server(
    addr: String,
    hub: HubHandle,
    settings: Settings,
) -> Result<(), HubError> {
    let listener = TcpListener::bind(&addr).await?;
    info!(
        "WebSocket server listening on ws://{}{}",
        listener.local_addr()?,
        settings.server.path
    );
    serve(listener, hub, settings).await
}

/// Accept loop over an already bound listener.
pub async fn serve(listener: TcpListener, hub: HubHandle, settings: Settings) -> Result<(), HubError> {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = hub.shutdown_requested() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let hub = hub.clone();
                    let settings = settings.clone();
                    connections.spawn(handle_connection(stream, peer, hub, settings));
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            },
        }
    }

    info!(
        "WebSocket server stopped accepting, waiting for {} connection(s)",
        connections.len()
    );
    let grace = settings.connection.write_wait();
    let drained = tokio::time::timeout(grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("Aborting {} connection(s) still open", connections.len());
        connections.shutdown().await;
    }
    Ok(())
}

async fn handle_connection<S>(stream: S, peer: SocketAddr, hub: HubHandle, settings: Settings)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws_stream = match upgrade(stream, &settings.server.path).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket upgrade failed for {}: {}", peer, e);
            return;
        }
    };

    let (sink, stream) = ws_stream.split();
    let actor = ClientActor::new(hub, sink, stream, settings.connection);
    debug!("Upgraded {} as {}", peer, actor.id());
    actor.run().await;
}

/// Performs the server side of the WebSocket handshake. Requests for any
/// path other than `path` are answered with 404 and reported as an error.
pub async fn upgrade<S>(stream: S, path: &str) -> Result<WebSocketStream<S>, HubError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let check_path = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if request.uri().path() == path {
            Ok(response)
        } else {
            let mut rejection = ErrorResponse::new(Some("not found".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    Ok(accept_hdr_async(stream, check_path).await?)
}

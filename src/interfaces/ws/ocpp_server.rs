//! OCPP 1.6 WebSocket server
//!
//! Accepts charge-point connections at `ws://<host>:<port>/ocpp/{charge_point_id}`
//! (or `/{charge_point_id}`).

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::engine::OcppEngine;
use crate::application::lifecycle::ConnectionLifecycle;
use crate::support::shutdown::ShutdownSignal;

/// OCPP 1.6 WebSocket subprotocol
const OCPP_SUBPROTOCOL: &str = "ocpp1.6";

/// OCPP WebSocket Server
pub struct OcppServer {
    engine: Arc<OcppEngine>,
    lifecycle: Arc<ConnectionLifecycle>,
}

impl OcppServer {
    pub fn new(engine: Arc<OcppEngine>, lifecycle: Arc<ConnectionLifecycle>) -> Self {
        Self { engine, lifecycle }
    }

    /// Accept connections until shutdown.
    pub async fn run(&self, listener: TcpListener, shutdown: ShutdownSignal) {
        if let Ok(addr) = listener.local_addr() {
            info!("🔌 OCPP 1.6 Central System started on ws://{}", addr);
            info!("   Charge points should connect to: ws://{}/ocpp/{{charge_point_id}}", addr);
        }

        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, addr)) => self.spawn_connection(stream, addr, shutdown.clone()),
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
                _ = shutdown.wait() => {
                    info!(
                        connected = self.engine.sessions().count(),
                        "🛑 WebSocket server received shutdown signal"
                    );
                    return;
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr, shutdown: ShutdownSignal) {
        let engine = self.engine.clone();
        let lifecycle = self.lifecycle.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, engine, lifecycle, shutdown).await {
                warn!(%addr, error = %e, "Connection error");
            }
        });
    }
}

/// Extract charge point ID from WebSocket request path.
///
/// Accepts `/ocpp/{id}` and `/{id}`; a bare `/ocpp` carries no identity.
fn extract_charge_point_id(path: &str) -> Option<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["ocpp", id] | [id] if *id != "ocpp" => Some(id.to_string()),
        _ => None,
    }
}

fn offers_ocpp16(req: &Request) -> bool {
    req.headers()
        .get_all("Sec-WebSocket-Protocol")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|p| p.trim() == OCPP_SUBPROTOCOL)
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    engine: Arc<OcppEngine>,
    lifecycle: Arc<ConnectionLifecycle>,
    shutdown: ShutdownSignal,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let mut charge_point_id: Option<String> = None;

    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, mut response: Response| {
        let path = req.uri().path();
        debug!(%addr, path, "WebSocket handshake");

        let Some(id) = extract_charge_point_id(path) else {
            warn!(%addr, path, "Handshake without charge point identity");
            let mut rejection = ErrorResponse::new(Some("charge point identity missing from path".into()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            return Err(rejection);
        };

        if offers_ocpp16(req) {
            response
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(OCPP_SUBPROTOCOL));
        } else {
            warn!(%addr, charge_point_id = id.as_str(), "Client did not offer ocpp1.6, continuing without subprotocol");
        }

        charge_point_id = Some(id);
        Ok(response)
    })
    .await?;

    let Some(charge_point_id) = charge_point_id else {
        return Ok(());
    };
    info!(charge_point_id = charge_point_id.as_str(), %addr, "Connected");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let sessions = engine.sessions().clone();
    let connection_id = sessions.register(&charge_point_id, tx);
    let generation = lifecycle.connected(&charge_point_id);

    let cp_id_send = charge_point_id.clone();
    let send_task = async move {
        while let Some(msg) = rx.recv().await {
            debug!(charge_point_id = cp_id_send.as_str(), "-> {}", msg);
            if let Err(e) = ws_sender.send(Message::Text(msg)).await {
                error!(charge_point_id = cp_id_send.as_str(), error = %e, "Send error");
                break;
            }
        }
        let _ = ws_sender.close().await;
    };

    let cp_id_recv = charge_point_id.clone();
    let recv_engine = engine.clone();
    let recv_task = async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    debug!(charge_point_id = cp_id_recv.as_str(), "<- {}", text);
                    recv_engine.sessions().touch(&cp_id_recv);
                    if let Some(reply) = recv_engine.handle_text(&cp_id_recv, &text) {
                        if let Err(e) = recv_engine.sessions().send_to(&cp_id_recv, reply) {
                            error!(charge_point_id = cp_id_recv.as_str(), error = %e, "Failed to send reply");
                            break;
                        }
                    }
                }
                Ok(Message::Close(frame)) => {
                    info!(charge_point_id = cp_id_recv.as_str(), ?frame, "Close frame received");
                    break;
                }
                Ok(Message::Binary(data)) => {
                    warn!(charge_point_id = cp_id_recv.as_str(), bytes = data.len(), "Binary message ignored");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(charge_point_id = cp_id_recv.as_str(), error = %e, "WebSocket error");
                    break;
                }
            }
        }
    };

    let server_stopping = tokio::select! {
        _ = send_task => false,
        _ = recv_task => false,
        _ = shutdown.wait() => {
            info!(charge_point_id = charge_point_id.as_str(), "Connection closing due to server shutdown");
            true
        }
    };

    if sessions.unregister(&charge_point_id, connection_id) {
        engine.cleanup_charge_point(&charge_point_id);
        // State stays in the registry for the final snapshot.
        if !server_stopping {
            lifecycle.disconnected(&charge_point_id, generation).await;
        }
    } else {
        info!(charge_point_id = charge_point_id.as_str(), "Superseded connection closed");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_point_id_from_path() {
        assert_eq!(extract_charge_point_id("/ocpp/CP1").as_deref(), Some("CP1"));
        assert_eq!(extract_charge_point_id("/CP-7/").as_deref(), Some("CP-7"));
        assert_eq!(extract_charge_point_id("/ocpp/"), None);
        assert_eq!(extract_charge_point_id("/ocpp"), None);
        assert_eq!(extract_charge_point_id("//ocpp//CP2"), Some("CP2".into()));
        assert_eq!(extract_charge_point_id("/"), None);
        assert_eq!(extract_charge_point_id("/a/b"), None);
    }
}

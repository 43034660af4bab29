//! TCP front door of the session engine
//!
//! Every accepted connection gets a fresh id, an outbound queue drained by
//! a writer task, and a read loop that turns frames into engine events.
//! Malformed frames are answered with an error and the connection stays
//! open; a broken stream ends it.

use std::net::SocketAddr;

use tokio::io::WriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use memecard_core::ConnId;

use crate::engine::EngineHandle;
use crate::error::{Error, Result};
use crate::frame::{decode, read_payload, write_frame};
use crate::protocol::{ClientMessage, ServerMessage};

/// Listening server handle
pub struct Server {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind `addr` and start accepting connections for `engine`
    pub async fn start(addr: SocketAddr, engine: EngineHandle) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "Server started");

        let (shutdown_tx, _) = broadcast::channel(1);
        tokio::spawn(accept_loop(listener, engine, shutdown_tx.clone()));

        Ok(Server {
            addr: bound_addr,
            shutdown_tx,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and close open connections
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Server shutdown initiated");
    }
}

async fn accept_loop(
    listener: TcpListener,
    engine: EngineHandle,
    shutdown_tx: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New connection");
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            engine.clone(),
                            shutdown_tx.subscribe(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    engine: EngineHandle,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let conn = ConnId::new();
    let (mut reader, writer) = tokio::io::split(stream);

    let (tx, rx) = mpsc::unbounded_channel();
    if engine.connect(conn, tx.clone()).is_err() {
        warn!(addr = %addr, "Engine stopped; refusing connection");
        return;
    }
    let writer_handle = tokio::spawn(writer_task(writer, rx));

    info!(addr = %addr, conn = %conn, "Connection opened");

    loop {
        tokio::select! {
            result = read_payload(&mut reader) => {
                let payload = match result {
                    Ok(payload) => payload,
                    Err(Error::ConnectionClosed) => {
                        debug!(conn = %conn, "Connection closed");
                        break;
                    }
                    Err(e) => {
                        warn!(conn = %conn, error = %e, "Read error");
                        break;
                    }
                };
                match parse(&payload) {
                    Ok(msg) => {
                        if engine.send(conn, msg).is_err() {
                            warn!(conn = %conn, "Engine stopped");
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(conn = %conn, error = %e, "Rejected frame");
                        let _ = tx.send(ServerMessage::error(e.to_string()));
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                debug!(conn = %conn, "Closing connection for shutdown");
                break;
            }
        }
    }

    let _ = engine.disconnect(conn);
    writer_handle.abort();

    info!(conn = %conn, "Connection closed");
}

/// Decode and validate one frame payload
fn parse(payload: &[u8]) -> Result<ClientMessage> {
    decode::<ClientMessage>(payload)?.validate()
}

async fn writer_task(
    mut writer: WriteHalf<TcpStream>,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &msg).await {
            debug!(error = %e, "Write failed");
            break;
        }
    }
}

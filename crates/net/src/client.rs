//! TCP client for talking to a session server
//!
//! Used by bots, load tools and the integration tests. The connection
//! task owns the socket; callers send through a command channel and read
//! server messages from an event queue.

use std::net::SocketAddr;

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use memecard_core::ConnId;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{ClientMessage, ServerMessage};

/// Event received from the server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Message(ServerMessage),
    /// Connection lost
    Disconnected,
}

/// Client handle for network operations
pub struct Client {
    conn_id: ConnId,
    event_rx: mpsc::Receiver<ServerEvent>,
    cmd_tx: mpsc::Sender<ClientCommand>,
}

enum ClientCommand {
    Send(ClientMessage),
    Disconnect,
}

impl Client {
    /// Connect and wait for the server's greeting
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        info!(addr = %addr, "Connecting to server");

        let stream = TcpStream::connect(addr).await?;
        let (mut reader, writer) = tokio::io::split(stream);

        let conn_id = match read_frame::<_, ServerMessage>(&mut reader).await? {
            ServerMessage::Connected { conn_id } => conn_id,
            other => {
                return Err(Error::Protocol(format!(
                    "Expected greeting, got {other:?}"
                )))
            }
        };

        let (event_tx, event_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio::spawn(connection_task(reader, writer, event_tx, cmd_rx));

        debug!(conn = %conn_id, "Connected");
        Ok(Client {
            conn_id,
            event_rx,
            cmd_tx,
        })
    }

    /// Id the server assigned to this connection
    pub fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    /// Get the next server event
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.event_rx.recv().await
    }

    /// Next server message, or `None` once disconnected
    pub async fn next_message(&mut self) -> Option<ServerMessage> {
        match self.event_rx.recv().await? {
            ServerEvent::Message(msg) => Some(msg),
            ServerEvent::Disconnected => None,
        }
    }

    pub async fn send(&self, msg: ClientMessage) -> Result<()> {
        self.cmd_tx
            .send(ClientCommand::Send(msg))
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// Disconnect from the server
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(ClientCommand::Disconnect).await;
    }
}

async fn connection_task(
    mut reader: ReadHalf<TcpStream>,
    mut writer: WriteHalf<TcpStream>,
    event_tx: mpsc::Sender<ServerEvent>,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
) {
    loop {
        tokio::select! {
            result = read_frame::<_, ServerMessage>(&mut reader) => {
                match result {
                    Ok(msg) => {
                        if event_tx.send(ServerEvent::Message(msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(Error::ConnectionClosed) => {
                        debug!("Server closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Read error");
                        break;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Send(msg)) => {
                        if let Err(e) = write_frame(&mut writer, &msg).await {
                            warn!(error = %e, "Write error");
                            break;
                        }
                    }
                    Some(ClientCommand::Disconnect) | None => {
                        debug!("Disconnect requested");
                        break;
                    }
                }
            }
        }
    }

    let _ = event_tx.send(ServerEvent::Disconnected).await;
    info!("Disconnected from server");
}

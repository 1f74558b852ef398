//! Server network layer: TCP accept loop, per-connection tasks and the relay loop

use crate::client_manager::ClientManager;
use crate::relay::{Delivery, GameTable, Recipient};
use log::{debug, error, info, warn};
use shared::Frame;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Messages sent from connection tasks to the relay loop
#[derive(Debug)]
pub enum ServerMessage {
    /// First line of a new connection: the identity it wants to use.
    Handshake {
        client_id: u32,
        identity: String,
        addr: SocketAddr,
        outbound: mpsc::UnboundedSender<String>,
    },
    LineReceived {
        client_id: u32,
        line: String,
    },
    Closed {
        client_id: u32,
    },
    Shutdown,
}

/// Stops a running [`Server`].
#[derive(Clone)]
pub struct ShutdownHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.server_tx.send(ServerMessage::Shutdown);
    }
}

/// Relay server
///
/// Connection tasks only move bytes; all state lives in the relay loop, which
/// owns the client registry and the game table and processes one message at
/// a time.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    clients: ClientManager,
    table: GameTable,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(addr: &str, max_clients: usize) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            local_addr,
            clients: ClientManager::new(max_clients),
            table: GameTable::new(),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    /// Spawns the reader and writer tasks of one accepted socket
    fn spawn_connection(
        stream: TcpStream,
        addr: SocketAddr,
        client_id: u32,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
        }
        let (read_half, write_half) = stream.into_split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(write_half, outbound_rx, client_id));
        tokio::spawn(read_loop(read_half, addr, client_id, outbound, server_tx));
    }

    fn deliver(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            match delivery.to {
                Recipient::All => self.clients.broadcast(&delivery.line, None),
                Recipient::AllExcept(identity) => {
                    self.clients.broadcast(&delivery.line, Some(&identity))
                }
                Recipient::One(identity) => {
                    self.clients.send_to(&identity, &delivery.line);
                }
            }
        }
    }

    fn handle_handshake(
        &mut self,
        client_id: u32,
        identity: String,
        addr: SocketAddr,
        outbound: mpsc::UnboundedSender<String>,
    ) {
        if let Err(reason) = self.clients.check_admission(&identity) {
            warn!("Refusing {} from {}: {}", identity, addr, reason);
            let _ = outbound.send(format!("Connection refused: {}", reason));
            // Dropping the sender lets the writer flush the refusal and close.
            return;
        }

        if let Err(e) = self.clients.add_client(client_id, &identity, addr, outbound) {
            warn!("Refusing {} from {}: {}", identity, addr, e);
            return;
        }

        let deliveries = self.table.on_connect(&identity);
        self.deliver(deliveries);
    }

    fn handle_line(&mut self, client_id: u32, line: String) {
        let Some(identity) = self.clients.identity(client_id).map(str::to_string) else {
            debug!("Ignoring line from unadmitted connection {}", client_id);
            return;
        };

        let frame = match Frame::parse(&line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping malformed frame from {}: {}", identity, e);
                return;
            }
        };

        if let Frame::Disconnect { .. } = frame {
            info!("{} said goodbye", identity);
            self.handle_close(client_id);
            return;
        }

        debug!("{}: {}", identity, line);
        let deliveries = self.table.on_frame(&identity, frame);
        self.deliver(deliveries);
    }

    fn handle_close(&mut self, client_id: u32) {
        if let Some(client) = self.clients.remove_client(&client_id) {
            let deliveries = self.table.on_disconnect(&client.identity);
            self.deliver(deliveries);
        }
    }

    /// Main server loop: accepts sockets and processes connection messages
    pub async fn run(mut self) -> io::Result<()> {
        let mut next_client_id: u32 = 1;

        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            debug!("Accepted connection {} from {}", next_client_id, addr);
                            let server_tx = self.server_tx.clone();
                            Self::spawn_connection(stream, addr, next_client_id, server_tx);
                            next_client_id = next_client_id.wrapping_add(1);
                        }
                        Err(e) => error!("Error accepting connection: {}", e),
                    }
                },

                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::Handshake { client_id, identity, addr, outbound }) => {
                            self.handle_handshake(client_id, identity, addr, outbound);
                        }
                        Some(ServerMessage::LineReceived { client_id, line }) => {
                            self.handle_line(client_id, line);
                        }
                        Some(ServerMessage::Closed { client_id }) => {
                            self.handle_close(client_id);
                        }
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },
            }
        }

        info!(
            "Served {} clients, {} games still open",
            self.clients.len(),
            self.table.len()
        );
        Ok(())
    }
}

async fn write_loop(
    write_half: OwnedWriteHalf,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    client_id: u32,
) {
    let mut writer = BufWriter::new(write_half);

    while let Some(line) = outbound_rx.recv().await {
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            error!("Failed to write to client {}: {}", client_id, e);
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Error closing connection {}: {}", client_id, e);
    }
}

/// Reads one line into `buf` without its `\n` or `\r\n` terminator.
/// Returns `false` at end of stream.
async fn read_line(reader: &mut BufReader<OwnedReadHalf>, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(false);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(true)
}

async fn read_loop(
    read_half: OwnedReadHalf,
    addr: SocketAddr,
    client_id: u32,
    outbound: mpsc::UnboundedSender<String>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();

    let identity = match read_line(&mut reader, &mut buf).await {
        Ok(true) => String::from_utf8_lossy(&buf).into_owned(),
        Ok(false) => {
            debug!("Connection {} closed before the handshake", client_id);
            return;
        }
        Err(e) => {
            warn!("Handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let handshake = ServerMessage::Handshake {
        client_id,
        identity,
        addr,
        outbound,
    };
    if server_tx.send(handshake).is_err() {
        return;
    }

    loop {
        match read_line(&mut reader, &mut buf).await {
            Ok(true) => {
                let line = match String::from_utf8(buf.clone()) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Dropping non-UTF-8 line from client {}: {}", client_id, e);
                        continue;
                    }
                };
                if server_tx
                    .send(ServerMessage::LineReceived { client_id, line })
                    .is_err()
                {
                    break;
                }
            }
            Ok(false) => break,
            Err(e) => {
                warn!("Error reading from client {}: {}", client_id, e);
                break;
            }
        }
    }

    let _ = server_tx.send(ServerMessage::Closed { client_id });
}

//! Client network layer bridging the GUI (UDP) and the server (TCP)
//!
//! Two reader tasks feed one event channel: the downlink task decodes
//! server messages off the TCP stream, the uplink task decodes GUI intents
//! out of UDP datagrams. The main loop owns the `RelaySession` and both
//! outgoing directions, so the session state has a single writer and the
//! observable ordering is exactly the channel order.

use crate::relay::RelaySession;
use log::{error, info, warn};
use shared::{
    ClientMessageGui, Decode, Encode, GuiMessageClient, ServerMessageClient, MAX_UDP_DATAGRAM,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

/// Relay endpoints and identity, parsed from the command line.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub gui_host: String,
    pub gui_port: u16,
    pub server_host: String,
    pub server_port: u16,
    pub player_name: String,
    /// Local UDP port to bind for datagrams from the GUI.
    pub port: u16,
}

/// Events funneled from the reader tasks into the relay loop.
#[derive(Debug)]
enum RelayEvent {
    FromServer(ServerMessageClient),
    FromGui(GuiMessageClient),
    ServerClosed,
}

/// The relay: session state plus both sockets' handles.
pub struct Client {
    session: RelaySession,
    gui_addr: SocketAddr,
    udp: Arc<UdpSocket>,
    server_writer: OwnedWriteHalf,
    events: mpsc::UnboundedReceiver<RelayEvent>,
}

impl Client {
    /// Connects to the server, binds the GUI-facing UDP socket, and spawns
    /// both reader tasks.
    pub async fn new(config: RelayConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let stream =
            TcpStream::connect((config.server_host.as_str(), config.server_port)).await?;
        stream.set_nodelay(true)?;
        info!("connected to server at {}", stream.peer_addr()?);
        let (read_half, write_half) = stream.into_split();

        let udp = Arc::new(UdpSocket::bind(("0.0.0.0", config.port)).await?);
        info!("listening for GUI datagrams on {}", udp.local_addr()?);

        let gui_addr = lookup_host((config.gui_host.as_str(), config.gui_port))
            .await?
            .next()
            .ok_or("could not resolve GUI address")?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        spawn_downlink(read_half, event_tx.clone());
        spawn_uplink(Arc::clone(&udp), event_tx);

        Ok(Client {
            session: RelaySession::new(config.player_name),
            gui_addr,
            udp,
            server_writer: write_half,
            events: event_rx,
        })
    }

    /// The UDP address the GUI should send its datagrams to.
    pub fn local_udp_addr(&self) -> std::io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    /// Runs the relay loop until the server connection ends.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        while let Some(event) = self.events.recv().await {
            match event {
                RelayEvent::FromServer(message) => {
                    if let Some(snapshot) = self.session.handle_server_message(message) {
                        self.send_to_gui(&snapshot).await;
                    }
                }
                RelayEvent::FromGui(message) => {
                    if let Some(outgoing) = self.session.handle_gui_message(message) {
                        let bytes = outgoing.to_bytes();
                        if let Err(e) = self.server_writer.write_all(&bytes).await {
                            self.session.mark_disconnected();
                            return Err(format!("failed to send to server: {}", e).into());
                        }
                    }
                }
                RelayEvent::ServerClosed => {
                    self.session.mark_disconnected();
                    return Err("server connection closed".into());
                }
            }
        }
        Ok(())
    }

    /// Sends one snapshot as one datagram. Snapshots that cannot fit a
    /// datagram are dropped, never fragmented.
    async fn send_to_gui(&self, message: &ClientMessageGui) {
        let bytes = message.to_bytes();
        if bytes.len() > MAX_UDP_DATAGRAM {
            error!(
                "snapshot of {} bytes exceeds the {} byte datagram limit, dropping",
                bytes.len(),
                MAX_UDP_DATAGRAM
            );
            return;
        }
        if let Err(e) = self.udp.send_to(&bytes, self.gui_addr).await {
            error!("failed to send snapshot to GUI: {}", e);
        }
    }
}

/// Decodes server messages until the stream ends or turns malformed. Either
/// condition is terminal for the session; reconnection is not attempted.
fn spawn_downlink(mut read_half: OwnedReadHalf, event_tx: mpsc::UnboundedSender<RelayEvent>) {
    tokio::spawn(async move {
        loop {
            match ServerMessageClient::decode(&mut read_half).await {
                Ok(message) => {
                    if event_tx.send(RelayEvent::FromServer(message)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("server stream ended: {}", e);
                    let _ = event_tx.send(RelayEvent::ServerClosed);
                    break;
                }
            }
        }
    });
}

/// Decodes GUI intents, one message per datagram. Malformed datagrams are
/// logged and skipped; UDP is lossy anyway.
fn spawn_uplink(udp: Arc<UdpSocket>, event_tx: mpsc::UnboundedSender<RelayEvent>) {
    tokio::spawn(async move {
        let mut buffer = [0u8; MAX_UDP_DATAGRAM];
        loop {
            match udp.recv_from(&mut buffer).await {
                Ok((len, addr)) => {
                    let mut bytes = &buffer[..len];
                    match GuiMessageClient::decode(&mut bytes).await {
                        Ok(message) if bytes.is_empty() => {
                            if event_tx.send(RelayEvent::FromGui(message)).is_err() {
                                break;
                            }
                        }
                        Ok(_) => warn!("trailing bytes in datagram from {}, dropping", addr),
                        Err(e) => warn!("malformed datagram from {}: {}", addr, e),
                    }
                }
                Err(e) => {
                    error!("error receiving datagram: {}", e);
                    sleep(Duration::from_millis(10)).await;
                }
            }
        }
    });
}

/// Splits `host:port` at the last colon, accepting bracketed IPv6 literals.
pub fn parse_host_port(input: &str) -> Result<(String, u16), String> {
    let (host, port) = input
        .rsplit_once(':')
        .ok_or_else(|| format!("'{}' is not of the form host:port", input))?;
    let port: u16 = port
        .parse()
        .map_err(|_| format!("'{}' is not a valid port number", port))?;
    let host = host
        .strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return Err(format!("'{}' is missing a host", input));
    }
    Ok((host.to_string(), port))
}

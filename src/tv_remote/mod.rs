//! tv_remote - Remote-control client for a network-connected TV
//!
//! Power probe over HTTP, Wake-on-LAN over UDP, pairing and key commands
//! over a WebSocket channel. The caller owns persistence: a token learned
//! during pairing is handed back from [`TvRemote::connect`] and never stored
//! anywhere but in memory.

mod identity;
mod keys;
mod protocol;
mod tls;
mod wake;

pub use identity::{IdentityError, RemoteIdentity, DEFAULT_PORT, DEFAULT_STATUS_PORT, DEFAULT_SUBNET};
pub use keys::{Key, UnknownKey};
pub use protocol::{pairing_token, RemoteCommand, TokenSource};
pub use wake::{broadcast_address, magic_packet};

use std::net::SocketAddrV4;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};

use crate::lock;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
pub const HANDSHAKE_WAIT: Duration = Duration::from_secs(30);
pub const DEFAULT_WAKE_REPEAT: usize = 10;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Unknown,
    Off,
    OnDisconnected,
    OnConnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    /// The TV closed the channel or the socket failed.
    Disconnected,
}

/// What the volume loop needs from a remote.
#[async_trait]
pub trait Remote: Send + Sync {
    fn is_connected(&self) -> bool;
    async fn press(&self, key: Key) -> bool;
    async fn close(&self);
}

struct ReadLoop {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct TvRemote {
    identity: RemoteIdentity,
    token: Mutex<Option<String>>,
    state: Arc<Mutex<ConnectionState>>,
    writer: tokio::sync::Mutex<Option<WsSink>>,
    reader: tokio::sync::Mutex<Option<ReadLoop>>,
    events: mpsc::Sender<RemoteEvent>,
    handshake_wait: Duration,
}

impl TvRemote {
    pub fn new(identity: RemoteIdentity, events: mpsc::Sender<RemoteEvent>) -> Self {
        let token = identity.token.clone();
        Self {
            identity,
            token: Mutex::new(token),
            state: Arc::new(Mutex::new(ConnectionState::Unknown)),
            writer: tokio::sync::Mutex::new(None),
            reader: tokio::sync::Mutex::new(None),
            events,
            handshake_wait: HANDSHAKE_WAIT,
        }
    }

    /// Overrides how long [`TvRemote::connect`] waits for the socket and the
    /// first frame together.
    pub fn with_handshake_wait(mut self, wait: Duration) -> Self {
        self.handshake_wait = wait;
        self
    }

    pub fn identity(&self) -> &RemoteIdentity {
        &self.identity
    }

    /// The token commands are sent with, if any.
    pub fn token(&self) -> Option<String> {
        lock(&self.token).clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    fn log_level(&self) -> log::Level {
        if self.identity.debug {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }

    /// Waits `delay`, then asks the TV's status endpoint whether it is up.
    ///
    /// Any failure, including the 3 s timeout, reads as "off".
    pub async fn is_on(&self, delay: Duration) -> bool {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let url = self.identity.status_url();
        match probe(&url).await {
            Ok(answer) => {
                log::log!(self.log_level(), "TV is on [{}]", answer.trim());
                if self.connection_state() != ConnectionState::OnConnected {
                    self.set_state(ConnectionState::OnDisconnected);
                }
                true
            }
            Err(e) => {
                log::log!(self.log_level(), "TV is off [{}]", e);
                // An open channel to a TV that is off is stale.
                if self.is_connected() {
                    self.close().await;
                }
                self.set_state(ConnectionState::Off);
                false
            }
        }
    }

    /// Broadcasts `repeat` Wake-on-LAN packets for the TV's MAC address.
    ///
    /// Fails only if the TV's address cannot be resolved.
    pub async fn turn_on(&self, repeat: usize) -> anyhow::Result<()> {
        let ip = wake::resolve_ipv4(&self.identity.ip_addr, self.identity.port).await?;
        let broadcast = wake::broadcast_address(ip, self.identity.subnet);
        let target = SocketAddrV4::new(broadcast, self.identity.port);

        let packet = wake::magic_packet(self.identity.mac_addr.bytes());
        log::log!(self.log_level(), "WOL packet to {}: {:02X?}", target, packet);

        wake::send_magic_packets(target, &packet, repeat).await;
        Ok(())
    }

    /// Opens the remote-control channel and returns the token in use.
    ///
    /// Requires a successful [`TvRemote::is_on`] first. `None` means the TV
    /// has not authorized this app yet (or is off); it is not a failure.
    pub async fn connect(&self) -> Option<String> {
        match self.connection_state() {
            ConnectionState::Unknown | ConnectionState::Off => {
                log::log!(self.log_level(), "TV is not known to be on, not connecting");
                return None;
            }
            ConnectionState::OnConnected => self.close().await,
            ConnectionState::OnDisconnected => {}
        }

        let stored = self.token();
        let url = match self.identity.remote_control_url(stored.as_deref()) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Invalid remote control URL: {}", e);
                return stored;
            }
        };

        let deadline = Instant::now() + self.handshake_wait;
        let ws_stream = match timeout_at(deadline, self.open_socket(url.as_str())).await {
            Ok(Ok(ws_stream)) => ws_stream,
            Ok(Err(e)) => {
                log::warn!("Error on connecting to TV: {}", e);
                return stored;
            }
            Err(_) => {
                log::warn!("Timeout on connecting to TV");
                return stored;
            }
        };
        log::log!(self.log_level(), "Please accept dialog for new connection on TV, if provided");

        let (write, mut read) = ws_stream.split();

        let fresh = match timeout_at(deadline, read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                log::log!(self.log_level(), "Data received from TV: {}", text.trim());
                match pairing_token(&text, &self.identity.app_name_base64()) {
                    Some((token, TokenSource::PairedClients)) => {
                        log::info!("Token taken from the paired clients list");
                        Some(token)
                    }
                    Some((token, TokenSource::Direct)) => Some(token),
                    None => None,
                }
            }
            Ok(Some(Ok(other))) => {
                log::warn!("Unexpected first frame from TV: {:?}", other);
                None
            }
            Ok(Some(Err(e))) => {
                log::warn!("Error on connecting to TV: {}", e);
                return stored;
            }
            Ok(None) => {
                log::warn!("TV closed the connection during the handshake");
                return stored;
            }
            Err(_) => {
                log::log!(self.log_level(), "Timeout on retrieving a token");
                None
            }
        };

        if let Some(token) = fresh {
            log::log!(self.log_level(), "Token received: {}", token);
            *lock(&self.token) = Some(token);
        }

        *self.writer.lock().await = Some(write);
        *self.reader.lock().await = Some(self.spawn_read_loop(read));
        self.set_state(ConnectionState::OnConnected);

        self.token()
    }

    async fn open_socket(&self, url: &str) -> anyhow::Result<WsStream> {
        let request = url.into_client_request()?;
        let connector = if self.identity.scheme() == "wss" {
            Connector::Rustls(tls::self_signed_client_config()?)
        } else {
            Connector::Plain
        };

        log::log!(self.log_level(), "Connecting to {}", url);
        let (ws_stream, _) =
            connect_async_tls_with_config(request, None, false, Some(connector)).await?;
        Ok(ws_stream)
    }

    /// Receives until cancelled or the socket goes away. Only the
    /// disconnect is visible to the outside.
    fn spawn_read_loop(&self, mut read: SplitStream<WsStream>) -> ReadLoop {
        let (cancel, mut cancelled) = oneshot::channel::<()>();
        let state = self.state.clone();
        let events = self.events.clone();
        let level = self.log_level();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancelled => return,
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            log::log!(level, "Data received from TV: {}", text.trim());
                        }
                        Some(Ok(Message::Close(frame))) => {
                            log::info!("TV closed connection: {:?}", frame);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            log::warn!("TV connection error: {}", e);
                            break;
                        }
                        None => break,
                    },
                }
            }

            {
                let mut state = lock(&state);
                if *state == ConnectionState::OnConnected {
                    *state = ConnectionState::OnDisconnected;
                }
            }
            if let Err(e) = events.send(RemoteEvent::Disconnected).await {
                log::debug!("Disconnect event not delivered: {}", e);
            }
        });

        ReadLoop { cancel, handle }
    }

    /// Sends one key click. False when not connected, unpaired, or the send fails.
    pub async fn press(&self, key: Key) -> bool {
        self.send(RemoteCommand::key(key)).await
    }

    /// Types `text` into the input field focused on the TV.
    pub async fn type_text(&self, text: &str) -> bool {
        self.send(RemoteCommand::text(text)).await
    }

    async fn send(&self, command: RemoteCommand) -> bool {
        if !self.is_connected() || self.token().is_none() {
            return false;
        }

        let payload = match serde_json::to_string(&command) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("Failed to encode command: {}", e);
                return false;
            }
        };
        log::log!(self.log_level(), "Sending: {}", payload);

        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return false;
        };
        match sink.send(Message::Text(payload.into())).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Error on sending a command: {}", e);
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::OnConnected
    }

    /// Stops the read loop, waits for it, then closes the socket.
    /// Safe to call any number of times.
    pub async fn close(&self) {
        let reader = self.reader.lock().await.take();
        if let Some(reader) = reader {
            let _ = reader.cancel.send(());
            if let Err(e) = reader.handle.await {
                log::warn!("Read loop ended abnormally: {}", e);
            }
        }

        let writer = self.writer.lock().await.take();
        if let Some(mut sink) = writer {
            if let Err(e) = sink.close().await {
                log::debug!("Closing the TV socket: {}", e);
            }
        }

        let mut state = lock(&self.state);
        if *state == ConnectionState::OnConnected {
            *state = ConnectionState::OnDisconnected;
        }
    }
}

impl Drop for TvRemote {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.handle.abort();
        }
    }
}

#[async_trait]
impl Remote for TvRemote {
    fn is_connected(&self) -> bool {
        TvRemote::is_connected(self)
    }

    async fn press(&self, key: Key) -> bool {
        TvRemote::press(self, key).await
    }

    async fn close(&self) {
        TvRemote::close(self).await
    }
}

async fn probe(url: &str) -> anyhow::Result<String> {
    let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
    let answer = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(answer)
}

#[cfg(test)]
mod tests;

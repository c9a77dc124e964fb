//! WebSocket transport over either channel type
//!
//! AES-HMAC appliances get binary frames encrypted with
//! [`AesHmacCipher`]; PSK-TLS appliances get text frames inside the TLS
//! stream. One I/O task per connection owns the socket and the cipher, so
//! frames are encrypted and decrypted strictly in wire order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{client_async, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::crypto::{AesHmacCipher, PskTlsConnector};
use crate::error::{HcdError, Result};
use crate::transport::liveness::{ConnectionChecks, KeepaliveTarget, Liveness};
use crate::transport::{Transport, TransportConfig, TransportEvent};
use crate::types::{ConnectionType, Credentials};

/// How long `disconnect()` waits for the I/O task to send its close frame
const CLOSE_GRACE: Duration = Duration::from_secs(5);

enum Channel {
    AesHmac { key: String, iv: String },
    Psk(PskTlsConnector),
}

enum Outbound {
    Text(String),
    Ping,
}

/// Turns protocol text into WebSocket frames and back
enum FrameCodec {
    AesHmac(AesHmacCipher),
    Plain,
}

impl FrameCodec {
    fn wrap(&mut self, text: String) -> WsMessage {
        match self {
            FrameCodec::AesHmac(cipher) => WsMessage::Binary(cipher.encrypt(text.as_bytes())),
            FrameCodec::Plain => WsMessage::Text(text),
        }
    }

    fn unwrap(&mut self, frame: WsMessage) -> Option<String> {
        match (self, frame) {
            (FrameCodec::AesHmac(cipher), WsMessage::Binary(data)) => {
                let decrypted = cipher.decrypt(&data);
                Some(String::from_utf8_lossy(&decrypted.plaintext).into_owned())
            }
            (FrameCodec::AesHmac(_), WsMessage::Text(text)) => {
                warn!("Unencrypted text frame on encrypted channel");
                Some(text)
            }
            (FrameCodec::Plain, WsMessage::Text(text)) => Some(text),
            (FrameCodec::Plain, WsMessage::Binary(data)) => {
                Some(String::from_utf8_lossy(&data).into_owned())
            }
            _ => None,
        }
    }
}

/// Handle the keepalive tasks use to reach a live session
struct SessionLink {
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
    /// Set when the owner called `disconnect()`
    requested: AtomicBool,
}

impl KeepaliveTarget for SessionLink {
    fn send_ping(&self) {
        let _ = self.outbound.send(Outbound::Ping);
    }

    fn is_open(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    fn force_disconnect(&self) {
        self.cancel.cancel();
    }
}

struct ActiveSession {
    link: Arc<SessionLink>,
    checks: ConnectionChecks,
    io: JoinHandle<()>,
}

/// [`Transport`] implementation for the appliance WebSocket
pub struct WebSocketTransport {
    address: String,
    channel: Channel,
    config: TransportConfig,
    events: mpsc::UnboundedSender<TransportEvent>,
    session: Mutex<Option<ActiveSession>>,
}

impl WebSocketTransport {
    /// Validate settings and key material.
    ///
    /// Errors returned here are configuration errors
    /// ([`HcdError::is_configuration`]) and retrying will not help.
    pub fn new(
        address: impl Into<String>,
        credentials: &Credentials,
        config: TransportConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(HcdError::ConfigError("appliance address is empty".into()));
        }

        let channel = match credentials {
            Credentials::AesHmac { key, iv } => {
                AesHmacCipher::new(key, iv)?;
                Channel::AesHmac {
                    key: key.clone(),
                    iv: iv.clone(),
                }
            }
            Credentials::Psk { key } => {
                if !PskTlsConnector::is_supported() {
                    return Err(HcdError::UnsupportedPlatform(
                        "TLS library lacks ECDHE-PSK-CHACHA20-POLY1305".into(),
                    ));
                }
                Channel::Psk(PskTlsConnector::new(key)?)
            }
        };

        let (events, events_rx) = mpsc::unbounded_channel();
        let transport = Self {
            address,
            channel,
            config,
            events,
            session: Mutex::new(None),
        };
        Ok((transport, events_rx))
    }

    pub fn connection_type(&self) -> ConnectionType {
        match self.channel {
            Channel::AesHmac { .. } => ConnectionType::AesHmacSha256,
            Channel::Psk(_) => ConnectionType::Tls,
        }
    }

    pub fn uri(&self) -> String {
        self.connection_type().endpoint_uri(&self.address)
    }

    async fn open(&self) -> Result<ActiveSession> {
        let uri = self.uri();
        let port = self.connection_type().default_port();
        debug!("Connecting to {}", uri);

        match &self.channel {
            Channel::AesHmac { key, iv } => {
                let tcp = TcpStream::connect((self.address.as_str(), port))
                    .await
                    .map_err(|e| HcdError::ConnectionFailed(format!("{}: {}", uri, e)))?;
                let (ws, _) = client_async(uri.as_str(), tcp).await?;
                let cipher = AesHmacCipher::new(key, iv)?;
                Ok(self.start_session(ws, FrameCodec::AesHmac(cipher)))
            }
            Channel::Psk(connector) => {
                let tls = connector.connect(&self.address, port).await?;
                let (ws, _) = client_async(uri.as_str(), tls).await?;
                Ok(self.start_session(ws, FrameCodec::Plain))
            }
        }
    }

    fn start_session<S>(&self, ws: WebSocketStream<S>, codec: FrameCodec) -> ActiveSession
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let link = Arc::new(SessionLink {
            outbound,
            cancel: cancel.clone(),
            requested: AtomicBool::new(false),
        });
        let liveness = Arc::new(Liveness::new());

        let _ = self.events.send(TransportEvent::Opened);
        let io = tokio::spawn(run_socket(
            ws,
            codec,
            outbound_rx,
            self.events.clone(),
            liveness.clone(),
            link.clone(),
        ));
        let checks = ConnectionChecks::start(&self.config, liveness, link.clone(), cancel.child_token());

        ActiveSession { link, checks, io }
    }

    async fn close_session(session: ActiveSession) {
        session.link.requested.store(true, Ordering::SeqCst);
        session.link.cancel.cancel();
        session.checks.stop();
        if tokio::time::timeout(CLOSE_GRACE, session.io).await.is_err() {
            debug!("I/O task did not finish within {:?}", CLOSE_GRACE);
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if let Some(existing) = session.take() {
            if existing.link.is_open() {
                *session = Some(existing);
                return Ok(());
            }
            Self::close_session(existing).await;
        }

        let active = tokio::time::timeout(self.config.connect_timeout, self.open())
            .await
            .map_err(|_| HcdError::ConnectionTimeout)??;
        info!("Connected to {}", self.uri());
        *session = Some(active);
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<()> {
        let session = self.session.lock().await;
        match session.as_ref() {
            Some(active) if active.link.is_open() => active
                .link
                .outbound
                .send(Outbound::Text(text.to_string()))
                .map_err(|_| HcdError::ConnectionClosed),
            Some(_) => Err(HcdError::ConnectionClosed),
            None => Err(HcdError::NotConnected),
        }
    }

    async fn disconnect(&self) {
        if let Some(active) = self.session.lock().await.take() {
            Self::close_session(active).await;
            info!("Disconnected from {}", self.uri());
        }
    }

    async fn is_open(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|active| active.link.is_open())
            .unwrap_or(false)
    }
}

/// Own the socket until either side closes it
async fn run_socket<S>(
    ws: WebSocketStream<S>,
    mut codec: FrameCodec,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
    liveness: Arc<Liveness>,
    link: Arc<SessionLink>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws.split();

    let reason = loop {
        tokio::select! {
            _ = link.cancel.cancelled() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                break Some("closed locally".to_string());
            }
            Some(out) = outbound.recv() => {
                let frame = match out {
                    Outbound::Text(text) => codec.wrap(text),
                    Outbound::Ping => WsMessage::Ping(Vec::new()),
                };
                if let Err(e) = sink.send(frame).await {
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break Some(e.to_string());
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(frame)) => {
                    liveness.touch();
                    match frame {
                        WsMessage::Ping(_) => {
                            trace!("Ping received");
                            // tungstenite queues the pong; flushing sends it now
                            let _ = sink.flush().await;
                        }
                        WsMessage::Pong(_) => trace!("Pong received"),
                        WsMessage::Close(frame) => {
                            break frame.map(|f| format!("{} {}", u16::from(f.code), f.reason));
                        }
                        other => {
                            if let Some(text) = codec.unwrap(other) {
                                let _ = events.send(TransportEvent::Message(text));
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break Some(e.to_string());
                }
                None => break None,
            }
        }
    };

    link.cancel.cancel();
    if !link.requested.load(Ordering::SeqCst) {
        debug!("Connection closed: {:?}", reason);
        let _ = events.send(TransportEvent::Closed { reason });
    }
}

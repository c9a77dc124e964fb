//! Connection actor for one appliance
//!
//! A single task owns the transport and the [`Session`]. Transport events,
//! user commands and reconnect triggers are processed one at a time, so
//! session id, message ids and service versions never race.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hcd_common::description::DescriptionResolver;
use hcd_common::transport::{Transport, TransportConfig, TransportEvent, WebSocketTransport};
use hcd_common::types::FailureKind;
use hcd_common::{ApplianceStatus, Credentials, DeviceIdentity, HaId, HcdError, Message};

use crate::appliance::command::{ApplianceCommand, CommandError};
use crate::appliance::event::ApplianceEvent;
use crate::appliance::history::{ApplianceMessage, Direction, MessageHistory};
use crate::appliance::reconnect::{Reconnector, DEFAULT_RECONNECT_DELAY};
use crate::appliance::session::Session;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Why a command was not delivered
#[derive(Debug, Error)]
pub enum SendError {
    #[error("appliance connection is not running")]
    Stopped,

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Transport(#[from] HcdError),
}

/// Everything an appliance connection needs besides its transport
#[derive(Clone)]
pub struct ApplianceSetup {
    pub ha_id: HaId,
    pub identity: DeviceIdentity,
    pub resolver: Arc<DescriptionResolver>,
    pub reconnect_delay: Duration,
    pub history_capacity: usize,
}

impl ApplianceSetup {
    pub fn new(ha_id: HaId, resolver: Arc<DescriptionResolver>) -> Self {
        Self {
            ha_id,
            identity: DeviceIdentity::default(),
            resolver,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            history_capacity: crate::appliance::history::DEFAULT_HISTORY_CAPACITY,
        }
    }
}

enum Control {
    Command {
        command: ApplianceCommand,
        reply: oneshot::Sender<Result<(), SendError>>,
    },
    Reconnect,
    ConnectFailed(String),
}

/// Handle to a running appliance connection
pub struct Appliance {
    ha_id: HaId,
    control: mpsc::UnboundedSender<Control>,
    events: broadcast::Sender<ApplianceEvent>,
    status: watch::Receiver<ApplianceStatus>,
    history: Arc<MessageHistory>,
    resolver: Arc<DescriptionResolver>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Appliance {
    /// Build the WebSocket transport and start connecting.
    ///
    /// Invalid credentials or an unsupported channel leave the appliance in
    /// a terminal failed state without any connection attempt.
    pub fn spawn(
        setup: ApplianceSetup,
        address: &str,
        credentials: hcd_common::Result<Credentials>,
        transport_config: TransportConfig,
    ) -> Self {
        let transport = credentials
            .and_then(|credentials| WebSocketTransport::new(address, &credentials, transport_config));
        Self::spawn_with_transport(setup, transport)
    }

    /// Start the connection actor on an already built transport
    pub fn spawn_with_transport<T>(
        setup: ApplianceSetup,
        transport: hcd_common::Result<(T, mpsc::UnboundedReceiver<TransportEvent>)>,
    ) -> Self
    where
        T: Transport + 'static,
    {
        let (control, control_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let history = Arc::new(MessageHistory::new(setup.history_capacity));
        let shutdown = CancellationToken::new();

        let (transport, transport_rx) = match transport {
            Ok(parts) => parts,
            Err(e) => {
                let kind = match e {
                    HcdError::UnsupportedPlatform(_) => FailureKind::Disabled,
                    _ => FailureKind::ConfigurationError,
                };
                error!(ha_id = %setup.ha_id, "Appliance disabled: {}", e);
                let (_, status) = watch::channel(ApplianceStatus::Failed {
                    kind,
                    reason: e.to_string(),
                });
                return Self {
                    ha_id: setup.ha_id,
                    control,
                    events,
                    status,
                    history,
                    resolver: setup.resolver,
                    shutdown,
                    task: None,
                };
            }
        };

        let (status_tx, status) = watch::channel(ApplianceStatus::Connecting);
        let trigger = control.clone();
        let reconnector = Reconnector::new(setup.reconnect_delay, move || {
            let _ = trigger.send(Control::Reconnect);
        });

        let actor = ApplianceActor {
            ha_id: setup.ha_id.clone(),
            transport: Arc::new(transport),
            transport_rx,
            control: control.clone(),
            control_rx,
            session: Session::new(setup.resolver.clone(), setup.identity),
            history: history.clone(),
            events: events.clone(),
            status: status_tx,
            reconnector,
            connecting: None,
        };
        let task = tokio::spawn(actor.run(shutdown.clone()));

        Self {
            ha_id: setup.ha_id,
            control,
            events,
            status,
            history,
            resolver: setup.resolver,
            shutdown,
            task: Some(task),
        }
    }

    pub fn ha_id(&self) -> &HaId {
        &self.ha_id
    }

    pub fn resolver(&self) -> &Arc<DescriptionResolver> {
        &self.resolver
    }

    /// Live feature events, description changes and subscription markers
    pub fn subscribe(&self) -> broadcast::Receiver<ApplianceEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> watch::Receiver<ApplianceStatus> {
        self.status.clone()
    }

    pub fn history(&self) -> &Arc<MessageHistory> {
        &self.history
    }

    /// Resolve and send a command.
    ///
    /// Fails when the handshake is not complete or the frame cannot be
    /// sent. A command naming a feature, program or value unknown to the
    /// appliance description is dropped with a warning and still returns
    /// `Ok(())`.
    pub async fn send_command(&self, command: ApplianceCommand) -> Result<(), SendError> {
        let (reply, response) = oneshot::channel();
        self.control
            .send(Control::Command { command, reply })
            .map_err(|_| SendError::Stopped)?;
        response.await.map_err(|_| SendError::Stopped)?
    }

    /// Stop the connection for good and wait for the actor to finish
    pub async fn dispose(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Appliance {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct ApplianceActor<T> {
    ha_id: HaId,
    transport: Arc<T>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    control: mpsc::UnboundedSender<Control>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    session: Session,
    history: Arc<MessageHistory>,
    events: broadcast::Sender<ApplianceEvent>,
    status: watch::Sender<ApplianceStatus>,
    reconnector: Reconnector,
    connecting: Option<JoinHandle<()>>,
}

impl<T: Transport + 'static> ApplianceActor<T> {
    async fn run(mut self, shutdown: CancellationToken) {
        self.start_connect();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                Some(event) = self.transport_rx.recv() => {
                    self.on_transport_event(event).await;
                }

                Some(control) = self.control_rx.recv() => {
                    self.on_control(control).await;
                }

                else => break,
            }
        }

        self.stop().await;
    }

    fn start_connect(&mut self) {
        if let Some(previous) = self.connecting.take() {
            previous.abort();
        }
        let transport = self.transport.clone();
        let control = self.control.clone();
        let ha_id = self.ha_id.clone();
        self.connecting = Some(tokio::spawn(async move {
            if let Err(e) = transport.connect().await {
                debug!(ha_id = %ha_id, "Connect failed: {}", e);
                let _ = control.send(Control::ConnectFailed(e.to_string()));
            }
        }));
    }

    fn set_status(&self, status: ApplianceStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    fn go_offline(&mut self, reason: Option<String>) {
        self.session.on_close();
        self.set_status(ApplianceStatus::Offline { reason });
        if self.reconnector.schedule() {
            info!(
                ha_id = %self.ha_id,
                "Reconnecting in {:?}",
                self.reconnector.delay()
            );
        }
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                info!(ha_id = %self.ha_id, "Connection open, waiting for session");
                self.reconnector.cancel();
                self.session.on_open();
                self.set_status(ApplianceStatus::Online);
            }
            TransportEvent::Message(text) => self.on_frame(&text).await,
            TransportEvent::Closed { reason } => {
                warn!(
                    ha_id = %self.ha_id,
                    "Connection closed: {}",
                    reason.as_deref().unwrap_or("no reason")
                );
                self.go_offline(reason);
            }
            TransportEvent::Error(message) => {
                warn!(ha_id = %self.ha_id, "Transport error: {}", message);
                if !self.transport.is_open().await {
                    self.go_offline(Some(message));
                }
            }
        }
    }

    async fn on_frame(&mut self, text: &str) {
        debug!(ha_id = %self.ha_id, "<< {}", text);
        let step = match self.session.handle_frame(text) {
            Ok(step) => step,
            Err(e) => {
                warn!(ha_id = %self.ha_id, "Ignoring frame: {}", e);
                self.history.record(ApplianceMessage::undecodable(text, e));
                return;
            }
        };

        self.history.record(ApplianceMessage::new(
            Direction::Inbound,
            step.message,
            step.events.clone(),
            step.description_changes.clone(),
        ));

        for reply in step.replies {
            if let Err(e) = self.send(reply).await {
                warn!(ha_id = %self.ha_id, "Failed to send reply: {}", e);
            }
        }

        // No subscribers is fine
        for event in step.events {
            let _ = self.events.send(ApplianceEvent::Feature(event));
        }
        for change in step.description_changes {
            let _ = self.events.send(ApplianceEvent::Description(change));
        }
        if step.subscribed {
            let _ = self.events.send(ApplianceEvent::Subscribed);
        }
    }

    async fn on_control(&mut self, control: Control) {
        match control {
            Control::Command { command, reply } => {
                let result = match self.execute(&command).await {
                    Err(SendError::Command(e)) if e.is_resolution_miss() => {
                        warn!(ha_id = %self.ha_id, "Dropping command {:?}: {}", command, e);
                        Ok(())
                    }
                    Err(e) => {
                        warn!(ha_id = %self.ha_id, "Command {:?} failed: {}", command, e);
                        Err(e)
                    }
                    Ok(()) => Ok(()),
                };
                let _ = reply.send(result);
            }
            Control::Reconnect => {
                if self.transport.is_open().await {
                    return;
                }
                info!(ha_id = %self.ha_id, "Reconnecting");
                self.set_status(ApplianceStatus::Connecting);
                self.start_connect();
            }
            Control::ConnectFailed(reason) => {
                self.go_offline(Some(reason));
            }
        }
    }

    async fn execute(&mut self, command: &ApplianceCommand) -> Result<(), SendError> {
        let message = self.session.command(command)?;
        self.send(message).await?;
        Ok(())
    }

    async fn send(&mut self, message: Message) -> hcd_common::Result<()> {
        let result = self.transmit(&message).await;
        let record = ApplianceMessage::outbound(message);
        match &result {
            Ok(()) => self.history.record(record),
            Err(e) => self.history.record(record.with_error(e)),
        }
        result
    }

    async fn transmit(&self, message: &Message) -> hcd_common::Result<()> {
        let text = self.session.encode(message)?;
        debug!(ha_id = %self.ha_id, ">> {}", text);
        self.transport.send(&text).await
    }

    async fn stop(&mut self) {
        self.reconnector.dispose();
        if let Some(connecting) = self.connecting.take() {
            connecting.abort();
        }
        self.transport.disconnect().await;
        self.session.on_close();
        self.set_status(ApplianceStatus::Offline {
            reason: Some("disposed".to_string()),
        });
        info!(ha_id = %self.ha_id, "Appliance connection stopped");
    }
}

//! Protocol state machine of one appliance connection
//!
//! The session is driven by the connection actor: it is told when the
//! transport opens or closes and is handed every inbound text frame. It
//! answers with the messages to send and the events to publish, so it never
//! touches the network itself.
//!
//! ## Handshake
//!
//! ```text
//! Appliance                         Session
//!    |-- POST ei/initialValues ------>|  (session id, first message id)
//!    |<-- RESPONSE ei/initialValues --|
//!    |<-- GET ci/services ------------|
//!    |-- RESPONSE ci/services ------->|  (service versions)
//!    |<-- GET ci/authentication ------|
//!    |<-- NOTIFY ei/deviceReady ------|
//!    |<-- GET ci/info, ... -----------|
//!    |<-- GET ro/allMandatoryValues --|  -> Subscribed
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use tracing::{debug, info, trace, warn};

use hcd_common::description::{keys, DescriptionResolver, Event, EventValue};
use hcd_common::protocol::resource::{
    CI_AUTHENTICATION, CI_INFO, CI_SERVICES, CI_TZ_INFO, EI_DEVICE_READY, EI_INITIAL_VALUES,
    IZ_INFO, NI_INFO, RO_ALL_DESCRIPTION_CHANGES, RO_ALL_MANDATORY_VALUES,
    RO_DESCRIPTION_CHANGE, RO_VALUES,
};
use hcd_common::protocol::{
    ApplianceInfo, AuthenticationNonce, DescriptionChange, DeviceInfo, ServiceVersions,
    CLIENT_DEVICE_TYPE,
};
use hcd_common::{Action, DeviceIdentity, Message, MessageCodec, Payload, Resource, Result};

use crate::appliance::command::{ApplianceCommand, CommandError};
use crate::appliance::event::DescriptionChangeEvent;

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    /// Transport open, waiting for `ei/initialValues`
    Connected,
    /// `ci/services` requested
    ServicesRequested,
    /// Handshake complete
    Subscribed,
}

/// Outcome of one inbound frame
#[derive(Debug, Clone)]
pub struct Step {
    /// The decoded frame
    pub message: Message,
    /// Messages to send, in order
    pub replies: Vec<Message>,
    pub events: Vec<Event>,
    pub description_changes: Vec<DescriptionChangeEvent>,
    /// Set when this frame completed the handshake
    pub subscribed: bool,
}

impl Step {
    fn new(message: Message) -> Self {
        Self {
            message,
            replies: Vec::new(),
            events: Vec::new(),
            description_changes: Vec::new(),
            subscribed: false,
        }
    }
}

/// Session state of one appliance
pub struct Session {
    phase: Phase,
    session_id: u64,
    next_message_id: u64,
    versions: ServiceVersions,
    codec: MessageCodec,
    resolver: Arc<DescriptionResolver>,
    identity: DeviceIdentity,
    selected_program: Option<String>,
    programs: BTreeMap<String, bool>,
    appliance_info: Option<ApplianceInfo>,
}

impl Session {
    pub fn new(resolver: Arc<DescriptionResolver>, identity: DeviceIdentity) -> Self {
        let programs = resolver.programs();
        Self {
            phase: Phase::Disconnected,
            session_id: 0,
            next_message_id: 0,
            versions: ServiceVersions::new(),
            codec: MessageCodec::new(),
            resolver,
            identity,
            selected_program: None,
            programs,
            appliance_info: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_subscribed(&self) -> bool {
        self.phase == Phase::Subscribed
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn resolver(&self) -> &DescriptionResolver {
        &self.resolver
    }

    /// Program name last reported through `BSH.Common.Root.SelectedProgram`
    pub fn selected_program(&self) -> Option<&str> {
        self.selected_program.as_deref()
    }

    /// Program availability, updated by description changes
    pub fn programs(&self) -> &BTreeMap<String, bool> {
        &self.programs
    }

    pub fn appliance_info(&self) -> Option<&ApplianceInfo> {
        self.appliance_info.as_ref()
    }

    /// Transport opened: start waiting for the appliance to open the session
    pub fn on_open(&mut self) {
        self.phase = Phase::Connected;
        self.session_id = 0;
        self.next_message_id = 0;
        self.versions.clear();
    }

    pub fn on_close(&mut self) {
        self.phase = Phase::Disconnected;
    }

    /// Encode an outbound message
    pub fn encode(&self, message: &Message) -> Result<String> {
        self.codec.encode(message)
    }

    /// Build an outbound request with the next message id.
    ///
    /// Without an explicit version the negotiated version of the resource's
    /// service is used.
    pub fn request(
        &mut self,
        action: Action,
        resource: Resource,
        data: Option<Payload>,
        version: Option<u32>,
    ) -> Message {
        let version = version.unwrap_or_else(|| self.versions.version_for(action, &resource));
        let message_id = self.next_message_id;
        self.next_message_id += 1;

        let message = Message::new(self.session_id, message_id, resource, version, action);
        match data {
            Some(data) => message.with_data(data),
            None => message,
        }
    }

    /// Turn a user command into an outbound message
    pub fn command(&mut self, command: &ApplianceCommand) -> std::result::Result<Message, CommandError> {
        if !self.is_subscribed() {
            return Err(CommandError::NotReady);
        }
        let request = command.resolve(&self.resolver, self.selected_program.as_deref())?;
        Ok(self.request(request.action, request.resource, request.data, request.version))
    }

    /// Process one inbound text frame
    pub fn handle_frame(&mut self, text: &str) -> Result<Step> {
        let message = self.codec.decode(text)?;
        let mut step = Step::new(message);

        if let Some(code) = step.message.code {
            debug!(
                "Appliance answered {} {} with code {}",
                step.message.action, step.message.resource, code
            );
            return Ok(step);
        }

        let resource = step.message.resource.clone();
        let action = step.message.action;

        if resource == EI_INITIAL_VALUES && action == Action::Post {
            self.open_session(&mut step);
        } else if resource == CI_SERVICES && matches!(action, Action::Response | Action::Notify) {
            self.services_received(&mut step);
        } else if resource == CI_INFO || resource == IZ_INFO {
            if let Some(Payload::ApplianceInfo(info)) = &step.message.data {
                if let Some(info) = info.first() {
                    info!(
                        "Appliance {} {} (software {})",
                        info.brand.as_deref().unwrap_or("unknown"),
                        info.e_number.as_deref().unwrap_or("?"),
                        info.sw_version.as_deref().unwrap_or("?")
                    );
                    self.appliance_info = Some(info.clone());
                }
            }
        } else if resource == RO_VALUES || resource == RO_ALL_MANDATORY_VALUES {
            self.values_received(&mut step);
        } else if resource == RO_DESCRIPTION_CHANGE || resource == RO_ALL_DESCRIPTION_CHANGES {
            self.description_changes_received(&mut step);
        } else if resource == CI_AUTHENTICATION || resource == CI_TZ_INFO || resource == NI_INFO {
            trace!("{} acknowledged", resource);
        } else {
            match action {
                Action::Post => warn!("Unhandled POST {}", resource),
                Action::Get => trace!("Ignoring GET {} from appliance", resource),
                _ => debug!("Ignoring {} {}", action, resource),
            }
        }

        Ok(step)
    }

    fn open_session(&mut self, step: &mut Step) {
        let first_id = match &step.message.data {
            Some(Payload::InitialValues(values)) => values.first().map(|v| v.message_id),
            _ => None,
        };
        let Some(first_id) = first_id else {
            warn!("ei/initialValues without a message id");
            return;
        };

        self.session_id = step.message.session_id;
        self.next_message_id = first_id;
        self.versions.clear();
        debug!("Session {} opened, first message id {}", self.session_id, first_id);

        let reply = Message::new(
            self.session_id,
            step.message.message_id,
            EI_INITIAL_VALUES,
            step.message.version,
            Action::Response,
        )
        .with_data(Payload::DeviceInfo(vec![DeviceInfo {
            device_type: CLIENT_DEVICE_TYPE.to_string(),
            device_name: self.identity.device_name.clone(),
            device_id: self.identity.device_id.clone(),
        }]));
        step.replies.push(reply);
        step.replies.push(self.request(Action::Get, CI_SERVICES, None, None));
        self.phase = Phase::ServicesRequested;
    }

    fn services_received(&mut self, step: &mut Step) {
        let services = match &step.message.data {
            Some(Payload::ServiceDescriptor(services)) => services.clone(),
            _ => {
                warn!("ci/services without service list");
                return;
            }
        };
        debug!(
            "Services: {}",
            services
                .iter()
                .map(|s| format!("{}@{}", s.service, s.version))
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.versions.replace(services);

        if self.phase != Phase::ServicesRequested {
            return;
        }

        let nonce = AuthenticationNonce { nonce: new_nonce() };
        let mut requests = vec![
            (Action::Get, CI_AUTHENTICATION, Some(Payload::Authentication(vec![nonce]))),
            (Action::Notify, EI_DEVICE_READY, None),
        ];
        for service in self.versions.services() {
            match service.service.as_str() {
                "ci" => {
                    requests.push((Action::Get, CI_INFO, None));
                    requests.push((Action::Get, CI_TZ_INFO, None));
                }
                "iz" => requests.push((Action::Get, IZ_INFO, None)),
                "ni" => requests.push((Action::Get, NI_INFO, None)),
                _ => {}
            }
        }
        requests.push((Action::Get, RO_ALL_MANDATORY_VALUES, None));
        requests.push((Action::Get, RO_VALUES, None));
        requests.push((Action::Get, RO_ALL_DESCRIPTION_CHANGES, None));

        for (action, resource, data) in requests {
            let message = self.request(action, resource, data, None);
            step.replies.push(message);
        }

        self.phase = Phase::Subscribed;
        step.subscribed = true;
        info!("Subscribed to appliance (session {})", self.session_id);
    }

    fn values_received(&mut self, step: &mut Step) {
        let values = match &step.message.data {
            Some(Payload::FeatureUpdate(values)) => values,
            Some(_) => {
                debug!("Unexpected payload on {}", step.message.resource);
                return;
            }
            None => return,
        };
        if !self.is_subscribed() {
            trace!("{} values received during {:?}", values.len(), self.phase);
        }

        for value in values {
            let event = self.resolver.resolve_event(value.uid, &value.value);
            if event.name == keys::SELECTED_PROGRAM {
                self.selected_program = match &event.value {
                    EventValue::Text(name) => Some(name.clone()),
                    _ => None,
                };
            }
            step.events.push(event);
        }
    }

    fn description_changes_received(&mut self, step: &mut Step) {
        let changes = match &step.message.data {
            Some(Payload::DescriptionChange(changes)) => changes,
            Some(_) => {
                debug!("Unexpected payload on {}", step.message.resource);
                return;
            }
            None => return,
        };
        if !self.is_subscribed() {
            trace!("{} description changes received during {:?}", changes.len(), self.phase);
        }

        for change in changes {
            let event = self.describe(change);
            if let Some(available) = change.available {
                if self.resolver.is_program(change.uid) {
                    self.programs.insert(event.name.clone(), available);
                }
            }
            step.description_changes.push(event);
        }
    }

    fn describe(&self, change: &DescriptionChange) -> DescriptionChangeEvent {
        DescriptionChangeEvent {
            uid: change.uid,
            name: self.resolver.uid_to_name(change.uid),
            parent_uid: change.parent_uid,
            available: change.available,
            access: change.access,
            min: change.min,
            max: change.max,
            step_size: change.step_size,
            default_value: change.default_value.clone(),
            enum_type: change.enum_type,
        }
    }
}

fn new_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

//! # Device management sessions
//!
//! LwM2M-like sessions against a cloud platform (OneNET), riding on the same command/URC transport as connections.
//! Requests which complete asynchronously (open, update, acknowledged notify) arm a pending operation on the session
//! scope before the command is issued. The module reports completion by an event carrying an event code and, for
//! acknowledged notifications, the echoed ack id. A mismatching ack id fails the request, since the event can not be
//! told apart from the answer to an earlier request.
//!
//! Events nobody waits for (e.g. read, write or observe requests of the platform) are passed to the
//! [MgmtListener] of the module.
use crate::capability::MgmtOps;
use crate::correlation::{CorrelationKey, EventKind, Outcome, PendingOperation};
use crate::error::Error;
use crate::module::Module;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::Write;
use heapless::String;
use log::{debug, error};

/// Session reference assigned by the module
pub type SessionRef = u8;

/// Receiver of unsolicited management events
pub type MgmtListener = Arc<dyn Fn(&MgmtEvent) + Send + Sync>;

pub const EVENT_BOOTSTRAP_START: u16 = 1;
pub const EVENT_BOOTSTRAP_SUCCESS: u16 = 2;
pub const EVENT_BOOTSTRAP_FAILED: u16 = 3;
pub const EVENT_CONNECT_SUCCESS: u16 = 4;
pub const EVENT_CONNECT_FAILED: u16 = 5;
pub const EVENT_REG_SUCCESS: u16 = 6;
pub const EVENT_REG_FAILED: u16 = 7;
pub const EVENT_REG_TIMEOUT: u16 = 8;
pub const EVENT_LIFETIME_TIMEOUT: u16 = 9;
pub const EVENT_STATUS_HALT: u16 = 10;
pub const EVENT_UPDATE_SUCCESS: u16 = 11;
pub const EVENT_UPDATE_FAILED: u16 = 12;
pub const EVENT_UPDATE_TIMEOUT: u16 = 13;
pub const EVENT_UPDATE_NEED: u16 = 14;
pub const EVENT_DEREG_DONE: u16 = 15;
pub const EVENT_RESPONSE_FAILED: u16 = 20;
pub const EVENT_RESPONSE_SUCCESS: u16 = 21;
pub const EVENT_NOTIFY_FAILED: u16 = 25;
pub const EVENT_NOTIFY_SUCCESS: u16 = 26;

/// Maps an event code to the awaited event kind and whether it reports success
pub(crate) fn classify_event(code: u16) -> Option<(EventKind, bool)> {
    match code {
        EVENT_REG_SUCCESS => Some((EventKind::Register, true)),
        EVENT_REG_FAILED | EVENT_REG_TIMEOUT => Some((EventKind::Register, false)),
        EVENT_UPDATE_SUCCESS => Some((EventKind::Update, true)),
        EVENT_UPDATE_FAILED | EVENT_UPDATE_TIMEOUT => Some((EventKind::Update, false)),
        EVENT_NOTIFY_SUCCESS => Some((EventKind::Notify, true)),
        EVENT_NOTIFY_FAILED => Some((EventKind::Notify, false)),
        _ => None,
    }
}

/// Platform connection settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MgmtConfig {
    /// true: bootstrap server, false: direct access to the platform
    pub bootstrap: bool,

    /// Server IP or hostname
    pub server: String<40>,

    pub port: u16,
}

/// Object registered for a session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectSpec {
    pub object_id: u32,
    pub instance_count: u8,

    /// One character per instance, '1' = instance available, e.g. "1101"
    pub instance_bitmap: String<16>,

    pub attribute_count: u8,
    pub action_count: u8,
}

/// Answer to a discover request of the platform
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoverResponse {
    pub message_id: u32,
    pub result: u8,

    /// Resource ids separated by ';', e.g. "5700;5701"
    pub resources: String<128>,
}

/// Notification settings of received data
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NmiConfig {
    /// Indication of new messages
    pub nnmi: u8,

    /// Indication of sent messages
    pub nsmi: u8,
}

/// Resource value
#[derive(Clone, Debug, PartialEq)]
pub enum MgmtValue {
    Text(String<128>),
    Opaque(Vec<u8>),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl MgmtValue {
    /// Value type code of the platform
    pub fn type_code(&self) -> u8 {
        match self {
            MgmtValue::Text(_) => 1,
            MgmtValue::Opaque(_) => 2,
            MgmtValue::Integer(_) => 3,
            MgmtValue::Float(_) => 4,
            MgmtValue::Boolean(_) => 5,
        }
    }

    /// Encoded length as announced in requests
    pub fn length(&self) -> usize {
        match self {
            MgmtValue::Text(text) => text.len(),
            MgmtValue::Opaque(data) => data.len(),
            MgmtValue::Integer(_) => 8,
            MgmtValue::Float(_) => 8,
            MgmtValue::Boolean(_) => 1,
        }
    }

    /// Writes the textual representation, strings quoted and opaque data hex encoded
    pub fn write_to(&self, out: &mut impl Write) -> core::fmt::Result {
        match self {
            MgmtValue::Text(text) => write!(out, "\"{}\"", text),
            MgmtValue::Opaque(data) => {
                out.write_char('"')?;
                for byte in data {
                    let hex = base16::encode_byte_u(*byte);
                    out.write_char(hex[0] as char)?;
                    out.write_char(hex[1] as char)?;
                }
                out.write_char('"')
            }
            MgmtValue::Integer(value) => write!(out, "{}", value),
            MgmtValue::Float(value) => write!(out, "{}", value),
            MgmtValue::Boolean(value) => write!(out, "{}", *value as u8),
        }
    }
}

/// Resource notification (report) of a session
#[derive(Clone, Debug, PartialEq)]
pub struct NotifyRequest {
    pub message_id: u32,
    pub object_id: u32,
    pub instance_id: u32,
    pub resource_id: u32,
    pub value: MgmtValue,

    /// Index of this notification within a multi resource report, counting down to 0
    pub index: u16,

    pub flag: u8,

    /// Requests an acknowledgement of the platform with the given ack id
    pub ack_id: Option<u16>,
}

/// Write request of the platform
#[derive(Clone, Debug, PartialEq)]
pub struct WriteRequest {
    pub reference: SessionRef,
    pub message_id: u32,
    pub object_id: u32,
    pub instance_id: u32,
    pub resource_id: u32,
    pub value_type: u8,

    /// Raw value, opaque values are hex decoded
    pub value: Vec<u8>,
}

/// Management related URC
#[derive(Clone, Debug, PartialEq)]
pub enum MgmtEvent {
    /// Status event, e.g. register success or notify ack
    Event {
        reference: SessionRef,
        code: u16,
        message_id: Option<u32>,
    },
    Read {
        reference: SessionRef,
        message_id: u32,
        object_id: u32,
        instance_id: i32,
        resource_id: i32,
    },
    Write(WriteRequest),
    Observe {
        reference: SessionRef,
        message_id: u32,
        observe: bool,
        object_id: u32,
        instance_id: i32,
        resource_id: i32,
    },
    Discover {
        reference: SessionRef,
        message_id: u32,
        object_id: u32,
    },
}

/// Device management session of a module
pub struct Session<'m> {
    module: &'m Module,
    reference: SessionRef,
}

impl Module {
    fn mgmt_ops(&self) -> Result<&'static dyn MgmtOps, Error> {
        self.capabilities().mgmt.ok_or(Error::NotSupported)
    }

    /// Sets the receiver of unsolicited management events
    pub fn set_mgmt_listener(&self, listener: Option<MgmtListener>) {
        self.mgmt_listener.lock(|current| *current.borrow_mut() = listener);
    }

    pub async fn mgmt_set_config(&self, config: &MgmtConfig) -> Result<(), Error> {
        let ops = self.mgmt_ops()?;
        ops.set_config(&mut **self.transport.lock().await, config).await
    }

    pub async fn mgmt_get_config(&self) -> Result<MgmtConfig, Error> {
        let ops = self.mgmt_ops()?;
        ops.get_config(&mut **self.transport.lock().await).await
    }

    /// Creates a new session
    pub async fn create_session(&self) -> Result<Session<'_>, Error> {
        let ops = self.mgmt_ops()?;
        let reference = ops.create(&mut **self.transport.lock().await).await?;
        debug!("[{}] Management session {} created", self.name(), reference);

        Ok(Session {
            module: self,
            reference,
        })
    }

    /// Attaches to an existing session
    pub fn session(&self, reference: SessionRef) -> Session<'_> {
        Session {
            module: self,
            reference,
        }
    }

    /// Routes a management event to its pending operation or the listener
    pub(crate) fn dispatch_management(&self, event: MgmtEvent) {
        if let MgmtEvent::Event {
            reference,
            code,
            message_id,
        } = event
        {
            if let Some((kind, _)) = classify_event(code) {
                let key = CorrelationKey::session(reference, kind);
                if self.correlator.complete(key, Outcome::Management { code, message_id }) {
                    return;
                }
            }
        }

        let listener = self.mgmt_listener.lock(|listener| listener.borrow().clone());
        match listener {
            Some(listener) => listener(&event),
            None => debug!("[{}] Unhandled management event {:?}", self.name(), event),
        }
    }
}

impl Session<'_> {
    pub fn reference(&self) -> SessionRef {
        self.reference
    }

    pub async fn delete(self) -> Result<(), Error> {
        let ops = self.module.mgmt_ops()?;
        ops.delete(&mut **self.module.transport.lock().await, self.reference).await
    }

    pub async fn add_object(&self, object: &ObjectSpec) -> Result<(), Error> {
        let ops = self.module.mgmt_ops()?;
        ops.add_object(&mut **self.module.transport.lock().await, self.reference, object).await
    }

    pub async fn discover_response(&self, response: &DiscoverResponse) -> Result<(), Error> {
        let ops = self.module.mgmt_ops()?;
        ops.discover_response(&mut **self.module.transport.lock().await, self.reference, response)
            .await
    }

    pub async fn set_nmi(&self, nmi: NmiConfig) -> Result<(), Error> {
        let ops = self.module.mgmt_ops()?;
        ops.set_nmi(&mut **self.module.transport.lock().await, self.reference, nmi).await
    }

    pub async fn get_nmi(&self) -> Result<NmiConfig, Error> {
        let ops = self.module.mgmt_ops()?;
        ops.get_nmi(&mut **self.module.transport.lock().await).await
    }

    /// Registers at the platform and waits for the register result
    pub async fn open(&self, lifetime: u32, timeout_s: u16) -> Result<(), Error> {
        let ops = self.module.mgmt_ops()?;
        let mut transport = self.module.transport.lock().await;

        let pending = self.arm(EventKind::Register);
        ops.open(&mut **transport, self.reference, lifetime, timeout_s).await?;
        self.await_event(pending, None).await
    }

    /// Reports a resource value. With an ack id, waits for the acknowledgement echoing the same id.
    pub async fn notify(&self, request: &NotifyRequest) -> Result<(), Error> {
        let ops = self.module.mgmt_ops()?;
        let mut transport = self.module.transport.lock().await;

        let pending = request.ack_id.map(|_| self.arm(EventKind::Notify));
        ops.notify(&mut **transport, self.reference, request).await?;

        match pending {
            Some(pending) => self.await_event(pending, request.ack_id.map(u32::from)).await,
            None => Ok(()),
        }
    }

    /// Refreshes the registration and waits for the update result
    pub async fn update(&self, lifetime: u32, with_objects: bool) -> Result<(), Error> {
        let ops = self.module.mgmt_ops()?;
        let mut transport = self.module.transport.lock().await;

        let pending = self.arm(EventKind::Update);
        ops.update(&mut **transport, self.reference, lifetime, with_objects).await?;
        self.await_event(pending, None).await
    }

    /// Reads a pending write request of the platform
    pub async fn get_write(&self) -> Result<WriteRequest, Error> {
        let ops = self.module.mgmt_ops()?;
        ops.get_write(&mut **self.module.transport.lock().await, self.reference).await
    }

    pub async fn write_response(&self, message_id: u32, result: u8) -> Result<(), Error> {
        let ops = self.module.mgmt_ops()?;
        ops.write_response(&mut **self.module.transport.lock().await, self.reference, message_id, result)
            .await
    }

    fn arm(&self, kind: EventKind) -> PendingOperation<'_> {
        self.module.correlator.arm(CorrelationKey::session(self.reference, kind))
    }

    async fn await_event(&self, pending: PendingOperation<'_>, expected_id: Option<u32>) -> Result<(), Error> {
        let outcome = pending.wait(self.module.config.management_timeout).await?;

        let Outcome::Management { code, message_id } = outcome else {
            return Err(Error::InvalidResponse);
        };

        if let Some(expected) = expected_id {
            if message_id != Some(expected) {
                error!(
                    "[{}] Session {} expected ack id {}, received {:?}",
                    self.module.name(),
                    self.reference,
                    expected,
                    message_id
                );
                return Err(Error::MessageIdMismatch);
            }
        }

        match classify_event(code) {
            Some((_, true)) => Ok(()),
            _ => Err(Error::ManagementEvent(code)),
        }
    }
}

//! # Unsolicited result codes
//!
//! Vendor drivers decode their URC lines into the vendor independent [Urc] type. The module then updates connection
//! state, completes pending operations or queues received payloads.
//!
//! Payloads announced by a URC header (e.g. "+IPD,0,5:") follow as raw bytes on the transport and must be consumed
//! before the next line can be parsed. If the payload can not be buffered it is still drained and discarded.
use crate::capability::PingResult;
use crate::correlation::{CorrelationKey, EventKind, Outcome};
use crate::mgmt::MgmtEvent;
use crate::module::Module;
use crate::netconn::ConnId;
use alloc::vec::Vec;
use core::net::IpAddr;
use embassy_time::{with_timeout, Duration};
use embedded_io_async::Read;
use log::{debug, error, warn};

/// Chunk size for draining payloads which are not buffered
pub const DRAIN_CHUNK_SIZE: usize = 8;

/// Link state changes
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// WIFi connection state changed to to connected
    WifiConnected,
    /// Wifi connection state changed to disconnected
    WifiDisconnected,
    /// Received an IP from the access point
    ReceivedIp,
    /// PDP context got deactivated by the network
    ContextDeactivated(u8),
}

/// Decoded URC
#[derive(Clone, Debug, PartialEq)]
pub enum Urc {
    /// Modem is ready for receiving AT commands
    Ready,
    Link(LinkEvent),
    /// Result of an open command, some dialects omit the connection id
    ConnectResult { id: Option<ConnId>, success: bool },
    /// Result of a send command, some dialects omit the connection id
    SendResult { id: Option<ConnId>, success: bool },
    /// Announces a raw payload of the given length following on the transport
    DataAvailable { id: ConnId, length: usize },
    /// Payload contained in the line itself
    Data { id: ConnId, payload: Vec<u8> },
    /// Connection closed by peer or module
    Closed { id: ConnId },
    /// Hostname resolution result, None on failure
    Resolved(Option<IpAddr>),
    Ping(PingResult),
    Management(MgmtEvent),
}

/// Decoder for lines matching prefix and suffix
#[derive(Clone, Copy)]
pub struct UrcHandler {
    pub prefix: &'static str,
    pub suffix: &'static str,

    /// Returns None for matching lines which carry no relevant information
    pub decode: fn(&str) -> Option<Urc>,
}

impl UrcHandler {
    pub const fn new(prefix: &'static str, suffix: &'static str, decode: fn(&str) -> Option<Urc>) -> Self {
        Self { prefix, suffix, decode }
    }

    /// True if the line (without line terminator) starts with the prefix and ends with the suffix
    pub fn matches(&self, line: &str) -> bool {
        line.len() >= self.prefix.len() + self.suffix.len()
            && line.starts_with(self.prefix)
            && line.ends_with(self.suffix)
    }
}

/// Removes the line terminator
pub(crate) fn trim_line(line: &[u8]) -> Option<&str> {
    let line = core::str::from_utf8(line).ok()?;
    Some(line.trim_end_matches(&['\r', '\n'][..]))
}

/// Parses the integer argument at the given position of a comma separated list
pub(crate) fn argument<T: core::str::FromStr>(arguments: &str, position: usize) -> Option<T> {
    arguments
        .split(',')
        .nth(position)
        .map(|argument| argument.trim().trim_matches('"'))
        .and_then(|argument| argument.parse().ok())
}

impl Module {
    /// Handles an unsolicited line routed by the transport.
    ///
    /// `raw` gives access to the bytes following the line, used for announced payloads. Returns false if no handler
    /// of this module matches the line.
    pub async fn handle_urc<R: Read>(&self, line: &[u8], raw: &mut R) -> bool {
        let Some(line) = trim_line(line) else {
            return false;
        };

        let Some(handler) = self.urc_handlers().iter().find(|handler| handler.matches(line)) else {
            return false;
        };

        match (handler.decode)(line) {
            Some(urc) => self.dispatch_urc(urc, raw).await,
            None => debug!("[{}] Ignoring URC {}", self.name(), line),
        }

        true
    }

    pub(crate) async fn dispatch_urc<R: Read>(&self, urc: Urc, raw: &mut R) {
        match urc {
            Urc::Ready => {
                self.update_link(|link| link.ready = true);
                self.correlator.complete(CorrelationKey::module(EventKind::Ready), Outcome::Success);
            }
            Urc::Link(event) => self.handle_link_event(event),
            Urc::ConnectResult { id, success } => {
                let completed = match id {
                    Some(id) => self
                        .correlator
                        .complete(CorrelationKey::connection(id, EventKind::Connect), outcome(success)),
                    None => self.correlator.complete_kind(EventKind::Connect, outcome(success)),
                };

                if !completed {
                    warn!("[{}] Discarding stale open result of connection {:?}", self.name(), id);
                }
            }
            Urc::SendResult { id, success } => {
                let completed = match id {
                    Some(id) => self
                        .correlator
                        .complete(CorrelationKey::connection(id, EventKind::Send), outcome(success)),
                    None => self.correlator.complete_kind(EventKind::Send, outcome(success)),
                };

                if !completed {
                    warn!("[{}] Discarding stale send result", self.name());
                }
            }
            Urc::DataAvailable { id, length } => {
                if let Some(payload) = self.read_payload(raw, length).await {
                    self.data_received(id, payload).await;
                }
            }
            Urc::Data { id, payload } => self.data_received(id, payload).await,
            Urc::Closed { id } => self.passively_closed(id),
            Urc::Resolved(address) => {
                let outcome = address.map(Outcome::Resolved).unwrap_or(Outcome::Failure);
                if !self.correlator.complete(CorrelationKey::module(EventKind::Dns), outcome) {
                    debug!("[{}] Discarding unrequested DNS result", self.name());
                }
            }
            Urc::Ping(result) => {
                if !self.correlator.complete(CorrelationKey::module(EventKind::Ping), Outcome::Ping(result)) {
                    debug!("[{}] Discarding unrequested ping result", self.name());
                }
            }
            Urc::Management(event) => self.dispatch_management(event),
        }
    }

    fn handle_link_event(&self, event: LinkEvent) {
        match event {
            LinkEvent::WifiConnected => self.update_link(|link| link.joined = true),
            LinkEvent::WifiDisconnected => self.update_link(|link| {
                link.joined = false;
                link.ip_assigned = false;
            }),
            LinkEvent::ReceivedIp => self.update_link(|link| link.ip_assigned = true),
            LinkEvent::ContextDeactivated(context) => {
                warn!("[{}] PDP context {} deactivated", self.name(), context)
            }
        }
    }

    /// Reads an announced payload. Payloads which can not be buffered are drained and discarded.
    async fn read_payload<R: Read>(&self, raw: &mut R, length: usize) -> Option<Vec<u8>> {
        let timeout = self.config.raw_read_timeout(length);
        let mut payload: Vec<u8> = Vec::new();

        if length > self.config.max_payload_size || payload.try_reserve_exact(length).is_err() {
            error!("[{}] No buffer for payload of {} bytes, discarding", self.name(), length);
            drain(raw, length, timeout).await;
            return None;
        }

        payload.resize(length, 0x0);
        match with_timeout(timeout, raw.read_exact(&mut payload)).await {
            Ok(Ok(())) => Some(payload),
            Ok(Err(e)) => {
                error!("[{}] Reading payload of {} bytes failed: {:?}", self.name(), length, e);
                None
            }
            Err(_) => {
                error!("[{}] Reading payload of {} bytes timed out", self.name(), length);
                None
            }
        }
    }
}

fn outcome(success: bool) -> Outcome {
    if success {
        Outcome::Success
    } else {
        Outcome::Failure
    }
}

/// Best-effort read of the given number of bytes, every read bounded by the timeout
pub(crate) async fn drain<R: Read>(raw: &mut R, length: usize, timeout: Duration) -> usize {
    let mut buffer = [0x0; DRAIN_CHUNK_SIZE];
    let mut remaining = length;

    while remaining > 0 {
        let size = remaining.min(DRAIN_CHUNK_SIZE);
        match with_timeout(timeout, raw.read(&mut buffer[..size])).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
            Ok(Ok(read)) => remaining -= read.min(remaining),
        }
    }

    length - remaining
}

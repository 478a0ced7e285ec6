//! # Capability tables
//!
//! One trait per functional domain. A vendor driver provides a static instance for every domain it supports and
//! leaves the others empty in [Capabilities]. Every method has a default returning [Error::NotSupported], so a
//! vendor only implements the operations its command dialect offers.
//!
//! Capability methods are the vendor half of an operation: they issue commands on the transport handed in by the
//! module while the module holds its command lock. Waiting for asynchronous completion events is done by the module,
//! a method returns [Completion::Pending] if the result arrives as URC.
use crate::error::Error;
use crate::mgmt::{DiscoverResponse, MgmtConfig, NmiConfig, NotifyRequest, ObjectSpec, SessionRef, WriteRequest};
use crate::netconn::{ConnId, ConnType};
use crate::transport::Transport;
use crate::urc::UrcHandler;
use alloc::boxed::Box;
use async_trait::async_trait;
use core::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use embassy_time::Duration;
use heapless::String;

/// Result of a vendor operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion<T> {
    /// Command response already contained the result
    Done(T),

    /// Result arrives later as URC
    Pending,
}

/// Functional domains of a module
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Domain {
    General,
    NetworkService,
    NetworkConnection,
    Wifi,
    DeviceManagement,
}

/// Signal quality as reported by +CSQ
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SignalQuality {
    /// Received signal strength indication, 0-31, 99 = unknown
    pub rssi: u8,

    /// Channel bit error rate, 0-7, 99 = unknown
    pub ber: u8,
}

/// Network registration state (+CREG/+CEREG)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationState {
    NotRegistered,
    RegisteredHome,
    Searching,
    Denied,
    Unknown,
    RegisteredRoaming,
}

impl RegistrationState {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::NotRegistered,
            1 => Self::RegisteredHome,
            2 => Self::Searching,
            3 => Self::Denied,
            5 => Self::RegisteredRoaming,
            _ => Self::Unknown,
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, Self::RegisteredHome | Self::RegisteredRoaming)
    }
}

/// Registration URC mode and current state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Registration {
    pub mode: u8,
    pub state: RegistrationState,
}

/// PDP context activation state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextState {
    pub cid: u8,
    pub active: bool,
}

/// Echo reply of a ping
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PingReply {
    /// Address of the replying host
    pub address: IpAddr,

    /// Payload length of the reply
    pub length: u16,

    pub ttl: u16,

    /// Round trip time in milliseconds
    pub time_ms: u32,
}

/// Outcome of a ping reported by the module
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PingResult {
    Reply(PingReply),

    /// No reply within the ping timeout
    Expired,

    /// Module reported the given error code
    Failed(u16),
}

/// Current WIFI connection state
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct JoinState {
    /// True if connected to an WIFI access point
    pub connected: bool,

    /// True if an IP was assigned by DHCP
    pub ip_assigned: bool,
}

/// Local IP and MAC addresses
#[derive(Default, Clone, Debug, PartialEq)]
pub struct LocalAddress {
    /// Local IPv4 address if assigned
    pub ipv4: Option<Ipv4Addr>,

    /// Local MAC address
    pub mac: Option<String<17>>,

    /// Link local IPv6 address if assigned
    pub ipv6_link_local: Option<Ipv6Addr>,

    /// Global IPv6 address if assigned
    pub ipv6_global: Option<Ipv6Addr>,
}

/// Basic module information and control
#[async_trait]
pub trait GeneralOps: Send + Sync {
    async fn at_test(&self, _transport: &mut dyn Transport) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    async fn get_imei(&self, _transport: &mut dyn Transport) -> Result<String<20>, Error> {
        Err(Error::NotSupported)
    }

    async fn get_imsi(&self, _transport: &mut dyn Transport) -> Result<String<20>, Error> {
        Err(Error::NotSupported)
    }

    async fn get_iccid(&self, _transport: &mut dyn Transport) -> Result<String<24>, Error> {
        Err(Error::NotSupported)
    }

    async fn get_cfun(&self, _transport: &mut dyn Transport) -> Result<u8, Error> {
        Err(Error::NotSupported)
    }

    async fn set_cfun(&self, _transport: &mut dyn Transport, _level: u8) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    /// Restarts the module. [Completion::Pending] if readiness gets signaled by URC.
    async fn soft_reset(&self, _transport: &mut dyn Transport) -> Result<Completion<()>, Error> {
        Err(Error::NotSupported)
    }

    async fn get_firmware_version(&self, _transport: &mut dyn Transport) -> Result<String<64>, Error> {
        Err(Error::NotSupported)
    }
}

/// Network service (attach, registration, PDP context, signal)
#[async_trait]
pub trait NetServOps: Send + Sync {
    async fn set_attach(&self, _transport: &mut dyn Transport, _attach: bool) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    async fn get_attach(&self, _transport: &mut dyn Transport) -> Result<bool, Error> {
        Err(Error::NotSupported)
    }

    async fn set_reg(&self, _transport: &mut dyn Transport, _mode: u8) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    async fn get_reg(&self, _transport: &mut dyn Transport) -> Result<Registration, Error> {
        Err(Error::NotSupported)
    }

    async fn set_cgact(&self, _transport: &mut dyn Transport, _cid: u8, _active: bool) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    async fn get_cgact(&self, _transport: &mut dyn Transport) -> Result<ContextState, Error> {
        Err(Error::NotSupported)
    }

    async fn get_csq(&self, _transport: &mut dyn Transport) -> Result<SignalQuality, Error> {
        Err(Error::NotSupported)
    }

    async fn get_ipaddr(&self, _transport: &mut dyn Transport) -> Result<IpAddr, Error> {
        Err(Error::NotSupported)
    }

    /// Sends a single echo request. [Completion::Pending] if the reply arrives as URC.
    async fn ping(
        &self,
        _transport: &mut dyn Transport,
        _host: &str,
        _length: u16,
        _timeout: Duration,
    ) -> Result<Completion<PingReply>, Error> {
        Err(Error::NotSupported)
    }
}

/// Logical TCP/UDP connections
#[async_trait]
pub trait NetConnOps: Send + Sync {
    /// Size of the connection pool, ids are 0..count
    fn connection_count(&self) -> usize;

    /// Max. payload size of a single send command
    fn max_fragment_size(&self, kind: ConnType) -> usize;

    /// Checks whether the module itself still considers the id in use
    async fn is_occupied(&self, _transport: &mut dyn Transport, _id: ConnId) -> Result<bool, Error> {
        Ok(false)
    }

    async fn open(
        &self,
        _transport: &mut dyn Transport,
        _id: ConnId,
        _kind: ConnType,
        _remote: SocketAddr,
    ) -> Result<Completion<()>, Error> {
        Err(Error::NotSupported)
    }

    /// Sends one fragment, at most [NetConnOps::max_fragment_size] bytes. Done carries the confirmed byte count.
    async fn send(
        &self,
        _transport: &mut dyn Transport,
        _id: ConnId,
        _kind: ConnType,
        _remote: SocketAddr,
        _data: &[u8],
    ) -> Result<Completion<usize>, Error> {
        Err(Error::NotSupported)
    }

    async fn close(&self, _transport: &mut dyn Transport, _id: ConnId) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    async fn resolve(&self, _transport: &mut dyn Transport, _host: &str) -> Result<Completion<IpAddr>, Error> {
        Err(Error::NotSupported)
    }
}

/// WIFI station
#[async_trait]
pub trait WifiOps: Send + Sync {
    /// Configures station mode and connects to the access point. The join state follows by URC.
    async fn join(&self, _transport: &mut dyn Transport, _ssid: &str, _key: &str) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    async fn get_address(&self, _transport: &mut dyn Transport) -> Result<LocalAddress, Error> {
        Err(Error::NotSupported)
    }

    /// Enables/Disables joining the stored access point on power up
    async fn set_auto_connect(&self, _transport: &mut dyn Transport, _enabled: bool) -> Result<(), Error> {
        Err(Error::NotSupported)
    }
}

/// LwM2M-like device management sessions (OneNET)
#[async_trait]
pub trait MgmtOps: Send + Sync {
    async fn set_config(&self, _transport: &mut dyn Transport, _config: &MgmtConfig) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    async fn get_config(&self, _transport: &mut dyn Transport) -> Result<MgmtConfig, Error> {
        Err(Error::NotSupported)
    }

    async fn create(&self, _transport: &mut dyn Transport) -> Result<SessionRef, Error> {
        Err(Error::NotSupported)
    }

    async fn delete(&self, _transport: &mut dyn Transport, _reference: SessionRef) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    async fn add_object(
        &self,
        _transport: &mut dyn Transport,
        _reference: SessionRef,
        _object: &ObjectSpec,
    ) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    async fn discover_response(
        &self,
        _transport: &mut dyn Transport,
        _reference: SessionRef,
        _response: &DiscoverResponse,
    ) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    async fn set_nmi(&self, _transport: &mut dyn Transport, _reference: SessionRef, _nmi: NmiConfig) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    async fn get_nmi(&self, _transport: &mut dyn Transport) -> Result<NmiConfig, Error> {
        Err(Error::NotSupported)
    }

    /// Registers at the platform. Completion is signaled by a register event.
    async fn open(
        &self,
        _transport: &mut dyn Transport,
        _reference: SessionRef,
        _lifetime: u32,
        _timeout_s: u16,
    ) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    async fn notify(
        &self,
        _transport: &mut dyn Transport,
        _reference: SessionRef,
        _request: &NotifyRequest,
    ) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    async fn update(
        &self,
        _transport: &mut dyn Transport,
        _reference: SessionRef,
        _lifetime: u32,
        _with_objects: bool,
    ) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    /// Fetches a pending write request of the platform
    async fn get_write(&self, _transport: &mut dyn Transport, _reference: SessionRef) -> Result<WriteRequest, Error> {
        Err(Error::NotSupported)
    }

    async fn write_response(
        &self,
        _transport: &mut dyn Transport,
        _reference: SessionRef,
        _message_id: u32,
        _result: u8,
    ) -> Result<(), Error> {
        Err(Error::NotSupported)
    }
}

/// Capability tables of a module, None if the domain is not supported
#[derive(Clone, Copy, Default)]
pub struct Capabilities {
    pub general: Option<&'static dyn GeneralOps>,
    pub netserv: Option<&'static dyn NetServOps>,
    pub netconn: Option<&'static dyn NetConnOps>,
    pub wifi: Option<&'static dyn WifiOps>,
    pub mgmt: Option<&'static dyn MgmtOps>,
}

impl Capabilities {
    pub fn supports(&self, domain: Domain) -> bool {
        match domain {
            Domain::General => self.general.is_some(),
            Domain::NetworkService => self.netserv.is_some(),
            Domain::NetworkConnection => self.netconn.is_some(),
            Domain::Wifi => self.wifi.is_some(),
            Domain::DeviceManagement => self.mgmt.is_some(),
        }
    }
}

/// Vendor driver, supplies the capability tables and the URC decoders
#[async_trait]
pub trait Driver: Send + Sync {
    /// Vendor name used in logs
    fn vendor(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    fn urc_handlers(&self) -> &'static [UrcHandler];

    /// Commands issued once after creation, e.g. enabling multiple connections
    async fn init(&self, _transport: &mut dyn Transport) -> Result<(), Error> {
        Ok(())
    }
}

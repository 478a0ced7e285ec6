use crate::capability::LocalAddress;
use crate::commands::{write_parts, CommandErrorHandler};
use crate::error::Error;
use crate::netconn::{ConnId, ConnType};
use crate::responses::{arguments, find_value, lines, unquote, NoResponse};
use atat::atat_derive::{AtatCmd, AtatResp};
use atat::{Error as AtError, InternalError};
use core::fmt::Write;
use core::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use core::str::FromStr;
use heapless::{String, Vec};

/// Sets the WIFI mode
#[derive(Clone, AtatCmd)]
#[at_cmd("+CWMODE", NoResponse, timeout_ms = 1_000)]
pub struct WifiModeCommand {
    /// WIFI mode:
    ///     0: Null mode. Wi-Fi RF will be disabled.
    ///     1: Station mode.
    ///     2: SoftAP mode.
    ///     3: SoftAP+Station mode.
    #[at_arg(position = 0)]
    mode: usize,
}

impl WifiModeCommand {
    pub fn station_mode() -> Self {
        Self { mode: 1 }
    }
}

impl CommandErrorHandler for WifiModeCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

/// Command for setting the target WIFI access point parameters
#[derive(Clone, AtatCmd)]
#[at_cmd("+CWJAP", NoResponse, timeout_ms = 20_000)]
pub struct AccessPointConnectCommand {
    /// The SSID of the target access point
    #[at_arg(position = 0)]
    ssid: String<32>,

    /// The password/key of the target access point
    #[at_arg(position = 1)]
    password: String<64>,
}

impl AccessPointConnectCommand {
    pub fn new(ssid: &str, password: &str) -> Result<Self, Error> {
        Ok(Self {
            ssid: String::from_str(ssid).map_err(|_| Error::InvalidArgument)?,
            password: String::from_str(password).map_err(|_| Error::InvalidArgument)?,
        })
    }
}

impl CommandErrorHandler for AccessPointConnectCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ConnectError(error)
    }
}

/// Enables/Disables joining the stored access point on power up
#[derive(Clone, AtatCmd)]
#[at_cmd("+CWAUTOCONN", NoResponse, timeout_ms = 1_000)]
pub struct AutoConnectCommand {
    /// 0: disabled, 1: enabled
    enabled: usize,
}

impl AutoConnectCommand {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: enabled as usize,
        }
    }
}

impl CommandErrorHandler for AutoConnectCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

/// Enables/Disables multiple connections
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPMUX", NoResponse, timeout_ms = 1_000)]
pub struct SetMultipleConnectionsCommand {
    /// 0: single connection, 1: multiple connections
    mode: usize,
}

impl SetMultipleConnectionsCommand {
    /// Enables multiple connections
    pub fn multiple() -> Self {
        Self { mode: 1 }
    }
}

impl CommandErrorHandler for SetMultipleConnectionsCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

/// Establish TCP Connection or UDP Transmission
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPSTART", NoResponse, timeout_ms = 10_000, attempts = 1)]
pub struct ConnectCommand {
    /// Socket ID
    link_id: usize,

    /// Connection type, e.g. TCP, TCPv6, UDP, UDPv6
    connection_type: String<5>,

    /// Remote IPv4 or IPV6 address
    remote_host: String<39>,

    /// Remote port
    port: u16,
}

impl ConnectCommand {
    pub fn new(link_id: ConnId, kind: ConnType, remote: SocketAddr) -> Result<Self, Error> {
        let connection_type = match (kind, remote) {
            (ConnType::Tcp, SocketAddr::V4(_)) => "TCP",
            (ConnType::Tcp, SocketAddr::V6(_)) => "TCPv6",
            (ConnType::Udp, SocketAddr::V4(_)) => "UDP",
            (ConnType::Udp, SocketAddr::V6(_)) => "UDPv6",
        };

        let mut remote_host = String::new();
        write!(remote_host, "{}", remote.ip()).map_err(|_| Error::InvalidArgument)?;

        Ok(Self {
            link_id,
            connection_type: String::from_str(connection_type).map_err(|_| Error::InvalidArgument)?,
            remote_host,
            port: remote.port(),
        })
    }
}

impl CommandErrorHandler for ConnectCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ConnectError(error)
    }
}

/// Initiates the transmission of the given number of bytes, ESP-AT responds with a '>' prompt
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPSEND", NoResponse, timeout_ms = 5_000)]
pub struct TransmissionPrepareCommand {
    /// Socket ID
    link_id: usize,

    /// Number of bytes to send
    length: usize,
}

impl TransmissionPrepareCommand {
    pub fn new(link_id: ConnId, length: usize) -> Self {
        Self { link_id, length }
    }
}

impl CommandErrorHandler for TransmissionPrepareCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::SendFailed(error)
    }
}

/// Closes the given connection
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPCLOSE", NoResponse, timeout_ms = 5_000)]
pub struct CloseSocketCommand {
    /// Socket ID
    link_id: usize,
}

impl CloseSocketCommand {
    pub fn new(link_id: ConnId) -> Self {
        Self { link_id }
    }
}

impl CommandErrorHandler for CloseSocketCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::CloseError(error)
    }
}

/// Restarts the module, readiness is signaled by the "ready" URC
#[derive(Clone, AtatCmd)]
#[at_cmd("+RST", NoResponse, timeout_ms = 1_000)]
pub struct RestartCommand;

impl CommandErrorHandler for RestartCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

/// Ids of the currently linked connections
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinkStatus(pub Vec<ConnId, 8>);

impl atat::AtatResp for LinkStatus {}

/// Queries the connection status (+CIPSTATUS)
#[derive(Clone, Default)]
pub struct ConnectionStatusCommand;

impl atat::AtatCmd for ConnectionStatusCommand {
    type Response = LinkStatus;
    const MAX_LEN: usize = 16;

    fn write(&self, buffer: &mut [u8]) -> usize {
        write_parts(buffer, &[b"AT+CIPSTATUS\r\n"])
    }

    fn parse(&self, response: Result<&[u8], InternalError>) -> Result<Self::Response, AtError> {
        let body = response.map_err(|_| AtError::InvalidResponse)?;
        let mut linked = Vec::new();

        for line in lines(body) {
            let Some(value) = line.strip_prefix("+CIPSTATUS:") else {
                continue;
            };

            let id = arguments(value)
                .next()
                .and_then(|id| id.parse().ok())
                .ok_or(AtError::Parse)?;
            linked.push(id).map_err(|_| AtError::Parse)?;
        }

        Ok(LinkStatus(linked))
    }
}

impl CommandErrorHandler for ConnectionStatusCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

/// Local addresses parsed from the CIFSR response
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocalAddressResponse(pub LocalAddress);

impl atat::AtatResp for LocalAddressResponse {}

/// Queries the local IP and MAC addresses
#[derive(Clone, Default)]
pub struct ObtainLocalAddressCommand;

impl atat::AtatCmd for ObtainLocalAddressCommand {
    type Response = LocalAddressResponse;
    const MAX_LEN: usize = 16;

    fn write(&self, buffer: &mut [u8]) -> usize {
        write_parts(buffer, &[b"AT+CIFSR\r\n"])
    }

    fn parse(&self, response: Result<&[u8], InternalError>) -> Result<Self::Response, AtError> {
        let body = response.map_err(|_| AtError::InvalidResponse)?;
        let mut data = LocalAddress::default();

        for line in lines(body) {
            let Some(value) = line.strip_prefix("+CIFSR:") else {
                continue;
            };

            let Some((address_type, address)) = value.split_once(',') else {
                return Err(AtError::Parse);
            };
            let address = unquote(address.trim());

            match address_type {
                "STAIP" => data.ipv4 = Some(Ipv4Addr::from_str(address).map_err(|_| AtError::Parse)?),
                "STAIP6LL" => data.ipv6_link_local = Some(Ipv6Addr::from_str(address).map_err(|_| AtError::Parse)?),
                "STAIP6GL" => data.ipv6_global = Some(Ipv6Addr::from_str(address).map_err(|_| AtError::Parse)?),
                "STAMAC" => data.mac = Some(String::from_str(address).map_err(|_| AtError::Parse)?),
                _ => {}
            }
        }

        Ok(LocalAddressResponse(data))
    }
}

impl CommandErrorHandler for ObtainLocalAddressCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        match error {
            AtError::Parse => Error::InvalidResponse,
            error => Error::Transport(error),
        }
    }
}

/// "+CIPDOMAIN:\"<ip>\""
#[derive(Clone, Debug, AtatResp)]
pub struct ResolvedAddressResponse {
    #[at_arg(position = 0)]
    pub address: String<40>,
}

/// Resolves a hostname (+CIPDOMAIN), the answer is part of the response
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPDOMAIN", ResolvedAddressResponse, timeout_ms = 20_000)]
pub struct ResolveCommand {
    #[at_arg(position = 0)]
    host: String<64>,
}

impl ResolveCommand {
    pub fn new(host: &str) -> Result<Self, Error> {
        if host.is_empty() {
            return Err(Error::InvalidArgument);
        }

        Ok(Self {
            host: String::from_str(host).map_err(|_| Error::InvalidArgument)?,
        })
    }
}

impl CommandErrorHandler for ResolveCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ResolveError(error)
    }
}

/// AT firmware version taken from the multi-line version information
#[derive(Clone, Debug, PartialEq)]
pub struct VersionInformation(pub String<64>);

impl atat::AtatResp for VersionInformation {}

/// Queries the version information (+GMR). Only the "AT version:" line is kept.
#[derive(Clone, Default)]
pub struct VersionInformationCommand;

impl atat::AtatCmd for VersionInformationCommand {
    type Response = VersionInformation;
    const MAX_LEN: usize = 16;

    fn write(&self, buffer: &mut [u8]) -> usize {
        write_parts(buffer, &[b"AT+GMR\r\n"])
    }

    fn parse(&self, response: Result<&[u8], InternalError>) -> Result<Self::Response, AtError> {
        let body = response.map_err(|_| AtError::InvalidResponse)?;
        let version = find_value(body, "AT version:").ok_or(AtError::InvalidResponse)?;

        String::from_str(version).map(VersionInformation).map_err(|_| AtError::Parse)
    }
}

impl CommandErrorHandler for VersionInformationCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

use crate::commands::{number, write_parts, CommandErrorHandler};
use crate::error::Error;
use crate::netconn::{ConnId, ConnType};
use crate::responses::{lines, FirmwareRevisionResponse, IccidResponse, NoResponse};
use atat::atat_derive::AtatCmd;
use atat::{Error as AtError, InternalError};
use core::fmt::Write;
use core::net::SocketAddr;
use core::str::FromStr;
use heapless::String;

/// PDP context used for all connections
pub const CONTEXT_ID: u8 = 1;

/// Full functionality with reset, readiness is signaled by the "RDY" URC
#[derive(Clone, AtatCmd)]
#[at_cmd("+CFUN", NoResponse, timeout_ms = 15_000)]
pub struct RestartCommand {
    #[at_arg(position = 0)]
    fun: u8,

    #[at_arg(position = 1)]
    reset: u8,
}

impl RestartCommand {
    pub fn full_with_reset() -> Self {
        Self { fun: 1, reset: 1 }
    }
}

impl CommandErrorHandler for RestartCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

#[derive(Clone, AtatCmd)]
#[at_cmd("+QCCID", IccidResponse, timeout_ms = 1_000)]
pub struct GetIccidCommand;

impl CommandErrorHandler for GetIccidCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

#[derive(Clone, AtatCmd)]
#[at_cmd("+QGMR", FirmwareRevisionResponse, timeout_ms = 1_000)]
pub struct GetFirmwareRevisionCommand;

impl CommandErrorHandler for GetFirmwareRevisionCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

/// Result of a socket state query
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SocketOccupation(pub bool);

impl atat::AtatResp for SocketOccupation {}

/// Queries the state of a single connection, the module lists nothing for unused ids
#[derive(Clone)]
pub struct SocketStateCommand {
    connect_id: ConnId,
}

impl SocketStateCommand {
    pub fn new(connect_id: ConnId) -> Self {
        Self { connect_id }
    }
}

impl atat::AtatCmd for SocketStateCommand {
    type Response = SocketOccupation;
    const MAX_LEN: usize = 40;

    fn write(&self, buffer: &mut [u8]) -> usize {
        let mut digits = [0x0; 20];
        let id = number(self.connect_id, &mut digits);

        write_parts(buffer, &[b"AT+QISTATE=1,", id, b"\r\n"])
    }

    fn parse(&self, response: Result<&[u8], InternalError>) -> Result<Self::Response, AtError> {
        let body = response.map_err(|_| AtError::InvalidResponse)?;
        Ok(SocketOccupation(lines(body).any(|line| line.starts_with("+QISTATE:"))))
    }
}

impl CommandErrorHandler for SocketStateCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

/// Opens a socket in direct push mode, the result follows as "+QIOPEN: <id>,<err>"
#[derive(Clone, AtatCmd)]
#[at_cmd("+QIOPEN", NoResponse, timeout_ms = 5_000, attempts = 1)]
pub struct OpenSocketCommand {
    context_id: u8,
    connect_id: usize,

    /// "TCP" or "UDP"
    service_type: String<3>,

    remote_host: String<39>,
    remote_port: u16,

    /// 0: automatically assigned
    local_port: u16,

    /// 0: buffer access, 1: direct push, 2: transparent
    access_mode: u8,
}

impl OpenSocketCommand {
    pub fn new(connect_id: ConnId, kind: ConnType, remote: SocketAddr) -> Result<Self, Error> {
        let service_type = match kind {
            ConnType::Tcp => "TCP",
            ConnType::Udp => "UDP",
        };

        let mut remote_host = String::new();
        write!(remote_host, "{}", remote.ip()).map_err(|_| Error::InvalidArgument)?;

        Ok(Self {
            context_id: CONTEXT_ID,
            connect_id,
            service_type: String::from_str(service_type).map_err(|_| Error::InvalidArgument)?,
            remote_host,
            remote_port: remote.port(),
            local_port: 0,
            access_mode: 1,
        })
    }
}

impl CommandErrorHandler for OpenSocketCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ConnectError(error)
    }
}

/// Initiates sending of the given number of bytes, the module responds with a '>' prompt
#[derive(Clone, AtatCmd)]
#[at_cmd("+QISEND", NoResponse, timeout_ms = 5_000)]
pub struct SendDataCommand {
    connect_id: usize,
    length: usize,
}

impl SendDataCommand {
    pub fn new(connect_id: ConnId, length: usize) -> Self {
        Self { connect_id, length }
    }
}

impl CommandErrorHandler for SendDataCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::SendFailed(error)
    }
}

#[derive(Clone, AtatCmd)]
#[at_cmd("+QICLOSE", NoResponse, timeout_ms = 10_000)]
pub struct CloseSocketCommand {
    connect_id: usize,
}

impl CloseSocketCommand {
    pub fn new(connect_id: ConnId) -> Self {
        Self { connect_id }
    }
}

impl CommandErrorHandler for CloseSocketCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::CloseError(error)
    }
}

/// Starts resolving the hostname, the answer follows as "+QIURC: \"dnsgip\"" URCs
#[derive(Clone, AtatCmd)]
#[at_cmd("+QIDNSGIP", NoResponse, timeout_ms = 5_000)]
pub struct ResolveCommand {
    context_id: u8,
    host: String<64>,
}

impl ResolveCommand {
    pub fn new(host: &str) -> Result<Self, Error> {
        if host.is_empty() {
            return Err(Error::InvalidArgument);
        }

        Ok(Self {
            context_id: CONTEXT_ID,
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

/// Pings the host once, the reply follows as "+QPING: <result>[,...]" URC
#[derive(Clone, AtatCmd)]
#[at_cmd("+QPING", NoResponse, timeout_ms = 5_000)]
pub struct PingCommand {
    #[at_arg(position = 0)]
    context_id: u8,

    #[at_arg(position = 1)]
    host: String<64>,

    /// Max. wait for the reply in seconds, 1-255
    #[at_arg(position = 2)]
    timeout_s: u8,

    #[at_arg(position = 3)]
    count: u8,
}

impl PingCommand {
    pub fn new(host: &str, timeout_s: u32) -> Result<Self, Error> {
        let timeout_s = u8::try_from(timeout_s)
            .ok()
            .filter(|timeout| *timeout >= 1)
            .ok_or(Error::InvalidArgument)?;

        Ok(Self {
            context_id: CONTEXT_ID,
            host: String::from_str(host).map_err(|_| Error::InvalidArgument)?,
            timeout_s,
            count: 1,
        })
    }
}

impl CommandErrorHandler for PingCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

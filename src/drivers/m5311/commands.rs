use crate::capability::{PingReply, PingResult};
use crate::commands::{number, write_parts, CommandErrorHandler};
use crate::error::Error;
use crate::mgmt::{DiscoverResponse, MgmtConfig, NmiConfig, NotifyRequest, ObjectSpec, SessionRef, WriteRequest};
use crate::netconn::{ConnId, ConnType};
use crate::responses::{arguments, find_value, lines, unquote, IccidResponse, ImeiResponse, NoResponse};
use alloc::string::String as AllocString;
use alloc::vec::Vec;
use atat::atat_derive::{AtatCmd, AtatResp};
use atat::{Error as AtError, InternalError};
use core::fmt::Write;
use core::net::{IpAddr, SocketAddr};
use core::str::FromStr;
use heapless::String;

/// Opaque value type code
const OPAQUE_TYPE: u8 = 2;

/// Sets the platform access parameters
#[derive(Clone, AtatCmd)]
#[at_cmd("+MIPLCONFIG", NoResponse, timeout_ms = 1_000)]
pub struct ConfigCommand {
    /// 1: bootstrap server, 0: platform access server
    bootstrap: u8,
    server: String<40>,
    port: u16,
}

impl ConfigCommand {
    pub fn new(config: &MgmtConfig) -> Self {
        Self {
            bootstrap: config.bootstrap as u8,
            server: config.server.clone(),
            port: config.port,
        }
    }
}

impl CommandErrorHandler for ConfigCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ManagementError(error)
    }
}

/// "+MIPLCONFIG:<mode>,\"<server>\",<port>"
#[derive(Clone, Debug, AtatResp)]
pub struct MgmtConfigResponse {
    #[at_arg(position = 0)]
    pub bootstrap: u8,

    #[at_arg(position = 1)]
    pub server: String<40>,

    #[at_arg(position = 2)]
    pub port: u16,
}

impl From<MgmtConfigResponse> for MgmtConfig {
    fn from(response: MgmtConfigResponse) -> Self {
        Self {
            bootstrap: response.bootstrap == 1,
            server: response.server,
            port: response.port,
        }
    }
}

#[derive(Clone, AtatCmd)]
#[at_cmd("+MIPLCONFIG?", MgmtConfigResponse, timeout_ms = 1_000)]
pub struct GetConfigCommand;

impl CommandErrorHandler for GetConfigCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ManagementError(error)
    }
}

/// "+MIPLCREATE:<ref>"
#[derive(Clone, Debug, AtatResp)]
pub struct CreateResponse {
    #[at_arg(position = 0)]
    pub reference: SessionRef,
}

/// Creates a session and returns its reference
#[derive(Clone, AtatCmd)]
#[at_cmd("+MIPLCREATE", CreateResponse, timeout_ms = 1_000)]
pub struct CreateCommand;

impl CommandErrorHandler for CreateCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ManagementError(error)
    }
}

/// "+MIPLNMI:<ref>,<nnmi>,<nsmi>"
#[derive(Clone, Debug, AtatResp)]
pub struct NmiResponse {
    #[at_arg(position = 0)]
    pub reference: SessionRef,

    #[at_arg(position = 1)]
    pub nnmi: u8,

    #[at_arg(position = 2)]
    pub nsmi: u8,
}

impl From<NmiResponse> for NmiConfig {
    fn from(response: NmiResponse) -> Self {
        Self {
            nnmi: response.nnmi,
            nsmi: response.nsmi,
        }
    }
}

#[derive(Clone, AtatCmd)]
#[at_cmd("+MIPLNMI?", NmiResponse, timeout_ms = 1_000)]
pub struct GetNmiCommand;

impl CommandErrorHandler for GetNmiCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ManagementError(error)
    }
}

#[derive(Clone, AtatCmd)]
#[at_cmd("+MIPLDELETE", NoResponse, timeout_ms = 1_000)]
pub struct DeleteCommand {
    reference: u8,
}

impl DeleteCommand {
    pub fn new(reference: SessionRef) -> Self {
        Self { reference }
    }
}

impl CommandErrorHandler for DeleteCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ManagementError(error)
    }
}

#[derive(Clone, AtatCmd)]
#[at_cmd("+MIPLADDOBJ", NoResponse, timeout_ms = 1_000)]
pub struct AddObjectCommand {
    reference: u8,
    object_id: u32,
    instance_count: u8,
    instance_bitmap: String<16>,
    attribute_count: u8,
    action_count: u8,
}

impl AddObjectCommand {
    pub fn new(reference: SessionRef, object: &ObjectSpec) -> Self {
        Self {
            reference,
            object_id: object.object_id,
            instance_count: object.instance_count,
            instance_bitmap: object.instance_bitmap.clone(),
            attribute_count: object.attribute_count,
            action_count: object.action_count,
        }
    }
}

impl CommandErrorHandler for AddObjectCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ManagementError(error)
    }
}

#[derive(Clone, AtatCmd)]
#[at_cmd("+MIPLDISCOVERRSP", NoResponse, timeout_ms = 1_000)]
pub struct DiscoverResponseCommand {
    reference: u8,
    message_id: u32,
    result: u8,
    length: usize,
    resources: String<128>,
}

impl DiscoverResponseCommand {
    pub fn new(reference: SessionRef, response: &DiscoverResponse) -> Self {
        Self {
            reference,
            message_id: response.message_id,
            result: response.result,
            length: response.resources.len(),
            resources: response.resources.clone(),
        }
    }
}

impl CommandErrorHandler for DiscoverResponseCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ManagementError(error)
    }
}

/// Configures the indication of received and sent messages
#[derive(Clone, AtatCmd)]
#[at_cmd("+MIPLNMI", NoResponse, timeout_ms = 1_000)]
pub struct NmiCommand {
    reference: u8,
    nnmi: u8,
    nsmi: u8,
}

impl NmiCommand {
    pub fn new(reference: SessionRef, nnmi: u8, nsmi: u8) -> Self {
        Self { reference, nnmi, nsmi }
    }
}

impl CommandErrorHandler for NmiCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ManagementError(error)
    }
}

/// Registers at the platform, the result follows as "+MIPLEVENT:<ref>,6"
#[derive(Clone, AtatCmd)]
#[at_cmd("+MIPLOPEN", NoResponse, timeout_ms = 5_000)]
pub struct OpenCommand {
    reference: u8,
    lifetime: u32,
    timeout: u16,
}

impl OpenCommand {
    pub fn new(reference: SessionRef, lifetime: u32, timeout: u16) -> Self {
        Self {
            reference,
            lifetime,
            timeout,
        }
    }
}

impl CommandErrorHandler for OpenCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ManagementError(error)
    }
}

/// Refreshes the registration, the result follows as "+MIPLEVENT:<ref>,11"
#[derive(Clone, AtatCmd)]
#[at_cmd("+MIPLUPDATE", NoResponse, timeout_ms = 5_000)]
pub struct UpdateCommand {
    reference: u8,
    lifetime: u32,
    with_objects: u8,
}

impl UpdateCommand {
    pub fn new(reference: SessionRef, lifetime: u32, with_objects: bool) -> Self {
        Self {
            reference,
            lifetime,
            with_objects: with_objects as u8,
        }
    }
}

impl CommandErrorHandler for UpdateCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ManagementError(error)
    }
}

#[derive(Clone, AtatCmd)]
#[at_cmd("+MIPLWRITERSP", NoResponse, timeout_ms = 1_000)]
pub struct WriteResponseCommand {
    reference: u8,
    message_id: u32,
    result: u8,
}

impl WriteResponseCommand {
    pub fn new(reference: SessionRef, message_id: u32, result: u8) -> Self {
        Self {
            reference,
            message_id,
            result,
        }
    }
}

impl CommandErrorHandler for WriteResponseCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ManagementError(error)
    }
}

/// Reports a resource value:
/// "AT+MIPLNOTIFY=<ref>,<msgid>,<objid>,<insid>,<resid>,<type>,<len>,<value>,<index>,<flag>[,<ackid>]"
#[derive(Clone)]
pub struct NotifyCommand {
    encoded: AllocString,
}

impl NotifyCommand {
    pub fn new(reference: SessionRef, request: &NotifyRequest) -> Result<Self, Error> {
        let mut encoded = AllocString::new();
        Self::encode(&mut encoded, reference, request).map_err(|_| Error::InvalidArgument)?;

        if encoded.len() > <Self as atat::AtatCmd>::MAX_LEN {
            return Err(Error::InvalidArgument);
        }

        Ok(Self { encoded })
    }

    fn encode(out: &mut AllocString, reference: SessionRef, request: &NotifyRequest) -> core::fmt::Result {
        write!(
            out,
            "AT+MIPLNOTIFY={},{},{},{},{},{},{},",
            reference,
            request.message_id,
            request.object_id,
            request.instance_id,
            request.resource_id,
            request.value.type_code(),
            request.value.length()
        )?;
        request.value.write_to(out)?;
        write!(out, ",{},{}", request.index, request.flag)?;

        if let Some(ack_id) = request.ack_id {
            write!(out, ",{}", ack_id)?;
        }

        out.write_str("\r\n")
    }
}

impl atat::AtatCmd for NotifyCommand {
    type Response = NoResponse;
    const MAX_LEN: usize = 1024;
    const MAX_TIMEOUT_MS: u32 = 5_000;

    fn write(&self, buffer: &mut [u8]) -> usize {
        write_parts(buffer, &[self.encoded.as_bytes()])
    }

    fn parse(&self, response: Result<&[u8], InternalError>) -> Result<Self::Response, AtError> {
        response.map_err(|_| AtError::InvalidResponse)?;
        Ok(NoResponse)
    }
}

impl CommandErrorHandler for NotifyCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ManagementError(error)
    }
}

/// Write request contained in the MIPLMGR response
#[derive(Clone, Debug, PartialEq)]
pub struct WriteRequestResponse(pub WriteRequest);

impl atat::AtatResp for WriteRequestResponse {}

/// Fetches the pending write request of the session
#[derive(Clone)]
pub struct GetWriteCommand {
    reference: SessionRef,
}

impl GetWriteCommand {
    pub fn new(reference: SessionRef) -> Self {
        Self { reference }
    }
}

impl atat::AtatCmd for GetWriteCommand {
    type Response = WriteRequestResponse;
    const MAX_LEN: usize = 24;
    const MAX_TIMEOUT_MS: u32 = 5_000;

    fn write(&self, buffer: &mut [u8]) -> usize {
        let mut digits = [0x0; 20];
        let reference = number(self.reference as usize, &mut digits);

        write_parts(buffer, &[b"AT+MIPLMGR=", reference, b"\r\n"])
    }

    fn parse(&self, response: Result<&[u8], InternalError>) -> Result<Self::Response, AtError> {
        let body = response.map_err(|_| AtError::InvalidResponse)?;
        let value = find_value(body, "+MIPLWRITE:").ok_or(AtError::InvalidResponse)?;

        parse_write_request(value).map(WriteRequestResponse).ok_or(AtError::Parse)
    }
}

impl CommandErrorHandler for GetWriteCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        match error {
            AtError::Parse => Error::InvalidResponse,
            error => Error::ManagementError(error),
        }
    }
}

/// Parses "<ref>,<msgid>,<objid>,<insid>,<resid>,<type>,<len>,<value>[,<flag>,<index>]"
pub(crate) fn parse_write_request(value: &str) -> Option<WriteRequest> {
    let mut parts = value.splitn(8, ',').map(|part| part.trim());

    let reference = parts.next()?.parse().ok()?;
    let message_id = parts.next()?.parse().ok()?;
    let object_id = parts.next()?.parse().ok()?;
    let instance_id = parts.next()?.parse().ok()?;
    let resource_id = parts.next()?.parse().ok()?;
    let value_type: u8 = parts.next()?.parse().ok()?;
    let length: usize = parts.next()?.parse().ok()?;
    let raw = raw_value(parts.next()?)?;

    let value = if value_type == OPAQUE_TYPE {
        let mut decoded = alloc::vec![0x0; raw.len() / 2];
        let size = base16::decode_slice(raw, &mut decoded).ok()?;
        decoded.truncate(size.min(length));
        decoded
    } else {
        let mut bytes: Vec<u8> = raw.as_bytes().to_vec();
        bytes.truncate(length);
        bytes
    };

    Some(WriteRequest {
        reference,
        message_id,
        object_id,
        instance_id,
        resource_id,
        value_type,
        value,
    })
}

/// Extracts the value from the remaining arguments, quoted values may contain commas
fn raw_value(remaining: &str) -> Option<&str> {
    match remaining.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next(),
        None => remaining.split(',').next().map(|value| value.trim()),
    }
}

#[derive(Clone, AtatCmd)]
#[at_cmd("+CGSN", ImeiResponse, timeout_ms = 1_000)]
pub struct GetImeiCommand {
    /// 1: IMEI
    #[at_arg(position = 0)]
    snt: u8,
}

impl GetImeiCommand {
    pub fn imei() -> Self {
        Self { snt: 1 }
    }
}

impl CommandErrorHandler for GetImeiCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

#[derive(Clone, AtatCmd)]
#[at_cmd("+ICCID", IccidResponse, timeout_ms = 1_000)]
pub struct GetIccidCommand;

impl CommandErrorHandler for GetIccidCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

/// Max. payload of a single IPSEND
pub const MAX_TCP_FRAGMENT_SIZE: usize = 720;
pub const MAX_UDP_FRAGMENT_SIZE: usize = 712;

/// Automatic receive mode, inbound data is pushed hex encoded as "+IPRD: <id>,<len>,<data>"
#[derive(Clone, AtatCmd)]
#[at_cmd("+IPRCFG", NoResponse, timeout_ms = 1_000)]
pub struct ReceiveConfigCommand {
    #[at_arg(position = 0)]
    auto_receive: u8,

    #[at_arg(position = 1)]
    header: u8,

    #[at_arg(position = 2)]
    hex: u8,
}

impl ReceiveConfigCommand {
    pub fn hex_push() -> Self {
        Self {
            auto_receive: 1,
            header: 0,
            hex: 1,
        }
    }
}

impl CommandErrorHandler for ReceiveConfigCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

/// TCP results follow as "CONNECT OK" or "CONNECT FAIL" URC, UDP sockets are usable immediately
#[derive(Clone, AtatCmd)]
#[at_cmd("+IPSTART", NoResponse, timeout_ms = 5_000, attempts = 1)]
pub struct OpenSocketCommand {
    #[at_arg(position = 0)]
    connect_id: usize,

    #[at_arg(position = 1)]
    service_type: String<3>,

    #[at_arg(position = 2)]
    remote_host: String<39>,

    #[at_arg(position = 3)]
    remote_port: u16,
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
            connect_id,
            service_type: String::from_str(service_type).map_err(|_| Error::InvalidArgument)?,
            remote_host,
            remote_port: remote.port(),
        })
    }
}

impl CommandErrorHandler for OpenSocketCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ConnectError(error)
    }
}

/// Number of bytes accepted by the module
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SentLength(pub usize);

impl atat::AtatResp for SentLength {}

/// "AT+IPSEND=<id>,<len>,<hex>[,<ip>,<port>]", UDP datagrams carry the remote address
#[derive(Clone)]
pub struct SendDataCommand {
    encoded: AllocString,
}

impl SendDataCommand {
    pub fn new(connect_id: ConnId, kind: ConnType, remote: SocketAddr, data: &[u8]) -> Result<Self, Error> {
        let limit = match kind {
            ConnType::Tcp => MAX_TCP_FRAGMENT_SIZE,
            ConnType::Udp => MAX_UDP_FRAGMENT_SIZE,
        };

        if data.is_empty() || data.len() > limit {
            return Err(Error::InvalidArgument);
        }

        let mut encoded = AllocString::with_capacity(data.len() * 2 + 64);
        Self::encode(&mut encoded, connect_id, kind, remote, data).map_err(|_| Error::InvalidArgument)?;

        Ok(Self { encoded })
    }

    fn encode(
        out: &mut AllocString,
        connect_id: ConnId,
        kind: ConnType,
        remote: SocketAddr,
        data: &[u8],
    ) -> core::fmt::Result {
        write!(out, "AT+IPSEND={},{},", connect_id, data.len())?;

        for byte in data {
            let hex = base16::encode_byte_u(*byte);
            out.push(hex[0] as char);
            out.push(hex[1] as char);
        }

        if kind == ConnType::Udp {
            write!(out, ",{},{}", remote.ip(), remote.port())?;
        }

        out.write_str("\r\n")
    }
}

impl atat::AtatCmd for SendDataCommand {
    type Response = SentLength;
    const MAX_LEN: usize = 2 * MAX_TCP_FRAGMENT_SIZE + 64;
    const MAX_TIMEOUT_MS: u32 = 10_000;

    fn write(&self, buffer: &mut [u8]) -> usize {
        write_parts(buffer, &[self.encoded.as_bytes()])
    }

    /// "+IPSEND: <id>,<len>"
    fn parse(&self, response: Result<&[u8], InternalError>) -> Result<Self::Response, AtError> {
        let body = response.map_err(|_| AtError::InvalidResponse)?;
        let value = find_value(body, "+IPSEND:").ok_or(AtError::InvalidResponse)?;

        arguments(value)
            .nth(1)
            .and_then(|length| length.parse().ok())
            .map(SentLength)
            .ok_or(AtError::Parse)
    }
}

impl CommandErrorHandler for SendDataCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::SendFailed(error)
    }
}

#[derive(Clone, AtatCmd)]
#[at_cmd("+IPCLOSE", NoResponse, timeout_ms = 10_000)]
pub struct CloseSocketCommand {
    #[at_arg(position = 0)]
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

/// Resolved address, if already contained in the response
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DnsResponse(pub Option<IpAddr>);

impl atat::AtatResp for DnsResponse {}

/// Literal addresses are answered before OK, names by a "+CMDNS:<ip>" URC afterwards
#[derive(Clone)]
pub struct ResolveCommand {
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

impl atat::AtatCmd for ResolveCommand {
    type Response = DnsResponse;
    const MAX_LEN: usize = 84;
    const MAX_TIMEOUT_MS: u32 = 5_000;

    fn write(&self, buffer: &mut [u8]) -> usize {
        write_parts(buffer, &[b"AT+CMDNS=\"", self.host.as_bytes(), b"\"\r\n"])
    }

    fn parse(&self, response: Result<&[u8], InternalError>) -> Result<Self::Response, AtError> {
        let body = response.map_err(|_| AtError::InvalidResponse)?;

        match find_value(body, "+CMDNS:") {
            None => Ok(DnsResponse(None)),
            Some(value) => IpAddr::from_str(unquote(value.trim()))
                .map(|address| DnsResponse(Some(address)))
                .map_err(|_| AtError::Parse),
        }
    }
}

impl CommandErrorHandler for ResolveCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::ResolveError(error)
    }
}

/// Accepted ping payload lengths
pub const PING_LENGTH: core::ops::RangeInclusive<u16> = 8..=1400;

/// Ping result, if already contained in the response
#[derive(Clone, Debug, PartialEq)]
pub struct PingResponse(pub Option<PingResult>);

impl atat::AtatResp for PingResponse {}

/// "AT+PING=\"<host>\",<len>,<timeout_ms>,1", the result follows as "+PING:" or "+PINGERR:"
#[derive(Clone)]
pub struct PingCommand {
    host: String<64>,
    length: u16,
    timeout_ms: u32,
}

impl PingCommand {
    pub fn new(host: &str, length: u16, timeout_ms: u32) -> Result<Self, Error> {
        if host.is_empty() || !PING_LENGTH.contains(&length) {
            return Err(Error::InvalidArgument);
        }

        Ok(Self {
            host: String::from_str(host).map_err(|_| Error::InvalidArgument)?,
            length,
            timeout_ms,
        })
    }
}

impl atat::AtatCmd for PingCommand {
    type Response = PingResponse;
    const MAX_LEN: usize = 112;
    const MAX_TIMEOUT_MS: u32 = 16_000;

    fn write(&self, buffer: &mut [u8]) -> usize {
        let mut length_digits = [0x0; 20];
        let mut timeout_digits = [0x0; 20];

        write_parts(
            buffer,
            &[
                b"AT+PING=\"",
                self.host.as_bytes(),
                b"\",",
                number(self.length as usize, &mut length_digits),
                b",",
                number(self.timeout_ms as usize, &mut timeout_digits),
                b",1\r\n",
            ],
        )
    }

    fn parse(&self, response: Result<&[u8], InternalError>) -> Result<Self::Response, AtError> {
        let body = response.map_err(|_| AtError::InvalidResponse)?;
        Ok(PingResponse(lines(body).find_map(parse_ping_result)))
    }
}

impl CommandErrorHandler for PingCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

/// "+PING: <ip>,<ttl>,<time>" or "+PINGERR: <code>", a TTL of zero or below means no reply within the timeout
pub(crate) fn parse_ping_result(line: &str) -> Option<PingResult> {
    if let Some(code) = line.strip_prefix("+PINGERR:") {
        return Some(PingResult::Failed(code.trim().parse().ok()?));
    }

    let mut values = arguments(line.strip_prefix("+PING:")?);
    let address = IpAddr::from_str(values.next()?).ok()?;
    let ttl: i32 = values.next()?.parse().ok()?;
    let time_ms: u32 = values.next()?.parse().ok()?;

    if ttl <= 0 {
        return Some(PingResult::Expired);
    }

    Some(PingResult::Reply(PingReply {
        address,
        length: 0,
        ttl: u16::try_from(ttl).ok()?,
        time_ms,
    }))
}

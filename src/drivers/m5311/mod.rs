//! # China Mobile M5311
//!
//! NB-IoT module with a built-in OneNET LwM2M client. Register, update and acknowledged notify results arrive as
//! "+MIPLEVENT:<ref>,<code>[,<ackid>]" URCs; platform requests as "+MIPLREAD", "+MIPLWRITE", "+MIPLOBSERVE" and
//! "+MIPLDISCOVER".
//!
//! Connections exchange hex encoded payloads. Inbound data is pushed as "+IPRD: <id>,<len>,<hex>", TCP connect
//! results as "CONNECT OK"/"CONNECT FAIL" without connect id.
pub mod commands;

use crate::capability::{
    Capabilities, Completion, ContextState, Driver, GeneralOps, MgmtOps, NetConnOps, NetServOps, PingReply,
    PingResult, Registration, RegistrationState, SignalQuality,
};
use crate::commands::{
    send_command, AtTestCommand, AttachCommand, ContextActivationCommand, GetAttachStateCommand,
    GetContextStateCommand, GetFunctionalityCommand, GetImsiCommand, GetPdpAddressCommand,
    GetRegistrationStatusCommand, GetSignalQualityCommand, RegistrationCommand, SetFunctionalityCommand,
};
use crate::error::Error;
use crate::mgmt::{
    DiscoverResponse, MgmtConfig, MgmtEvent, NmiConfig, NotifyRequest, ObjectSpec, SessionRef, WriteRequest,
};
use crate::netconn::{ConnId, ConnType};
use crate::responses::{arguments, unquote};
use crate::transport::Transport;
use crate::urc::{argument, Urc, UrcHandler};
use alloc::boxed::Box;
use async_trait::async_trait;
use commands::{
    parse_ping_result, parse_write_request, AddObjectCommand, CloseSocketCommand, ConfigCommand, CreateCommand,
    DeleteCommand, DiscoverResponseCommand, GetConfigCommand, GetIccidCommand, GetImeiCommand, GetNmiCommand,
    GetWriteCommand, NmiCommand, NotifyCommand, OpenCommand, OpenSocketCommand, PingCommand, ReceiveConfigCommand,
    ResolveCommand, SendDataCommand, UpdateCommand, WriteResponseCommand, MAX_TCP_FRAGMENT_SIZE,
    MAX_UDP_FRAGMENT_SIZE,
};
use core::net::{IpAddr, SocketAddr};
use core::str::FromStr;
use embassy_time::Duration;
use heapless::String;
use log::{debug, warn};

/// Number of connect ids
const CONNECTION_COUNT: usize = 5;

/// PDP context of the NB-IoT attach
const CONTEXT_ID: u8 = 0;

pub(crate) static DRIVER: M5311 = M5311;

static URC_HANDLERS: [UrcHandler; 11] = [
    UrcHandler::new("+MIPLEVENT:", "", decode_event),
    UrcHandler::new("+MIPLREAD:", "", decode_read),
    UrcHandler::new("+MIPLWRITE:", "", decode_write),
    UrcHandler::new("+MIPLOBSERVE:", "", decode_observe),
    UrcHandler::new("+MIPLDISCOVER:", "", decode_discover),
    UrcHandler::new("+IPCLOSE:", "", decode_closed),
    UrcHandler::new("+IPRD:", "", decode_data),
    UrcHandler::new("CONNECT ", "", decode_connect),
    UrcHandler::new("+CMDNS:", "", decode_dns),
    UrcHandler::new("+PINGERR:", "", decode_ping),
    UrcHandler::new("+PING:", "", decode_ping),
];

pub struct M5311;

#[async_trait]
impl Driver for M5311 {
    fn vendor(&self) -> &'static str {
        "M5311"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            general: Some(&DRIVER),
            netserv: Some(&DRIVER),
            netconn: Some(&DRIVER),
            wifi: None,
            mgmt: Some(&DRIVER),
        }
    }

    fn urc_handlers(&self) -> &'static [UrcHandler] {
        &URC_HANDLERS
    }

    async fn init(&self, transport: &mut dyn Transport) -> Result<(), Error> {
        send_command(transport, &ReceiveConfigCommand::hex_push()).await?;
        Ok(())
    }
}

#[async_trait]
impl GeneralOps for M5311 {
    async fn at_test(&self, transport: &mut dyn Transport) -> Result<(), Error> {
        send_command(transport, &AtTestCommand).await?;
        Ok(())
    }

    async fn get_imei(&self, transport: &mut dyn Transport) -> Result<String<20>, Error> {
        Ok(send_command(transport, &GetImeiCommand::imei()).await?.imei)
    }

    async fn get_imsi(&self, transport: &mut dyn Transport) -> Result<String<20>, Error> {
        Ok(send_command(transport, &GetImsiCommand).await?.imsi)
    }

    async fn get_iccid(&self, transport: &mut dyn Transport) -> Result<String<24>, Error> {
        Ok(send_command(transport, &GetIccidCommand).await?.iccid)
    }

    async fn get_cfun(&self, transport: &mut dyn Transport) -> Result<u8, Error> {
        Ok(send_command(transport, &GetFunctionalityCommand).await?.fun)
    }

    async fn set_cfun(&self, transport: &mut dyn Transport, level: u8) -> Result<(), Error> {
        send_command(transport, &SetFunctionalityCommand::new(level)).await?;
        Ok(())
    }
}

#[async_trait]
impl NetServOps for M5311 {
    async fn set_attach(&self, transport: &mut dyn Transport, attach: bool) -> Result<(), Error> {
        send_command(transport, &AttachCommand::new(attach)).await?;
        Ok(())
    }

    async fn get_attach(&self, transport: &mut dyn Transport) -> Result<bool, Error> {
        Ok(send_command(transport, &GetAttachStateCommand).await?.state == 1)
    }

    async fn set_reg(&self, transport: &mut dyn Transport, mode: u8) -> Result<(), Error> {
        send_command(transport, &RegistrationCommand::new(mode)).await?;
        Ok(())
    }

    async fn get_reg(&self, transport: &mut dyn Transport) -> Result<Registration, Error> {
        let response = send_command(transport, &GetRegistrationStatusCommand).await?;

        Ok(Registration {
            mode: response.mode,
            state: RegistrationState::from_code(response.stat),
        })
    }

    async fn set_cgact(&self, transport: &mut dyn Transport, cid: u8, active: bool) -> Result<(), Error> {
        send_command(transport, &ContextActivationCommand::new(cid, active)).await?;
        Ok(())
    }

    async fn get_cgact(&self, transport: &mut dyn Transport) -> Result<ContextState, Error> {
        let response = send_command(transport, &GetContextStateCommand).await?;

        Ok(ContextState {
            cid: response.cid,
            active: response.state == 1,
        })
    }

    async fn get_csq(&self, transport: &mut dyn Transport) -> Result<SignalQuality, Error> {
        let response = send_command(transport, &GetSignalQualityCommand).await?;

        Ok(SignalQuality {
            rssi: response.rssi,
            ber: response.ber,
        })
    }

    async fn get_ipaddr(&self, transport: &mut dyn Transport) -> Result<IpAddr, Error> {
        let response = send_command(transport, &GetPdpAddressCommand::new(CONTEXT_ID)).await?;
        IpAddr::from_str(&response.address).map_err(|_| Error::InvalidResponse)
    }

    /// Payload length 8-1400 bytes. The module reports the result either before OK or as URC afterwards.
    async fn ping(
        &self,
        transport: &mut dyn Transport,
        host: &str,
        length: u16,
        timeout: Duration,
    ) -> Result<Completion<PingReply>, Error> {
        let timeout_ms = u32::try_from(timeout.as_millis()).map_err(|_| Error::InvalidArgument)?;
        let command = PingCommand::new(host, length, timeout_ms)?;
        debug!("Pinging {} with {} bytes", host, length);

        match send_command(transport, &command).await?.0 {
            None => Ok(Completion::Pending),
            Some(PingResult::Reply(reply)) => Ok(Completion::Done(PingReply { length, ..reply })),
            Some(PingResult::Expired) => Err(Error::Timeout),
            Some(PingResult::Failed(code)) => Err(Error::PingFailed(code)),
        }
    }
}

#[async_trait]
impl NetConnOps for M5311 {
    fn connection_count(&self) -> usize {
        CONNECTION_COUNT
    }

    fn max_fragment_size(&self, kind: ConnType) -> usize {
        match kind {
            ConnType::Tcp => MAX_TCP_FRAGMENT_SIZE,
            ConnType::Udp => MAX_UDP_FRAGMENT_SIZE,
        }
    }

    async fn open(
        &self,
        transport: &mut dyn Transport,
        id: ConnId,
        kind: ConnType,
        remote: SocketAddr,
    ) -> Result<Completion<()>, Error> {
        send_command(transport, &OpenSocketCommand::new(id, kind, remote)?).await?;

        match kind {
            ConnType::Tcp => Ok(Completion::Pending),
            ConnType::Udp => Ok(Completion::Done(())),
        }
    }

    async fn send(
        &self,
        transport: &mut dyn Transport,
        id: ConnId,
        kind: ConnType,
        remote: SocketAddr,
        data: &[u8],
    ) -> Result<Completion<usize>, Error> {
        let response = send_command(transport, &SendDataCommand::new(id, kind, remote, data)?).await?;
        Ok(Completion::Done(response.0))
    }

    async fn close(&self, transport: &mut dyn Transport, id: ConnId) -> Result<(), Error> {
        send_command(transport, &CloseSocketCommand::new(id)).await?;
        Ok(())
    }

    async fn resolve(&self, transport: &mut dyn Transport, host: &str) -> Result<Completion<IpAddr>, Error> {
        match send_command(transport, &ResolveCommand::new(host)?).await?.0 {
            Some(address) => Ok(Completion::Done(address)),
            None => Ok(Completion::Pending),
        }
    }
}

#[async_trait]
impl MgmtOps for M5311 {
    async fn set_config(&self, transport: &mut dyn Transport, config: &MgmtConfig) -> Result<(), Error> {
        send_command(transport, &ConfigCommand::new(config)).await?;
        Ok(())
    }

    async fn get_config(&self, transport: &mut dyn Transport) -> Result<MgmtConfig, Error> {
        Ok(send_command(transport, &GetConfigCommand).await?.into())
    }

    async fn create(&self, transport: &mut dyn Transport) -> Result<SessionRef, Error> {
        Ok(send_command(transport, &CreateCommand).await?.reference)
    }

    async fn delete(&self, transport: &mut dyn Transport, reference: SessionRef) -> Result<(), Error> {
        send_command(transport, &DeleteCommand::new(reference)).await?;
        Ok(())
    }

    async fn add_object(
        &self,
        transport: &mut dyn Transport,
        reference: SessionRef,
        object: &ObjectSpec,
    ) -> Result<(), Error> {
        send_command(transport, &AddObjectCommand::new(reference, object)).await?;
        Ok(())
    }

    async fn discover_response(
        &self,
        transport: &mut dyn Transport,
        reference: SessionRef,
        response: &DiscoverResponse,
    ) -> Result<(), Error> {
        send_command(transport, &DiscoverResponseCommand::new(reference, response)).await?;
        Ok(())
    }

    async fn set_nmi(&self, transport: &mut dyn Transport, reference: SessionRef, nmi: NmiConfig) -> Result<(), Error> {
        send_command(transport, &NmiCommand::new(reference, nmi.nnmi, nmi.nsmi)).await?;
        Ok(())
    }

    async fn get_nmi(&self, transport: &mut dyn Transport) -> Result<NmiConfig, Error> {
        Ok(send_command(transport, &GetNmiCommand).await?.into())
    }

    async fn open(
        &self,
        transport: &mut dyn Transport,
        reference: SessionRef,
        lifetime: u32,
        timeout_s: u16,
    ) -> Result<(), Error> {
        send_command(transport, &OpenCommand::new(reference, lifetime, timeout_s)).await?;
        Ok(())
    }

    async fn notify(
        &self,
        transport: &mut dyn Transport,
        reference: SessionRef,
        request: &NotifyRequest,
    ) -> Result<(), Error> {
        send_command(transport, &NotifyCommand::new(reference, request)?).await?;
        Ok(())
    }

    async fn update(
        &self,
        transport: &mut dyn Transport,
        reference: SessionRef,
        lifetime: u32,
        with_objects: bool,
    ) -> Result<(), Error> {
        send_command(transport, &UpdateCommand::new(reference, lifetime, with_objects)).await?;
        Ok(())
    }

    async fn get_write(&self, transport: &mut dyn Transport, reference: SessionRef) -> Result<WriteRequest, Error> {
        Ok(send_command(transport, &GetWriteCommand::new(reference)).await?.0)
    }

    async fn write_response(
        &self,
        transport: &mut dyn Transport,
        reference: SessionRef,
        message_id: u32,
        result: u8,
    ) -> Result<(), Error> {
        send_command(transport, &WriteResponseCommand::new(reference, message_id, result)).await?;
        Ok(())
    }
}

/// "+MIPLEVENT:<ref>,<code>[,<ackid>]"
fn decode_event(line: &str) -> Option<Urc> {
    let arguments = line.strip_prefix("+MIPLEVENT:")?;

    Some(Urc::Management(MgmtEvent::Event {
        reference: argument(arguments, 0)?,
        code: argument(arguments, 1)?,
        message_id: argument(arguments, 2),
    }))
}

/// "+MIPLREAD:<ref>,<msgid>,<objid>,<insid>,<resid>", -1 addresses all instances/resources
fn decode_read(line: &str) -> Option<Urc> {
    let arguments = line.strip_prefix("+MIPLREAD:")?;

    Some(Urc::Management(MgmtEvent::Read {
        reference: argument(arguments, 0)?,
        message_id: argument(arguments, 1)?,
        object_id: argument(arguments, 2)?,
        instance_id: argument(arguments, 3)?,
        resource_id: argument(arguments, 4)?,
    }))
}

fn decode_write(line: &str) -> Option<Urc> {
    let request = parse_write_request(line.strip_prefix("+MIPLWRITE:")?)?;
    Some(Urc::Management(MgmtEvent::Write(request)))
}

/// "+MIPLOBSERVE:<ref>,<msgid>,<flag>,<objid>,<insid>,<resid>"
fn decode_observe(line: &str) -> Option<Urc> {
    let arguments = line.strip_prefix("+MIPLOBSERVE:")?;
    let flag: u8 = argument(arguments, 2)?;

    Some(Urc::Management(MgmtEvent::Observe {
        reference: argument(arguments, 0)?,
        message_id: argument(arguments, 1)?,
        observe: flag == 1,
        object_id: argument(arguments, 3)?,
        instance_id: argument(arguments, 4)?,
        resource_id: argument(arguments, 5)?,
    }))
}

/// "+MIPLDISCOVER:<ref>,<msgid>,<objid>"
fn decode_discover(line: &str) -> Option<Urc> {
    let arguments = line.strip_prefix("+MIPLDISCOVER:")?;

    Some(Urc::Management(MgmtEvent::Discover {
        reference: argument(arguments, 0)?,
        message_id: argument(arguments, 1)?,
        object_id: argument(arguments, 2)?,
    }))
}

/// "+IPCLOSE: <id>"
fn decode_closed(line: &str) -> Option<Urc> {
    let arguments = line.strip_prefix("+IPCLOSE:")?;
    Some(Urc::Closed {
        id: argument(arguments, 0)?,
    })
}

/// "+IPRD: <id>,<len>,<hex>"
fn decode_data(line: &str) -> Option<Urc> {
    let mut values = arguments(line.strip_prefix("+IPRD:")?);
    let id: ConnId = values.next()?.parse().ok()?;
    let length: usize = values.next()?.parse().ok()?;
    let hex = values.next()?;

    let mut payload = alloc::vec![0x0; hex.len() / 2];
    let size = match base16::decode_slice(hex, &mut payload) {
        Ok(size) => size,
        Err(_) => {
            warn!("Dropping undecodable data of connection {}", id);
            return None;
        }
    };

    payload.truncate(size.min(length));
    Some(Urc::Data { id, payload })
}

fn decode_connect(line: &str) -> Option<Urc> {
    match line {
        "CONNECT OK" => Some(Urc::ConnectResult { id: None, success: true }),
        "CONNECT FAIL" => Some(Urc::ConnectResult { id: None, success: false }),
        _ => None,
    }
}

/// "+CMDNS:<ip>" following the OK of a name lookup
fn decode_dns(line: &str) -> Option<Urc> {
    let value = unquote(line.strip_prefix("+CMDNS:")?.trim());
    Some(Urc::Resolved(IpAddr::from_str(value).ok()))
}

fn decode_ping(line: &str) -> Option<Urc> {
    parse_ping_result(line).map(Urc::Ping)
}

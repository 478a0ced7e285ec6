//! # Quectel EC200x
//!
//! LTE Cat 1 module with up to twelve connections on PDP context 1. Opening a connection and resolving a host are
//! asynchronous: the results arrive as "+QIOPEN: <id>,<err>" and "+QIURC: \"dnsgip\",..." URCs. Inbound data is
//! pushed as "+QIURC: \"recv\",<id>,<len>" followed by the raw payload. Ping replies arrive as "+QPING:" URCs.
pub mod commands;

use crate::capability::{
    Capabilities, Completion, ContextState, Driver, GeneralOps, NetConnOps, NetServOps, PingReply, PingResult,
    Registration, RegistrationState, SignalQuality,
};
use crate::commands::{
    send_command, send_command_expecting, AtTestCommand, AttachCommand, ContextActivationCommand,
    GetAttachStateCommand, GetContextStateCommand, GetFunctionalityCommand, GetImeiCommand, GetImsiCommand,
    GetPdpAddressCommand, GetRegistrationStatusCommand, GetSignalQualityCommand, RegistrationCommand,
    SetFunctionalityCommand,
};
use crate::error::Error;
use crate::netconn::{ConnId, ConnType};
use crate::responses::arguments;
use crate::transport::{ResponseExpectation, Transport};
use crate::urc::{argument, LinkEvent, Urc, UrcHandler};
use alloc::boxed::Box;
use async_trait::async_trait;
use commands::{
    CloseSocketCommand, GetFirmwareRevisionCommand, GetIccidCommand, OpenSocketCommand, PingCommand, ResolveCommand,
    RestartCommand, SendDataCommand, SocketStateCommand, CONTEXT_ID,
};
use core::net::{IpAddr, SocketAddr};
use core::str::FromStr;
use embassy_time::Duration;
use heapless::String;
use log::debug;

/// Number of connect ids
const CONNECTION_COUNT: usize = 12;

/// Max. length of a single QISEND
const MAX_FRAGMENT_SIZE: usize = 1460;

/// Max. time waiting for the '>' prompt
const PROMPT_TIMEOUT_MS: u32 = 5_000;

/// Ping error code for an expired request
const PING_TIMEOUT_CODE: u16 = 569;

pub(crate) static DRIVER: Ec200x = Ec200x;

static URC_HANDLERS: [UrcHandler; 5] = [
    UrcHandler::new("RDY", "", decode_ready),
    UrcHandler::new("+QIOPEN:", "", decode_open),
    UrcHandler::new("SEND ", "", decode_send_result),
    UrcHandler::new("+QIURC:", "", decode_notification),
    UrcHandler::new("+QPING:", "", decode_ping),
];

pub struct Ec200x;

#[async_trait]
impl Driver for Ec200x {
    fn vendor(&self) -> &'static str {
        "EC200x"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            general: Some(&DRIVER),
            netserv: Some(&DRIVER),
            netconn: Some(&DRIVER),
            wifi: None,
            mgmt: None,
        }
    }

    fn urc_handlers(&self) -> &'static [UrcHandler] {
        &URC_HANDLERS
    }
}

#[async_trait]
impl GeneralOps for Ec200x {
    async fn at_test(&self, transport: &mut dyn Transport) -> Result<(), Error> {
        send_command(transport, &AtTestCommand).await?;
        Ok(())
    }

    async fn get_imei(&self, transport: &mut dyn Transport) -> Result<String<20>, Error> {
        Ok(send_command(transport, &GetImeiCommand).await?.imei)
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

    async fn soft_reset(&self, transport: &mut dyn Transport) -> Result<Completion<()>, Error> {
        send_command(transport, &RestartCommand::full_with_reset()).await?;
        Ok(Completion::Pending)
    }

    async fn get_firmware_version(&self, transport: &mut dyn Transport) -> Result<String<64>, Error> {
        Ok(send_command(transport, &GetFirmwareRevisionCommand).await?.revision)
    }
}

#[async_trait]
impl NetServOps for Ec200x {
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

    /// The payload length is fixed by the module, the timeout is limited to 1-255 s
    async fn ping(
        &self,
        transport: &mut dyn Transport,
        host: &str,
        _length: u16,
        timeout: Duration,
    ) -> Result<Completion<PingReply>, Error> {
        let command = PingCommand::new(host, timeout.as_secs() as u32)?;
        debug!("Pinging {} with a timeout of {} s", host, timeout.as_secs());

        send_command(transport, &command).await?;
        Ok(Completion::Pending)
    }
}

#[async_trait]
impl NetConnOps for Ec200x {
    fn connection_count(&self) -> usize {
        CONNECTION_COUNT
    }

    fn max_fragment_size(&self, _kind: ConnType) -> usize {
        MAX_FRAGMENT_SIZE
    }

    async fn is_occupied(&self, transport: &mut dyn Transport, id: ConnId) -> Result<bool, Error> {
        Ok(send_command(transport, &SocketStateCommand::new(id)).await?.0)
    }

    async fn open(
        &self,
        transport: &mut dyn Transport,
        id: ConnId,
        kind: ConnType,
        remote: SocketAddr,
    ) -> Result<Completion<()>, Error> {
        send_command(transport, &OpenSocketCommand::new(id, kind, remote)?).await?;
        Ok(Completion::Pending)
    }

    async fn send(
        &self,
        transport: &mut dyn Transport,
        id: ConnId,
        _kind: ConnType,
        _remote: SocketAddr,
        data: &[u8],
    ) -> Result<Completion<usize>, Error> {
        let expect = ResponseExpectation::from_millis(PROMPT_TIMEOUT_MS).with_prompt(b'>');
        send_command_expecting(transport, &SendDataCommand::new(id, data.len()), expect).await?;

        transport.send_raw(data).await.map_err(Error::SendFailed)?;
        Ok(Completion::Pending)
    }

    async fn close(&self, transport: &mut dyn Transport, id: ConnId) -> Result<(), Error> {
        send_command(transport, &CloseSocketCommand::new(id)).await?;
        Ok(())
    }

    async fn resolve(&self, transport: &mut dyn Transport, host: &str) -> Result<Completion<IpAddr>, Error> {
        send_command(transport, &ResolveCommand::new(host)?).await?;
        Ok(Completion::Pending)
    }
}

fn decode_ready(line: &str) -> Option<Urc> {
    (line == "RDY").then_some(Urc::Ready)
}

/// "+QIOPEN: <id>,<err>", err 0 means success
fn decode_open(line: &str) -> Option<Urc> {
    let arguments = line.strip_prefix("+QIOPEN:")?;
    let error: u16 = argument(arguments, 1)?;

    Some(Urc::ConnectResult {
        id: Some(argument(arguments, 0)?),
        success: error == 0,
    })
}

fn decode_send_result(line: &str) -> Option<Urc> {
    match line {
        "SEND OK" => Some(Urc::SendResult { id: None, success: true }),
        "SEND FAIL" => Some(Urc::SendResult { id: None, success: false }),
        _ => None,
    }
}

/// "+QIURC: \"<type>\",..." notifications
fn decode_notification(line: &str) -> Option<Urc> {
    let mut values = arguments(line.strip_prefix("+QIURC:")?);

    match values.next()? {
        "closed" => Some(Urc::Closed {
            id: values.next()?.parse().ok()?,
        }),
        "recv" => Some(Urc::DataAvailable {
            id: values.next()?.parse().ok()?,
            length: values.next()?.parse().ok()?,
        }),
        "pdpdeact" => Some(Urc::Link(LinkEvent::ContextDeactivated(values.next()?.parse().ok()?))),
        "dnsgip" => decode_dns_result(values.next()?),
        _ => None,
    }
}

/// The header line "+QIURC: \"dnsgip\",<err>,<count>,<ttl>" is followed by one line per address. Only a failed
/// header and the first address complete the lookup.
fn decode_dns_result(value: &str) -> Option<Urc> {
    if let Ok(address) = IpAddr::from_str(value) {
        return Some(Urc::Resolved(Some(address)));
    }

    let error: u16 = value.parse().ok()?;
    (error != 0).then_some(Urc::Resolved(None))
}

/// "+QPING: <result>[,\"<ip>\",<bytes>,<time>,<ttl>]" per reply. The closing statistics line
/// "+QPING: 0,<sent>,<rcvd>,..." carries no address and is ignored.
fn decode_ping(line: &str) -> Option<Urc> {
    let mut values = arguments(line.strip_prefix("+QPING:")?);
    let result: u16 = values.next()?.parse().ok()?;

    match result {
        0 => {
            let address = IpAddr::from_str(values.next()?).ok()?;

            Some(Urc::Ping(PingResult::Reply(PingReply {
                address,
                length: values.next()?.parse().ok()?,
                time_ms: values.next()?.parse().ok()?,
                ttl: values.next()?.parse().ok()?,
            })))
        }
        PING_TIMEOUT_CODE => Some(Urc::Ping(PingResult::Expired)),
        code => Some(Urc::Ping(PingResult::Failed(code))),
    }
}

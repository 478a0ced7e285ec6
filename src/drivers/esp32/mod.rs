//! # ESP32 (ESP-AT firmware)
//!
//! WIFI station with up to five simultaneous connections (link ids 0-4). Opening a connection and resolving hosts
//! are synchronous, the command response already contains the result. Send confirmations ("SEND OK") carry no link
//! id. Inbound data is pushed in active mode as "+IPD,<id>,<len>:" followed by the raw payload.
pub mod commands;

use crate::capability::{Capabilities, Completion, Driver, GeneralOps, LocalAddress, NetConnOps, WifiOps};
use crate::commands::{send_command, send_command_expecting, AtTestCommand};
use crate::error::Error;
use crate::netconn::{ConnId, ConnType};
use crate::transport::{ResponseExpectation, Transport};
use crate::urc::{argument, LinkEvent, Urc, UrcHandler};
use alloc::boxed::Box;
use async_trait::async_trait;
use commands::{
    AccessPointConnectCommand, AutoConnectCommand, CloseSocketCommand, ConnectCommand, ConnectionStatusCommand,
    ObtainLocalAddressCommand, ResolveCommand, RestartCommand, SetMultipleConnectionsCommand,
    TransmissionPrepareCommand, VersionInformationCommand, WifiModeCommand,
};
use atat::Error as AtError;
use core::net::{IpAddr, SocketAddr};
use core::str::FromStr;
use heapless::String;

/// Number of link ids
const CONNECTION_COUNT: usize = 5;

/// Max. length of a single CIPSEND
const MAX_FRAGMENT_SIZE: usize = 2048;

/// Max. time waiting for the '>' prompt
const PROMPT_TIMEOUT_MS: u32 = 5_000;

pub(crate) static DRIVER: Esp32 = Esp32;

static URC_HANDLERS: [UrcHandler; 7] = [
    UrcHandler::new("ready", "", decode_ready),
    UrcHandler::new("WIFI ", "", decode_wifi),
    UrcHandler::new("SEND ", "", decode_send_result),
    UrcHandler::new("+IPD,", ":", decode_data),
    UrcHandler::new("", ",CLOSED", decode_closed),
    UrcHandler::new("", ",CONNECT", ignore),
    UrcHandler::new("Recv ", " bytes", ignore),
];

pub struct Esp32;

#[async_trait]
impl Driver for Esp32 {
    fn vendor(&self) -> &'static str {
        "ESP32"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            general: Some(&DRIVER),
            netserv: None,
            netconn: Some(&DRIVER),
            wifi: Some(&DRIVER),
            mgmt: None,
        }
    }

    fn urc_handlers(&self) -> &'static [UrcHandler] {
        &URC_HANDLERS
    }

    async fn init(&self, transport: &mut dyn Transport) -> Result<(), Error> {
        send_command(transport, &SetMultipleConnectionsCommand::multiple()).await?;
        Ok(())
    }
}

#[async_trait]
impl GeneralOps for Esp32 {
    async fn at_test(&self, transport: &mut dyn Transport) -> Result<(), Error> {
        send_command(transport, &AtTestCommand).await?;
        Ok(())
    }

    async fn soft_reset(&self, transport: &mut dyn Transport) -> Result<Completion<()>, Error> {
        send_command(transport, &RestartCommand).await?;
        Ok(Completion::Pending)
    }

    async fn get_firmware_version(&self, transport: &mut dyn Transport) -> Result<String<64>, Error> {
        Ok(send_command(transport, &VersionInformationCommand).await?.0)
    }
}

#[async_trait]
impl WifiOps for Esp32 {
    async fn join(&self, transport: &mut dyn Transport, ssid: &str, key: &str) -> Result<(), Error> {
        let command = AccessPointConnectCommand::new(ssid, key)?;

        send_command(transport, &WifiModeCommand::station_mode()).await?;
        send_command(transport, &command).await?;
        Ok(())
    }

    async fn get_address(&self, transport: &mut dyn Transport) -> Result<LocalAddress, Error> {
        Ok(send_command(transport, &ObtainLocalAddressCommand).await?.0)
    }

    async fn set_auto_connect(&self, transport: &mut dyn Transport, enabled: bool) -> Result<(), Error> {
        send_command(transport, &AutoConnectCommand::new(enabled)).await?;
        Ok(())
    }
}

#[async_trait]
impl NetConnOps for Esp32 {
    fn connection_count(&self) -> usize {
        CONNECTION_COUNT
    }

    fn max_fragment_size(&self, _kind: ConnType) -> usize {
        MAX_FRAGMENT_SIZE
    }

    async fn is_occupied(&self, transport: &mut dyn Transport, id: ConnId) -> Result<bool, Error> {
        let status = send_command(transport, &ConnectionStatusCommand).await?;
        Ok(status.0.contains(&id))
    }

    async fn open(
        &self,
        transport: &mut dyn Transport,
        id: ConnId,
        kind: ConnType,
        remote: SocketAddr,
    ) -> Result<Completion<()>, Error> {
        send_command(transport, &ConnectCommand::new(id, kind, remote)?).await?;
        Ok(Completion::Done(()))
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
        send_command_expecting(transport, &TransmissionPrepareCommand::new(id, data.len()), expect).await?;

        transport.send_raw(data).await.map_err(Error::SendFailed)?;
        Ok(Completion::Pending)
    }

    async fn close(&self, transport: &mut dyn Transport, id: ConnId) -> Result<(), Error> {
        send_command(transport, &CloseSocketCommand::new(id)).await?;
        Ok(())
    }

    async fn resolve(&self, transport: &mut dyn Transport, host: &str) -> Result<Completion<IpAddr>, Error> {
        let response = send_command(transport, &ResolveCommand::new(host)?).await?;
        let address = IpAddr::from_str(&response.address).map_err(|_| Error::ResolveError(AtError::Parse))?;

        Ok(Completion::Done(address))
    }
}

fn decode_ready(line: &str) -> Option<Urc> {
    (line == "ready").then_some(Urc::Ready)
}

fn decode_wifi(line: &str) -> Option<Urc> {
    match line {
        "WIFI CONNECTED" => Some(Urc::Link(LinkEvent::WifiConnected)),
        "WIFI DISCONNECT" => Some(Urc::Link(LinkEvent::WifiDisconnected)),
        "WIFI GOT IP" => Some(Urc::Link(LinkEvent::ReceivedIp)),
        _ => None,
    }
}

fn decode_send_result(line: &str) -> Option<Urc> {
    match line {
        "SEND OK" => Some(Urc::SendResult { id: None, success: true }),
        "SEND FAIL" => Some(Urc::SendResult { id: None, success: false }),
        _ => None,
    }
}

/// "+IPD,<id>,<len>[,<remote ip>,<remote port>]:"
fn decode_data(line: &str) -> Option<Urc> {
    let arguments = line.strip_prefix("+IPD,")?.strip_suffix(':')?;

    Some(Urc::DataAvailable {
        id: argument(arguments, 0)?,
        length: argument(arguments, 1)?,
    })
}

/// "<id>,CLOSED"
fn decode_closed(line: &str) -> Option<Urc> {
    let id = line.strip_suffix(",CLOSED")?.trim().parse().ok()?;
    Some(Urc::Closed { id })
}

fn ignore(_line: &str) -> Option<Urc> {
    None
}

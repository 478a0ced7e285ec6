//! Command plumbing and the 3GPP commands shared by the cellular drivers
use crate::error::Error;
use crate::responses::{
    AttachStateResponse, ContextStateResponse, FunctionalityResponse, ImeiResponse, ImsiResponse, NoResponse,
    PdpAddressResponse, RegistrationStatusResponse, SignalQualityResponse,
};
use crate::transport::{ResponseExpectation, Transport};
use alloc::vec;
use atat::atat_derive::AtatCmd;
use atat::{AtatCmd, Error as AtError};
use numtoa::NumToA;

/// Trait for mapping command errors
pub trait CommandErrorHandler {
    type Error;

    /// Maps regular errors
    fn command_error(&self, error: AtError) -> Self::Error;
}

/// Encodes the command, executes it and parses the response
pub(crate) async fn send_command<Cmd>(transport: &mut dyn Transport, command: &Cmd) -> Result<Cmd::Response, Cmd::Error>
where
    Cmd: AtatCmd + CommandErrorHandler + Sync,
{
    let expect = ResponseExpectation::from_millis(Cmd::MAX_TIMEOUT_MS);
    send_command_expecting(transport, command, expect).await
}

/// Same as [send_command] for commands whose response shape differs from the default
pub(crate) async fn send_command_expecting<Cmd>(
    transport: &mut dyn Transport,
    command: &Cmd,
    expect: ResponseExpectation,
) -> Result<Cmd::Response, Cmd::Error>
where
    Cmd: AtatCmd + CommandErrorHandler + Sync,
{
    let mut buffer = vec![0x0; Cmd::MAX_LEN];
    let length = command.write(&mut buffer);

    let response = transport
        .execute(&buffer[..length], expect)
        .await
        .map_err(|e| command.command_error(e))?;

    command
        .parse(Ok(response.trim_ascii()))
        .map_err(|e| command.command_error(e))
}

/// Formats the number into the buffer and returns the digits
pub(crate) fn number(value: usize, buffer: &mut [u8; 20]) -> &[u8] {
    value.numtoa(10, buffer)
}

/// Copies the given parts into the buffer and returns the written length
pub(crate) fn write_parts(buffer: &mut [u8], parts: &[&[u8]]) -> usize {
    let mut length = 0;

    for part in parts {
        let end = (length + part.len()).min(buffer.len());
        buffer[length..end].copy_from_slice(&part[..end - length]);
        length = end;
    }

    length
}

/// Plain "AT", checks whether the module responds
#[derive(Clone, AtatCmd)]
#[at_cmd("", NoResponse, timeout_ms = 1_000)]
pub struct AtTestCommand;

impl CommandErrorHandler for AtTestCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

/// Product serial number (IMEI), answered by the bare value
#[derive(Clone, AtatCmd)]
#[at_cmd("+GSN", ImeiResponse, timeout_ms = 1_000)]
pub struct GetImeiCommand;

impl CommandErrorHandler for GetImeiCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

#[derive(Clone, AtatCmd)]
#[at_cmd("+CIMI", ImsiResponse, timeout_ms = 1_000)]
pub struct GetImsiCommand;

impl CommandErrorHandler for GetImsiCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

/// Sets the functionality level
#[derive(Clone, AtatCmd)]
#[at_cmd("+CFUN", NoResponse, timeout_ms = 15_000)]
pub struct SetFunctionalityCommand {
    /// 0: minimum, 1: full, 4: disabled RF
    #[at_arg(position = 0)]
    fun: u8,
}

impl SetFunctionalityCommand {
    pub fn new(fun: u8) -> Self {
        Self { fun }
    }
}

impl CommandErrorHandler for SetFunctionalityCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

#[derive(Clone, AtatCmd)]
#[at_cmd("+CFUN?", FunctionalityResponse, timeout_ms = 1_000)]
pub struct GetFunctionalityCommand;

impl CommandErrorHandler for GetFunctionalityCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

/// Attaches to/Detaches from the packet domain service
#[derive(Clone, AtatCmd)]
#[at_cmd("+CGATT", NoResponse, timeout_ms = 140_000)]
pub struct AttachCommand {
    /// 0: detached, 1: attached
    #[at_arg(position = 0)]
    state: u8,
}

impl AttachCommand {
    pub fn new(attach: bool) -> Self {
        Self { state: attach as u8 }
    }
}

impl CommandErrorHandler for AttachCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

#[derive(Clone, AtatCmd)]
#[at_cmd("+CGATT?", AttachStateResponse, timeout_ms = 1_000)]
pub struct GetAttachStateCommand;

impl CommandErrorHandler for GetAttachStateCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

/// Configures the EPS network registration URC
#[derive(Clone, AtatCmd)]
#[at_cmd("+CEREG", NoResponse, timeout_ms = 1_000)]
pub struct RegistrationCommand {
    /// 0: disabled, 1: registration state, 2: registration state and location
    #[at_arg(position = 0)]
    mode: u8,
}

impl RegistrationCommand {
    pub fn new(mode: u8) -> Self {
        Self { mode }
    }
}

impl CommandErrorHandler for RegistrationCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

#[derive(Clone, AtatCmd)]
#[at_cmd("+CEREG?", RegistrationStatusResponse, timeout_ms = 1_000)]
pub struct GetRegistrationStatusCommand;

impl CommandErrorHandler for GetRegistrationStatusCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

/// Activates/Deactivates a PDP context
#[derive(Clone, AtatCmd)]
#[at_cmd("+CGACT", NoResponse, timeout_ms = 150_000)]
pub struct ContextActivationCommand {
    #[at_arg(position = 0)]
    state: u8,

    #[at_arg(position = 1)]
    cid: u8,
}

impl ContextActivationCommand {
    pub fn new(cid: u8, active: bool) -> Self {
        Self {
            state: active as u8,
            cid,
        }
    }
}

impl CommandErrorHandler for ContextActivationCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

/// Reads the PDP context state, a single defined context is expected
#[derive(Clone, AtatCmd)]
#[at_cmd("+CGACT?", ContextStateResponse, timeout_ms = 1_000)]
pub struct GetContextStateCommand;

impl CommandErrorHandler for GetContextStateCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

#[derive(Clone, AtatCmd)]
#[at_cmd("+CSQ", SignalQualityResponse, timeout_ms = 1_000)]
pub struct GetSignalQualityCommand;

impl CommandErrorHandler for GetSignalQualityCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

/// Reads the address of the given PDP context
#[derive(Clone, AtatCmd)]
#[at_cmd("+CGPADDR", PdpAddressResponse, timeout_ms = 5_000)]
pub struct GetPdpAddressCommand {
    #[at_arg(position = 0)]
    cid: u8,
}

impl GetPdpAddressCommand {
    pub fn new(cid: u8) -> Self {
        Self { cid }
    }
}

impl CommandErrorHandler for GetPdpAddressCommand {
    type Error = Error;

    fn command_error(&self, error: AtError) -> Self::Error {
        Error::Transport(error)
    }
}

//! Responses of the commands shared by the cellular drivers. Fields are deserialized by position, a leading
//! "+<CMD>:" keyword is skipped.
use atat::atat_derive::AtatResp;
use heapless::String;

/// Commands which gets just responded by OK
#[derive(Clone, AtatResp)]
pub struct NoResponse;

/// "+CSQ: <rssi>,<ber>"
#[derive(Clone, Debug, AtatResp)]
pub struct SignalQualityResponse {
    #[at_arg(position = 0)]
    pub rssi: u8,

    #[at_arg(position = 1)]
    pub ber: u8,
}

/// "+CGATT: <state>"
#[derive(Clone, Debug, AtatResp)]
pub struct AttachStateResponse {
    #[at_arg(position = 0)]
    pub state: u8,
}

/// "+CEREG: <n>,<stat>[,<tac>,<ci>[,<AcT>]]", location fields are only reported with n >= 2
#[derive(Clone, Debug, AtatResp)]
pub struct RegistrationStatusResponse {
    #[at_arg(position = 0)]
    pub mode: u8,

    #[at_arg(position = 1)]
    pub stat: u8,

    #[at_arg(position = 2)]
    pub tac: Option<String<8>>,

    #[at_arg(position = 3)]
    pub cell_id: Option<String<16>>,

    #[at_arg(position = 4)]
    pub access_technology: Option<u8>,
}

/// "+CFUN: <fun>"
#[derive(Clone, Debug, AtatResp)]
pub struct FunctionalityResponse {
    #[at_arg(position = 0)]
    pub fun: u8,
}

/// "+CGACT: <cid>,<state>"
#[derive(Clone, Debug, AtatResp)]
pub struct ContextStateResponse {
    #[at_arg(position = 0)]
    pub cid: u8,

    #[at_arg(position = 1)]
    pub state: u8,
}

/// "+CGPADDR: <cid>,<address>"
#[derive(Clone, Debug, AtatResp)]
pub struct PdpAddressResponse {
    #[at_arg(position = 0)]
    pub cid: u8,

    #[at_arg(position = 1)]
    pub address: String<64>,
}

/// Serial number (IMEI), either bare or as "+CGSN: <sn>"
#[derive(Clone, Debug, AtatResp)]
pub struct ImeiResponse {
    #[at_arg(position = 0)]
    pub imei: String<20>,
}

/// International mobile subscriber identity, bare value
#[derive(Clone, Debug, AtatResp)]
pub struct ImsiResponse {
    #[at_arg(position = 0)]
    pub imsi: String<20>,
}

/// SIM card identification, e.g. "+QCCID: <iccid>" or "+ICCID: <iccid>"
#[derive(Clone, Debug, AtatResp)]
pub struct IccidResponse {
    #[at_arg(position = 0)]
    pub iccid: String<24>,
}

/// Bare firmware revision
#[derive(Clone, Debug, AtatResp)]
pub struct FirmwareRevisionResponse {
    #[at_arg(position = 0)]
    pub revision: String<64>,
}

/// Iterates over all non-empty lines of a multi-line response
pub(crate) fn lines(body: &[u8]) -> impl Iterator<Item = &str> {
    body.split(|byte| *byte == b'\n')
        .filter_map(|line| core::str::from_utf8(line).ok())
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
}

/// Returns the argument part of the first line starting with the given keyword
pub(crate) fn find_value<'a>(body: &'a [u8], keyword: &str) -> Option<&'a str> {
    lines(body).find_map(|line| line.strip_prefix(keyword)).map(|value| value.trim())
}

/// Splits the arguments of a response line, strips whitespace and quotes
pub(crate) fn arguments(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(|argument| unquote(argument.trim()))
}

pub(crate) fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|value| value.strip_suffix('"'))
        .unwrap_or(value)
}

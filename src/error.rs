use atat::Error as AtError;

/// Errors of module, connection and session operations
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// The module has no capability table for this domain or the vendor does not implement the operation
    NotSupported,

    /// Operation is not allowed in the current connection state
    InvalidState,

    /// Generic command failure reported by the transport
    Transport(AtError),

    /// Bounded wait expired without a matching event
    Timeout,

    /// No free connection slot, since the maximum number is in use or occupied by the module
    NoConnectionAvailable,

    /// A module with the same name is already registered
    DuplicateName,

    /// The transport is already owned by another module
    TransportInUse,

    /// No default module is designated
    NoDefaultModule,

    /// Module is not registered
    UnknownModule,

    /// Open command (e.g. CIPSTART, QIOPEN) failed
    ConnectError(AtError),

    /// Module reported that the remote refused or failed the connection
    ConnectRefused,

    /// Transmission of data failed
    SendFailed(AtError),

    /// Close command failed
    CloseError(AtError),

    /// Hostname resolution failed or returned an unusable address
    ResolveError(AtError),

    /// Module reported a failed ping, contains the vendor error code
    PingFailed(u16),

    /// Device management command failed
    ManagementError(AtError),

    /// Device management event reported a failure, contains the event code
    ManagementEvent(u16),

    /// Message id echoed by the module does not match the issued request
    MessageIdMismatch,

    /// Argument exceeds the limits of the command, e.g. name or SSID too long
    InvalidArgument,

    /// Response could not be interpreted
    InvalidResponse,
}

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Error::Timeout => embedded_io::ErrorKind::TimedOut,
            Error::NotSupported => embedded_io::ErrorKind::Unsupported,
            Error::InvalidState => embedded_io::ErrorKind::NotConnected,
            Error::ConnectRefused => embedded_io::ErrorKind::ConnectionRefused,
            Error::InvalidArgument => embedded_io::ErrorKind::InvalidInput,
            Error::InvalidResponse => embedded_io::ErrorKind::InvalidData,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

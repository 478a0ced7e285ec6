//! # embedded-nal-async integration
//!
//! [Module] implements [TcpConnect] and [Dns], so it plugs into clients written against embedded-nal-async.
//! The returned [Connection] implements [embedded_io_async::Read] and [embedded_io_async::Write] on top of a
//! [NetConn].
use crate::error::Error;
use crate::module::Module;
use crate::netconn::{ConnType, NetConn};
use alloc::vec::Vec;
use atat::Error as AtError;
use core::net::{IpAddr, SocketAddr};
use embassy_time::Duration;
use embedded_nal_async::{AddrType, Dns, TcpConnect};

/// Max. time of a single receive call while blocked in read()
const READ_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct Connection<'m> {
    module: &'m Module,
    netconn: Option<NetConn>,

    /// Remaining bytes of the last received chunk
    buffer: Vec<u8>,
}

impl<'m> Connection<'m> {
    pub fn new(module: &'m Module, netconn: NetConn) -> Self {
        Self {
            module,
            netconn: Some(netconn),
            buffer: Vec::new(),
        }
    }

    pub fn netconn(&self) -> Option<&NetConn> {
        self.netconn.as_ref()
    }

    /// Closes the connection and releases its slot
    pub async fn close(mut self) -> Result<(), Error> {
        match self.netconn.take() {
            Some(netconn) => self.module.destroy(netconn).await,
            None => Ok(()),
        }
    }

    fn socket(&self) -> Result<&NetConn, Error> {
        self.netconn.as_ref().ok_or(Error::InvalidState)
    }
}

impl embedded_io::ErrorType for Connection<'_> {
    type Error = Error;
}

impl embedded_io_async::Read for Connection<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.buffer.is_empty() {
            match self.module.receive(self.socket()?, READ_POLL_INTERVAL).await {
                // End of data
                Ok(chunk) if chunk.is_empty() => return Ok(0),
                Ok(chunk) => self.buffer = chunk,
                Err(Error::Timeout) => continue,
                Err(error) => return Err(error),
            }
        }

        let length = buf.len().min(self.buffer.len());
        buf[..length].copy_from_slice(&self.buffer[..length]);
        self.buffer.drain(..length);

        Ok(length)
    }
}

impl embedded_io_async::Write for Connection<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.module.send(self.socket()?, buf).await
    }
}

impl TcpConnect for Module {
    type Error = Error;

    type Connection<'a>
        = Connection<'a>
    where
        Self: 'a;

    async fn connect<'a>(&'a self, remote: SocketAddr) -> Result<Self::Connection<'a>, Self::Error> {
        let netconn = self.create(ConnType::Tcp).await?;

        if let Err(error) = Module::connect(self, &netconn, remote).await {
            let _ = self.destroy(netconn).await;
            return Err(error);
        }

        Ok(Connection::new(self, netconn))
    }
}

impl Dns for Module {
    type Error = Error;

    async fn get_host_by_name(&self, host: &str, addr_type: AddrType) -> Result<IpAddr, Self::Error> {
        let address = self.resolve(host).await?;

        match (addr_type, address) {
            (AddrType::IPv4, IpAddr::V6(_)) | (AddrType::IPv6, IpAddr::V4(_)) => {
                Err(Error::ResolveError(AtError::InvalidResponse))
            }
            _ => Ok(address),
        }
    }

    async fn get_host_by_address(&self, _addr: IpAddr, _result: &mut [u8]) -> Result<usize, Self::Error> {
        Err(Error::NotSupported)
    }
}

//! # Modem link abstraction
//!
//! Vendor independent access to AT-command driven communication modules (WIFI, LTE, NB-IoT). Every physical modem
//! is a [Module] owning one exclusive [Transport]. Operations are dispatched through the capability tables of the
//! module's vendor driver, asynchronous results (URCs) are correlated with the waiting operation.
//!
//! ## Example
//!
//! ````ignore
//! let module = molink::create(Registry::global(), "wifi0", ModuleKind::Esp32, "uart1", transport, Config::default())
//!     .await?;
//!
//! let connection = module.create(ConnType::Tcp).await?;
//! module.connect(&connection, SocketAddr::from_str("10.0.0.1:21").unwrap()).await?;
//! module.send(&connection, b"hallo!").await?;
//! let data = module.receive(&connection, Duration::from_secs(5)).await?;
//! module.destroy(connection).await?;
//! ````
#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]

extern crate alloc;

pub mod capability;
pub(crate) mod commands;
pub mod config;
pub mod connection;
pub mod correlation;
pub mod drivers;
pub mod error;
pub mod mgmt;
pub mod module;
pub mod netconn;
pub mod registry;
pub(crate) mod responses;
pub mod transport;
pub mod urc;

pub use capability::{Capabilities, Completion, Domain, Driver};
pub use config::Config;
pub use connection::Connection;
pub use drivers::ModuleKind;
pub use error::Error;
pub use mgmt::{MgmtEvent, Session};
pub use module::{create, destroy, Module};
pub use netconn::{ConnId, ConnState, ConnType, ConnectionInfo, NetConn, NetConnEvent};
pub use registry::Registry;
pub use transport::{ResponseExpectation, Transport};
pub use urc::{Urc, UrcHandler};

#[cfg(test)]
mod tests;

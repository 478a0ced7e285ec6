//! # Module instance
//!
//! A [Module] is one physical modem bound to one exclusively owned [Transport]. All operations resolve the
//! capability table of their domain first and fail with [Error::NotSupported] without side effects if the vendor
//! driver does not provide it.
//!
//! Commands are serialized by the module's command lock, which is held from issuing a command until its completion
//! event arrived or timed out. Different modules are fully independent.
use crate::capability::{
    Capabilities, Completion, ContextState, Domain, Driver, GeneralOps, JoinState, LocalAddress, NetServOps,
    PingReply, PingResult, Registration, SignalQuality, WifiOps,
};
use crate::config::Config;
use crate::correlation::{CorrelationKey, Correlator, EventKind, Outcome};
use crate::drivers::ModuleKind;
use crate::error::Error;
use crate::mgmt::MgmtListener;
use crate::netconn::{ConnectionPool, EventCallback, NetConnEvent};
use crate::registry::Registry;
use crate::transport::Transport;
use crate::urc::UrcHandler;
use alloc::boxed::Box;
use alloc::sync::Arc;
use core::cell::RefCell;
use core::net::IpAddr;
use core::str::FromStr;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::Duration;
use heapless::String;
use log::{debug, info, warn};

/// Max. length of module names and transport ids
pub const NAME_MAX_LEN: usize = 24;

/// Additional wait for a ping result beyond the ping timeout itself
pub const PING_RESPONSE_MARGIN: Duration = Duration::from_secs(5);

/// Module state which is driven by URCs
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct LinkState {
    /// Module signaled readiness after power up or restart
    pub(crate) ready: bool,

    /// Joined a WIFI access point
    pub(crate) joined: bool,

    /// IP address assigned by the access point
    pub(crate) ip_assigned: bool,
}

pub struct Module {
    /// Unique name of the module instance
    name: String<NAME_MAX_LEN>,

    /// Identifier of the owned transport (e.g. serial device name)
    transport_id: String<NAME_MAX_LEN>,

    /// Vendor driver
    driver: &'static dyn Driver,

    /// Capability tables of the vendor driver
    capabilities: Capabilities,

    /// AT transport, the mutex serializes command execution
    pub(crate) transport: Mutex<CriticalSectionRawMutex, Box<dyn Transport>>,

    /// Connection slots
    pub(crate) pool: ConnectionPool,

    /// Pending operations waiting for URCs
    pub(crate) correlator: Correlator,

    /// URC driven link state
    link: BlockingMutex<CriticalSectionRawMutex, RefCell<LinkState>>,

    /// Socket event callback
    event_callback: BlockingMutex<CriticalSectionRawMutex, RefCell<Option<EventCallback>>>,

    /// Receiver of unsolicited device management events
    pub(crate) mgmt_listener: BlockingMutex<CriticalSectionRawMutex, RefCell<Option<MgmtListener>>>,

    /// Timeouts and limits
    pub(crate) config: Config,
}

// Needed by tests that call `unwrap_err` on `Result<Arc<Module>, _>`
#[cfg(test)]
impl core::fmt::Debug for Module {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Module {
    pub fn new(
        name: &str,
        transport_id: &str,
        transport: Box<dyn Transport>,
        driver: &'static dyn Driver,
        config: Config,
    ) -> Result<Self, Error> {
        if name.is_empty() || transport_id.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let name = String::from_str(name).map_err(|_| Error::InvalidArgument)?;
        let transport_id = String::from_str(transport_id).map_err(|_| Error::InvalidArgument)?;
        let capabilities = driver.capabilities();
        let pool_size = capabilities.netconn.map(|ops| ops.connection_count()).unwrap_or(0);

        Ok(Self {
            name,
            transport_id,
            driver,
            capabilities,
            transport: Mutex::new(transport),
            pool: ConnectionPool::new(pool_size),
            correlator: Correlator::new(),
            link: BlockingMutex::new(RefCell::new(LinkState::default())),
            event_callback: BlockingMutex::new(RefCell::new(None)),
            mgmt_listener: BlockingMutex::new(RefCell::new(None)),
            config,
        })
    }

    /// Runs the vendor initialization commands
    pub async fn init(&self) -> Result<(), Error> {
        let mut transport = self.transport.lock().await;
        self.driver.init(&mut **transport).await?;
        info!("[{}] {} module initialized on {}", self.name, self.driver.vendor(), self.transport_id);
        Ok(())
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn transport_id(&self) -> &str {
        self.transport_id.as_str()
    }

    pub fn vendor(&self) -> &'static str {
        self.driver.vendor()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn supports(&self, domain: Domain) -> bool {
        self.capabilities.supports(domain)
    }

    /// Number of connection slots
    pub fn connection_count(&self) -> usize {
        self.pool.size()
    }

    /// URC handlers the transport needs to route unsolicited lines to [Module::handle_urc]
    pub fn urc_handlers(&self) -> &'static [UrcHandler] {
        self.driver.urc_handlers()
    }

    /// Registers the callback for socket events of all connections
    pub fn set_event_callback(&self, callback: Option<EventCallback>) {
        self.event_callback.lock(|current| *current.borrow_mut() = callback);
    }

    pub(crate) fn raise_event(&self, id: usize, event: NetConnEvent) {
        let callback = self.event_callback.lock(|callback| callback.borrow().clone());
        if let Some(callback) = callback {
            callback(id, event);
        }
    }

    pub(crate) fn update_link(&self, f: impl FnOnce(&mut LinkState)) {
        self.link.lock(|link| f(&mut link.borrow_mut()));
    }

    /// True once the module signaled readiness
    pub fn is_ready(&self) -> bool {
        self.link.lock(|link| link.borrow().ready)
    }

    fn general(&self) -> Result<&'static dyn GeneralOps, Error> {
        self.capabilities.general.ok_or(Error::NotSupported)
    }

    fn netserv(&self) -> Result<&'static dyn NetServOps, Error> {
        self.capabilities.netserv.ok_or(Error::NotSupported)
    }

    fn wifi(&self) -> Result<&'static dyn WifiOps, Error> {
        self.capabilities.wifi.ok_or(Error::NotSupported)
    }

    pub async fn at_test(&self) -> Result<(), Error> {
        let ops = self.general()?;
        ops.at_test(&mut **self.transport.lock().await).await
    }

    pub async fn get_imei(&self) -> Result<String<20>, Error> {
        let ops = self.general()?;
        ops.get_imei(&mut **self.transport.lock().await).await
    }

    pub async fn get_imsi(&self) -> Result<String<20>, Error> {
        let ops = self.general()?;
        ops.get_imsi(&mut **self.transport.lock().await).await
    }

    pub async fn get_iccid(&self) -> Result<String<24>, Error> {
        let ops = self.general()?;
        ops.get_iccid(&mut **self.transport.lock().await).await
    }

    pub async fn get_cfun(&self) -> Result<u8, Error> {
        let ops = self.general()?;
        ops.get_cfun(&mut **self.transport.lock().await).await
    }

    pub async fn set_cfun(&self, level: u8) -> Result<(), Error> {
        let ops = self.general()?;
        ops.set_cfun(&mut **self.transport.lock().await, level).await
    }

    pub async fn get_firmware_version(&self) -> Result<String<64>, Error> {
        let ops = self.general()?;
        ops.get_firmware_version(&mut **self.transport.lock().await).await
    }

    /// Restarts the module and waits until it is ready.
    ///
    /// All connections are closed passively, since the module lost them.
    pub async fn soft_reset(&self) -> Result<(), Error> {
        let ops = self.general()?;
        let mut transport = self.transport.lock().await;

        let pending = self.correlator.arm(CorrelationKey::module(EventKind::Ready));

        let completion = ops.soft_reset(&mut **transport).await?;
        self.update_link(|link| *link = LinkState::default());
        self.close_all_passively();

        if completion == Completion::Pending {
            match pending.wait(self.config.ready_timeout).await {
                Ok(_) => {}
                Err(error) => {
                    warn!("[{}] Module not ready after restart", self.name);
                    return Err(error);
                }
            }
        }

        self.update_link(|link| link.ready = true);
        Ok(())
    }

    pub async fn set_attach(&self, attach: bool) -> Result<(), Error> {
        let ops = self.netserv()?;
        ops.set_attach(&mut **self.transport.lock().await, attach).await
    }

    pub async fn get_attach(&self) -> Result<bool, Error> {
        let ops = self.netserv()?;
        ops.get_attach(&mut **self.transport.lock().await).await
    }

    pub async fn set_reg(&self, mode: u8) -> Result<(), Error> {
        let ops = self.netserv()?;
        ops.set_reg(&mut **self.transport.lock().await, mode).await
    }

    pub async fn get_reg(&self) -> Result<Registration, Error> {
        let ops = self.netserv()?;
        ops.get_reg(&mut **self.transport.lock().await).await
    }

    pub async fn set_cgact(&self, cid: u8, active: bool) -> Result<(), Error> {
        let ops = self.netserv()?;
        ops.set_cgact(&mut **self.transport.lock().await, cid, active).await
    }

    pub async fn get_cgact(&self) -> Result<ContextState, Error> {
        let ops = self.netserv()?;
        ops.get_cgact(&mut **self.transport.lock().await).await
    }

    pub async fn get_csq(&self) -> Result<SignalQuality, Error> {
        let ops = self.netserv()?;
        ops.get_csq(&mut **self.transport.lock().await).await
    }

    pub async fn get_ipaddr(&self) -> Result<IpAddr, Error> {
        let ops = self.netserv()?;
        ops.get_ipaddr(&mut **self.transport.lock().await).await
    }

    /// Sends a single echo request with the given payload length. `timeout` bounds the wait for the reply at the
    /// module, the result is awaited [PING_RESPONSE_MARGIN] longer.
    pub async fn ping(&self, host: &str, length: u16, timeout: Duration) -> Result<PingReply, Error> {
        let ops = self.netserv()?;
        if host.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let mut transport = self.transport.lock().await;
        let pending = self.correlator.arm(CorrelationKey::module(EventKind::Ping));

        let result = match ops.ping(&mut **transport, host, length, timeout).await? {
            Completion::Done(reply) => PingResult::Reply(reply),
            Completion::Pending => match pending.wait(timeout + PING_RESPONSE_MARGIN).await? {
                Outcome::Ping(result) => result,
                _ => PingResult::Failed(0),
            },
        };

        match result {
            PingResult::Reply(mut reply) => {
                // Some modules do not echo the payload size
                if reply.length == 0 {
                    reply.length = length;
                }

                debug!("[{}] Ping {} replied by {} in {} ms", self.name, host, reply.address, reply.time_ms);
                Ok(reply)
            }
            PingResult::Expired => {
                warn!("[{}] Ping {} expired", self.name, host);
                Err(Error::Timeout)
            }
            PingResult::Failed(code) => {
                warn!("[{}] Ping {} failed with code {}", self.name, host, code);
                Err(Error::PingFailed(code))
            }
        }
    }

    /// Connects to an WIFI access point and returns the connection state
    pub async fn join(&self, ssid: &str, key: &str) -> Result<JoinState, Error> {
        let ops = self.wifi()?;
        ops.join(&mut **self.transport.lock().await, ssid, key).await?;
        Ok(self.join_status())
    }

    /// Returns the current WIFI connection status
    pub fn join_status(&self) -> JoinState {
        self.link.lock(|link| {
            let link = link.borrow();
            JoinState {
                connected: link.joined,
                ip_assigned: link.ip_assigned,
            }
        })
    }

    /// Returns local address information
    pub async fn get_address(&self) -> Result<LocalAddress, Error> {
        let ops = self.wifi()?;
        ops.get_address(&mut **self.transport.lock().await).await
    }

    /// Enables/Disables joining the stored access point on power up
    pub async fn set_auto_connect(&self, enabled: bool) -> Result<(), Error> {
        let ops = self.wifi()?;
        ops.set_auto_connect(&mut **self.transport.lock().await, enabled).await
    }

    /// Resolves the hostname. IP literals are returned without asking the module.
    pub async fn resolve(&self, host: &str) -> Result<IpAddr, Error> {
        let ops = self.capabilities.netconn.ok_or(Error::NotSupported)?;

        if let Ok(address) = IpAddr::from_str(host) {
            return Ok(address);
        }

        let mut transport = self.transport.lock().await;
        let pending = self.correlator.arm(CorrelationKey::module(EventKind::Dns));

        let address = match ops.resolve(&mut **transport, host).await? {
            Completion::Done(address) => address,
            Completion::Pending => match pending.wait(self.config.dns_timeout).await? {
                Outcome::Resolved(address) => address,
                _ => return Err(Error::ResolveError(atat::Error::InvalidResponse)),
            },
        };

        if address.is_unspecified() || address.is_loopback() {
            warn!("[{}] Resolving {} returned unusable address {}", self.name, host, address);
            return Err(Error::ResolveError(atat::Error::InvalidResponse));
        }

        debug!("[{}] Resolved {} to {}", self.name, host, address);
        Ok(address)
    }
}

/// Creates a module of the given kind, runs its initialization and registers it
pub async fn create(
    registry: &Registry,
    name: &str,
    kind: ModuleKind,
    transport_id: &str,
    transport: Box<dyn Transport>,
    config: Config,
) -> Result<Arc<Module>, Error> {
    registry.check_available(name, transport_id)?;

    let module = Arc::new(Module::new(name, transport_id, transport, kind.driver(), config)?);
    module.init().await?;
    registry.register(module.clone())?;

    Ok(module)
}

/// Destroys all connections of the module and removes it from the registry
pub async fn destroy(registry: &Registry, module: Arc<Module>) -> Result<(), Error> {
    module.destroy_all().await;
    registry.unregister(&module)?;
    info!("[{}] Module destroyed", module.name());
    Ok(())
}

//! # Logical connections
//!
//! Every module owns a fixed pool of connection slots. The slot index is the connection id used by the vendor
//! protocol. A slot moves through the following states:
//!
//! ````text
//! Null --create--> Init --connect--> Connected --peer closed--> Closed
//!  ^                |                   |                         |
//!  +----destroy-----+-------------------+-------------------------+
//! ````
//!
//! Inbound payloads are buffered per slot in a bounded queue until the application receives them. A passive close
//! drains the queue and leaves an empty end-of-data chunk, which unblocks a waiting reader. Every reservation of a
//! slot starts a new generation, so a chunk received for an earlier connection never reaches a later one.
use crate::capability::{Completion, NetConnOps};
use crate::correlation::{CorrelationKey, EventKind, Outcome, Scope};
use crate::error::Error;
use crate::module::Module;
use crate::transport::Transport;
use alloc::sync::Arc;
use alloc::vec::Vec;
use atat::Error as AtError;
use core::cell::RefCell;
use core::net::SocketAddr;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_time::{with_timeout, Duration, Instant, Timer};
use log::{debug, error, warn};

/// Depth of the inbound data queue of a connection
pub const DATA_QUEUE_DEPTH: usize = 5;

/// Retry interval of a push into a full data queue
const QUEUE_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Connection id, index into the connection pool of a module
pub type ConnId = usize;

/// Transport protocol of a connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnType {
    Tcp,
    Udp,
}

/// Connection state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnState {
    /// Slot is free
    #[default]
    Null,
    /// Allocated by create(), not connected yet
    Init,
    /// Connection is fully open
    Connected,
    /// Closed by peer or module. Buffered data may still be received.
    Closed,
}

/// Events raised for socket compatibility layers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetConnEvent {
    /// Data got queued, contains the chunk length. 0 signals end-of-data after a passive close.
    DataAvailable(usize),
    /// Connection broke
    Error,
}

/// Snapshot of a connection slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnId,
    pub state: ConnState,
    pub kind: Option<ConnType>,
    pub remote: Option<SocketAddr>,
}

/// Callback for [NetConnEvent]s
pub type EventCallback = Arc<dyn Fn(ConnId, NetConnEvent) + Send + Sync>;

/// Handle of an allocated connection slot
#[derive(Debug, PartialEq, Eq)]
pub struct NetConn {
    pub(crate) id: ConnId,
}

impl NetConn {
    pub(crate) fn new(id: ConnId) -> Self {
        Self { id }
    }

    /// Connection id of the slot
    pub fn id(&self) -> ConnId {
        self.id
    }
}

/// State of a single connection slot
#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    state: ConnState,
    kind: Option<ConnType>,
    remote: Option<SocketAddr>,
    generation: u32,
}

/// Result of a single push attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Push {
    Full,
    /// Slot is not connected or got reused since the first attempt
    Rejected(ConnState),
}

type DataQueue = Channel<CriticalSectionRawMutex, Vec<u8>, DATA_QUEUE_DEPTH>;

/// Fixed pool of connection slots and their data queues
pub(crate) struct ConnectionPool {
    slots: Mutex<CriticalSectionRawMutex, RefCell<Vec<Slot>>>,
    queues: Vec<DataQueue>,
}

impl ConnectionPool {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            slots: Mutex::new(RefCell::new(alloc::vec![Slot::default(); size])),
            queues: (0..size).map(|_| DataQueue::new()).collect(),
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.queues.len()
    }

    pub(crate) fn state(&self, id: ConnId) -> ConnState {
        self.with_slot(id, |slot| slot.state).unwrap_or_default()
    }

    pub(crate) fn kind(&self, id: ConnId) -> Option<ConnType> {
        self.with_slot(id, |slot| slot.kind).flatten()
    }

    pub(crate) fn remote(&self, id: ConnId) -> Option<SocketAddr> {
        self.with_slot(id, |slot| slot.remote).flatten()
    }

    /// Snapshot of all slots, including free ones
    pub(crate) fn info(&self) -> Vec<ConnectionInfo> {
        self.slots.lock(|slots| {
            slots
                .borrow()
                .iter()
                .enumerate()
                .map(|(id, slot)| ConnectionInfo {
                    id,
                    state: slot.state,
                    kind: slot.kind,
                    remote: slot.remote,
                })
                .collect()
        })
    }

    /// Ids of all free slots in ascending order
    pub(crate) fn free_ids(&self) -> Vec<ConnId> {
        self.slots.lock(|slots| {
            slots
                .borrow()
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.state == ConnState::Null)
                .map(|(id, _)| id)
                .collect()
        })
    }

    /// Ids of all slots which are not free
    pub(crate) fn live_ids(&self) -> Vec<ConnId> {
        self.slots.lock(|slots| {
            slots
                .borrow()
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.state != ConnState::Null)
                .map(|(id, _)| id)
                .collect()
        })
    }

    /// Moves a free slot to Init. Returns false if the slot got taken meanwhile.
    pub(crate) fn reserve(&self, id: ConnId, kind: ConnType) -> bool {
        let reserved = self
            .with_slot_mut(id, |slot| {
                if slot.state != ConnState::Null {
                    return false;
                }

                *slot = Slot {
                    state: ConnState::Init,
                    kind: Some(kind),
                    remote: None,
                    generation: slot.generation.wrapping_add(1),
                };
                true
            })
            .unwrap_or(false);

        if reserved {
            self.drain(id);
        }

        reserved
    }

    pub(crate) fn set_connected(&self, id: ConnId, remote: SocketAddr) {
        self.with_slot_mut(id, |slot| {
            slot.state = ConnState::Connected;
            slot.remote = Some(remote);
        });
    }

    /// Resets the slot to Null and releases buffered data
    pub(crate) fn release(&self, id: ConnId) {
        self.with_slot_mut(id, |slot| {
            *slot = Slot {
                generation: slot.generation,
                ..Slot::default()
            }
        });
        self.drain(id);
    }

    /// Generation of the slot, changes on every reservation
    pub(crate) fn generation(&self, id: ConnId) -> Option<u32> {
        self.with_slot(id, |slot| slot.generation)
    }

    /// Queues the chunk if the slot is still connected within the given generation. State check and push happen
    /// under the slot lock, so a concurrent close or release either precedes or follows the push as a whole.
    pub(crate) fn push(&self, id: ConnId, generation: u32, data: Vec<u8>) -> Result<(), (Push, Vec<u8>)> {
        let Some(queue) = self.queues.get(id) else {
            return Err((Push::Rejected(ConnState::Null), data));
        };

        self.slots.lock(|slots| {
            let state = slots
                .borrow()
                .get(id)
                .filter(|slot| slot.generation == generation)
                .map(|slot| slot.state)
                .unwrap_or_default();

            if state != ConnState::Connected {
                return Err((Push::Rejected(state), data));
            }

            queue.try_send(data).map_err(|error| match error {
                TrySendError::Full(data) => (Push::Full, data),
            })
        })
    }

    /// Moves a live slot to Closed. Returns false if the slot is free.
    pub(crate) fn close_passively(&self, id: ConnId) -> bool {
        let closed = self
            .with_slot_mut(id, |slot| {
                if slot.state == ConnState::Null {
                    return false;
                }

                slot.state = ConnState::Closed;
                true
            })
            .unwrap_or(false);

        if closed {
            self.drain(id);
            if let Some(queue) = self.queues.get(id) {
                let _ = queue.try_send(Vec::new());
            }
        }

        closed
    }

    pub(crate) fn queue(&self, id: ConnId) -> Result<&DataQueue, Error> {
        self.queues.get(id).ok_or(Error::InvalidState)
    }

    /// Number of queued chunks
    pub(crate) fn queued(&self, id: ConnId) -> usize {
        self.queues.get(id).map(|queue| queue.len()).unwrap_or(0)
    }

    fn drain(&self, id: ConnId) {
        if let Some(queue) = self.queues.get(id) {
            while queue.try_receive().is_ok() {}
        }
    }

    fn with_slot<R>(&self, id: ConnId, f: impl FnOnce(&Slot) -> R) -> Option<R> {
        self.slots.lock(|slots| slots.borrow().get(id).map(f))
    }

    fn with_slot_mut<R>(&self, id: ConnId, f: impl FnOnce(&mut Slot) -> R) -> Option<R> {
        self.slots.lock(|slots| slots.borrow_mut().get_mut(id).map(f))
    }
}

impl Module {
    fn netconn_ops(&self) -> Result<&'static dyn NetConnOps, Error> {
        self.capabilities().netconn.ok_or(Error::NotSupported)
    }

    /// Returns the current state of the connection
    pub fn state(&self, connection: &NetConn) -> ConnState {
        self.pool.state(connection.id)
    }

    /// Returns the protocol of the connection
    pub fn connection_type(&self, connection: &NetConn) -> Option<ConnType> {
        self.pool.kind(connection.id)
    }

    /// Returns the remote address of a connected connection
    pub fn remote_address(&self, connection: &NetConn) -> Option<SocketAddr> {
        self.pool.remote(connection.id)
    }

    /// Lists every connection slot of the module with its state, protocol and remote address
    pub fn get_info(&self) -> Result<Vec<ConnectionInfo>, Error> {
        self.netconn_ops()?;
        Ok(self.pool.info())
    }

    /// Allocates a free connection slot.
    ///
    /// Every candidate id is double-checked at the module, since the module may still consider an id in use after a
    /// restart or a missed close.
    pub async fn create(&self, kind: ConnType) -> Result<NetConn, Error> {
        let ops = self.netconn_ops()?;
        let mut transport = self.transport.lock().await;

        for id in self.pool.free_ids() {
            if ops.is_occupied(&mut **transport, id).await? {
                warn!("[{}] Connection id {} is still in use by the module", self.name(), id);
                continue;
            }

            if self.pool.reserve(id, kind) {
                debug!("[{}] Connection {} created ({:?})", self.name(), id, kind);
                return Ok(NetConn::new(id));
            }
        }

        error!("[{}] No connection available", self.name());
        Err(Error::NoConnectionAvailable)
    }

    /// Opens the connection to the remote address. Requires state Init.
    ///
    /// On failure or timeout the connection stays in Init and may be retried or destroyed.
    pub async fn connect(&self, connection: &NetConn, remote: SocketAddr) -> Result<(), Error> {
        let ops = self.netconn_ops()?;
        let kind = self.require_state(connection, ConnState::Init)?;

        let mut transport = self.transport.lock().await;
        if self.pool.state(connection.id) != ConnState::Init {
            return Err(Error::InvalidState);
        }

        let pending = self.correlator.arm(CorrelationKey::connection(connection.id, EventKind::Connect));

        match ops.open(&mut **transport, connection.id, kind, remote).await? {
            Completion::Done(()) => {}
            Completion::Pending => match pending.wait(self.config.connect_timeout).await {
                Ok(Outcome::Success) => {}
                Ok(_) => {
                    warn!("[{}] Connection {} refused by {}", self.name(), connection.id, remote);
                    return Err(Error::ConnectRefused);
                }
                Err(error) => {
                    warn!("[{}] Connection {} open timed out", self.name(), connection.id);
                    return Err(error);
                }
            },
        }

        self.pool.set_connected(connection.id, remote);
        debug!("[{}] Connection {} connected to {}", self.name(), connection.id, remote);
        Ok(())
    }

    /// Sends the data. Requires state Connected.
    ///
    /// Data exceeding the vendor's single send limit is split into fragments, each one confirmed before the next one
    /// is issued. Returns the number of confirmed bytes. If a fragment fails, the bytes confirmed so far are returned,
    /// which is 0 if the first of several fragments fails. Data fitting into a single fragment returns the error
    /// instead.
    pub async fn send(&self, connection: &NetConn, data: &[u8]) -> Result<usize, Error> {
        let ops = self.netconn_ops()?;
        let kind = self.require_state(connection, ConnState::Connected)?;

        if data.is_empty() {
            return Ok(0);
        }

        let remote = self.pool.remote(connection.id).ok_or(Error::InvalidState)?;
        let fragment_size = ops.max_fragment_size(kind).max(1);
        let mut transport = self.transport.lock().await;
        let mut confirmed = 0;

        for fragment in data.chunks(fragment_size) {
            let result = match self.pool.state(connection.id) {
                ConnState::Connected => {
                    self.send_fragment(ops, &mut **transport, connection.id, kind, remote, fragment)
                        .await
                }
                _ => Err(Error::InvalidState),
            };

            match result {
                Ok(()) => confirmed += fragment.len(),
                Err(error) if data.len() <= fragment_size => return Err(error),
                Err(error) => {
                    warn!(
                        "[{}] Send on connection {} aborted after {} of {} bytes: {:?}",
                        self.name(),
                        connection.id,
                        confirmed,
                        data.len(),
                        error
                    );
                    return Ok(confirmed);
                }
            }
        }

        Ok(confirmed)
    }

    async fn send_fragment(
        &self,
        ops: &'static dyn NetConnOps,
        transport: &mut dyn Transport,
        id: ConnId,
        kind: ConnType,
        remote: SocketAddr,
        fragment: &[u8],
    ) -> Result<(), Error> {
        let pending = self.correlator.arm(CorrelationKey::connection(id, EventKind::Send));

        match ops.send(transport, id, kind, remote, fragment).await? {
            Completion::Done(length) if length == fragment.len() => Ok(()),
            Completion::Done(_) => Err(Error::SendFailed(AtError::InvalidResponse)),
            Completion::Pending => match pending.wait(self.config.send_timeout).await? {
                Outcome::Success => Ok(()),
                _ => Err(Error::SendFailed(AtError::Error)),
            },
        }
    }

    /// Receives one buffered chunk, waiting up to the given timeout.
    ///
    /// Requires state Connected or Closed. An empty chunk signals end-of-data after the peer closed the connection.
    /// [Error::Timeout] is returned if no data arrived in time.
    pub async fn receive(&self, connection: &NetConn, timeout: Duration) -> Result<Vec<u8>, Error> {
        self.netconn_ops()?;
        let queue = self.pool.queue(connection.id)?;

        match self.pool.state(connection.id) {
            ConnState::Connected => {}
            ConnState::Closed => return Ok(queue.try_receive().unwrap_or_default()),
            _ => return Err(Error::InvalidState),
        }

        with_timeout(timeout, queue.receive()).await.map_err(|_| Error::Timeout)
    }

    /// Closes the connection and releases the slot. Requires state != Null.
    ///
    /// The slot and its buffered data are released even if the close command fails, the close error is returned
    /// afterwards.
    pub async fn destroy(&self, connection: NetConn) -> Result<(), Error> {
        let ops = self.netconn_ops()?;
        self.close_and_release(ops, connection.id).await
    }

    async fn close_and_release(&self, ops: &'static dyn NetConnOps, id: ConnId) -> Result<(), Error> {
        let state = self.pool.state(id);
        let mut result = Ok(());

        match state {
            ConnState::Null => return Err(Error::InvalidState),
            ConnState::Init | ConnState::Connected => {
                let mut transport = self.transport.lock().await;
                result = with_timeout(self.config.close_timeout, ops.close(&mut **transport, id))
                    .await
                    .unwrap_or(Err(Error::Timeout));
            }
            ConnState::Closed => {}
        }

        if let Err(error) = &result {
            warn!("[{}] Closing connection {} failed, releasing anyway: {:?}", self.name(), id, error);
        }

        self.correlator.fail_scope(Scope::Connection(id));
        self.pool.release(id);
        debug!("[{}] Connection {} destroyed", self.name(), id);
        result
    }

    /// Destroys all live connections, used on module teardown
    pub(crate) async fn destroy_all(&self) {
        let Some(ops) = self.capabilities().netconn else {
            return;
        };

        for id in self.pool.live_ids() {
            let _ = self.close_and_release(ops, id).await;
        }
    }

    /// Queues inbound data of the connection. Data for connections not in state Connected is dropped.
    ///
    /// A full queue is retried until [Config::queue_push_timeout](crate::Config) expires. The chunk is dropped if
    /// the connection gets closed or reused meanwhile.
    pub async fn data_received(&self, id: ConnId, data: Vec<u8>) {
        let Some(generation) = self.pool.generation(id) else {
            warn!("[{}] Dropping {} bytes for unknown connection {}", self.name(), data.len(), id);
            return;
        };

        let length = data.len();
        let deadline = Instant::now() + self.config.queue_push_timeout;
        let mut data = data;

        loop {
            match self.pool.push(id, generation, data) {
                Ok(()) => break,
                Err((Push::Rejected(state), _)) => {
                    warn!("[{}] Dropping {} bytes for connection {} in state {:?}", self.name(), length, id, state);
                    return;
                }
                Err((_, _)) if Instant::now() >= deadline => {
                    error!("[{}] Data queue of connection {} full, dropped {} bytes", self.name(), id, length);
                    return;
                }
                Err((_, rejected)) => {
                    data = rejected;
                    Timer::after(QUEUE_RETRY_INTERVAL).await;
                }
            }
        }

        self.raise_event(id, NetConnEvent::DataAvailable(length));
    }

    /// Marks the connection as closed by the peer or the module
    pub fn passively_closed(&self, id: ConnId) {
        if !self.pool.close_passively(id) {
            debug!("[{}] Ignoring close of unused connection {}", self.name(), id);
            return;
        }

        self.correlator.fail_scope(Scope::Connection(id));
        debug!("[{}] Connection {} closed passively", self.name(), id);

        self.raise_event(id, NetConnEvent::DataAvailable(0));
        self.raise_event(id, NetConnEvent::Error);
    }

    /// Passively closes all live connections, e.g. after a module restart
    pub(crate) fn close_all_passively(&self) {
        for id in self.pool.live_ids() {
            self.passively_closed(id);
        }
    }

    fn require_state(&self, connection: &NetConn, required: ConnState) -> Result<ConnType, Error> {
        let state = self.pool.state(connection.id);
        if state != required {
            debug!(
                "[{}] Connection {} is in state {:?}, required {:?}",
                self.name(),
                connection.id,
                state,
                required
            );
            return Err(Error::InvalidState);
        }

        self.pool.kind(connection.id).ok_or(Error::InvalidState)
    }
}

//! # Correlation of asynchronous events with pending operations
//!
//! A caller arms a [PendingOperation] for a [CorrelationKey] right before issuing the triggering command. The
//! reception path completes the key when the matching URC arrives. Every armed operation owns a fresh single-use
//! [Signal], and the registration is retired when the operation is dropped, whether it completed, timed out or got
//! cancelled. A late event for a retired key finds no registration and is discarded.
use crate::capability::PingResult;
use crate::error::Error;
use crate::mgmt::SessionRef;
use crate::netconn::ConnId;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::net::IpAddr;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};

/// Addressed entity of an event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Single connection slot
    Connection(ConnId),

    /// Module wide, e.g. hostname resolution, ping or readiness after restart
    Module,

    /// Device management session
    Session(SessionRef),
}

/// Kind of awaited event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Connect,
    Send,
    Dns,
    Ping,
    Ready,
    Register,
    Update,
    Notify,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CorrelationKey {
    pub scope: Scope,
    pub kind: EventKind,
}

impl CorrelationKey {
    pub const fn connection(id: ConnId, kind: EventKind) -> Self {
        Self {
            scope: Scope::Connection(id),
            kind,
        }
    }

    pub const fn module(kind: EventKind) -> Self {
        Self {
            scope: Scope::Module,
            kind,
        }
    }

    pub const fn session(reference: SessionRef, kind: EventKind) -> Self {
        Self {
            scope: Scope::Session(reference),
            kind,
        }
    }
}

/// Result delivered to a pending operation
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Success,
    Failure,
    Resolved(IpAddr),
    Ping(PingResult),
    Management { code: u16, message_id: Option<u32> },
}

type OutcomeSignal = Signal<CriticalSectionRawMutex, Outcome>;

struct Registration {
    key: CorrelationKey,
    ticket: u32,
    signal: Arc<OutcomeSignal>,
}

struct Registrations {
    entries: Vec<Registration>,
    next_ticket: u32,
}

/// Table of armed pending operations
pub struct Correlator {
    registrations: Mutex<CriticalSectionRawMutex, RefCell<Registrations>>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub const fn new() -> Self {
        Self {
            registrations: Mutex::new(RefCell::new(Registrations {
                entries: Vec::new(),
                next_ticket: 0,
            })),
        }
    }

    /// Registers a new wait for the key. An older registration of the same key is replaced.
    pub fn arm(&self, key: CorrelationKey) -> PendingOperation<'_> {
        let signal = Arc::new(OutcomeSignal::new());

        let ticket = self.registrations.lock(|registrations| {
            let mut registrations = registrations.borrow_mut();
            let ticket = registrations.next_ticket;
            registrations.next_ticket = ticket.wrapping_add(1);

            registrations.entries.retain(|entry| entry.key != key);
            registrations.entries.push(Registration {
                key,
                ticket,
                signal: signal.clone(),
            });
            ticket
        });

        PendingOperation {
            correlator: self,
            key,
            ticket,
            signal,
        }
    }

    /// Delivers the outcome to the armed operation of the key. Returns false if nobody is waiting.
    pub fn complete(&self, key: CorrelationKey, outcome: Outcome) -> bool {
        let registration = self.registrations.lock(|registrations| {
            let mut registrations = registrations.borrow_mut();
            let position = registrations.entries.iter().position(|entry| entry.key == key)?;
            Some(registrations.entries.swap_remove(position))
        });

        Self::deliver(registration, outcome)
    }

    /// Delivers the outcome to the only armed operation of the given kind.
    ///
    /// Used for events which do not carry an id, e.g. "SEND OK". Nothing is delivered if the kind is ambiguous.
    pub fn complete_kind(&self, kind: EventKind, outcome: Outcome) -> bool {
        let registration = self.registrations.lock(|registrations| {
            let mut registrations = registrations.borrow_mut();
            let (position, ambiguous) = {
                let mut positions = registrations
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| entry.key.kind == kind)
                    .map(|(position, _)| position);

                (positions.next()?, positions.next().is_some())
            };

            if ambiguous {
                return None;
            }

            Some(registrations.entries.swap_remove(position))
        });

        Self::deliver(registration, outcome)
    }

    /// Fails all armed operations of the scope, returns the number of woken operations
    pub fn fail_scope(&self, scope: Scope) -> usize {
        let failed: Vec<Registration> = self.registrations.lock(|registrations| {
            let mut registrations = registrations.borrow_mut();
            let (failed, kept): (Vec<_>, Vec<_>) =
                registrations.entries.drain(..).partition(|entry| entry.key.scope == scope);
            registrations.entries = kept;
            failed
        });

        let count = failed.len();
        for registration in failed {
            registration.signal.signal(Outcome::Failure);
        }

        count
    }

    /// Returns true if an operation is armed for the key
    pub fn is_armed(&self, key: CorrelationKey) -> bool {
        self.registrations
            .lock(|registrations| registrations.borrow().entries.iter().any(|entry| entry.key == key))
    }

    /// Number of armed operations
    pub fn armed_count(&self) -> usize {
        self.registrations.lock(|registrations| registrations.borrow().entries.len())
    }

    fn deliver(registration: Option<Registration>, outcome: Outcome) -> bool {
        match registration {
            Some(registration) => {
                registration.signal.signal(outcome);
                true
            }
            None => false,
        }
    }

    fn retire(&self, key: CorrelationKey, ticket: u32) {
        self.registrations.lock(|registrations| {
            registrations
                .borrow_mut()
                .entries
                .retain(|entry| !(entry.key == key && entry.ticket == ticket));
        });
    }
}

/// Single-use wait token, retires its registration on drop
pub struct PendingOperation<'a> {
    correlator: &'a Correlator,
    key: CorrelationKey,
    ticket: u32,
    signal: Arc<OutcomeSignal>,
}

impl PendingOperation<'_> {
    pub fn key(&self) -> CorrelationKey {
        self.key
    }

    /// Waits for the outcome, [Error::Timeout] if nothing arrives in time
    pub async fn wait(self, timeout: Duration) -> Result<Outcome, Error> {
        with_timeout(timeout, self.signal.wait()).await.map_err(|_| Error::Timeout)
    }
}

impl Drop for PendingOperation<'_> {
    fn drop(&mut self) {
        self.correlator.retire(self.key, self.ticket);
    }
}

//! # Module registry
//!
//! Tracks all active module instances by name and transport and resolves the default module. Names and transports
//! are unique among registered modules. The first registered module becomes the default if none is designated.
//!
//! The registry is protected by a critical section, so it may also be walked from the reception context.
use crate::error::Error;
use crate::module::Module;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use log::{debug, warn};

struct Modules {
    modules: Vec<Arc<Module>>,
    default: Option<Arc<Module>>,
}

pub struct Registry {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Modules>>,
}

static GLOBAL: Registry = Registry::new();

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Modules {
                modules: Vec::new(),
                default: None,
            })),
        }
    }

    /// Process wide registry
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Fails if the name or the transport is already taken
    pub fn check_available(&self, name: &str, transport_id: &str) -> Result<(), Error> {
        self.inner.lock(|inner| Self::check(&inner.borrow(), name, transport_id))
    }

    pub fn register(&self, module: Arc<Module>) -> Result<(), Error> {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            Self::check(&inner, module.name(), module.transport_id())?;

            if inner.default.is_none() {
                inner.default = Some(module.clone());
            }

            debug!("Module {} registered", module.name());
            inner.modules.push(module);
            Ok(())
        })
    }

    /// Removes the module. If it was the default, no default is designated afterwards.
    pub fn unregister(&self, module: &Module) -> Result<(), Error> {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            let position = inner
                .modules
                .iter()
                .position(|registered| core::ptr::eq(registered.as_ref(), module))
                .ok_or(Error::UnknownModule)?;

            inner.modules.remove(position);

            let was_default = inner
                .default
                .as_ref()
                .map(|default| core::ptr::eq(default.as_ref(), module))
                .unwrap_or(false);

            if was_default {
                inner.default = None;
            }

            debug!("Module {} unregistered", module.name());
            Ok(())
        })
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<Module>> {
        self.inner.lock(|inner| {
            inner
                .borrow()
                .modules
                .iter()
                .find(|module| module.name() == name)
                .cloned()
        })
    }

    pub fn find_by_transport(&self, transport_id: &str) -> Option<Arc<Module>> {
        self.inner.lock(|inner| {
            inner
                .borrow()
                .modules
                .iter()
                .find(|module| module.transport_id() == transport_id)
                .cloned()
        })
    }

    pub fn get_default(&self) -> Result<Arc<Module>, Error> {
        let default = self.inner.lock(|inner| inner.borrow().default.clone());

        if default.is_none() {
            warn!("There is no default module");
        }

        default.ok_or(Error::NoDefaultModule)
    }

    /// Designates the registered module with the given name as default
    pub fn set_default(&self, name: &str) -> Result<(), Error> {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            let module = inner
                .modules
                .iter()
                .find(|module| module.name() == name)
                .cloned()
                .ok_or(Error::UnknownModule)?;

            inner.default = Some(module);
            Ok(())
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock(|inner| inner.borrow().modules.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(inner: &Modules, name: &str, transport_id: &str) -> Result<(), Error> {
        if inner.modules.iter().any(|module| module.name() == name) {
            return Err(Error::DuplicateName);
        }

        if inner.modules.iter().any(|module| module.transport_id() == transport_id) {
            return Err(Error::TransportInUse);
        }

        Ok(())
    }
}

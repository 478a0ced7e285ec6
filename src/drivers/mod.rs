//! # Vendor drivers
//!
//! Every driver provides the capability tables of the domains its AT dialect supports and the decoders for its
//! URCs. Drivers are stateless, all per-instance state lives in the [Module](crate::module::Module).
use crate::capability::Driver;

pub mod ec200x;
pub mod esp32;
pub mod m5311;

/// Supported module types
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleKind {
    /// Espressif ESP32 running ESP-AT firmware (WIFI)
    Esp32,

    /// Quectel EC200x (LTE Cat 1)
    Ec200x,

    /// China Mobile M5311 (NB-IoT, OneNET device management)
    M5311,
}

impl ModuleKind {
    pub fn driver(self) -> &'static dyn Driver {
        match self {
            ModuleKind::Esp32 => &esp32::DRIVER,
            ModuleKind::Ec200x => &ec200x::DRIVER,
            ModuleKind::M5311 => &m5311::DRIVER,
        }
    }
}

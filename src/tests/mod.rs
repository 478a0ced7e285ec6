mod mgmt;
pub(crate) mod mock;
mod module;
mod registry;
mod urc;

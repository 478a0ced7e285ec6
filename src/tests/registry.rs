use crate::error::Error;
use crate::module::{create, destroy, Module};
use crate::registry::Registry;
use crate::tests::mock::{test_config, MockedCommand, ScriptedTransport};
use crate::transport::MockTransport;
use crate::ModuleKind;
use alloc::boxed::Box;
use alloc::sync::Arc;
use embassy_futures::block_on;

fn module(name: &str, transport_id: &str) -> Arc<Module> {
    let driver = ModuleKind::M5311.driver();
    Arc::new(Module::new(name, transport_id, Box::new(MockTransport::new()), driver, test_config()).unwrap())
}

#[test]
fn test_register_first_module_becomes_default() {
    let registry = Registry::new();

    registry.register(module("nb0", "uart0")).unwrap();
    registry.register(module("nb1", "uart1")).unwrap();

    assert_eq!(2, registry.len());
    assert_eq!("nb0", registry.get_default().unwrap().name());
}

#[test]
fn test_register_duplicate_name() {
    let registry = Registry::new();
    registry.register(module("nb0", "uart0")).unwrap();

    assert_eq!(Error::DuplicateName, registry.register(module("nb0", "uart1")).unwrap_err());
    assert_eq!(1, registry.len());
}

#[test]
fn test_register_transport_in_use() {
    let registry = Registry::new();
    registry.register(module("nb0", "uart0")).unwrap();

    assert_eq!(Error::TransportInUse, registry.register(module("nb1", "uart0")).unwrap_err());
    assert_eq!(Error::TransportInUse, registry.check_available("nb1", "uart0").unwrap_err());
    assert!(registry.check_available("nb1", "uart1").is_ok());
}

#[test]
fn test_find_by_name_and_transport() {
    let registry = Registry::new();
    registry.register(module("nb0", "uart0")).unwrap();
    registry.register(module("wifi0", "uart1")).unwrap();

    assert_eq!("wifi0", registry.find_by_name("wifi0").unwrap().name());
    assert_eq!("nb0", registry.find_by_transport("uart0").unwrap().name());
    assert!(registry.find_by_name("lte0").is_none());
    assert!(registry.find_by_transport("uart2").is_none());
}

#[test]
fn test_unregister_default_clears_default() {
    let registry = Registry::new();
    let first = module("nb0", "uart0");
    registry.register(first.clone()).unwrap();
    registry.register(module("nb1", "uart1")).unwrap();

    registry.unregister(&first).unwrap();

    assert_eq!(Error::NoDefaultModule, registry.get_default().unwrap_err());
    assert_eq!(1, registry.len());
}

#[test]
fn test_unregister_unknown_module() {
    let registry = Registry::new();
    let module = module("nb0", "uart0");

    assert_eq!(Error::UnknownModule, registry.unregister(&module).unwrap_err());
}

#[test]
fn test_set_default() {
    let registry = Registry::new();
    registry.register(module("nb0", "uart0")).unwrap();
    registry.register(module("nb1", "uart1")).unwrap();

    registry.set_default("nb1").unwrap();
    assert_eq!("nb1", registry.get_default().unwrap().name());

    assert_eq!(Error::UnknownModule, registry.set_default("nb2").unwrap_err());
    assert_eq!("nb1", registry.get_default().unwrap().name());
}

#[test]
fn test_no_default_module() {
    let registry = Registry::new();
    assert!(registry.is_empty());
    assert_eq!(Error::NoDefaultModule, registry.get_default().unwrap_err());
}

#[test]
fn test_create_runs_init_and_registers() {
    let registry = Registry::new();
    let transport = ScriptedTransport::new();
    transport.add_response(MockedCommand::ok(b"AT+CIPMUX=1\r\n", &[]));

    let module = block_on(create(
        &registry,
        "wifi0",
        ModuleKind::Esp32,
        "uart1",
        Box::new(transport.clone()),
        test_config(),
    ))
    .unwrap();

    assert_eq!("ESP32", module.vendor());
    assert_eq!("wifi0", registry.get_default().unwrap().name());
    transport.assert_all_cmds_sent();
}

#[test]
fn test_create_init_failed_not_registered() {
    let registry = Registry::new();
    let transport = ScriptedTransport::new();
    transport.add_response(MockedCommand::error(b"AT+CIPMUX=1\r\n", &[]));

    let result = block_on(create(
        &registry,
        "wifi0",
        ModuleKind::Esp32,
        "uart1",
        Box::new(transport.clone()),
        test_config(),
    ));

    assert_eq!(Error::Transport(atat::Error::Error), result.err().unwrap());
    assert!(registry.is_empty());
}

#[test]
fn test_create_duplicate_name_sends_nothing() {
    let registry = Registry::new();
    registry.register(module("wifi0", "uart0")).unwrap();
    let transport = ScriptedTransport::new();

    let result = block_on(create(
        &registry,
        "wifi0",
        ModuleKind::Esp32,
        "uart1",
        Box::new(transport.clone()),
        test_config(),
    ));

    assert_eq!(Error::DuplicateName, result.err().unwrap());
    assert!(transport.get_commands_as_strings().is_empty());
}

#[test]
fn test_destroy_module_unregisters() {
    let registry = Registry::new();
    let nb = module("nb0", "uart0");
    registry.register(nb.clone()).unwrap();

    block_on(destroy(&registry, nb.clone())).unwrap();

    assert!(registry.is_empty());
    assert_eq!(Error::UnknownModule, block_on(destroy(&registry, nb)).unwrap_err());
}

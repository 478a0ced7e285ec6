use crate::capability::{Domain, JoinState};
use crate::error::Error;
use crate::module::Module;
use crate::netconn::{ConnState, ConnType};
use crate::tests::mock::{deliver_urcs, run, scripted_module, test_config, MockedCommand, UrcMessage};
use crate::transport::MockTransport;
use crate::ModuleKind;
use alloc::boxed::Box;
use alloc::string::ToString;
use alloc::vec::Vec;
use atat::Error as AtError;
use core::net::SocketAddr;
use core::str::FromStr;
use embassy_futures::block_on;

#[test]
fn test_new_invalid_name() {
    let driver = ModuleKind::Esp32.driver();

    let result = Module::new("", "uart0", Box::new(MockTransport::new()), driver, test_config());
    assert_eq!(Error::InvalidArgument, result.err().unwrap());

    let result = Module::new("wifi0", "", Box::new(MockTransport::new()), driver, test_config());
    assert_eq!(Error::InvalidArgument, result.err().unwrap());

    let name = "a_very_long_module_name_exceeding_the_limit";
    let result = Module::new(name, "uart0", Box::new(MockTransport::new()), driver, test_config());
    assert_eq!(Error::InvalidArgument, result.err().unwrap());
}

#[test]
fn test_capabilities_by_kind() {
    let (esp, _) = scripted_module(ModuleKind::Esp32);
    assert!(esp.supports(Domain::General));
    assert!(esp.supports(Domain::NetworkConnection));
    assert!(esp.supports(Domain::Wifi));
    assert!(!esp.supports(Domain::NetworkService));
    assert!(!esp.supports(Domain::DeviceManagement));
    assert_eq!(5, esp.connection_count());

    let (lte, _) = scripted_module(ModuleKind::Ec200x);
    assert!(lte.supports(Domain::NetworkService));
    assert!(lte.supports(Domain::NetworkConnection));
    assert!(!lte.supports(Domain::Wifi));
    assert_eq!(12, lte.connection_count());

    let (nb, _) = scripted_module(ModuleKind::M5311);
    assert!(nb.supports(Domain::DeviceManagement));
    assert!(nb.supports(Domain::NetworkConnection));
    assert!(nb.supports(Domain::NetworkService));
    assert!(!nb.supports(Domain::Wifi));
    assert_eq!(5, nb.connection_count());
    assert_eq!("M5311", nb.vendor());
}

#[test]
fn test_at_test() {
    let mut transport = MockTransport::new();
    transport
        .expect_execute()
        .times(1)
        .withf(|command, _| command.to_vec() == b"AT\r\n".to_vec())
        .returning(|_, _| Ok(Vec::new()));

    let module = Module::new("wifi0", "uart0", Box::new(transport), ModuleKind::Esp32.driver(), test_config()).unwrap();
    block_on(module.at_test()).unwrap();
}

#[test]
fn test_at_test_error() {
    let mut transport = MockTransport::new();
    transport
        .expect_execute()
        .times(1)
        .returning(|_, _| Err(AtError::Timeout));

    let module = Module::new("lte0", "uart0", Box::new(transport), ModuleKind::Ec200x.driver(), test_config()).unwrap();
    assert_eq!(Error::Transport(AtError::Timeout), block_on(module.at_test()).unwrap_err());
}

#[test]
fn test_operation_not_supported_without_command() {
    let (module, transport) = scripted_module(ModuleKind::Ec200x);

    assert_eq!(Error::NotSupported, block_on(module.join("ssid", "key")).unwrap_err());
    assert_eq!(Error::NotSupported, block_on(module.get_address()).unwrap_err());
    assert_eq!(Error::NotSupported, block_on(module.create_session()).err().unwrap());
    assert!(transport.get_commands_as_strings().is_empty());

    let (module, transport) = scripted_module(ModuleKind::Esp32);
    assert_eq!(Error::NotSupported, block_on(module.get_imei()).unwrap_err());
    assert_eq!(Error::NotSupported, block_on(module.get_csq()).unwrap_err());
    assert_eq!(Error::NotSupported, block_on(module.set_cfun(1)).unwrap_err());
    assert!(transport.get_commands_as_strings().is_empty());
}

#[test]
fn test_init_esp32() {
    let (module, transport) = scripted_module(ModuleKind::Esp32);
    transport.add_response(MockedCommand::ok(b"AT+CIPMUX=1\r\n", &[]));

    block_on(module.init()).unwrap();
    transport.assert_all_cmds_sent();
}

#[test]
fn test_init_without_commands() {
    let (module, transport) = scripted_module(ModuleKind::Ec200x);

    block_on(module.init()).unwrap();
    assert!(transport.get_commands_as_strings().is_empty());
}

#[test]
fn test_soft_reset_waits_for_ready() {
    let (module, transport) = scripted_module(ModuleKind::Esp32);
    transport.add_response(MockedCommand::ok(b"AT+RST\r\n", &[UrcMessage::line(b"ready\r\n")]));

    assert!(!module.is_ready());
    run(&module, &transport, module.soft_reset()).unwrap();
    assert!(module.is_ready());
}

#[test]
fn test_soft_reset_not_ready() {
    let (module, transport) = scripted_module(ModuleKind::Ec200x);
    transport.add_response(MockedCommand::ok(b"AT+CFUN=1,1\r\n", &[]));

    assert_eq!(Error::Timeout, run(&module, &transport, module.soft_reset()).unwrap_err());
    assert!(!module.is_ready());
    assert_eq!(0, module.correlator.armed_count());
}

#[test]
fn test_soft_reset_closes_connections() {
    let (module, transport) = scripted_module(ModuleKind::Esp32);
    transport.add_response(MockedCommand::response(b"AT+CIPSTATUS\r\n", b"STATUS:2\r\n", &[]));
    transport.add_response(MockedCommand::ok(b"AT+CIPSTART=0,\"TCP\",\"10.0.0.1\",21\r\n", &[]));
    transport.add_response(MockedCommand::ok(b"AT+RST\r\n", &[UrcMessage::line(b"ready\r\n")]));

    let connection = block_on(module.create(ConnType::Tcp)).unwrap();
    block_on(module.connect(&connection, SocketAddr::from_str("10.0.0.1:21").unwrap())).unwrap();
    run(&module, &transport, module.soft_reset()).unwrap();

    assert_eq!(ConnState::Closed, module.state(&connection));
}

#[test]
fn test_soft_reset_not_supported_keeps_state() {
    let (module, transport) = scripted_module(ModuleKind::M5311);
    module.update_link(|link| link.ready = true);

    assert_eq!(Error::NotSupported, block_on(module.soft_reset()).unwrap_err());

    assert!(module.is_ready());
    assert!(transport.get_commands_as_strings().is_empty());
    assert_eq!(0, module.correlator.armed_count());
}

#[test]
fn test_join() {
    let (module, transport) = scripted_module(ModuleKind::Esp32);
    transport.add_response(MockedCommand::ok(b"AT+CWMODE=1\r\n", &[]));
    transport.add_response(MockedCommand::ok(
        b"AT+CWJAP=\"test_wifi\",\"secret\"\r\n",
        &[UrcMessage::line(b"WIFI CONNECTED\r\n"), UrcMessage::line(b"WIFI GOT IP\r\n")],
    ));

    block_on(module.join("test_wifi", "secret")).unwrap();
    deliver_urcs(&module, &transport);

    assert_eq!(
        JoinState {
            connected: true,
            ip_assigned: true
        },
        module.join_status()
    );

    transport.publish_urc(UrcMessage::line(b"WIFI DISCONNECT\r\n"));
    deliver_urcs(&module, &transport);
    assert_eq!(JoinState::default(), module.join_status());
}

#[test]
fn test_join_error() {
    let (module, transport) = scripted_module(ModuleKind::Esp32);
    transport.add_response(MockedCommand::ok(b"AT+CWMODE=1\r\n", &[]));
    transport.add_response(MockedCommand::error(b"AT+CWJAP=\"test_wifi\",\"secret\"\r\n", &[]));

    let result = block_on(module.join("test_wifi", "secret"));
    assert_eq!(Error::ConnectError(AtError::Error), result.unwrap_err());
}

#[test]
fn test_join_ssid_too_long() {
    let (module, transport) = scripted_module(ModuleKind::Esp32);

    let result = block_on(module.join("an_ssid_which_is_longer_than_32_chars", "secret"));
    assert_eq!(Error::InvalidArgument, result.unwrap_err());
    assert!(transport.get_commands_as_strings().is_empty());
}

#[test]
fn test_resolve_rejects_unusable_address() {
    let (module, transport) = scripted_module(ModuleKind::Esp32);
    transport.add_response(MockedCommand::response(
        b"AT+CIPDOMAIN=\"localhost\"\r\n",
        b"+CIPDOMAIN:\"127.0.0.1\"\r\n",
        &[],
    ));

    let result = block_on(module.resolve("localhost"));
    assert_eq!(Error::ResolveError(AtError::InvalidResponse), result.unwrap_err());
}

#[test]
fn test_firmware_version() {
    let (module, transport) = scripted_module(ModuleKind::Esp32);
    transport.add_response(MockedCommand::response(
        b"AT+GMR\r\n",
        b"AT version:2.2.0.0(c6fa6bf - ESP32 - Jul  2 2021 06:44:05)\r\nSDK version:v4.2.2-76-gefa6eca\r\n",
        &[],
    ));

    let version = block_on(module.get_firmware_version()).unwrap();
    assert_eq!(
        "2.2.0.0(c6fa6bf - ESP32 - Jul  2 2021 06:44:05)".to_string(),
        version.as_str().to_string()
    );
}

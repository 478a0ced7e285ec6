use crate::module::Module;
use crate::netconn::{ConnState, ConnType};
use crate::tests::mock::{scripted_module, test_config, MockedCommand, ScriptedTransport};
use crate::urc::{argument, drain, Urc, UrcHandler};
use crate::ModuleKind;
use alloc::boxed::Box;
use core::net::SocketAddr;
use core::str::FromStr;
use embassy_futures::block_on;
use embassy_time::Duration;

fn connected_esp(config_payload_size: usize) -> (Module, ScriptedTransport) {
    let transport = ScriptedTransport::new();
    let config = test_config().with_max_payload_size(config_payload_size);
    let module = Module::new("wifi0", "uart0", Box::new(transport.clone()), ModuleKind::Esp32.driver(), config).unwrap();

    transport.add_response(MockedCommand::response(b"AT+CIPSTATUS\r\n", b"STATUS:2\r\n", &[]));
    transport.add_response(MockedCommand::ok(b"AT+CIPSTART=0,\"TCP\",\"10.0.0.1\",21\r\n", &[]));

    let connection = block_on(module.create(ConnType::Tcp)).unwrap();
    block_on(module.connect(&connection, SocketAddr::from_str("10.0.0.1:21").unwrap())).unwrap();
    (module, transport)
}

fn decode_any(_line: &str) -> Option<Urc> {
    Some(Urc::Ready)
}

#[test]
fn test_handler_matches_prefix_and_suffix() {
    let handler = UrcHandler::new("+IPD,", ":", decode_any);

    assert!(handler.matches("+IPD,0,5:"));
    assert!(!handler.matches("+IPD,0,5"));
    assert!(!handler.matches("IPD,0,5:"));
}

#[test]
fn test_handler_suffix_only() {
    let handler = UrcHandler::new("", ",CLOSED", decode_any);

    assert!(handler.matches("4,CLOSED"));
    assert!(!handler.matches("CLOSED"));
    assert!(!handler.matches("4,CONNECT"));
}

#[test]
fn test_argument() {
    assert_eq!(Some(3), argument::<u8>("3,\"TCP\",565", 0));
    assert_eq!(Some(565), argument::<u16>(" 3, 565", 1));
    assert_eq!(None, argument::<u16>("3", 1));
    assert_eq!(None, argument::<u16>("3,abc", 1));
}

#[test]
fn test_unknown_line_not_handled() {
    let (module, _) = scripted_module(ModuleKind::Esp32);
    let mut raw: &[u8] = b"";

    assert!(!block_on(module.handle_urc(b"+CWLAP:(3,\"test\")\r\n", &mut raw)));
    assert!(!block_on(module.handle_urc(&[0xff, 0xfe, b'\r', b'\n'], &mut raw)));
}

#[test]
fn test_matching_line_without_information() {
    let (module, _) = scripted_module(ModuleKind::Esp32);
    let mut raw: &[u8] = b"";

    assert!(block_on(module.handle_urc(b"0,CONNECT\r\n", &mut raw)));
    assert!(block_on(module.handle_urc(b"Recv 5 bytes\r\n", &mut raw)));
}

#[test]
fn test_payload_consumed_exactly() {
    let (module, _) = connected_esp(4096);
    let mut raw: &[u8] = b"hello\r\nSEND OK\r\n";

    assert!(block_on(module.handle_urc(b"+IPD,0,5:", &mut raw)));

    assert_eq!(b"\r\nSEND OK\r\n", raw);
    assert_eq!(1, module.pool.queued(0));
}

#[test]
fn test_oversize_payload_drained_and_discarded() {
    let (module, _) = connected_esp(4);
    let mut raw: &[u8] = b"0123456789abcdefgh\r\n";

    assert!(block_on(module.handle_urc(b"+IPD,0,18:", &mut raw)));

    assert_eq!(b"\r\n", raw);
    assert_eq!(0, module.pool.queued(0));
    assert_eq!(ConnState::Connected, module.pool.state(0));
}

#[test]
fn test_truncated_payload_dropped() {
    let (module, _) = connected_esp(4096);
    let mut raw: &[u8] = b"abc";

    assert!(block_on(module.handle_urc(b"+IPD,0,5:", &mut raw)));
    assert_eq!(0, module.pool.queued(0));
}

#[test]
fn test_data_queue_full_drops_chunk() {
    let (module, _) = connected_esp(4096);

    for _ in 0..6 {
        let mut raw: &[u8] = b"x";
        block_on(module.handle_urc(b"+IPD,0,1:", &mut raw));
    }

    assert_eq!(crate::netconn::DATA_QUEUE_DEPTH, module.pool.queued(0));
}

#[test]
fn test_drain_stops_at_end_of_stream() {
    let mut raw: &[u8] = b"abc";

    assert_eq!(3, block_on(drain(&mut raw, 10, Duration::from_millis(10))));
    assert!(raw.is_empty());
}

#[test]
fn test_drain_in_chunks() {
    let mut raw: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    assert_eq!(20, block_on(drain(&mut raw, 20, Duration::from_millis(10))));
    assert_eq!(b"klmnopqrstuvwxyz", raw);
}

#[test]
fn test_ready_without_waiter() {
    let (module, _) = scripted_module(ModuleKind::Ec200x);
    let mut raw: &[u8] = b"";

    assert!(block_on(module.handle_urc(b"RDY\r\n", &mut raw)));
    assert!(module.is_ready());
}

#[test]
fn test_stale_send_result_discarded() {
    let (module, _) = connected_esp(4096);
    let mut raw: &[u8] = b"";

    assert!(block_on(module.handle_urc(b"SEND OK\r\n", &mut raw)));
    assert_eq!(0, module.correlator.armed_count());
}

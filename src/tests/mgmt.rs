use crate::correlation::EventKind;
use crate::error::Error;
use crate::mgmt::{classify_event, MgmtConfig, MgmtEvent, MgmtValue, NmiConfig, NotifyRequest, ObjectSpec};
use crate::tests::mock::{deliver_urcs, run, scripted_module, MockedCommand, UrcMessage};
use crate::ModuleKind;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use atat::Error as AtError;
use core::cell::RefCell;
use core::str::FromStr;
use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

type Events = Arc<Mutex<CriticalSectionRawMutex, RefCell<Vec<MgmtEvent>>>>;

fn record_events(module: &crate::module::Module) -> Events {
    let events: Events = Arc::new(Mutex::new(RefCell::new(Vec::new())));
    let sink = events.clone();

    module.set_mgmt_listener(Some(Arc::new(move |event: &MgmtEvent| {
        sink.lock(|events| events.borrow_mut().push(event.clone()));
    })));

    events
}

fn recorded(events: &Events) -> Vec<MgmtEvent> {
    events.lock(|events| events.borrow().clone())
}

fn temperature(ack_id: Option<u16>) -> NotifyRequest {
    NotifyRequest {
        message_id: 1,
        object_id: 3303,
        instance_id: 0,
        resource_id: 5700,
        value: MgmtValue::Float(21.5),
        index: 0,
        flag: 0,
        ack_id,
    }
}

#[test]
fn test_classify_event() {
    assert_eq!(Some((EventKind::Register, true)), classify_event(6));
    assert_eq!(Some((EventKind::Register, false)), classify_event(7));
    assert_eq!(Some((EventKind::Register, false)), classify_event(8));
    assert_eq!(Some((EventKind::Update, true)), classify_event(11));
    assert_eq!(Some((EventKind::Update, false)), classify_event(13));
    assert_eq!(Some((EventKind::Notify, true)), classify_event(26));
    assert_eq!(Some((EventKind::Notify, false)), classify_event(25));
    assert_eq!(None, classify_event(1));
    assert_eq!(None, classify_event(15));
}

#[test]
fn test_value_encoding() {
    let mut out = String::new();
    MgmtValue::Opaque(vec![0x0a, 0xff]).write_to(&mut out).unwrap();
    assert_eq!("\"0AFF\"", out);

    let mut out = String::new();
    MgmtValue::Boolean(false).write_to(&mut out).unwrap();
    assert_eq!("0", out);

    let text = MgmtValue::Text(heapless::String::from_str("abc").unwrap());
    assert_eq!(3, text.length());
    assert_eq!(1, text.type_code());
    assert_eq!(8, MgmtValue::Integer(1).length());
}

#[test]
fn test_config() {
    let (module, transport) = scripted_module(ModuleKind::M5311);
    transport.add_response(MockedCommand::ok(b"AT+MIPLCONFIG=0,\"10.0.0.1\",5683\r\n", &[]));
    transport.add_response(MockedCommand::response(
        b"AT+MIPLCONFIG?\r\n",
        b"+MIPLCONFIG:0,\"10.0.0.1\",5683\r\n",
        &[],
    ));

    let config = MgmtConfig {
        bootstrap: false,
        server: heapless::String::from_str("10.0.0.1").unwrap(),
        port: 5683,
    };

    block_on(module.mgmt_set_config(&config)).unwrap();
    assert_eq!(config, block_on(module.mgmt_get_config()).unwrap());
}

#[test]
fn test_create_session() {
    let (module, transport) = scripted_module(ModuleKind::M5311);
    transport.add_response(MockedCommand::response(b"AT+MIPLCREATE\r\n", b"+MIPLCREATE:0\r\n", &[]));
    transport.add_response(MockedCommand::ok(b"AT+MIPLADDOBJ=0,3303,1,\"1\",1,0\r\n", &[]));
    transport.add_response(MockedCommand::ok(b"AT+MIPLNMI=0,1,0\r\n", &[]));
    transport.add_response(MockedCommand::response(b"AT+MIPLNMI?\r\n", b"+MIPLNMI:0,1,0\r\n", &[]));
    transport.add_response(MockedCommand::ok(b"AT+MIPLDELETE=0\r\n", &[]));

    let session = block_on(module.create_session()).unwrap();
    assert_eq!(0, session.reference());

    let object = ObjectSpec {
        object_id: 3303,
        instance_count: 1,
        instance_bitmap: heapless::String::from_str("1").unwrap(),
        attribute_count: 1,
        action_count: 0,
    };
    block_on(session.add_object(&object)).unwrap();

    let nmi = NmiConfig { nnmi: 1, nsmi: 0 };
    block_on(session.set_nmi(nmi)).unwrap();
    assert_eq!(nmi, block_on(session.get_nmi()).unwrap());

    block_on(session.delete()).unwrap();
    transport.assert_all_cmds_sent();
}

#[test]
fn test_create_session_error() {
    let (module, transport) = scripted_module(ModuleKind::M5311);
    transport.add_response(MockedCommand::error(b"AT+MIPLCREATE\r\n", &[]));

    let result = block_on(module.create_session());
    assert_eq!(Error::Transport(AtError::Error), result.err().unwrap());
}

#[test]
fn test_open_success() {
    let (module, transport) = scripted_module(ModuleKind::M5311);
    transport.add_response(MockedCommand::ok(
        b"AT+MIPLOPEN=0,3600,30\r\n",
        &[
            UrcMessage::line(b"+MIPLEVENT:0,1\r\n"),
            UrcMessage::line(b"+MIPLEVENT:0,2\r\n"),
            UrcMessage::line(b"+MIPLEVENT:0,6\r\n"),
        ],
    ));
    let events = record_events(&module);

    let session = module.session(0);
    run(&module, &transport, session.open(3600, 30)).unwrap();

    // Bootstrap progress is passed to the listener
    assert_eq!(2, recorded(&events).len());
    assert_eq!(0, module.correlator.armed_count());
}

#[test]
fn test_open_register_failed() {
    let (module, transport) = scripted_module(ModuleKind::M5311);
    transport.add_response(MockedCommand::ok(
        b"AT+MIPLOPEN=0,3600,30\r\n",
        &[UrcMessage::line(b"+MIPLEVENT:0,7\r\n")],
    ));

    let result = run(&module, &transport, module.session(0).open(3600, 30));
    assert_eq!(Error::ManagementEvent(7), result.unwrap_err());
}

#[test]
fn test_open_timeout() {
    let (module, transport) = scripted_module(ModuleKind::M5311);
    transport.add_response(MockedCommand::ok(b"AT+MIPLOPEN=0,3600,30\r\n", &[]));

    let result = run(&module, &transport, module.session(0).open(3600, 30));
    assert_eq!(Error::Timeout, result.unwrap_err());
    assert_eq!(0, module.correlator.armed_count());
}

#[test]
fn test_open_command_error() {
    let (module, transport) = scripted_module(ModuleKind::M5311);
    transport.add_response(MockedCommand::error(b"AT+MIPLOPEN=0,3600,30\r\n", &[]));

    let result = run(&module, &transport, module.session(0).open(3600, 30));
    assert_eq!(Error::ManagementError(AtError::Error), result.unwrap_err());
    assert_eq!(0, module.correlator.armed_count());
}

#[test]
fn test_open_other_session_event_ignored() {
    let (module, transport) = scripted_module(ModuleKind::M5311);
    transport.add_response(MockedCommand::ok(
        b"AT+MIPLOPEN=0,3600,30\r\n",
        &[UrcMessage::line(b"+MIPLEVENT:1,6\r\n")],
    ));
    let events = record_events(&module);

    let result = run(&module, &transport, module.session(0).open(3600, 30));
    assert_eq!(Error::Timeout, result.unwrap_err());

    assert_eq!(
        vec![MgmtEvent::Event {
            reference: 1,
            code: 6,
            message_id: None
        }],
        recorded(&events)
    );
}

#[test]
fn test_notify_acknowledged() {
    let (module, transport) = scripted_module(ModuleKind::M5311);
    transport.add_response(MockedCommand::ok(
        b"AT+MIPLNOTIFY=0,1,3303,0,5700,4,8,21.5,0,0,5\r\n",
        &[UrcMessage::line(b"+MIPLEVENT:0,26,5\r\n")],
    ));

    run(&module, &transport, module.session(0).notify(&temperature(Some(5)))).unwrap();
    transport.assert_all_cmds_sent();
}

#[test]
fn test_notify_ack_id_mismatch() {
    let (module, transport) = scripted_module(ModuleKind::M5311);
    transport.add_response(MockedCommand::ok(
        b"AT+MIPLNOTIFY=0,1,3303,0,5700,4,8,21.5,0,0,5\r\n",
        &[UrcMessage::line(b"+MIPLEVENT:0,26,4\r\n")],
    ));

    let result = run(&module, &transport, module.session(0).notify(&temperature(Some(5))));
    assert_eq!(Error::MessageIdMismatch, result.unwrap_err());
}

#[test]
fn test_notify_failed() {
    let (module, transport) = scripted_module(ModuleKind::M5311);
    transport.add_response(MockedCommand::ok(
        b"AT+MIPLNOTIFY=0,1,3303,0,5700,4,8,21.5,0,0,5\r\n",
        &[UrcMessage::line(b"+MIPLEVENT:0,25,5\r\n")],
    ));

    let result = run(&module, &transport, module.session(0).notify(&temperature(Some(5))));
    assert_eq!(Error::ManagementEvent(25), result.unwrap_err());
}

#[test]
fn test_notify_without_ack() {
    let (module, transport) = scripted_module(ModuleKind::M5311);
    transport.add_response(MockedCommand::ok(b"AT+MIPLNOTIFY=0,1,3303,0,5700,4,8,21.5,0,0\r\n", &[]));

    block_on(module.session(0).notify(&temperature(None))).unwrap();
    assert_eq!(0, module.correlator.armed_count());
}

#[test]
fn test_update() {
    let (module, transport) = scripted_module(ModuleKind::M5311);
    transport.add_response(MockedCommand::ok(
        b"AT+MIPLUPDATE=0,7200,0\r\n",
        &[UrcMessage::line(b"+MIPLEVENT:0,11\r\n")],
    ));
    transport.add_response(MockedCommand::ok(
        b"AT+MIPLUPDATE=0,7200,1\r\n",
        &[UrcMessage::line(b"+MIPLEVENT:0,12\r\n")],
    ));

    let session = module.session(0);
    run(&module, &transport, session.update(7200, false)).unwrap();

    let result = run(&module, &transport, session.update(7200, true));
    assert_eq!(Error::ManagementEvent(12), result.unwrap_err());
}

#[test]
fn test_platform_requests_passed_to_listener() {
    let (module, transport) = scripted_module(ModuleKind::M5311);
    let events = record_events(&module);

    transport.publish_urc(UrcMessage::line(b"+MIPLREAD:0,1234,3303,0,-1\r\n"));
    transport.publish_urc(UrcMessage::line(b"+MIPLOBSERVE:0,1235,1,3303,0,-1\r\n"));
    transport.publish_urc(UrcMessage::line(b"+MIPLDISCOVER:0,1236,3303\r\n"));
    transport.publish_urc(UrcMessage::line(b"+MIPLEVENT:0,14\r\n"));
    deliver_urcs(&module, &transport);

    assert_eq!(
        vec![
            MgmtEvent::Read {
                reference: 0,
                message_id: 1234,
                object_id: 3303,
                instance_id: 0,
                resource_id: -1,
            },
            MgmtEvent::Observe {
                reference: 0,
                message_id: 1235,
                observe: true,
                object_id: 3303,
                instance_id: 0,
                resource_id: -1,
            },
            MgmtEvent::Discover {
                reference: 0,
                message_id: 1236,
                object_id: 3303,
            },
            MgmtEvent::Event {
                reference: 0,
                code: 14,
                message_id: None,
            },
        ],
        recorded(&events)
    );
}

#[test]
fn test_write_request_and_response() {
    let (module, transport) = scripted_module(ModuleKind::M5311);
    transport.add_response(MockedCommand::ok(b"AT+MIPLWRITERSP=0,65,2\r\n", &[]));
    let events = record_events(&module);

    transport.publish_urc(UrcMessage::line(b"+MIPLWRITE:0,65,3303,0,5750,2,2,CAFE,0,0\r\n"));
    deliver_urcs(&module, &transport);

    let recorded = recorded(&events);
    let MgmtEvent::Write(request) = &recorded[0] else {
        panic!("Unexpected event {:?}", recorded[0]);
    };
    assert_eq!(vec![0xca, 0xfe], request.value);

    block_on(module.session(0).write_response(request.message_id, 2)).unwrap();
    transport.assert_all_cmds_sent();
}

#[test]
fn test_discover_response() {
    let (module, transport) = scripted_module(ModuleKind::M5311);
    transport.add_response(MockedCommand::ok(b"AT+MIPLDISCOVERRSP=0,1236,1,4,\"5700\"\r\n", &[]));

    let response = crate::mgmt::DiscoverResponse {
        message_id: 1236,
        result: 1,
        resources: heapless::String::from_str("5700").unwrap(),
    };
    block_on(module.session(0).discover_response(&response)).unwrap();
    transport.assert_all_cmds_sent();
}

#[test]
fn test_unsupported_module() {
    let (module, transport) = scripted_module(ModuleKind::Esp32);

    let result = block_on(module.session(0).open(3600, 30));
    assert_eq!(Error::NotSupported, result.unwrap_err());
    assert!(transport.get_commands_as_strings().is_empty());
}

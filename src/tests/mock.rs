use crate::capability::{Capabilities, Driver};
use crate::config::Config;
use crate::drivers::ModuleKind;
use crate::module::Module;
use crate::transport::{ResponseExpectation, Transport};
use crate::urc::UrcHandler;
use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use async_trait::async_trait;
use atat::Error as AtError;
use core::cell::RefCell;
use core::future::Future;
use embassy_futures::block_on;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_time::Duration;

/// URC line followed by raw bytes (e.g. the payload announced by "+IPD,0,5:")
#[derive(Clone, Copy, Debug)]
pub struct UrcMessage {
    pub line: &'static [u8],
    pub payload: &'static [u8],
}

impl UrcMessage {
    pub const fn line(line: &'static [u8]) -> Self {
        Self { line, payload: b"" }
    }

    pub const fn with_payload(line: &'static [u8], payload: &'static [u8]) -> Self {
        Self { line, payload }
    }
}

pub type UrcChannel = Channel<CriticalSectionRawMutex, UrcMessage, 32>;

/// Mocked command response + URC messages which get published after the command was executed
pub struct MockedCommand {
    /// Expected encoded command, not checked if None
    pub command: Option<&'static [u8]>,

    /// Response body or error
    pub response: Result<&'static [u8], AtError>,

    pub urc_messages: Vec<UrcMessage>,
}

impl MockedCommand {
    /// Command responded by OK without body
    pub fn ok(command: &'static [u8], urc_messages: &[UrcMessage]) -> Self {
        Self::response(command, b"", urc_messages)
    }

    pub fn response(command: &'static [u8], response: &'static [u8], urc_messages: &[UrcMessage]) -> Self {
        Self {
            command: Some(command),
            response: Ok(response),
            urc_messages: urc_messages.to_vec(),
        }
    }

    /// Command responded by ERROR
    pub fn error(command: &'static [u8], urc_messages: &[UrcMessage]) -> Self {
        Self {
            command: Some(command),
            response: Err(AtError::Error),
            urc_messages: urc_messages.to_vec(),
        }
    }
}

#[derive(Default)]
struct Script {
    /// Executed (encoded) commands
    commands: Vec<String>,

    /// Mocked responses which get returned in the same order as inserted
    responses: VecDeque<MockedCommand>,

    /// Payloads written by send_raw()
    raw: Vec<Vec<u8>>,
}

/// Transport returning scripted responses, shared between the module and the test
#[derive(Clone)]
pub struct ScriptedTransport {
    script: Arc<Mutex<CriticalSectionRawMutex, RefCell<Script>>>,
    urc: Arc<UrcChannel>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(RefCell::new(Script::default()))),
            urc: Arc::new(UrcChannel::new()),
        }
    }

    pub fn add_response(&self, command: MockedCommand) {
        self.script.lock(|script| script.borrow_mut().responses.push_back(command));
    }

    /// Publishes an URC message, independent of any command
    pub fn publish_urc(&self, message: UrcMessage) {
        self.urc.try_send(message).unwrap();
    }

    pub fn urc_channel(&self) -> Arc<UrcChannel> {
        self.urc.clone()
    }

    /// Returns a copy of the executed commands
    pub fn get_commands_as_strings(&self) -> Vec<String> {
        self.script.lock(|script| script.borrow().commands.clone())
    }

    /// Returns a copy of the raw payloads
    pub fn get_raw_data(&self) -> Vec<Vec<u8>> {
        self.script.lock(|script| script.borrow().raw.clone())
    }

    pub fn assert_all_cmds_sent(&self) {
        let remaining = self.script.lock(|script| script.borrow().responses.len());
        assert_eq!(0, remaining, "Not all mocked commands were executed");
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&mut self, command: &[u8], _expect: ResponseExpectation) -> Result<Vec<u8>, AtError> {
        let encoded = String::from_utf8(command.to_vec()).unwrap();

        let mocked = self.script.lock(|script| {
            let mut script = script.borrow_mut();
            script.commands.push(encoded.clone());
            script.responses.pop_front()
        });

        let mocked = mocked.unwrap_or_else(|| panic!("Unexpected command {:?}", encoded));
        if let Some(expected) = mocked.command {
            assert_eq!(String::from_utf8(expected.to_vec()).unwrap(), encoded);
        }

        for message in mocked.urc_messages {
            self.urc.try_send(message).unwrap();
        }

        mocked.response.map(|response| response.to_vec())
    }

    async fn send_raw(&mut self, data: &[u8]) -> Result<(), AtError> {
        self.script.lock(|script| script.borrow_mut().raw.push(data.to_vec()));
        Ok(())
    }
}

/// Config with short timeouts
pub fn test_config() -> Config {
    Config::default()
        .with_connect_timeout(Duration::from_millis(200))
        .with_send_timeout(Duration::from_millis(200))
        .with_dns_timeout(Duration::from_millis(200))
        .with_ready_timeout(Duration::from_millis(200))
        .with_management_timeout(Duration::from_millis(200))
        .with_queue_push_timeout(Duration::from_millis(200))
}

/// Creates a module of the given kind on a new scripted transport
pub fn scripted_module(kind: ModuleKind) -> (Module, ScriptedTransport) {
    let transport = ScriptedTransport::new();
    let module = Module::new("test", "uart0", Box::new(transport.clone()), kind.driver(), test_config()).unwrap();
    (module, transport)
}

/// Driver without any domain
pub struct BareDriver;

static BARE_DRIVER: BareDriver = BareDriver;

#[async_trait]
impl Driver for BareDriver {
    fn vendor(&self) -> &'static str {
        "bare"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            general: None,
            netserv: None,
            netconn: None,
            wifi: None,
            mgmt: None,
        }
    }

    fn urc_handlers(&self) -> &'static [UrcHandler] {
        &[]
    }
}

pub fn bare_module() -> (Module, ScriptedTransport) {
    let transport = ScriptedTransport::new();
    let module = Module::new("bare", "uart0", Box::new(transport.clone()), &BARE_DRIVER, test_config()).unwrap();
    (module, transport)
}

/// Runs the operation while the published URCs get dispatched to the module
pub fn run<F: Future>(module: &Module, transport: &ScriptedTransport, operation: F) -> F::Output {
    let channel = transport.urc_channel();

    block_on(async {
        match select(operation, pump(module, &channel)).await {
            Either::First(output) => output,
            Either::Second(_) => unreachable!(),
        }
    })
}

/// Dispatches all pending URCs
pub fn deliver_urcs(module: &Module, transport: &ScriptedTransport) {
    let channel = transport.urc_channel();

    block_on(async {
        while let Ok(message) = channel.try_receive() {
            let mut payload = message.payload;
            module.handle_urc(message.line, &mut payload).await;
        }
    })
}

async fn pump(module: &Module, channel: &UrcChannel) {
    loop {
        let message = channel.receive().await;
        let mut payload = message.payload;
        module.handle_urc(message.line, &mut payload).await;
    }
}

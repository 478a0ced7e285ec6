//! # Transport seam
//!
//! The AT transport tokenizes lines, matches response terminators and routes unsolicited lines. It is owned
//! exclusively by one [Module](crate::module::Module) and only accessed while holding the module's command lock,
//! so at most one command is in flight at any time.
//!
//! Unsolicited lines are not pushed through this trait. The reception task of the transport asks the module for its
//! [UrcHandler](crate::urc::UrcHandler) table and calls [Module::handle_urc](crate::module::Module::handle_urc) for
//! every matching line, handing over the byte stream for length-prefixed payloads.
use alloc::boxed::Box;
use alloc::vec::Vec;
use async_trait::async_trait;
use atat::Error as AtError;
use embassy_time::Duration;

/// Expected shape of a command response
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResponseExpectation {
    /// Max. response size in bytes
    pub buffer_size: usize,

    /// Number of lines to collect. 0 means until the final result code (OK/ERROR).
    pub line_count: usize,

    /// Max. time waiting for the response
    pub timeout: Duration,

    /// Response is complete once this byte arrived, e.g. the '>' prompt of send commands
    pub prompt: Option<u8>,
}

impl ResponseExpectation {
    pub const DEFAULT_BUFFER_SIZE: usize = 256;

    pub const fn new(timeout: Duration) -> Self {
        Self {
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
            line_count: 0,
            timeout,
            prompt: None,
        }
    }

    pub const fn from_millis(timeout_ms: u32) -> Self {
        Self::new(Duration::from_millis(timeout_ms as u64))
    }

    pub const fn with_line_count(mut self, line_count: usize) -> Self {
        self.line_count = line_count;
        self
    }

    pub const fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub const fn with_prompt(mut self, prompt: u8) -> Self {
        self.prompt = Some(prompt);
        self
    }
}

/// Line oriented AT command transport
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send {
    /// Executes a single encoded command and returns the response body without the final result code
    async fn execute(&mut self, command: &[u8], expect: ResponseExpectation) -> Result<Vec<u8>, AtError>;

    /// Writes payload bytes after a command solicited them
    async fn send_raw(&mut self, data: &[u8]) -> Result<(), AtError>;
}

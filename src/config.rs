use embassy_time::Duration;

/// Timeouts and limits of a module instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Max. time waiting for the open result of a connection
    pub connect_timeout: Duration,

    /// Max. time waiting for the confirmation of a single send fragment
    pub send_timeout: Duration,

    /// Max. time waiting for hostname resolution
    pub dns_timeout: Duration,

    /// Max. time of the close command
    pub close_timeout: Duration,

    /// Max. time waiting for the ready message after a restart
    pub ready_timeout: Duration,

    /// Max. time waiting for device management events (register, notify ack, update)
    pub management_timeout: Duration,

    /// Max. time the reception path waits for space in a full data queue before dropping the chunk
    pub queue_push_timeout: Duration,

    /// Inbound payloads larger than this get drained from the transport and discarded
    pub max_payload_size: usize,

    /// Lower bound of the raw payload read timeout. The effective timeout is max(len ms, this value).
    pub min_raw_read_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(60),
            send_timeout: Duration::from_secs(10),
            dns_timeout: Duration::from_secs(60),
            close_timeout: Duration::from_secs(5),
            ready_timeout: Duration::from_secs(5),
            management_timeout: Duration::from_secs(30),
            queue_push_timeout: Duration::from_secs(1),
            max_payload_size: 4096,
            min_raw_read_timeout: Duration::from_millis(10),
        }
    }
}

impl Config {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_dns_timeout(mut self, timeout: Duration) -> Self {
        self.dns_timeout = timeout;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_management_timeout(mut self, timeout: Duration) -> Self {
        self.management_timeout = timeout;
        self
    }

    pub fn with_queue_push_timeout(mut self, timeout: Duration) -> Self {
        self.queue_push_timeout = timeout;
        self
    }

    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    pub fn with_min_raw_read_timeout(mut self, timeout: Duration) -> Self {
        self.min_raw_read_timeout = timeout;
        self
    }

    /// Timeout for reading a raw payload of the given length
    pub(crate) fn raw_read_timeout(&self, len: usize) -> Duration {
        let by_length = Duration::from_millis(len as u64);
        if by_length > self.min_raw_read_timeout {
            by_length
        } else {
            self.min_raw_read_timeout
        }
    }
}

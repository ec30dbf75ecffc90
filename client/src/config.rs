use std::time::Duration;

/// Per-dispatcher settings.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// How long each request waits for its response.
    pub timeout: Duration,
    /// How long a partially received split response is kept.
    pub reassembly_expiry: Duration,
    /// Receive buffer; datagrams longer than this are truncated by the OS.
    pub recv_buffer_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            reassembly_expiry: Duration::from_millis(1000),
            recv_buffer_size: 4096,
        }
    }
}

impl QueryConfig {
    /// Sets the default per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how long an incomplete split response is kept.
    pub fn with_reassembly_expiry(mut self, expiry: Duration) -> Self {
        self.reassembly_expiry = expiry;
        self
    }

    /// Sets the size of the datagram receive buffer.
    pub fn with_recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }
}

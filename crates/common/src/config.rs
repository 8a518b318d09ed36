use std::time::Duration;

/// Tunables for the object-store HTTP client, threaded in by value rather than
/// read from a global.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// TCP connect / dial timeout. Default 2s.
    pub dial_timeout: Duration,
    /// Time to receive the response headers. Default 60s.
    pub response_header_timeout: Duration,
    /// Time to read each chunk of the response body once headers arrive. Default 5s.
    pub read_timeout: Duration,
    /// Max idle connections kept open per host. Default ≈5.
    pub idle_connections_per_host: usize,
    /// How many times a request whose body is rewindable is retried on 500/503.
    /// Exactly once.
    pub retry_count: u32,
    /// Whether `URL::reader` rejects a response whose `Last-Modified` predates the
    /// blob's recorded `Info::last_modified`. Off by default.
    pub check_last_modified: bool,
    /// `targetBytes` default for `Compressed::split`. 100 MiB.
    pub split_size: u64,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(2),
            response_header_timeout: Duration::from_secs(60),
            read_timeout: Duration::from_secs(5),
            idle_connections_per_host: 5,
            retry_count: 1,
            check_last_modified: false,
            split_size: 100 << 20,
        }
    }
}

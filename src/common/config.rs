// Configuration types and parsing

use std::path::PathBuf;
use std::time::Duration;
use crate::common::error::{Error, Result};
use crate::common::types::{
    ACCEPT_POLL_INTERVAL, DEFAULT_BIND_ADDR, DEFAULT_CLIENT_DIR, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_ROOT_DIR,
};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub root_dir: PathBuf,
    /// `None` runs one thread per connection; `Some(n)` uses a fixed pool.
    pub workers: Option<usize>,
    /// Serialize the rename step of concurrent PUTs to the same name.
    pub serialize_writes: bool,
    pub poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
            workers: None,
            serialize_writes: false,
            poll_interval: ACCEPT_POLL_INTERVAL,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: impl Into<String>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            root_dir: root_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Fixed pool with one worker per CPU
    pub fn with_cpu_workers(self) -> Self {
        self.with_workers(num_cpus::get().max(1))
    }

    pub fn with_serialized_writes(mut self, enabled: bool) -> Self {
        self.serialize_writes = enabled;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.bind_addr.trim().is_empty() {
            return Err(Error::ConfigError("bind address must not be empty".to_string()));
        }
        if self.workers == Some(0) {
            return Err(Error::ConfigError("worker pool size must be at least 1".to_string()));
        }
        if self.root_dir.exists() && !self.root_dir.is_dir() {
            return Err(Error::ConfigError(format!(
                "root {:?} exists but is not a directory",
                self.root_dir
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    pub local_dir: PathBuf,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_BIND_ADDR.to_string(),
            local_dir: PathBuf::from(DEFAULT_CLIENT_DIR),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            ..Default::default()
        }
    }

    pub fn with_local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_dir = dir.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

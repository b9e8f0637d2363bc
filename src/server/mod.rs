// Server module - TCP acceptor and per-connection sessions

mod session;
mod spawner;
mod transfer;

pub use session::{run_session, ServerSession, SessionEnd, SessionState, SessionSummary};
pub use spawner::{Job, SessionSpawner, ThreadPerConnection, WorkerPool};
pub use transfer::TransferManager;

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use crate::common::config::ServerConfig;
use crate::common::error::{Error, Result};
use crate::storage::FileStore;
use crate::transport::Connection;

/// Cloneable stop signal for a running [`Server`].
///
/// `shutdown` stops the acceptor, which then waits for open sessions to
/// end. `force` also cuts that wait short.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    forced: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop accepting; `run` returns once every session has ended
    pub fn shutdown(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Stop accepting and return without waiting for sessions
    pub fn force(&self) {
        self.forced.store(true, Ordering::SeqCst);
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn is_forced(&self) -> bool {
        self.forced.load(Ordering::SeqCst)
    }
}

/// Held by each dispatched session until its job is dropped
struct SessionGuard(Arc<AtomicUsize>);

impl SessionGuard {
    fn enter(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(active))
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Listening socket plus the shared store every session works against
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    store: Arc<FileStore>,
    spawner: Box<dyn SessionSpawner>,
    shutdown: ShutdownHandle,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Validate the config, open the store and bind the listener.
    ///
    /// Failing to bind is fatal and is returned to the caller.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let mut store = FileStore::open(&config.root_dir)?;
        if config.serialize_writes {
            store = store.with_write_locks();
        }

        let spawner: Box<dyn SessionSpawner> = match config.workers {
            Some(size) => Box::new(WorkerPool::new(size)?),
            None => Box::new(ThreadPerConnection),
        };

        let listener = TcpListener::bind(&config.bind_addr).map_err(|e| {
            Error::Io(io::Error::new(
                e.kind(),
                format!("failed to bind {}: {}", config.bind_addr, e),
            ))
        })?;
        // polled so a shutdown request is noticed without a wake-up connection
        listener.set_nonblocking(true)?;

        log::info!(
            "Server listening on {} (root {:?})",
            listener.local_addr()?,
            config.root_dir
        );

        Ok(Self {
            config,
            listener,
            store: Arc::new(store),
            spawner,
            shutdown: ShutdownHandle::new(),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Replace the spawn strategy chosen from the config
    pub fn with_spawner(mut self, spawner: impl SessionSpawner + 'static) -> Self {
        self.spawner = Box::new(spawner);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Sessions dispatched and not yet finished, including queued ones
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Accept connections until shutdown is requested, then wait for the
    /// sessions still open unless shutdown is forced.
    ///
    /// Each accepted stream is handed to the spawner and the loop goes
    /// straight back to accepting; it never waits on a session.
    pub fn run(self) -> Result<()> {
        while !self.shutdown.is_requested() {
            match self.listener.accept() {
                Ok((stream, peer)) => self.dispatch(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(self.config.poll_interval);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    // per-connection failures (e.g. reset before accept) are not fatal
                    log::warn!("Accept failed: {}", e);
                    thread::sleep(self.config.poll_interval);
                }
            }
        }

        let Server { config, listener, spawner, shutdown, active, .. } = self;
        drop(listener);
        log::info!("Server shutting down, no longer accepting connections");

        let mut reported = 0;
        loop {
            let open = active.load(Ordering::SeqCst);
            if open == 0 {
                break;
            }
            if shutdown.is_forced() {
                log::warn!("Forced shutdown with {} session(s) still open", open);
                break;
            }
            if open != reported {
                log::info!("Waiting for {} open session(s) to finish", open);
                reported = open;
            }
            thread::sleep(config.poll_interval);
        }

        drop(spawner);
        Ok(())
    }

    /// Run the acceptor on its own thread
    pub fn spawn(self) -> Result<RunningServer> {
        let addr = self.local_addr()?;
        let shutdown = self.shutdown_handle();
        let handle = thread::Builder::new()
            .name("ftpx-acceptor".to_string())
            .spawn(move || self.run())?;

        Ok(RunningServer { addr, shutdown, handle })
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        log::info!("Accepted connection from {}", peer);

        // accepted sockets may inherit the listener's non-blocking mode
        if let Err(e) = stream.set_nonblocking(false) {
            log::warn!("[{}] Dropping connection: {}", peer, e);
            return;
        }

        let store = Arc::clone(&self.store);
        let guard = SessionGuard::enter(&self.active);
        let job: Job = Box::new(move || {
            let _guard = guard;
            match Connection::from_tcp(stream) {
                Ok(connection) => {
                    run_session(connection, store);
                }
                Err(e) => log::warn!("[{}] Failed to set up connection: {}", peer, e),
            }
        });

        if let Err(e) = self.spawner.spawn(job) {
            log::error!("[{}] Could not start session: {}", peer, e);
        }
    }
}

/// Handle to a server running on a background thread
pub struct RunningServer {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    handle: JoinHandle<Result<()>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Stop accepting and wait for the acceptor, leaving open sessions
    /// to finish on their own
    pub fn stop(self) -> Result<()> {
        self.shutdown.force();
        self.join()
    }

    /// Wait for the acceptor to exit, which happens once shutdown has been
    /// requested and the open sessions have drained
    pub fn join(self) -> Result<()> {
        self.handle
            .join()
            .map_err(|_| Error::Protocol("acceptor thread panicked".to_string()))?
    }
}

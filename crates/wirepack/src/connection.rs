//! The connection engine: lifecycle state machine, read loop, and dispatch.
//!
//! One engine owns one TCP socket. [`enable`](ClientConnection::enable)
//! starts a dedicated read task that frames the byte stream into packages
//! (identifier → registry lookup → fixed or dynamic payload), decodes them
//! through their descriptors, and dispatches each entity to the registered
//! handlers — all serialized, in wire arrival order.
//!
//! # Lifecycle
//!
//! ```text
//! Active ──(unknown id | length out of bounds | i/o error | timeout |
//!           handler error | explicit disable | send failure)──▶ Dead
//! ```
//!
//! `Dead` is terminal. Every path into it funnels through
//! [`disable`](ClientConnection::disable), which releases the socket and
//! fires the disconnect handler exactly once; a new connection object is
//! required to reconnect.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, watch};
use wirepack_protocol::{ID_LENGTH, Package, PackageId, decode_length_prefix};

use crate::callbacks::{
    DisconnectHandler, HandlerError, ReceiveHandler, TimeoutHandler, UnknownPackageHandler,
};
use crate::{ClientConfig, ClientError, PackageRegistry};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a connection. [`Dead`](Self::Dead) is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The connection owns live resources and the read loop may run.
    Active,
    /// All resources have been released; the disconnect handler has fired.
    Dead,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Dead => write!(f, "Dead"),
        }
    }
}

const STATE_ACTIVE: u8 = 0;
const STATE_DEAD: u8 = 1;

/// Why the read loop stopped. Logging and the timeout hook key off this;
/// every variant ends in the same single `disable()`.
enum LoopExit {
    /// The state flipped to `Dead` under the loop (external disable, or a
    /// handler disabling its own connection).
    Disabled,
    /// An identifier could not be resolved; the stream can no longer be
    /// framed. Logged and reported at the detection site.
    UnknownPackage,
    /// A dynamic package declared a length outside the configured bound.
    /// Logged at the detection site.
    SizeMismatch,
    /// A read exceeded the configured timeout.
    TimedOut,
    /// The transport failed (includes the remote end closing the stream).
    Io(std::io::Error),
    /// A receive handler returned an error.
    Handler(HandlerError),
}

// ---------------------------------------------------------------------------
// ClientConnection
// ---------------------------------------------------------------------------

struct ConnectionInner {
    state: AtomicU8,
    peer: String,
    config: ClientConfig,
    registry: RwLock<Arc<PackageRegistry>>,
    /// Taken exactly once, by `enable()` (or dropped by `disable()` if the
    /// loop never started).
    reader: StdMutex<Option<OwnedReadHalf>>,
    /// Taken out by `disable()` under the same lock `send()` writes under,
    /// so a send never observes a mid-teardown stream.
    writer: Mutex<Option<OwnedWriteHalf>>,
    shutdown: watch::Sender<bool>,
    receive_handlers: RwLock<Vec<Arc<dyn ReceiveHandler>>>,
    unknown_package_handler: RwLock<Option<Arc<dyn UnknownPackageHandler>>>,
    timeout_handler: RwLock<Option<Arc<dyn TimeoutHandler>>>,
    disconnect_handler: RwLock<Option<Arc<dyn DisconnectHandler>>>,
}

/// A live connection to a remote peer.
///
/// Cheaply cloneable handle: clones share the same underlying connection.
/// `send`, `disable`, and handler registration may be called from any task;
/// the read loop runs on its own task started by [`enable`](Self::enable).
#[derive(Clone)]
pub struct ClientConnection {
    inner: Arc<ConnectionInner>,
}

impl ClientConnection {
    /// Wraps an already-open socket.
    ///
    /// The connection starts `Active` (taking the stream by value
    /// guarantees both halves exist) but does not read anything until
    /// [`enable`](Self::enable) is called.
    pub fn new(stream: TcpStream, registry: Arc<PackageRegistry>, config: ClientConfig) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        let (reader, writer) = stream.into_split();
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(ConnectionInner {
                state: AtomicU8::new(STATE_ACTIVE),
                peer,
                config,
                registry: RwLock::new(registry),
                reader: StdMutex::new(Some(reader)),
                writer: Mutex::new(Some(writer)),
                shutdown,
                receive_handlers: RwLock::new(Vec::new()),
                unknown_package_handler: RwLock::new(None),
                timeout_handler: RwLock::new(None),
                disconnect_handler: RwLock::new(None),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        match self.inner.state.load(Ordering::SeqCst) {
            STATE_ACTIVE => ConnectionState::Active,
            _ => ConnectionState::Dead,
        }
    }

    /// Returns `true` while the connection is `Active`.
    pub fn is_active(&self) -> bool {
        self.inner.state.load(Ordering::SeqCst) == STATE_ACTIVE
    }

    /// The remote peer address, as captured at construction.
    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    /// The registry this connection resolves identifiers against.
    pub fn registry(&self) -> Arc<PackageRegistry> {
        read_lock(&self.inner.registry).clone()
    }

    /// Replaces the registry.
    ///
    /// Only meaningful before [`enable`](Self::enable): the registry is
    /// treated as read-only while the connection is active, and swapping it
    /// mid-stream gives no guarantee about which registry frames the
    /// in-flight package.
    pub fn set_registry(&self, registry: Arc<PackageRegistry>) {
        *write_lock(&self.inner.registry) = registry;
    }

    /// Adds a global receive handler. Handlers fire in registration order.
    pub fn add_receive_handler(&self, handler: Arc<dyn ReceiveHandler>) {
        write_lock(&self.inner.receive_handlers).push(handler);
    }

    /// Sets the handler for unresolved identifiers (at most one).
    pub fn set_unknown_package_handler(&self, handler: Arc<dyn UnknownPackageHandler>) {
        *write_lock(&self.inner.unknown_package_handler) = Some(handler);
    }

    /// Sets the read-timeout handler (at most one).
    pub fn set_timeout_handler(&self, handler: Arc<dyn TimeoutHandler>) {
        *write_lock(&self.inner.timeout_handler) = Some(handler);
    }

    /// Sets the disconnect handler (at most one).
    pub fn set_disconnect_handler(&self, handler: Arc<dyn DisconnectHandler>) {
        *write_lock(&self.inner.disconnect_handler) = Some(handler);
    }

    // -----------------------------------------------------------------
    // Activation
    // -----------------------------------------------------------------

    /// Starts the read loop on its own task.
    ///
    /// A no-op if the connection is already `Dead` or already enabled (the
    /// reader half is taken exactly once). Once enabled, every faulty
    /// package — unknown identifier, out-of-bounds length, failed read —
    /// disables the connection; there is no resynchronization.
    pub fn enable(&self) {
        if !self.is_active() {
            return;
        }
        let Some(reader) = lock(&self.inner.reader).take() else {
            tracing::debug!(peer = %self.inner.peer, "enable called twice; read loop already running");
            return;
        };

        let connection = self.clone();
        let shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(connection.run(reader, shutdown));
        tracing::debug!(peer = %self.inner.peer, "connection enabled");
    }

    async fn run(self, mut reader: OwnedReadHalf, mut shutdown: watch::Receiver<bool>) {
        let exit = self.read_loop(&mut reader, &mut shutdown).await;
        drop(reader);

        match exit {
            LoopExit::Disabled | LoopExit::UnknownPackage | LoopExit::SizeMismatch => {}
            LoopExit::TimedOut => {
                let handler = read_lock(&self.inner.timeout_handler).clone();
                if let Some(handler) = handler {
                    if let Err(error) = handler.on_timeout(&self).await {
                        tracing::error!(
                            peer = %self.inner.peer,
                            %error,
                            "timeout handler failed; the connection will be closed regardless"
                        );
                    }
                }
                tracing::warn!(peer = %self.inner.peer, "connection timed out");
            }
            LoopExit::Io(error) => {
                // Stay quiet if the connection was already dead: the error
                // is just the echo of our own close.
                if self.is_active() {
                    tracing::error!(peer = %self.inner.peer, %error, "i/o failure on connection");
                }
            }
            LoopExit::Handler(error) => {
                tracing::error!(
                    peer = %self.inner.peer,
                    %error,
                    "receive handler failed; disabling connection"
                );
            }
        }

        self.disable().await;
    }

    // -----------------------------------------------------------------
    // Read loop
    // -----------------------------------------------------------------

    async fn read_loop(
        &self,
        reader: &mut OwnedReadHalf,
        shutdown: &mut watch::Receiver<bool>,
    ) -> LoopExit {
        loop {
            if !self.is_active() {
                return LoopExit::Disabled;
            }

            let mut raw_id = [0u8; ID_LENGTH];
            if let Err(exit) = self.read_frame(reader, &mut raw_id, shutdown).await {
                return exit;
            }

            let registry = self.registry();
            let Some(descriptor) = registry.lookup_bytes(raw_id) else {
                let id = PackageId::from_bytes(raw_id);
                tracing::error!(peer = %self.inner.peer, %id, "unknown package identifier");
                let handler = read_lock(&self.inner.unknown_package_handler).clone();
                if let Some(handler) = handler {
                    handler.on_unknown_package(raw_id, self).await;
                }
                return LoopExit::UnknownPackage;
            };

            let payload = if descriptor.is_dynamic() {
                let mut prefix = vec![0u8; usize::from(descriptor.declared_len())];
                if let Err(exit) = self.read_frame(reader, &mut prefix, shutdown).await {
                    return exit;
                }
                let length = decode_length_prefix(&prefix);
                // Unsigned interpretation: a prefix that would be negative
                // as a signed value lands far above the bound.
                if length >= self.inner.config.max_package_size as u64 {
                    tracing::error!(
                        peer = %self.inner.peer,
                        id = %descriptor.id(),
                        length,
                        max = self.inner.config.max_package_size,
                        "dynamic package length out of bounds"
                    );
                    return LoopExit::SizeMismatch;
                }
                let mut payload = vec![0u8; length as usize];
                if let Err(exit) = self.read_frame(reader, &mut payload, shutdown).await {
                    return exit;
                }
                payload
            } else {
                let mut payload = vec![0u8; usize::from(descriptor.declared_len())];
                if let Err(exit) = self.read_frame(reader, &mut payload, shutdown).await {
                    return exit;
                }
                payload
            };

            let package = descriptor.build(payload);
            tracing::trace!(
                peer = %self.inner.peer,
                id = %package.id,
                len = package.payload.len(),
                "received package"
            );

            let handlers = read_lock(&self.inner.receive_handlers).clone();
            for handler in &handlers {
                if let Err(error) = handler.on_receive(&package, self).await {
                    return LoopExit::Handler(error);
                }
            }
            if let Some(handler) = descriptor.handler() {
                if let Err(error) = handler.on_receive(&package, self).await {
                    return LoopExit::Handler(error);
                }
            }
            // A handler may have disabled the connection; the next
            // iteration's state check exits before another read.
        }
    }

    /// Reads exactly `buf.len()` bytes, bounded by the configured timeout
    /// and interruptible by `disable()`.
    async fn read_frame(
        &self,
        reader: &mut OwnedReadHalf,
        buf: &mut [u8],
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), LoopExit> {
        tokio::select! {
            _ = shutdown.changed() => Err(LoopExit::Disabled),
            result = read_exact_timed(reader, buf, self.inner.config.read_timeout) => result,
        }
    }

    // -----------------------------------------------------------------
    // Send path
    // -----------------------------------------------------------------

    /// Encodes and writes a package, then flushes.
    ///
    /// A no-op `Ok` if the write half is gone or the connection is not
    /// `Active`. A write failure disables the connection and returns the
    /// error.
    pub async fn send(&self, package: &Package) -> Result<(), ClientError> {
        let mut writer = self.inner.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Ok(());
        };
        if !self.is_active() {
            return Ok(());
        }

        let bytes = package.encode();
        let result = async {
            stream.write_all(&bytes).await?;
            stream.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                tracing::debug!(
                    peer = %self.inner.peer,
                    id = %package.id,
                    len = package.payload.len(),
                    "sent package"
                );
                Ok(())
            }
            Err(error) => {
                // Release the writer lock before disable() re-takes it.
                drop(writer);
                tracing::error!(peer = %self.inner.peer, %error, "send failed; disabling connection");
                self.disable().await;
                Err(ClientError::Io(error))
            }
        }
    }

    // -----------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------

    /// Drives the connection to `Dead`, releases the socket, and fires the
    /// disconnect handler.
    ///
    /// Idempotent: the atomic state swap elects exactly one caller to tear
    /// down; every other call returns immediately. The disconnect handler
    /// therefore fires exactly once, after resources are released.
    pub async fn disable(&self) {
        if self.inner.state.swap(STATE_DEAD, Ordering::SeqCst) == STATE_DEAD {
            return;
        }
        tracing::info!(peer = %self.inner.peer, "disabling connection");

        // Wake the read loop out of any blocking read.
        let _ = self.inner.shutdown.send(true);

        {
            let mut writer = self.inner.writer.lock().await;
            if let Some(mut stream) = writer.take() {
                // Shutdown errors are ignored: the stream may already be
                // closed by the failure that brought us here.
                let _ = stream.shutdown().await;
            }
        }
        drop(lock(&self.inner.reader).take());

        let handler = read_lock(&self.inner.disconnect_handler).clone();
        if let Some(handler) = handler {
            handler.on_disconnect(self).await;
        }
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("peer", &self.inner.peer)
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn read_exact_timed(
    reader: &mut OwnedReadHalf,
    buf: &mut [u8],
    limit: Option<Duration>,
) -> Result<(), LoopExit> {
    let result = match limit {
        Some(limit) => match tokio::time::timeout(limit, reader.read_exact(buf)).await {
            Ok(result) => result,
            Err(_elapsed) => return Err(LoopExit::TimedOut),
        },
        None => reader.read_exact(buf).await,
    };
    match result {
        Ok(_) => Ok(()),
        Err(error) => Err(LoopExit::Io(error)),
    }
}

// Handlers and registry slots are plain data: a lock poisoned by a panicking
// writer still holds a usable value, so recover instead of propagating.
fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(lock: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

// =========================================================================
// Tests
// =========================================================================

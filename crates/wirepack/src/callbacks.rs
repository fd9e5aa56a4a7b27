//! Handler traits — the extension points of the engine.
//!
//! Each trait is a single-method handler invoked from the connection's read
//! task, so invocations for one connection are always serialized: global
//! receive handlers fire in registration order, then the package type's own
//! handler, and across packages dispatch order equals wire arrival order.
//!
//! The traits are `async` so a handler can reply through the same
//! connection (`connection.send(...).await`) without blocking the runtime.
//! They are kept dyn-compatible via `async_trait` because the engine stores
//! them as trait objects.
//!
//! # Failure contract
//!
//! Handlers are trusted code, not sandboxed. An `Err` from a
//! [`ReceiveHandler`] propagates to the read loop and tears the connection
//! down — a connection is not expected to survive a misbehaving handler
//! mid-message. The one exception is [`TimeoutHandler`]: its error is
//! logged and swallowed, because the connection is being closed either way
//! and the teardown must not be derailed.

use async_trait::async_trait;
use wirepack_protocol::{ID_LENGTH, Package};

use crate::ClientConnection;

/// Error type a handler may surface to the engine.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Called for every successfully decoded package.
///
/// Registered globally on a connection (many, ordered) or on a single
/// package type via
/// [`PackageDescriptor::with_handler`](crate::PackageDescriptor::with_handler)
/// (at most one per type, invoked last).
#[async_trait]
pub trait ReceiveHandler: Send + Sync {
    /// Handles one decoded package.
    ///
    /// # Errors
    /// Returning `Err` disables the connection.
    async fn on_receive(
        &self,
        package: &Package,
        connection: &ClientConnection,
    ) -> Result<(), HandlerError>;
}

/// Called once when an identifier cannot be resolved in the registry.
///
/// Fired with the raw identifier bytes immediately before the connection is
/// disabled — after an unknown identifier the rest of the stream cannot be
/// framed, so there is no recovery.
#[async_trait]
pub trait UnknownPackageHandler: Send + Sync {
    /// Handles an unresolved identifier.
    async fn on_unknown_package(&self, raw_id: [u8; ID_LENGTH], connection: &ClientConnection);
}

/// Called once when a read exceeds the configured timeout.
///
/// Fired before the connection is disabled. Errors returned here are logged
/// and swallowed; the connection is closed regardless.
#[async_trait]
pub trait TimeoutHandler: Send + Sync {
    /// Handles a read timeout.
    ///
    /// # Errors
    /// The error is logged; it does not change the teardown.
    async fn on_timeout(&self, connection: &ClientConnection) -> Result<(), HandlerError>;
}

/// Called exactly once at the end of [`disable`](ClientConnection::disable),
/// after the connection's resources have been released.
#[async_trait]
pub trait DisconnectHandler: Send + Sync {
    /// Handles the connection going `Dead`.
    async fn on_disconnect(&self, connection: &ClientConnection);
}

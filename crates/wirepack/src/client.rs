//! The `Client` facade: opens the socket and wires up the connection engine.
//!
//! The facade is deliberately thin. It owns no protocol logic — it opens the
//! TCP stream, constructs a [`ClientConnection`] with the configured
//! registry, applies any handlers registered on the builder, and enables
//! the read loop. Everything after that is the engine's business.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use wirepack_protocol::Package;

use crate::callbacks::{
    DisconnectHandler, ReceiveHandler, TimeoutHandler, UnknownPackageHandler,
};
use crate::{ClientConfig, ClientConnection, ClientError, ConnectionState, PackageRegistry};

/// Builder for configuring and connecting a [`Client`].
///
/// # Example
///
/// ```rust,no_run
/// use wirepack::Client;
/// use std::time::Duration;
///
/// # async fn run() -> Result<(), wirepack::ClientError> {
/// let client = Client::builder()
///     .address("127.0.0.1:7400")
///     .read_timeout(Duration::from_secs(30))
///     .connect()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    address: String,
    config: ClientConfig,
    registry: Option<Arc<PackageRegistry>>,
    receive_handlers: Vec<Arc<dyn ReceiveHandler>>,
    unknown_package_handler: Option<Arc<dyn UnknownPackageHandler>>,
    timeout_handler: Option<Arc<dyn TimeoutHandler>>,
    disconnect_handler: Option<Arc<dyn DisconnectHandler>>,
}

impl ClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            address: "127.0.0.1:7400".to_string(),
            config: ClientConfig::default(),
            registry: None,
            receive_handlers: Vec::new(),
            unknown_package_handler: None,
            timeout_handler: None,
            disconnect_handler: None,
        }
    }

    /// Sets the remote address (`host:port`) to connect to.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Replaces the whole connection configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the exclusive upper bound on dynamic package lengths.
    pub fn max_package_size(mut self, size: usize) -> Self {
        self.config.max_package_size = size;
        self
    }

    /// Bounds each blocking read; an exceeded wait times the connection out.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = Some(timeout);
        self
    }

    /// Uses a custom registry instead of the standard package set.
    pub fn registry(mut self, registry: Arc<PackageRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Adds a global receive handler (invocation order = registration
    /// order). Registering here, before the socket is opened, guarantees no
    /// package can arrive ahead of the handler.
    pub fn on_receive(mut self, handler: Arc<dyn ReceiveHandler>) -> Self {
        self.receive_handlers.push(handler);
        self
    }

    /// Sets the handler for unresolved identifiers.
    pub fn on_unknown_package(mut self, handler: Arc<dyn UnknownPackageHandler>) -> Self {
        self.unknown_package_handler = Some(handler);
        self
    }

    /// Sets the read-timeout handler.
    pub fn on_timeout(mut self, handler: Arc<dyn TimeoutHandler>) -> Self {
        self.timeout_handler = Some(handler);
        self
    }

    /// Sets the disconnect handler.
    pub fn on_disconnect(mut self, handler: Arc<dyn DisconnectHandler>) -> Self {
        self.disconnect_handler = Some(handler);
        self
    }

    /// Opens the TCP connection, wires up the engine, and starts the read
    /// loop.
    ///
    /// The builder is consumed, so a client cannot be connected twice.
    ///
    /// # Errors
    /// [`ClientError::Connect`] if the socket cannot be opened.
    pub async fn connect(self) -> Result<Client, ClientError> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(ClientError::Connect)?;
        tracing::info!(address = %self.address, "connected");

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(PackageRegistry::with_base_packages()));
        let connection = ClientConnection::new(stream, registry, self.config);

        for handler in self.receive_handlers {
            connection.add_receive_handler(handler);
        }
        if let Some(handler) = self.unknown_package_handler {
            connection.set_unknown_package_handler(handler);
        }
        if let Some(handler) = self.timeout_handler {
            connection.set_timeout_handler(handler);
        }
        if let Some(handler) = self.disconnect_handler {
            connection.set_disconnect_handler(handler);
        }

        connection.enable();
        Ok(Client { connection })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A connected client.
///
/// Thin wrapper around the underlying [`ClientConnection`]; use
/// [`connection`](Self::connection) for anything the conveniences below
/// don't cover.
pub struct Client {
    connection: ClientConnection,
}

impl Client {
    /// Creates a new builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The underlying connection engine.
    pub fn connection(&self) -> &ClientConnection {
        &self.connection
    }

    /// Current lifecycle state of the connection.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Returns `true` while the connection is `Active`.
    pub fn is_active(&self) -> bool {
        self.connection.is_active()
    }

    /// Sends a package. See [`ClientConnection::send`].
    ///
    /// # Errors
    /// [`ClientError::Io`] if the write fails (the connection is disabled
    /// first).
    pub async fn send(&self, package: &Package) -> Result<(), ClientError> {
        self.connection.send(package).await
    }

    /// Disables the connection. See [`ClientConnection::disable`].
    pub async fn disable(&self) {
        self.connection.disable().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = ClientBuilder::new();
        assert_eq!(builder.address, "127.0.0.1:7400");
        assert_eq!(builder.config.max_package_size, 2048);
        assert!(builder.config.read_timeout.is_none());
        assert!(builder.registry.is_none());
        assert!(builder.receive_handlers.is_empty());
    }

    #[test]
    fn test_builder_setters_accumulate() {
        let builder = Client::builder()
            .address("10.0.0.1:9000")
            .max_package_size(4096)
            .read_timeout(Duration::from_secs(5));
        assert_eq!(builder.address, "10.0.0.1:9000");
        assert_eq!(builder.config.max_package_size, 4096);
        assert_eq!(builder.config.read_timeout, Some(Duration::from_secs(5)));
    }
}

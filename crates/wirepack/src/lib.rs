//! # Wirepack
//!
//! Client-side binary package protocol engine.
//!
//! Wirepack establishes a single TCP connection, frames the incoming byte
//! stream into typed binary messages ("packages"), decodes them through a
//! per-type descriptor registry, and dispatches each decoded package to
//! registered handlers.
//!
//! ```text
//! bytes ──▶ read loop ──▶ registry lookup ──▶ descriptor decode ──▶ dispatch
//!            (engine)      (PackageRegistry)   (PackageDescriptor)   (handlers)
//! ```
//!
//! - [`Client`] / [`ClientBuilder`] — open a connection and wire everything
//!   up.
//! - [`ClientConnection`] — the engine: lifecycle state machine, read loop,
//!   send path.
//! - [`PackageRegistry`] / [`PackageDescriptor`] — which message shapes
//!   exist and how to decode them.
//! - [`ReceiveHandler`] & friends — the callback contracts.
//!
//! The wire-level types live in [`wirepack_protocol`], re-exported here as
//! [`protocol`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use wirepack::{Client, ClientConnection, HandlerError, ReceiveHandler};
//! use wirepack::protocol::{base, Package};
//!
//! struct PrintMessages;
//!
//! #[async_trait]
//! impl ReceiveHandler for PrintMessages {
//!     async fn on_receive(
//!         &self,
//!         package: &Package,
//!         _connection: &ClientConnection,
//!     ) -> Result<(), HandlerError> {
//!         if package.id == base::MESSAGE {
//!             println!("{}", base::message_text(package));
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> Result<(), wirepack::ClientError> {
//! let client = Client::builder()
//!     .address("127.0.0.1:7400")
//!     .on_receive(Arc::new(PrintMessages))
//!     .connect()
//!     .await?;
//! client.send(&base::message("hello")).await?;
//! # Ok(())
//! # }
//! ```

mod callbacks;
mod client;
mod config;
mod connection;
mod descriptor;
mod error;
mod registry;

pub use callbacks::{
    DisconnectHandler, HandlerError, ReceiveHandler, TimeoutHandler, UnknownPackageHandler,
};
pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, DEFAULT_MAX_PACKAGE_SIZE};
pub use connection::{ClientConnection, ConnectionState};
pub use descriptor::{DecodeFn, PackageDescriptor};
pub use error::ClientError;
pub use registry::PackageRegistry;

pub use wirepack_protocol as protocol;

//! Wire layer for Wirepack.
//!
//! This crate defines the data that travels on the wire and nothing else:
//!
//! - **[`PackageId`]** — the 2-byte type identifier every message starts with.
//! - **[`Package`]** — one decoded (or pending-encode) message: identifier,
//!   declared length metadata, dynamic flag, raw payload.
//! - **[`base`]** — the standard package set (keep-alive, message, …).
//! - **[`ProtocolError`]** — what can go wrong describing or constructing
//!   packages.
//!
//! # Architecture
//!
//! The wire layer sits below the engine. It knows how bytes are laid out —
//! identifiers, length prefixes, payloads — but nothing about sockets,
//! registries, or handlers:
//!
//! ```text
//! Engine (sockets, registry, dispatch) → Wire (Package, bytes)
//! ```

mod error;
mod package;

pub mod base;

pub use error::ProtocolError;
pub use package::{
    ID_LENGTH, MAX_PREFIX_WIDTH, Package, PackageId, decode_length_prefix, encode_length_prefix,
    prefix_capacity,
};

//! Error types for the wire layer.
//!
//! Everything here is a *configuration or shape* error — something that is
//! wrong about how a package or registry was set up, caught before any bytes
//! hit the network. Runtime transport failures live in the engine crate.

use crate::PackageId;

/// Errors that can occur while describing or constructing packages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Two package types were registered under the same identifier.
    ///
    /// Identifiers are the single lookup key on the wire; a duplicate would
    /// make one of the two types unreachable. Registration rejects this
    /// immediately instead of silently overwriting.
    #[error("package identifier {0} is already registered")]
    DuplicateId(PackageId),

    /// A dynamic package type declared a length-prefix width outside the
    /// supported `1..=8` byte range.
    ///
    /// The prefix is decoded into a `u64`, so eight bytes is the widest
    /// field that can be represented. Zero-width prefixes would make the
    /// payload length unknowable.
    #[error("length-prefix width {0} is outside the supported range (1..=8 bytes)")]
    InvalidPrefixWidth(u16),

    /// A fixed-length package was constructed with a payload that does not
    /// match its declared length.
    ///
    /// Fixed types carry no length information on the wire — the receiver
    /// reads exactly the declared count — so any other payload size would
    /// desynchronize the stream.
    #[error("payload is {actual} bytes but package {id} declares a fixed length of {expected}")]
    FixedLengthMismatch {
        /// The package type being constructed.
        id: PackageId,
        /// The descriptor's declared payload length.
        expected: u16,
        /// The actual payload size supplied.
        actual: usize,
    },

    /// A dynamic package's payload is too large to be described by its
    /// length-prefix field.
    #[error("payload of {len} bytes does not fit a {width}-byte length prefix for package {id}")]
    PayloadTooLarge {
        /// The package type being constructed.
        id: PackageId,
        /// The actual payload size supplied.
        len: usize,
        /// The declared prefix width in bytes.
        width: u16,
    },
}

//! Package type descriptors: the static metadata behind each identifier.
//!
//! A descriptor tells the engine how to frame one package type — is the
//! payload length fixed or carried on the wire, how wide is the length
//! field — and how to turn the framed bytes into a [`Package`]. It can also
//! carry a per-type receive handler, invoked after the global ones.

use std::fmt;
use std::sync::Arc;

use wirepack_protocol::{MAX_PREFIX_WIDTH, Package, PackageId, ProtocolError, prefix_capacity};

use crate::callbacks::ReceiveHandler;

/// Decoding constructor for one package type.
///
/// Called with the descriptor's metadata and the framed payload bytes; must
/// not fail for input of the declared shape (the read loop only hands it
/// payloads it has already framed correctly). This is a strategy slot: the
/// default simply builds a [`Package`], and a type can swap in its own
/// constructor to normalize or enrich the entity.
pub type DecodeFn = Arc<dyn Fn(PackageId, u16, bool, Vec<u8>) -> Package + Send + Sync>;

/// Static metadata for one package type.
///
/// Descriptors are plain immutable data, registered explicitly during
/// initialization (no runtime type scanning). Cloning is cheap — the decode
/// strategy and handler are shared `Arc`s.
#[derive(Clone)]
pub struct PackageDescriptor {
    id: PackageId,
    declared_len: u16,
    dynamic: bool,
    decode: DecodeFn,
    handler: Option<Arc<dyn ReceiveHandler>>,
}

impl PackageDescriptor {
    /// Describes a fixed-length package type: exactly `len` payload bytes
    /// follow the identifier on the wire.
    pub fn fixed(id: PackageId, len: u16) -> Self {
        Self {
            id,
            declared_len: len,
            dynamic: false,
            decode: Arc::new(Package::new),
            handler: None,
        }
    }

    /// Describes a dynamic-length package type: a `prefix_width`-byte
    /// big-endian length field follows the identifier, then that many
    /// payload bytes.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidPrefixWidth`] if `prefix_width` is outside
    /// `1..=8`.
    pub fn dynamic(id: PackageId, prefix_width: u16) -> Result<Self, ProtocolError> {
        if prefix_width == 0 || prefix_width > MAX_PREFIX_WIDTH {
            return Err(ProtocolError::InvalidPrefixWidth(prefix_width));
        }
        Ok(Self {
            id,
            declared_len: prefix_width,
            dynamic: true,
            decode: Arc::new(Package::new),
            handler: None,
        })
    }

    /// Replaces the decoding constructor.
    pub fn with_decoder(
        mut self,
        decode: impl Fn(PackageId, u16, bool, Vec<u8>) -> Package + Send + Sync + 'static,
    ) -> Self {
        self.decode = Arc::new(decode);
        self
    }

    /// Attaches the per-type receive handler, invoked after all global
    /// handlers for packages of this type.
    pub fn with_handler(mut self, handler: Arc<dyn ReceiveHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// The package type identifier.
    pub fn id(&self) -> PackageId {
        self.id
    }

    /// Exact payload byte count (fixed types) or length-prefix width
    /// (dynamic types).
    pub fn declared_len(&self) -> u16 {
        self.declared_len
    }

    /// Whether the payload length travels on the wire.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// The per-type receive handler, if any.
    pub fn handler(&self) -> Option<Arc<dyn ReceiveHandler>> {
        self.handler.clone()
    }

    /// Builds the entity for a payload that already matches this
    /// descriptor's framing. Decode-side construction: never fails.
    ///
    /// The entity's `declared_len` mirrors the descriptor — for dynamic
    /// types that is the prefix *width*, not the payload size just read.
    pub fn build(&self, payload: Vec<u8>) -> Package {
        (self.decode)(self.id, self.declared_len, self.dynamic, payload)
    }

    /// Builds an outgoing entity, validating the payload against this
    /// descriptor's shape.
    ///
    /// # Errors
    /// - [`ProtocolError::FixedLengthMismatch`] for a fixed type whose
    ///   payload is not exactly `declared_len` bytes.
    /// - [`ProtocolError::PayloadTooLarge`] for a dynamic type whose payload
    ///   does not fit the prefix field.
    pub fn instantiate(&self, payload: Vec<u8>) -> Result<Package, ProtocolError> {
        if self.dynamic {
            if payload.len() as u64 > prefix_capacity(self.declared_len) {
                return Err(ProtocolError::PayloadTooLarge {
                    id: self.id,
                    len: payload.len(),
                    width: self.declared_len,
                });
            }
        } else if payload.len() != usize::from(self.declared_len) {
            return Err(ProtocolError::FixedLengthMismatch {
                id: self.id,
                expected: self.declared_len,
                actual: payload.len(),
            });
        }
        Ok(self.build(payload))
    }
}

impl fmt::Debug for PackageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageDescriptor")
            .field("id", &self.id)
            .field("declared_len", &self.declared_len)
            .field("dynamic", &self.dynamic)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

// =========================================================================
// Tests
// =========================================================================
